//! End-to-end scenarios: projects are built as parsed models, driven by
//! frame updates at 60 Hz, and asserted on final variable/target state.

use sb3vm_core::audio::AudioSink;
use sb3vm_core::project::{
    BlockDecl, BroadcastDecl, CostumeDecl, Field, Input, ListDecl, Mutation, Opcode, Project,
    RotationStyle, SoundDecl, TargetDecl, VariableDecl,
};
use sb3vm_core::target::SoundEffects;
use sb3vm_core::types::SoundHandle;
use sb3vm_core::{Runtime, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DT: f64 = 1.0 / 60.0;

// ─── Builders ─────────────────────────────────────────────────

fn block(opcode: Opcode) -> BlockDecl {
    BlockDecl {
        opcode,
        inputs: Vec::new(),
        fields: BTreeMap::new(),
        next: None,
        parent: None,
        top_level: false,
        shadow: false,
        mutation: None,
    }
}

fn lit(value: impl Into<Value>) -> Input {
    Input::Literal {
        value: value.into(),
    }
}

fn reporter(id: &str) -> Input {
    Input::Block { id: id.to_string() }
}

fn substack(id: &str) -> Input {
    Input::Substack {
        id: Some(id.to_string()),
    }
}

fn var_field(name: &str) -> (String, Field) {
    (
        "VARIABLE".to_string(),
        Field {
            value: name.to_string(),
            id: Some(name.to_string()),
        },
    )
}

fn list_field(name: &str) -> (String, Field) {
    (
        "LIST".to_string(),
        Field {
            value: name.to_string(),
            id: Some(name.to_string()),
        },
    )
}

fn flag_hat(next: &str) -> BlockDecl {
    let mut hat = block(Opcode::EventWhenFlagClicked);
    hat.top_level = true;
    hat.next = Some(next.to_string());
    hat
}

fn change_var(name: &str, delta: impl Into<Value>) -> BlockDecl {
    let mut b = block(Opcode::DataChangeVariableBy);
    b.inputs.push(("VALUE".to_string(), lit(delta)));
    b.fields.extend([var_field(name)]);
    b
}

fn set_var(name: &str, input: Input) -> BlockDecl {
    let mut b = block(Opcode::DataSetVariableTo);
    b.inputs.push(("VALUE".to_string(), input));
    b.fields.extend([var_field(name)]);
    b
}

fn chain(blocks: &mut BTreeMap<String, BlockDecl>, ids: &[&str]) {
    for pair in ids.windows(2) {
        blocks.get_mut(pair[0]).expect("linked block").next = Some(pair[1].to_string());
    }
}

fn stage(vars: &[&str]) -> TargetDecl {
    TargetDecl {
        name: "Stage".to_string(),
        is_stage: true,
        variables: vars
            .iter()
            .map(|v| VariableDecl {
                id: v.to_string(),
                name: v.to_string(),
                value: Value::Number(0.0),
            })
            .collect(),
        lists: Vec::new(),
        broadcasts: vec![BroadcastDecl {
            id: "b1".to_string(),
            name: "test".to_string(),
        }],
        blocks: BTreeMap::new(),
        costumes: vec![CostumeDecl {
            name: "backdrop1".to_string(),
            width: 480.0,
            height: 360.0,
        }],
        sounds: Vec::new(),
        current_costume: 0,
        x: 0.0,
        y: 0.0,
        direction: 90.0,
        size: 100.0,
        visible: true,
        volume: 100.0,
        rotation_style: RotationStyle::AllAround,
    }
}

fn sprite(name: &str, blocks: BTreeMap<String, BlockDecl>) -> TargetDecl {
    TargetDecl {
        name: name.to_string(),
        is_stage: false,
        variables: Vec::new(),
        lists: Vec::new(),
        broadcasts: Vec::new(),
        blocks,
        costumes: vec![CostumeDecl {
            name: "costume1".to_string(),
            width: 40.0,
            height: 40.0,
        }],
        sounds: Vec::new(),
        current_costume: 0,
        x: 0.0,
        y: 0.0,
        direction: 90.0,
        size: 100.0,
        visible: true,
        volume: 100.0,
        rotation_style: RotationStyle::AllAround,
    }
}

fn project(stage: TargetDecl, sprites: Vec<TargetDecl>) -> Project {
    let mut targets = vec![stage];
    targets.extend(sprites);
    Project {
        targets,
        extensions: Vec::new(),
    }
}

/// Fire the green flag and run frames until every thread is done. Returns
/// the number of frames taken.
fn run_project(rt: &mut Runtime, max_frames: usize) -> usize {
    rt.green_flag();
    for frame in 1..=max_frames {
        rt.update(DT);
        if rt.active_thread_count() == 0 {
            return frame;
        }
    }
    panic!("threads still active after {max_frames} frames");
}

fn num(rt: &Runtime, name: &str) -> f64 {
    rt.variable("Stage", name)
        .unwrap_or_else(|| panic!("variable {name}"))
        .to_number()
}

// ─── Scheduler & control flow ─────────────────────────────────

#[test]
fn repeat_three_data_only() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("rep"));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(3.0)));
    rep.inputs.push(("SUBSTACK".into(), substack("chg")));
    blocks.insert("rep".into(), rep);
    blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut rt = Runtime::new(&project(stage(&["counter"]), vec![sprite("Sprite1", blocks)])).unwrap();
    let frames = run_project(&mut rt, 100);
    assert_eq!(num(&rt, "counter"), 3.0);
    assert!(frames <= 5, "took {frames} frames");
}

#[test]
fn nested_repeats_multiply() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("outer"));
    let mut outer = block(Opcode::ControlRepeat);
    outer.inputs.push(("TIMES".into(), lit(2.0)));
    outer.inputs.push(("SUBSTACK".into(), substack("inner")));
    blocks.insert("outer".into(), outer);
    let mut inner = block(Opcode::ControlRepeat);
    inner.inputs.push(("TIMES".into(), lit(3.0)));
    inner.inputs.push(("SUBSTACK".into(), substack("chg")));
    blocks.insert("inner".into(), inner);
    blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut rt = Runtime::new(&project(stage(&["counter"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    assert_eq!(num(&rt, "counter"), 6.0);
}

#[test]
fn repeat_count_rounds_ties_up() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("rep"));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(3.5)));
    rep.inputs.push(("SUBSTACK".into(), substack("chg")));
    blocks.insert("rep".into(), rep);
    blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut rt = Runtime::new(&project(stage(&["counter"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    assert_eq!(num(&rt, "counter"), 4.0);
}

#[test]
fn hundred_data_iterations_fit_in_five_frames() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("rep"));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(100.0)));
    rep.inputs.push(("SUBSTACK".into(), substack("chg")));
    blocks.insert("rep".into(), rep);
    blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut rt = Runtime::new(&project(stage(&["counter"]), vec![sprite("Sprite1", blocks)])).unwrap();
    let frames = run_project(&mut rt, 100);
    assert_eq!(num(&rt, "counter"), 100.0);
    assert!(frames <= 5, "took {frames} frames");
}

#[test]
fn redrawing_thread_does_not_starve_data_threads() {
    // Sprite1: pure data loop. Sprite2: redraws every frame, forever.
    let mut data_blocks = BTreeMap::new();
    data_blocks.insert("hat".into(), flag_hat("rep"));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(100.0)));
    rep.inputs.push(("SUBSTACK".into(), substack("chg")));
    data_blocks.insert("rep".into(), rep);
    data_blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut mover_blocks = BTreeMap::new();
    mover_blocks.insert("hat".into(), flag_hat("fv"));
    let mut fv = block(Opcode::ControlForever);
    fv.inputs.push(("SUBSTACK".into(), substack("mv")));
    mover_blocks.insert("fv".into(), fv);
    let mut mv = block(Opcode::MotionMoveSteps);
    mv.inputs.push(("STEPS".into(), lit(1.0)));
    mover_blocks.insert("mv".into(), mv);

    let mut rt = Runtime::new(&project(
        stage(&["counter"]),
        vec![
            sprite("Sprite1", data_blocks),
            sprite("Sprite2", mover_blocks),
        ],
    ))
    .unwrap();
    rt.green_flag();
    let mut frames = 0;
    for _ in 0..5 {
        rt.update(DT);
        frames += 1;
        if num(&rt, "counter") == 100.0 {
            break;
        }
    }
    // The mover's per-frame redraw yield only parks the mover; the data
    // loop still finishes within the throughput bound.
    assert_eq!(num(&rt, "counter"), 100.0);
    assert!(frames <= 5, "took {frames} frames");
    // One step per frame for the mover, direction 90 = right.
    let (x, _) = rt.position("Sprite2").unwrap();
    assert_eq!(x, frames as f64);
    // The frame did draw, so the repaint hint is up.
    assert!(rt.redraw_requested());
}

#[test]
fn forever_with_empty_body_stays_live_without_hanging() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("fv"));
    blocks.insert("fv".into(), block(Opcode::ControlForever));

    let mut rt = Runtime::new(&project(stage(&[]), vec![sprite("Sprite1", blocks)])).unwrap();
    rt.green_flag();
    for _ in 0..5 {
        rt.update(DT);
    }
    assert_eq!(rt.active_thread_count(), 1);
}

#[test]
fn wait_until_resumes_when_condition_turns_true() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("wu"));
    let mut wu = block(Opcode::ControlWaitUntil);
    wu.inputs.push(("CONDITION".into(), reporter("eq")));
    blocks.insert("wu".into(), wu);
    let mut eq = block(Opcode::OperatorEquals);
    eq.inputs.push(("OPERAND1".into(), reporter("v")));
    eq.inputs.push(("OPERAND2".into(), lit(1.0)));
    blocks.insert("eq".into(), eq);
    let mut v = block(Opcode::DataVariable);
    v.fields.extend([var_field("v")]);
    blocks.insert("v".into(), v);
    blocks.insert("done".into(), set_var("done", lit(1.0)));
    chain(&mut blocks, &["wu", "done"]);

    // A second script flips the variable after a few frames.
    blocks.insert("hat2".into(), flag_hat("w"));
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(0.05)));
    blocks.insert("w".into(), w);
    blocks.insert("setv".into(), set_var("v", lit(1.0)));
    chain(&mut blocks, &["w", "setv"]);

    let mut rt = Runtime::new(&project(stage(&["v", "done"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    assert_eq!(num(&rt, "done"), 1.0);
}

#[test]
fn unknown_opcodes_execute_as_no_ops() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("a"));
    blocks.insert("a".into(), change_var("counter", 1.0));
    blocks.insert("mystery".into(), block(Opcode::Unknown));
    blocks.insert("b".into(), change_var("counter", 1.0));
    chain(&mut blocks, &["a", "mystery", "b"]);

    let mut rt = Runtime::new(&project(stage(&["counter"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    assert_eq!(num(&rt, "counter"), 2.0);
}

// ─── Broadcasts ───────────────────────────────────────────────

fn broadcast_input() -> Input {
    Input::Broadcast {
        id: "b1".to_string(),
        name: "test".to_string(),
    }
}

#[test]
fn broadcast_and_wait_joins_before_continuing() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("bw"));
    let mut bw = block(Opcode::EventBroadcastAndWait);
    bw.inputs.push(("BROADCAST_INPUT".into(), broadcast_input()));
    blocks.insert("bw".into(), bw);
    blocks.insert("plus1".into(), change_var("result", 1.0));
    chain(&mut blocks, &["bw", "plus1"]);

    let mut rhat = block(Opcode::EventWhenBroadcastReceived);
    rhat.top_level = true;
    rhat.fields
        .insert("BROADCAST_OPTION".into(), Field::plain("test"));
    rhat.next = Some("w".into());
    blocks.insert("rhat".into(), rhat);
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(0.01)));
    blocks.insert("w".into(), w);
    blocks.insert("plus10".into(), change_var("result", 10.0));
    chain(&mut blocks, &["w", "plus10"]);

    let mut rt = Runtime::new(&project(stage(&["result"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    // 10 then 1: the caller resumed only after the receiver finished.
    assert_eq!(num(&rt, "result"), 11.0);
}

#[test]
fn rebroadcast_restarts_live_receiver_with_fresh_handle() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("b1"));
    let mut b1 = block(Opcode::EventBroadcast);
    b1.inputs.push(("BROADCAST_INPUT".into(), broadcast_input()));
    blocks.insert("b1".into(), b1);
    let mut pause = block(Opcode::ControlWait);
    pause.inputs.push(("DURATION".into(), lit(0.02)));
    blocks.insert("pause".into(), pause);
    let mut b2 = block(Opcode::EventBroadcast);
    b2.inputs.push(("BROADCAST_INPUT".into(), broadcast_input()));
    blocks.insert("b2".into(), b2);
    chain(&mut blocks, &["b1", "pause", "b2"]);

    let mut rhat = block(Opcode::EventWhenBroadcastReceived);
    rhat.top_level = true;
    rhat.fields
        .insert("BROADCAST_OPTION".into(), Field::plain("test"));
    rhat.next = Some("early".into());
    blocks.insert("rhat".into(), rhat);
    blocks.insert("early".into(), change_var("c", 1.0));
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(0.05)));
    blocks.insert("w".into(), w);
    blocks.insert("late".into(), change_var("c", 100.0));
    chain(&mut blocks, &["early", "w", "late"]);

    let mut rt = Runtime::new(&project(stage(&["c"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    // First run reaches +1 then parks; the restart runs +1 again and only
    // the restarted thread survives to +100.
    assert_eq!(num(&rt, "c"), 102.0);
}

#[test]
fn broadcast_names_match_case_insensitively() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("b"));
    let mut b = block(Opcode::EventBroadcast);
    b.inputs.push((
        "BROADCAST_INPUT".into(),
        Input::Broadcast {
            id: "b1".into(),
            name: "TEST".into(),
        },
    ));
    blocks.insert("b".into(), b);

    let mut rhat = block(Opcode::EventWhenBroadcastReceived);
    rhat.top_level = true;
    rhat.fields
        .insert("BROADCAST_OPTION".into(), Field::plain("test"));
    rhat.next = Some("chg".into());
    blocks.insert("rhat".into(), rhat);
    blocks.insert("chg".into(), change_var("c", 1.0));

    let mut rt = Runtime::new(&project(stage(&["c"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    assert_eq!(num(&rt, "c"), 1.0);
}

#[test]
fn missing_broadcast_is_a_silent_no_op() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("bw"));
    let mut bw = block(Opcode::EventBroadcastAndWait);
    bw.inputs.push((
        "BROADCAST_INPUT".into(),
        Input::Broadcast {
            id: "nope".into(),
            name: "nobody listens".into(),
        },
    ));
    blocks.insert("bw".into(), bw);
    blocks.insert("after".into(), set_var("r", lit(5.0)));
    chain(&mut blocks, &["bw", "after"]);

    let mut rt = Runtime::new(&project(stage(&["r"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    assert_eq!(num(&rt, "r"), 5.0);
}

// ─── Procedures ───────────────────────────────────────────────

fn prototype(proccode: &str, arg_ids: &[&str], arg_names: &[&str], warp: bool) -> BlockDecl {
    let mut proto = block(Opcode::ProceduresPrototype);
    proto.shadow = true;
    proto.mutation = Some(Mutation {
        proccode: proccode.to_string(),
        argument_ids: arg_ids.iter().map(|s| s.to_string()).collect(),
        argument_names: arg_names.iter().map(|s| s.to_string()).collect(),
        warp,
    });
    proto
}

fn definition(proto_id: &str, body: Option<&str>) -> BlockDecl {
    let mut def = block(Opcode::ProceduresDefinition);
    def.top_level = true;
    def.inputs.push((
        "custom_block".to_string(),
        Input::Block {
            id: proto_id.to_string(),
        },
    ));
    def.next = body.map(|b| b.to_string());
    def
}

fn call(proccode: &str, args: Vec<(&str, Input)>, warp: bool) -> BlockDecl {
    let mut c = block(Opcode::ProceduresCall);
    c.mutation = Some(Mutation {
        proccode: proccode.to_string(),
        argument_ids: args.iter().map(|(id, _)| id.to_string()).collect(),
        argument_names: Vec::new(),
        warp,
    });
    c.inputs = args
        .into_iter()
        .map(|(id, input)| (id.to_string(), input))
        .collect();
    c
}

#[test]
fn warp_procedure_finishes_fifty_iterations_fast() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("call"));
    blocks.insert("call".into(), call("blast", vec![], true));
    blocks.insert("proto".into(), prototype("blast", &[], &[], true));
    blocks.insert("def".into(), definition("proto", Some("rep")));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(50.0)));
    rep.inputs.push(("SUBSTACK".into(), substack("chg")));
    blocks.insert("rep".into(), rep);
    blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut rt = Runtime::new(&project(stage(&["counter"]), vec![sprite("Sprite1", blocks)])).unwrap();
    let frames = run_project(&mut rt, 100);
    assert_eq!(num(&rt, "counter"), 50.0);
    assert!(frames <= 3, "took {frames} frames");
}

#[test]
fn stop_this_script_returns_to_caller_in_recursion() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("call5"));
    blocks.insert(
        "call5".into(),
        call("countdown %s", vec![("arg1", lit(5.0))], false),
    );
    blocks.insert("set88".into(), set_var("result", lit(88.0)));
    chain(&mut blocks, &["call5", "set88"]);

    blocks.insert("proto".into(), prototype("countdown %s", &["arg1"], &["n"], false));
    blocks.insert("def".into(), definition("proto", Some("chg")));
    blocks.insert("chg".into(), change_var("counter", 1.0));

    let mut guard = block(Opcode::ControlIf);
    guard.inputs.push(("CONDITION".into(), reporter("lt")));
    guard.inputs.push(("SUBSTACK".into(), substack("stop")));
    blocks.insert("if".into(), guard);
    let mut lt = block(Opcode::OperatorLt);
    lt.inputs.push(("OPERAND1".into(), reporter("n1")));
    lt.inputs.push(("OPERAND2".into(), lit(3.0)));
    blocks.insert("lt".into(), lt);
    let mut n1 = block(Opcode::ArgumentReporterStringNumber);
    n1.fields.insert("VALUE".into(), Field::plain("n"));
    blocks.insert("n1".into(), n1);
    let mut stop = block(Opcode::ControlStop);
    stop.fields
        .insert("STOP_OPTION".into(), Field::plain("this script"));
    blocks.insert("stop".into(), stop);

    let mut sub = block(Opcode::OperatorSubtract);
    sub.inputs.push(("NUM1".into(), reporter("n2")));
    sub.inputs.push(("NUM2".into(), lit(1.0)));
    blocks.insert("sub".into(), sub);
    let mut n2 = block(Opcode::ArgumentReporterStringNumber);
    n2.fields.insert("VALUE".into(), Field::plain("n"));
    blocks.insert("n2".into(), n2);
    blocks.insert(
        "rec".into(),
        call("countdown %s", vec![("arg1", reporter("sub"))], false),
    );
    chain(&mut blocks, &["chg", "if", "rec"]);

    let mut rt =
        Runtime::new(&project(stage(&["counter", "result"]), vec![sprite("Sprite1", blocks)]))
            .unwrap();
    run_project(&mut rt, 100);
    // Increments at n = 5, 4, 3, 2; the guard stops the n = 2 frame before
    // it recurses, and the top-level script still runs its final block.
    assert_eq!(num(&rt, "counter"), 4.0);
    assert_eq!(num(&rt, "result"), 88.0);
}

// ─── Motion & fence ───────────────────────────────────────────

#[test]
fn fence_clamps_forty_pixel_costume() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("go"));
    let mut go = block(Opcode::MotionGoToXY);
    go.inputs.push(("X".into(), lit(300.0)));
    go.inputs.push(("Y".into(), lit(0.0)));
    blocks.insert("go".into(), go);

    let mut rt = Runtime::new(&project(stage(&[]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    let (x, y) = rt.position("Sprite1").unwrap();
    assert!(x > 240.0 && x <= 255.0, "x = {x}");
    assert_eq!(y, 0.0);
}

#[test]
fn glide_sets_final_position_exactly() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("glide"));
    let mut glide = block(Opcode::MotionGlideSecsToXY);
    glide.inputs.push(("SECS".into(), lit(0.1)));
    glide.inputs.push(("X".into(), lit(100.0)));
    glide.inputs.push(("Y".into(), lit(50.0)));
    blocks.insert("glide".into(), glide);

    let mut rt = Runtime::new(&project(stage(&[]), vec![sprite("Sprite1", blocks)])).unwrap();
    let frames = run_project(&mut rt, 100);
    assert_eq!(rt.position("Sprite1").unwrap(), (100.0, 50.0));
    assert!(frames >= 6, "glide finished suspiciously fast: {frames}");
}

#[test]
fn move_steps_follows_direction_convention() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("point"));
    let mut point = block(Opcode::MotionPointInDirection);
    point.inputs.push(("DIRECTION".into(), lit(0.0)));
    blocks.insert("point".into(), point);
    let mut mv = block(Opcode::MotionMoveSteps);
    mv.inputs.push(("STEPS".into(), lit(10.0)));
    blocks.insert("mv".into(), mv);
    chain(&mut blocks, &["point", "mv"]);

    let mut rt = Runtime::new(&project(stage(&[]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    let (x, y) = rt.position("Sprite1").unwrap();
    // Direction 0 is up.
    assert!(x.abs() < 1e-9);
    assert!((y - 10.0).abs() < 1e-9);
}

#[test]
fn turn_wraps_direction_into_signed_range() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("turn"));
    let mut turn = block(Opcode::MotionTurnRight);
    turn.inputs.push(("DEGREES".into(), lit(180.0)));
    blocks.insert("turn".into(), turn);

    let mut rt = Runtime::new(&project(stage(&[]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    // 90 + 180 = 270, normalised to -90.
    assert_eq!(rt.direction("Sprite1").unwrap(), -90.0);
}

// ─── Sound ────────────────────────────────────────────────────

struct CountingSink(Arc<AtomicUsize>);

impl AudioSink for CountingSink {
    fn start(&mut self, _: SoundHandle, _: &SoundDecl, _: f64, _: SoundEffects) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    fn stop_all(&mut self) {}
}

fn sound_menu(name: &str) -> BlockDecl {
    let mut menu = block(Opcode::SoundSoundsMenu);
    menu.shadow = true;
    menu.fields
        .insert("SOUND_MENU".into(), Field::plain(name));
    menu
}

#[test]
fn play_until_done_in_repeat_five_starts_five_playbacks() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("rep"));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(5.0)));
    rep.inputs.push(("SUBSTACK".into(), substack("play")));
    blocks.insert("rep".into(), rep);
    let mut play = block(Opcode::SoundPlayUntilDone);
    play.inputs.push(("SOUND_MENU".into(), reporter("menu")));
    blocks.insert("play".into(), play);
    blocks.insert("menu".into(), sound_menu("blip"));

    let mut target = sprite("Sprite1", blocks);
    target.sounds.push(SoundDecl {
        name: "blip".to_string(),
        duration_secs: 0.05,
    });

    let starts = Arc::new(AtomicUsize::new(0));
    let mut rt = Runtime::new(&project(stage(&[]), vec![target])).unwrap();
    rt.set_audio_sink(Box::new(CountingSink(starts.clone())));
    run_project(&mut rt, 100);
    assert_eq!(starts.load(Ordering::SeqCst), 5);
}

#[test]
fn stop_all_sounds_releases_waiting_threads() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("play"));
    let mut play = block(Opcode::SoundPlayUntilDone);
    play.inputs.push(("SOUND_MENU".into(), reporter("menu")));
    blocks.insert("play".into(), play);
    blocks.insert("menu".into(), sound_menu("drone"));
    blocks.insert("after".into(), set_var("r", lit(1.0)));
    chain(&mut blocks, &["play", "after"]);

    blocks.insert("hat2".into(), flag_hat("w"));
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(0.02)));
    blocks.insert("w".into(), w);
    blocks.insert("stop".into(), block(Opcode::SoundStopAllSounds));
    chain(&mut blocks, &["w", "stop"]);

    let mut target = sprite("Sprite1", blocks);
    target.sounds.push(SoundDecl {
        name: "drone".to_string(),
        duration_secs: 10.0,
    });

    let mut rt = Runtime::new(&project(stage(&["r"]), vec![target])).unwrap();
    rt.green_flag();
    rt.update(DT);
    assert!(rt.has_waiting_sounds("Sprite1"));
    for _ in 0..10 {
        rt.update(DT);
    }
    assert!(!rt.has_waiting_sounds("Sprite1"));
    assert_eq!(num(&rt, "r"), 1.0);
}

#[test]
fn missing_sound_completes_immediately() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("play"));
    let mut play = block(Opcode::SoundPlayUntilDone);
    play.inputs.push(("SOUND_MENU".into(), reporter("menu")));
    blocks.insert("play".into(), play);
    blocks.insert("menu".into(), sound_menu("ghost"));
    blocks.insert("after".into(), set_var("r", lit(1.0)));
    chain(&mut blocks, &["play", "after"]);

    let mut rt = Runtime::new(&project(stage(&["r"]), vec![sprite("Sprite1", blocks)])).unwrap();
    let frames = run_project(&mut rt, 10);
    assert_eq!(num(&rt, "r"), 1.0);
    assert!(frames <= 2);
}

// ─── Clones ───────────────────────────────────────────────────

fn clone_menu(option: &str) -> BlockDecl {
    let mut menu = block(Opcode::ControlCreateCloneOfMenu);
    menu.shadow = true;
    menu.fields
        .insert("CLONE_OPTION".into(), Field::plain(option));
    menu
}

#[test]
fn clone_runs_start_hat_then_deletes_itself() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("mk"));
    let mut mk = block(Opcode::ControlCreateCloneOf);
    mk.inputs.push(("CLONE_OPTION".into(), reporter("menu")));
    blocks.insert("mk".into(), mk);
    blocks.insert("menu".into(), clone_menu("_myself_"));

    let mut chat = block(Opcode::ControlStartAsClone);
    chat.top_level = true;
    chat.next = Some("chg".into());
    blocks.insert("chat".into(), chat);
    blocks.insert("chg".into(), change_var("clones", 1.0));
    blocks.insert("del".into(), block(Opcode::ControlDeleteThisClone));
    chain(&mut blocks, &["chg", "del"]);

    let mut rt = Runtime::new(&project(stage(&["clones"]), vec![sprite("Sprite1", blocks)])).unwrap();
    rt.green_flag();
    rt.update(DT);
    // Clone materialises at the first frame's end.
    assert_eq!(rt.clone_count(), 1);
    for _ in 0..3 {
        rt.update(DT);
    }
    assert_eq!(num(&rt, "clones"), 1.0);
    assert_eq!(rt.clone_count(), 0);
}

#[test]
fn clone_cap_drops_excess_requests() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("rep"));
    let mut rep = block(Opcode::ControlRepeat);
    rep.inputs.push(("TIMES".into(), lit(10.0)));
    rep.inputs.push(("SUBSTACK".into(), substack("mk")));
    blocks.insert("rep".into(), rep);
    let mut mk = block(Opcode::ControlCreateCloneOf);
    mk.inputs.push(("CLONE_OPTION".into(), reporter("menu")));
    blocks.insert("mk".into(), mk);
    blocks.insert("menu".into(), clone_menu("_myself_"));

    let mut options = sb3vm_core::RuntimeOptions::default();
    options.clone_cap = 3;
    let mut rt = Runtime::with_options(
        &project(stage(&[]), vec![sprite("Sprite1", blocks)]),
        options,
    )
    .unwrap();
    run_project(&mut rt, 100);
    assert_eq!(rt.clone_count(), 3);
}

#[test]
fn clones_inherit_state_but_diverge_afterwards() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("go"));
    let mut go = block(Opcode::MotionGoToXY);
    go.inputs.push(("X".into(), lit(17.0)));
    go.inputs.push(("Y".into(), lit(-8.0)));
    blocks.insert("go".into(), go);
    let mut mk = block(Opcode::ControlCreateCloneOf);
    mk.inputs.push(("CLONE_OPTION".into(), reporter("menu")));
    blocks.insert("mk".into(), mk);
    blocks.insert("menu".into(), clone_menu("_myself_"));
    chain(&mut blocks, &["go", "mk"]);

    let mut chat = block(Opcode::ControlStartAsClone);
    chat.top_level = true;
    chat.next = Some("cgo".into());
    blocks.insert("chat".into(), chat);
    let mut cgo = block(Opcode::MotionGoToXY);
    cgo.inputs.push(("X".into(), lit(-40.0)));
    cgo.inputs.push(("Y".into(), lit(0.0)));
    blocks.insert("cgo".into(), cgo);

    let mut rt = Runtime::new(&project(stage(&[]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 20);
    let snapshot = rt.visual_snapshot();
    let original = snapshot
        .iter()
        .find(|t| t.name == "Sprite1" && !t.is_clone)
        .unwrap();
    let clone = snapshot.iter().find(|t| t.is_clone).unwrap();
    assert_eq!((original.x, original.y), (17.0, -8.0));
    assert_eq!((clone.x, clone.y), (-40.0, 0.0));
}

// ─── Stops & restarts ─────────────────────────────────────────

#[test]
fn stop_all_kills_every_thread() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("one"));
    blocks.insert("one".into(), change_var("x", 1.0));
    let mut stop = block(Opcode::ControlStop);
    stop.fields.insert("STOP_OPTION".into(), Field::plain("all"));
    blocks.insert("stop".into(), stop);
    blocks.insert("unreached".into(), change_var("x", 1.0));
    chain(&mut blocks, &["one", "stop", "unreached"]);

    blocks.insert("hat2".into(), flag_hat("fv"));
    let mut fv = block(Opcode::ControlForever);
    fv.inputs.push(("SUBSTACK".into(), substack("chgy")));
    blocks.insert("fv".into(), fv);
    blocks.insert("chgy".into(), change_var("y", 1.0));

    let mut rt = Runtime::new(&project(stage(&["x", "y"]), vec![sprite("Sprite1", blocks)])).unwrap();
    rt.green_flag();
    rt.update(DT);
    rt.update(DT);
    assert_eq!(rt.active_thread_count(), 0);
    assert_eq!(num(&rt, "x"), 1.0);
}

#[test]
fn stop_other_scripts_spares_stage_and_self() {
    let mut sprite_blocks = BTreeMap::new();
    sprite_blocks.insert("hat".into(), flag_hat("fv"));
    let mut fv = block(Opcode::ControlForever);
    fv.inputs.push(("SUBSTACK".into(), substack("chga")));
    sprite_blocks.insert("fv".into(), fv);
    sprite_blocks.insert("chga".into(), change_var("a", 1.0));

    sprite_blocks.insert("hat2".into(), flag_hat("w"));
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(0.05)));
    sprite_blocks.insert("w".into(), w);
    let mut stop = block(Opcode::ControlStop);
    stop.fields
        .insert("STOP_OPTION".into(), Field::plain("other scripts in sprite"));
    sprite_blocks.insert("stop".into(), stop);
    sprite_blocks.insert("after".into(), set_var("self_done", lit(1.0)));
    chain(&mut sprite_blocks, &["w", "stop", "after"]);

    let mut stage_decl = stage(&["a", "s", "self_done"]);
    let mut stage_blocks = BTreeMap::new();
    stage_blocks.insert("shat".into(), flag_hat("srep"));
    let mut srep = block(Opcode::ControlRepeat);
    srep.inputs.push(("TIMES".into(), lit(20.0)));
    srep.inputs.push(("SUBSTACK".into(), substack("schg")));
    stage_blocks.insert("srep".into(), srep);
    stage_blocks.insert("schg".into(), change_var("s", 1.0));
    stage_decl.blocks = stage_blocks;

    let mut rt =
        Runtime::new(&project(stage_decl, vec![sprite("Sprite1", sprite_blocks)])).unwrap();
    run_project(&mut rt, 100);
    let frozen = num(&rt, "a");
    assert!(frozen > 0.0);
    assert_eq!(num(&rt, "self_done"), 1.0);
    assert_eq!(num(&rt, "s"), 20.0);

    // The forever loop really is dead.
    rt.update(DT);
    rt.update(DT);
    assert_eq!(num(&rt, "a"), frozen);
}

#[test]
fn green_flag_restarts_running_scripts() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("chg"));
    blocks.insert("chg".into(), change_var("g", 1.0));
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(10.0)));
    blocks.insert("w".into(), w);
    chain(&mut blocks, &["chg", "w"]);

    let mut rt = Runtime::new(&project(stage(&["g"]), vec![sprite("Sprite1", blocks)])).unwrap();
    rt.green_flag();
    rt.update(DT);
    rt.green_flag();
    rt.update(DT);
    assert_eq!(num(&rt, "g"), 2.0);
    assert_eq!(rt.active_thread_count(), 1);
}

// ─── Edge hats ────────────────────────────────────────────────

#[test]
fn timer_edge_hat_fires_once_per_rising_edge() {
    let mut blocks = BTreeMap::new();
    let mut hat = block(Opcode::EventWhenGreaterThan);
    hat.top_level = true;
    hat.fields
        .insert("WHENGREATERTHANMENU".into(), Field::plain("TIMER"));
    hat.inputs.push(("VALUE".into(), lit(0.05)));
    hat.next = Some("chg".into());
    blocks.insert("hat".into(), hat);
    blocks.insert("chg".into(), change_var("t", 1.0));

    let mut rt = Runtime::new(&project(stage(&["t"]), vec![sprite("Sprite1", blocks)])).unwrap();
    for _ in 0..20 {
        rt.update(DT);
    }
    assert_eq!(num(&rt, "t"), 1.0);

    rt.reset_timer();
    for _ in 0..20 {
        rt.update(DT);
    }
    assert_eq!(num(&rt, "t"), 2.0);
}

// ─── Reporters & data ─────────────────────────────────────────

#[test]
fn variable_reporters_evaluate_at_use_time() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("w"));
    let mut w = block(Opcode::ControlWait);
    w.inputs.push(("DURATION".into(), lit(0.05)));
    blocks.insert("w".into(), w);
    blocks.insert("read".into(), set_var("r", reporter("v")));
    chain(&mut blocks, &["w", "read"]);
    let mut v = block(Opcode::DataVariable);
    v.fields.extend([var_field("v")]);
    blocks.insert("v".into(), v);

    blocks.insert("hat2".into(), flag_hat("write"));
    blocks.insert("write".into(), set_var("v", lit(2.0)));

    let mut stage_decl = stage(&["v", "r"]);
    stage_decl.variables[0].value = Value::Number(1.0);
    let mut rt = Runtime::new(&project(stage_decl, vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 100);
    // The reporter saw the value at read time, not at script launch.
    assert_eq!(num(&rt, "r"), 2.0);
}

#[test]
fn infinity_arithmetic_follows_ieee() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("s1"));
    let mut div = block(Opcode::OperatorDivide);
    div.inputs.push(("NUM1".into(), lit("Infinity")));
    div.inputs.push(("NUM2".into(), lit(0.0)));
    blocks.insert("div".into(), div);
    blocks.insert("s1".into(), set_var("r1", reporter("div")));

    let mut subtract = block(Opcode::OperatorSubtract);
    subtract.inputs.push(("NUM1".into(), lit("Infinity")));
    subtract.inputs.push(("NUM2".into(), lit("Infinity")));
    blocks.insert("sub".into(), subtract);
    blocks.insert("s2".into(), set_var("r2", reporter("sub")));

    let mut mul = block(Opcode::OperatorMultiply);
    mul.inputs.push(("NUM1".into(), lit("Infinity")));
    mul.inputs.push(("NUM2".into(), lit(0.0)));
    blocks.insert("mul".into(), mul);
    blocks.insert("s3".into(), set_var("r3", reporter("mul")));
    chain(&mut blocks, &["s1", "s2", "s3"]);

    let mut rt =
        Runtime::new(&project(stage(&["r1", "r2", "r3"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    assert_eq!(
        rt.variable("Stage", "r1").unwrap(),
        Value::Number(f64::INFINITY)
    );
    assert!(matches!(rt.variable("Stage", "r2").unwrap(), Value::Number(n) if n.is_nan()));
    assert!(matches!(rt.variable("Stage", "r3").unwrap(), Value::Number(n) if n.is_nan()));
}

#[test]
fn operator_semantics_match_scratch() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("s1"));

    // -3 mod 6 takes the divisor's sign.
    let mut modulo = block(Opcode::OperatorMod);
    modulo.inputs.push(("NUM1".into(), lit(-3.0)));
    modulo.inputs.push(("NUM2".into(), lit(6.0)));
    blocks.insert("mod".into(), modulo);
    blocks.insert("s1".into(), set_var("r_mod", reporter("mod")));

    let mut round = block(Opcode::OperatorRound);
    round.inputs.push(("NUM".into(), lit(2.5)));
    blocks.insert("round".into(), round);
    blocks.insert("s2".into(), set_var("r_round", reporter("round")));

    let mut letter = block(Opcode::OperatorLetterOf);
    letter.inputs.push(("LETTER".into(), lit(2.0)));
    letter.inputs.push(("STRING".into(), lit("科学")));
    blocks.insert("letter".into(), letter);
    blocks.insert("s3".into(), set_var("r_letter", reporter("letter")));

    let mut length = block(Opcode::OperatorLength);
    length.inputs.push(("STRING".into(), lit("ありがとう")));
    blocks.insert("len".into(), length);
    blocks.insert("s4".into(), set_var("r_len", reporter("len")));

    let mut contains = block(Opcode::OperatorContains);
    contains.inputs.push(("STRING1".into(), lit("Hello")));
    contains.inputs.push(("STRING2".into(), lit("ELL")));
    blocks.insert("contains".into(), contains);
    blocks.insert("s5".into(), set_var("r_contains", reporter("contains")));

    let mut join = block(Opcode::OperatorJoin);
    join.inputs.push(("STRING1".into(), lit("foo")));
    join.inputs.push(("STRING2".into(), lit(3.0)));
    blocks.insert("join".into(), join);
    blocks.insert("s6".into(), set_var("r_join", reporter("join")));

    let mut sin = block(Opcode::OperatorMathOp);
    sin.fields.insert("OPERATOR".into(), Field::plain("sin"));
    sin.inputs.push(("NUM".into(), lit(180.0)));
    blocks.insert("sin".into(), sin);
    blocks.insert("s7".into(), set_var("r_sin", reporter("sin")));

    let mut tan = block(Opcode::OperatorMathOp);
    tan.fields.insert("OPERATOR".into(), Field::plain("tan"));
    tan.inputs.push(("NUM".into(), lit(90.0)));
    blocks.insert("tan".into(), tan);
    blocks.insert("s8".into(), set_var("r_tan", reporter("tan")));

    chain(&mut blocks, &["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"]);

    let vars = [
        "r_mod", "r_round", "r_letter", "r_len", "r_contains", "r_join", "r_sin", "r_tan",
    ];
    let mut rt = Runtime::new(&project(stage(&vars), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    assert_eq!(num(&rt, "r_mod"), 3.0);
    assert_eq!(num(&rt, "r_round"), 3.0);
    assert_eq!(rt.variable("Stage", "r_letter").unwrap(), Value::Text("学".into()));
    assert_eq!(num(&rt, "r_len"), 5.0);
    assert_eq!(rt.variable("Stage", "r_contains").unwrap(), Value::Bool(true));
    assert_eq!(rt.variable("Stage", "r_join").unwrap(), Value::Text("foo3".into()));
    assert_eq!(num(&rt, "r_sin"), 0.0);
    assert_eq!(num(&rt, "r_tan"), f64::INFINITY);
}

#[test]
fn list_blocks_are_one_indexed() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("a1"));

    let mut add10 = block(Opcode::DataAddToList);
    add10.inputs.push(("ITEM".into(), lit(10.0)));
    add10.fields.extend([list_field("mylist")]);
    blocks.insert("a1".into(), add10);

    let mut add20 = block(Opcode::DataAddToList);
    add20.inputs.push(("ITEM".into(), lit(20.0)));
    add20.fields.extend([list_field("mylist")]);
    blocks.insert("a2".into(), add20);

    let mut ins = block(Opcode::DataInsertAtList);
    ins.inputs.push(("ITEM".into(), lit(5.0)));
    ins.inputs.push(("INDEX".into(), lit(1.0)));
    ins.fields.extend([list_field("mylist")]);
    blocks.insert("a3".into(), ins);

    let mut rep = block(Opcode::DataReplaceItemOfList);
    rep.inputs.push(("ITEM".into(), lit(99.0)));
    rep.inputs.push(("INDEX".into(), lit(2.0)));
    rep.fields.extend([list_field("mylist")]);
    blocks.insert("a4".into(), rep);

    let mut item2 = block(Opcode::DataItemOfList);
    item2.inputs.push(("INDEX".into(), lit(2.0)));
    item2.fields.extend([list_field("mylist")]);
    blocks.insert("item2".into(), item2);
    blocks.insert("a5".into(), set_var("r1", reporter("item2")));

    let mut out_of_range = block(Opcode::DataItemOfList);
    out_of_range.inputs.push(("INDEX".into(), lit(4.0)));
    out_of_range.fields.extend([list_field("mylist")]);
    blocks.insert("oor".into(), out_of_range);
    blocks.insert("a6".into(), set_var("r2", reporter("oor")));

    let mut pos = block(Opcode::DataItemNumOfList);
    pos.inputs.push(("ITEM".into(), lit(20.0)));
    pos.fields.extend([list_field("mylist")]);
    blocks.insert("pos".into(), pos);
    blocks.insert("a7".into(), set_var("r3", reporter("pos")));

    let mut del = block(Opcode::DataDeleteOfList);
    del.inputs.push(("INDEX".into(), lit(1.0)));
    del.fields.extend([list_field("mylist")]);
    blocks.insert("a8".into(), del);
    chain(&mut blocks, &["a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8"]);

    let mut stage_decl = stage(&["r1", "r2", "r3"]);
    stage_decl.lists.push(ListDecl {
        id: "mylist".to_string(),
        name: "mylist".to_string(),
        values: Vec::new(),
    });

    let mut rt = Runtime::new(&project(stage_decl, vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    // [5,10,20] → replace #2 → [5,99,20]; item 2 = 99, item 4 = "",
    // position of 20 = 3; delete #1 → [99,20].
    assert_eq!(num(&rt, "r1"), 99.0);
    assert_eq!(rt.variable("Stage", "r2").unwrap(), Value::Text(String::new()));
    assert_eq!(num(&rt, "r3"), 3.0);
    assert_eq!(
        rt.list_values("Stage", "mylist").unwrap(),
        vec![Value::Number(99.0), Value::Number(20.0)]
    );
}

#[test]
fn counter_blocks_share_one_global_counter() {
    let mut blocks = BTreeMap::new();
    blocks.insert("hat".into(), flag_hat("i1"));
    blocks.insert("i1".into(), block(Opcode::ControlIncrCounter));
    blocks.insert("i2".into(), block(Opcode::ControlIncrCounter));
    let mut get = block(Opcode::ControlGetCounter);
    blocks.insert("get".into(), get.clone());
    blocks.insert("save".into(), set_var("r1", reporter("get")));
    blocks.insert("clr".into(), block(Opcode::ControlClearCounter));
    get = block(Opcode::ControlGetCounter);
    blocks.insert("get2".into(), get);
    blocks.insert("save2".into(), set_var("r2", reporter("get2")));
    chain(&mut blocks, &["i1", "i2", "save", "clr", "save2"]);

    let mut rt = Runtime::new(&project(stage(&["r1", "r2"]), vec![sprite("Sprite1", blocks)])).unwrap();
    run_project(&mut rt, 10);
    assert_eq!(num(&rt, "r1"), 2.0);
    assert_eq!(num(&rt, "r2"), 0.0);
    assert_eq!(rt.counter(), 0);
}

#[test]
fn seeded_runs_are_deterministic() {
    let build = || {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".into(), flag_hat("rep"));
        let mut rep = block(Opcode::ControlRepeat);
        rep.inputs.push(("TIMES".into(), lit(10.0)));
        rep.inputs.push(("SUBSTACK".into(), substack("chg")));
        blocks.insert("rep".into(), rep);
        let mut chg = block(Opcode::DataChangeVariableBy);
        chg.inputs.push(("VALUE".into(), reporter("rand")));
        chg.fields.extend([var_field("r")]);
        blocks.insert("chg".into(), chg);
        let mut rand = block(Opcode::OperatorRandom);
        rand.inputs.push(("FROM".into(), lit(1.0)));
        rand.inputs.push(("TO".into(), lit(10.0)));
        blocks.insert("rand".into(), rand);
        Runtime::new(&project(stage(&["r"]), vec![sprite("Sprite1", blocks)])).unwrap()
    };

    let mut a = build();
    let mut b = build();
    a.seed_rng(42);
    b.seed_rng(42);
    run_project(&mut a, 100);
    run_project(&mut b, 100);
    assert_eq!(num(&a, "r"), num(&b, "r"));
    assert!(num(&a, "r") >= 10.0 && num(&a, "r") <= 100.0);
}
