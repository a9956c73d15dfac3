use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::target::SayKind;
use crate::thread::{Thread, ThreadStatus, WaitState};
use crate::value::{parse_number, Value};

pub(crate) fn say(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl, think: bool) {
    let message = rt.arg_str(th, graph, block, "MESSAGE");
    set_bubble(rt, th, message, think);
}

pub(crate) fn say_for_secs(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    think: bool,
) {
    let message = rt.arg_str(th, graph, block, "MESSAGE");
    let secs = rt.arg_num(th, graph, block, "SECS").max(0.0);
    let Some(epoch) = set_bubble(rt, th, message, think) else {
        return;
    };
    th.status = ThreadStatus::Waiting(WaitState::SayTimer {
        until: rt.clock.now() + secs,
        epoch,
    });
}

fn set_bubble(rt: &mut Runtime, th: &Thread, message: String, think: bool) -> Option<u64> {
    let kind = if think { SayKind::Think } else { SayKind::Say };
    let target = rt.target_mut(th.target)?;
    let bubble = if message.is_empty() {
        None
    } else {
        Some((kind, message))
    };
    Some(target.set_say(bubble))
}

pub(crate) fn set_visible(rt: &mut Runtime, th: &mut Thread, visible: bool) {
    if let Some(target) = rt.target_mut(th.target) {
        target.visible = visible;
    }
}

/// Costume selection mirrors sound selection — name first for strings,
/// wrapped 1-based index for numbers — plus the `next/previous costume`
/// menu words.
fn select_costume(target: &crate::target::Target, arg: &Value) -> Option<i64> {
    let current = target.current_costume as i64;
    match arg {
        Value::Text(s) => {
            if let Some(i) = target.costume_index_by_name(s) {
                return Some(i as i64);
            }
            match s.as_str() {
                "next costume" | "next backdrop" => Some(current + 1),
                "previous costume" | "previous backdrop" => Some(current - 1),
                _ => parse_number(s)
                    .filter(|n| n.is_finite() && !s.trim().is_empty())
                    .map(|n| n.round() as i64 - 1),
            }
        }
        Value::Number(n) if n.is_finite() => Some(n.round() as i64 - 1),
        _ => None,
    }
}

pub(crate) fn switch_costume(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let arg = rt.arg_value(th, graph, block, "COSTUME");
    if let Some(target) = rt.target_mut(th.target) {
        if let Some(index) = select_costume(target, &arg) {
            target.set_costume_wrapped(index);
        }
    }
}

pub(crate) fn next_costume(rt: &mut Runtime, th: &mut Thread) {
    if let Some(target) = rt.target_mut(th.target) {
        let next = target.current_costume as i64 + 1;
        target.set_costume_wrapped(next);
    }
}

/// Backdrop blocks always act on the stage, whichever target runs them.
pub(crate) fn switch_backdrop(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let arg = rt.arg_value(th, graph, block, "BACKDROP");
    let stage = rt.stage_mut();
    if let Some(index) = select_costume(stage, &arg) {
        stage.set_costume_wrapped(index);
    }
}

pub(crate) fn next_backdrop(rt: &mut Runtime) {
    let stage = rt.stage_mut();
    let next = stage.current_costume as i64 + 1;
    stage.set_costume_wrapped(next);
}

pub(crate) fn change_size(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let delta = rt.arg_num(th, graph, block, "CHANGE");
    if let Some(target) = rt.target_mut(th.target) {
        target.size = (target.size + delta).max(0.0);
    }
}

pub(crate) fn set_size(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let size = rt.arg_num(th, graph, block, "SIZE");
    if let Some(target) = rt.target_mut(th.target) {
        target.size = size.max(0.0);
    }
}

pub(crate) fn change_effect(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let delta = rt.arg_num(th, graph, block, "CHANGE");
    let effect = block.field_text("EFFECT").unwrap_or("").to_string();
    if let Some(target) = rt.target_mut(th.target) {
        let current = target.effects.get(&effect);
        target.effects.set(&effect, current + delta);
    }
}

pub(crate) fn set_effect(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let value = rt.arg_num(th, graph, block, "VALUE");
    let effect = block.field_text("EFFECT").unwrap_or("").to_string();
    if let Some(target) = rt.target_mut(th.target) {
        target.effects.set(&effect, value);
    }
}

pub(crate) fn clear_effects(rt: &mut Runtime, th: &mut Thread) {
    if let Some(target) = rt.target_mut(th.target) {
        target.effects.clear();
    }
}

pub(crate) fn go_to_front_back(rt: &mut Runtime, th: &mut Thread, block: &BlockDecl) {
    let front = block.field_text("FRONT_BACK") != Some("back");
    rt.move_to_layer_extreme(th.target, front);
}

pub(crate) fn go_layers(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let num = rt.arg_num(th, graph, block, "NUM").round() as i64;
    let delta = if block.field_text("FORWARD_BACKWARD") == Some("backward") {
        -num
    } else {
        num
    };
    rt.shift_layer(th.target, delta);
}

pub(crate) fn costume_number_name(
    rt: &mut Runtime,
    th: &Thread,
    block: &BlockDecl,
    backdrop: bool,
) -> Value {
    let target = if backdrop {
        Some(rt.stage())
    } else {
        rt.target(th.target)
    };
    let Some(target) = target else {
        return Value::Number(0.0);
    };
    match block.field_text("NUMBER_NAME") {
        Some("name") => Value::Text(target.current_costume_name().to_string()),
        _ => Value::Number(target.current_costume as f64 + 1.0),
    }
}
