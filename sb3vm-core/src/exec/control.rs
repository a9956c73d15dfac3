use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::thread::{Frame, FrameKind, Thread, ThreadStatus, WaitState};
use tracing::warn;

pub(crate) fn wait(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let secs = rt.arg_num(th, graph, block, "DURATION").max(0.0);
    if secs > 0.0 {
        th.status = ThreadStatus::Waiting(WaitState::Timer {
            until: rt.clock.now() + secs,
        });
    } else {
        // `wait 0` gives up the rest of this frame.
        th.status = ThreadStatus::YieldedTick;
    }
}

pub(crate) fn repeat(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    id: &str,
    block: &BlockDecl,
) {
    let times = rt.arg_num(th, graph, block, "TIMES").round();
    if times < 1.0 {
        return;
    }
    let start = Runtime::branch(block, "SUBSTACK");
    th.frames.push(Frame::child(
        id.to_string(),
        start,
        FrameKind::Repeat { remaining: times },
    ));
}

pub(crate) fn forever(th: &mut Thread, id: &str, block: &BlockDecl) {
    let start = Runtime::branch(block, "SUBSTACK");
    th.frames
        .push(Frame::child(id.to_string(), start, FrameKind::Forever));
}

pub(crate) fn if_then(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    id: &str,
    block: &BlockDecl,
) {
    if !rt.arg_bool(th, graph, block, "CONDITION") {
        return;
    }
    if let Some(start) = Runtime::branch(block, "SUBSTACK") {
        th.frames
            .push(Frame::child(id.to_string(), Some(start), FrameKind::Branch));
    }
}

pub(crate) fn if_else(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    id: &str,
    block: &BlockDecl,
) {
    let arm = if rt.arg_bool(th, graph, block, "CONDITION") {
        "SUBSTACK"
    } else {
        "SUBSTACK2"
    };
    if let Some(start) = Runtime::branch(block, arm) {
        th.frames
            .push(Frame::child(id.to_string(), Some(start), FrameKind::Branch));
    }
}

/// Re-executes itself once per frame until the condition holds.
pub(crate) fn wait_until(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    id: &str,
    block: &BlockDecl,
) {
    if rt.arg_bool(th, graph, block, "CONDITION") {
        return;
    }
    if let Some(frame) = th.current_frame_mut() {
        frame.cursor = Some(id.to_string());
    }
    th.status = ThreadStatus::YieldedTick;
}

/// `repeat until` (condition exits the loop) and the legacy `while`
/// (condition keeps it going) share a frame; only the polarity differs.
pub(crate) fn repeat_until(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    id: &str,
    block: &BlockDecl,
    until: bool,
) {
    let cond = rt.arg_bool(th, graph, block, "CONDITION");
    let enter = if until { !cond } else { cond };
    if !enter {
        return;
    }
    let kind = if until {
        FrameKind::RepeatUntil
    } else {
        FrameKind::While
    };
    let start = Runtime::branch(block, "SUBSTACK");
    th.frames.push(Frame::child(id.to_string(), start, kind));
}

pub(crate) fn all_at_once(th: &mut Thread, id: &str, block: &BlockDecl) {
    if let Some(start) = Runtime::branch(block, "SUBSTACK") {
        th.frames.push(Frame::child(
            id.to_string(),
            Some(start),
            FrameKind::AllAtOnce,
        ));
    }
}

pub(crate) fn stop(rt: &mut Runtime, th: &mut Thread, block: &BlockDecl) {
    match block.field_text("STOP_OPTION").unwrap_or("") {
        "all" => {
            rt.stop_all();
            th.kill();
        }
        "this script" => th.stop_script(),
        "other scripts in sprite" | "other scripts in stage" => {
            rt.kill_sibling_threads(th.target, th.id);
        }
        other => warn!(option = other, "unrecognised stop option"),
    }
}

pub(crate) fn create_clone_of(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let option = rt.arg_str(th, graph, block, "CLONE_OPTION");
    let source = if option == "_myself_" {
        match rt.target(th.target) {
            // Cloning the stage is meaningless; degrade to a no-op.
            Some(t) if t.is_stage => None,
            Some(t) => Some(t.id),
            None => None,
        }
    } else {
        rt.sprite_id_by_name(&option)
    };
    if let Some(source) = source {
        rt.request_clone(source);
    }
}

pub(crate) fn delete_this_clone(rt: &mut Runtime, th: &mut Thread) {
    let Some(target) = rt.target(th.target) else {
        return;
    };
    if !target.is_clone {
        return;
    }
    rt.doom_target(th.target);
    th.kill();
}
