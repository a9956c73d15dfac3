use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::thread::{Thread, ThreadStatus, WaitState};

/// Fire-and-forget: receivers are scheduled behind every thread already in
/// this frame's list. An unknown broadcast name fires nothing and succeeds.
pub(crate) fn broadcast(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let name = rt.arg_str(th, graph, block, "BROADCAST_INPUT");
    rt.start_broadcast(&name, Some(th));
}

/// Captures the receiver threads it launched and joins on all of them
/// reaching completion. Re-broadcasts of the same name spawn new handles,
/// which never extend an existing join.
pub(crate) fn broadcast_and_wait(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let name = rt.arg_str(th, graph, block, "BROADCAST_INPUT");
    let receivers = rt.start_broadcast(&name, Some(th));
    if receivers.is_empty() || !matches!(th.status, ThreadStatus::Running) {
        return;
    }
    th.status = ThreadStatus::Waiting(WaitState::Broadcast { threads: receivers });
}
