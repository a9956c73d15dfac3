use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::thread::{Frame, FrameKind, Thread};
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Call a custom block: arguments are evaluated now, in declaration order,
/// and bound by name (call-by-value). A warp definition raises the thread's
/// warp depth for the life of the frame.
pub(crate) fn call(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let Some(mutation) = &block.mutation else {
        return;
    };
    let Some(def) = graph.procedure(&mutation.proccode).cloned() else {
        warn!(proccode = %mutation.proccode, "call to undefined procedure");
        return;
    };
    if th.frames.len() >= rt.options.max_frame_depth {
        warn!(proccode = %mutation.proccode, "frame depth cap reached, skipping call");
        return;
    }

    let mut locals = BTreeMap::new();
    for (arg_id, arg_name) in def.argument_ids.iter().zip(&def.argument_names) {
        let value = rt
            .input_value(th, graph, block, arg_id, &mut Vec::new())
            .unwrap_or_else(|| Value::Text(String::new()));
        locals.insert(arg_name.clone(), value);
    }

    if def.warp {
        th.warp_depth += 1;
    }
    th.frames.push(Frame::child(
        def.definition.clone(),
        def.body.clone(),
        FrameKind::Call {
            locals,
            warp: def.warp,
        },
    ));
}

/// Argument reporters read the innermost call frame; outside any call, or
/// for an unknown name, they report 0.
pub(crate) fn argument_reporter(th: &Thread, block: &BlockDecl) -> Value {
    let name = block.field_text("VALUE").unwrap_or("");
    th.locals()
        .and_then(|locals| locals.get(name).cloned())
        .unwrap_or(Value::Number(0.0))
}
