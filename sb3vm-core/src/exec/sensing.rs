use crate::blocks::BlockGraph;
use crate::clock;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::thread::Thread;
use crate::types::BlockId;
use crate::value::Value;

/// Distance to a sprite or the mouse pointer; 10000 on the stage, the value
/// Scratch reports there.
pub(crate) fn distance_to(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let menu = rt
        .input_value(th, graph, block, "DISTANCETOMENU", visited)
        .unwrap_or_default()
        .to_display();
    let Some(target) = rt.target(th.target) else {
        return Value::Number(10000.0);
    };
    if target.is_stage {
        return Value::Number(10000.0);
    }
    let (x, y) = (target.x, target.y);
    match rt.named_point(&menu) {
        Some((px, py)) => Value::Number(((px - x).powi(2) + (py - y).powi(2)).sqrt()),
        None => Value::Number(10000.0),
    }
}

pub(crate) fn key_pressed(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let key = rt
        .input_value(th, graph, block, "KEY_OPTION", visited)
        .unwrap_or_default();
    Value::Bool(rt.input.key_pressed(&crate::engine::canonical_key(&key)))
}

pub(crate) fn current(block: &BlockDecl) -> Value {
    let menu = block.field_text("CURRENTMENU").unwrap_or("");
    Value::Number(clock::current_datum(menu))
}
