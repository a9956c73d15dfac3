//! Motion blocks. All position writes funnel through the runtime's fenced
//! setter; every block here is a no-op on the stage.

use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::fence;
use crate::project::BlockDecl;
use crate::thread::{Thread, ThreadStatus, WaitState};

fn sprite_position(rt: &Runtime, th: &Thread) -> Option<(f64, f64)> {
    rt.target(th.target)
        .filter(|t| !t.is_stage)
        .map(|t| (t.x, t.y))
}

pub(crate) fn move_steps(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let steps = rt.arg_num(th, graph, block, "STEPS");
    let Some(target) = rt.target(th.target) else {
        return;
    };
    if target.is_stage {
        return;
    }
    let (dx, dy) = fence::direction_vector(target.direction);
    let (x, y) = (target.x + dx * steps, target.y + dy * steps);
    rt.set_sprite_position(th.target, x, y);
}

pub(crate) fn turn(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl, sign: f64) {
    let degrees = rt.arg_num(th, graph, block, "DEGREES");
    if let Some(target) = rt.target_mut(th.target) {
        if !target.is_stage {
            target.direction = fence::wrap_direction(target.direction + sign * degrees);
        }
    }
}

pub(crate) fn go_to_xy(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let x = rt.arg_num(th, graph, block, "X");
    let y = rt.arg_num(th, graph, block, "Y");
    rt.set_sprite_position(th.target, x, y);
}

pub(crate) fn go_to(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let destination = rt.arg_str(th, graph, block, "TO");
    if let Some((x, y)) = rt.named_point(&destination) {
        rt.set_sprite_position(th.target, x, y);
    }
}

pub(crate) fn glide_secs_to_xy(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let secs = rt.arg_num(th, graph, block, "SECS");
    let x = rt.arg_num(th, graph, block, "X");
    let y = rt.arg_num(th, graph, block, "Y");
    glide(rt, th, secs, x, y);
}

pub(crate) fn glide_to(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let secs = rt.arg_num(th, graph, block, "SECS");
    let destination = rt.arg_str(th, graph, block, "TO");
    if let Some((x, y)) = rt.named_point(&destination) {
        glide(rt, th, secs, x, y);
    }
}

/// Blocking, time-interpolated move. The scheduler advances the position
/// each frame while the thread waits; the final position is set exactly.
fn glide(rt: &mut Runtime, th: &mut Thread, secs: f64, x: f64, y: f64) {
    let Some(from) = sprite_position(rt, th) else {
        return;
    };
    if secs <= 0.0 {
        rt.set_sprite_position(th.target, x, y);
        return;
    }
    th.status = ThreadStatus::Waiting(WaitState::Glide {
        start: rt.clock.now(),
        duration: secs,
        from,
        to: (x, y),
    });
}

pub(crate) fn point_in_direction(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let direction = rt.arg_num(th, graph, block, "DIRECTION");
    if let Some(target) = rt.target_mut(th.target) {
        if !target.is_stage {
            target.direction = fence::wrap_direction(direction);
        }
    }
}

pub(crate) fn point_towards(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let towards = rt.arg_str(th, graph, block, "TOWARDS");
    let Some((x, y)) = sprite_position(rt, th) else {
        return;
    };
    let direction = if towards == "_random_" {
        rt.random_float(-180.0, 180.0)
    } else {
        let Some((px, py)) = rt.named_point(&towards) else {
            return;
        };
        (px - x).atan2(py - y).to_degrees()
    };
    if let Some(target) = rt.target_mut(th.target) {
        target.direction = fence::wrap_direction(direction);
    }
}

pub(crate) fn change_x_by(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let dx = rt.arg_num(th, graph, block, "DX");
    if let Some((x, y)) = sprite_position(rt, th) {
        rt.set_sprite_position(th.target, x + dx, y);
    }
}

pub(crate) fn set_x(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let x = rt.arg_num(th, graph, block, "X");
    if let Some((_, y)) = sprite_position(rt, th) {
        rt.set_sprite_position(th.target, x, y);
    }
}

pub(crate) fn change_y_by(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let dy = rt.arg_num(th, graph, block, "DY");
    if let Some((x, y)) = sprite_position(rt, th) {
        rt.set_sprite_position(th.target, x, y + dy);
    }
}

pub(crate) fn set_y(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let y = rt.arg_num(th, graph, block, "Y");
    if let Some((x, _)) = sprite_position(rt, th) {
        rt.set_sprite_position(th.target, x, y);
    }
}

pub(crate) fn if_on_edge_bounce(rt: &mut Runtime, th: &mut Thread) {
    let Some(target) = rt.target(th.target) else {
        return;
    };
    if target.is_stage {
        return;
    }
    let (w, h) = target.bounds_extent();
    if let Some((x, y, direction)) = fence::bounce(target.x, target.y, target.direction, w, h) {
        let id = th.target;
        if let Some(target) = rt.target_mut(id) {
            target.x = x;
            target.y = y;
            target.direction = direction;
        }
    }
}

pub(crate) fn set_rotation_style(rt: &mut Runtime, th: &mut Thread, block: &BlockDecl) {
    let Some(style) = block
        .field_text("STYLE")
        .and_then(crate::project::RotationStyle::from_menu)
    else {
        return;
    };
    if let Some(target) = rt.target_mut(th.target) {
        target.rotation_style = style;
    }
}
