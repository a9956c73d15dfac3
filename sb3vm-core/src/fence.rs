//! Stage geometry: the degrees convention (0 = up, 90 = right), position
//! fencing, and edge bouncing.

use crate::types::{FENCE_WIDTH, SCRATCH_MAX_X, SCRATCH_MAX_Y, SCRATCH_MIN_X, SCRATCH_MIN_Y};

/// Unit vector for a direction in Scratch degrees.
pub fn direction_vector(direction: f64) -> (f64, f64) {
    let radians = direction.to_radians();
    (radians.sin(), radians.cos())
}

/// Normalise a direction into `(-180, 180]`.
pub fn wrap_direction(direction: f64) -> f64 {
    if !direction.is_finite() {
        return 90.0;
    }
    let mut wrapped = direction.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}

/// Clamp a position to the stage fence. The inset per axis is
/// `min(FENCE_WIDTH, half_extent)`, so small sprites stay fully on stage
/// while large ones may sit up to the fence width past an edge.
pub fn clamp_position(x: f64, y: f64, extent_w: f64, extent_h: f64) -> (f64, f64) {
    let inset_x = FENCE_WIDTH.min(extent_w.abs() / 2.0);
    let inset_y = FENCE_WIDTH.min(extent_h.abs() / 2.0);
    (
        x.clamp(SCRATCH_MIN_X - inset_x, SCRATCH_MAX_X + inset_x),
        y.clamp(SCRATCH_MIN_Y - inset_y, SCRATCH_MAX_Y + inset_y),
    )
}

/// `if on edge, bounce`: if the sprite's bounding box crosses an edge,
/// reflect the direction about that edge's axis and translate the sprite
/// back inside by the largest overlap. Returns `None` when no edge is
/// crossed.
pub fn bounce(
    x: f64,
    y: f64,
    direction: f64,
    extent_w: f64,
    extent_h: f64,
) -> Option<(f64, f64, f64)> {
    let half_w = extent_w.abs() / 2.0;
    let half_h = extent_h.abs() / 2.0;

    let left = SCRATCH_MIN_X - (x - half_w);
    let right = (x + half_w) - SCRATCH_MAX_X;
    let top = (y + half_h) - SCRATCH_MAX_Y;
    let bottom = SCRATCH_MIN_Y - (y - half_h);

    let (overlap, edge) = [(left, Edge::Left), (right, Edge::Right), (top, Edge::Top), (bottom, Edge::Bottom)]
        .into_iter()
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))?;
    if overlap <= 0.0 {
        return None;
    }

    let (new_x, new_y, new_dir) = match edge {
        // Vertical boundaries mirror left/right, horizontal mirror up/down.
        Edge::Left => (x + overlap, y, -direction),
        Edge::Right => (x - overlap, y, -direction),
        Edge::Top => (x, y - overlap, 180.0 - direction),
        Edge::Bottom => (x, y + overlap, 180.0 - direction),
    };
    Some((new_x, new_y, wrap_direction(new_dir)))
}

#[derive(Clone, Copy, Debug)]
enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}
