use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Block identifier within one target's block graph.
pub type BlockId = String;

/// Procedure signature string (`%s`/`%b` markers included).
pub type ProcCode = String;

// ─── Runtime handles ──────────────────────────────────────────

/// Stable handle to a stage, sprite or clone for the lifetime of the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub Uuid);

impl TargetId {
    pub fn fresh() -> Self {
        Self(Uuid::now_v7())
    }
}

/// Handle to one executing script. Restarting a script mints a new handle,
/// which is what lets broadcast-and-wait joins treat a restarted receiver as
/// already finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    pub fn fresh() -> Self {
        Self(Uuid::now_v7())
    }
}

/// Handle to one playback of one sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoundHandle(pub Uuid);

impl SoundHandle {
    pub fn fresh() -> Self {
        Self(Uuid::now_v7())
    }
}

// ─── Stage geometry constants ─────────────────────────────────

pub const SCRATCH_MAX_X: f64 = 240.0;
pub const SCRATCH_MIN_X: f64 = -240.0;
pub const SCRATCH_MAX_Y: f64 = 180.0;
pub const SCRATCH_MIN_Y: f64 = -180.0;

/// Maximum distance a sprite's position may sit past a stage edge when
/// fencing is enabled.
pub const FENCE_WIDTH: f64 = 15.0;

// ─── Runtime limits ───────────────────────────────────────────

/// Scratch's clone cap.
pub const CLONE_LIMIT: usize = 300;

/// Primitive-step safety cap per frame; bounds runaway warp loops.
pub const FRAME_STEP_BUDGET: usize = 1 << 20;

/// Scheduler passes per frame; bounds non-warp loops that never request a
/// redraw.
pub const FRAME_PASS_BUDGET: usize = 500;

/// Frame-stack depth cap; a procedure call past this degrades to a no-op.
pub const MAX_FRAME_DEPTH: usize = 1024;

// ─── Runtime options ──────────────────────────────────────────

/// Tunables a host may override before the first frame.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Clamp sprite positions to the stage fence.
    pub fencing: bool,
    pub clone_cap: usize,
    pub frame_step_budget: usize,
    pub frame_pass_budget: usize,
    pub max_frame_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            fencing: true,
            clone_cap: CLONE_LIMIT,
            frame_step_budget: FRAME_STEP_BUDGET,
            frame_pass_budget: FRAME_PASS_BUDGET,
            max_frame_depth: MAX_FRAME_DEPTH,
        }
    }
}
