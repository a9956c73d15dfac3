use crate::types::{BlockId, SoundHandle, TargetId, ThreadId};
use crate::value::Value;
use std::collections::BTreeMap;

/// Why a frame was pushed, and what happens when its cursor runs off the end
/// of the substack.
#[derive(Clone, Debug)]
pub enum FrameKind {
    /// Bottom frame: the hat's body. Running off the end finishes the thread.
    Script,
    /// `if` / `if else` arm; runs once.
    Branch,
    /// `all at once`: like Branch, but suppresses yields for its own blocks.
    AllAtOnce,
    Repeat { remaining: f64 },
    /// Re-evaluates the owner's condition on each wrap; exits when true.
    RepeatUntil,
    /// Re-evaluates the owner's condition on each wrap; exits when false.
    While,
    Forever,
    Call { locals: BTreeMap<String, Value>, warp: bool },
}

/// One execution record: a cursor walking a block body.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Control or call block that pushed this frame; `None` for the bottom
    /// frame. Loop frames consult it to re-evaluate their condition.
    pub owner: Option<BlockId>,
    /// Next block to execute; `None` means the body is exhausted.
    pub cursor: Option<BlockId>,
    /// Substack entry, kept for loop re-entry.
    pub start: Option<BlockId>,
    pub kind: FrameKind,
}

impl Frame {
    pub fn script(start: Option<BlockId>) -> Self {
        Self {
            owner: None,
            cursor: start.clone(),
            start,
            kind: FrameKind::Script,
        }
    }

    pub fn child(owner: BlockId, start: Option<BlockId>, kind: FrameKind) -> Self {
        Self {
            owner: Some(owner),
            cursor: start.clone(),
            start,
            kind,
        }
    }
}

/// Predicate a Waiting thread is parked on; polled by the scheduler before
/// each attempt.
#[derive(Clone, Debug)]
pub enum WaitState {
    Timer {
        until: f64,
    },
    /// Timed say/think: clears the bubble on expiry if it is still ours.
    SayTimer {
        until: f64,
        epoch: u64,
    },
    Glide {
        start: f64,
        duration: f64,
        from: (f64, f64),
        to: (f64, f64),
    },
    Sound {
        handle: SoundHandle,
    },
    /// Broadcast-and-wait join over the receiver threads captured at
    /// invocation time.
    Broadcast {
        threads: Vec<ThreadId>,
    },
}

#[derive(Clone, Debug)]
pub enum ThreadStatus {
    Running,
    /// Cooperative yield; re-runnable this frame until a redraw is requested.
    YieldedFrame,
    /// Parked until the next frame.
    YieldedTick,
    Waiting(WaitState),
    Done,
    Killed,
}

/// One executing script, anchored at a hat block.
#[derive(Debug)]
pub struct Thread {
    pub id: ThreadId,
    pub target: TargetId,
    pub top_block: BlockId,
    /// LIFO; the bottom frame is the hat's body.
    pub frames: Vec<Frame>,
    pub status: ThreadStatus,
    /// Number of warp procedure frames currently active.
    pub warp_depth: u32,
    /// Whether a new fire of the same hat restarts this thread while live.
    pub restartable: bool,
    /// Set when this thread yields on a redraw-requesting block; it gets no
    /// further passes this frame, without stalling other threads.
    pub redrawn: bool,
}

impl Default for Thread {
    /// Placeholder slot value while a thread is checked out of the scheduler
    /// list; never executed.
    fn default() -> Self {
        Self {
            id: ThreadId::fresh(),
            target: TargetId(uuid::Uuid::nil()),
            top_block: BlockId::new(),
            frames: Vec::new(),
            status: ThreadStatus::Killed,
            warp_depth: 0,
            restartable: false,
            redrawn: false,
        }
    }
}

impl Thread {
    pub fn new(
        target: TargetId,
        top_block: BlockId,
        body: Option<BlockId>,
        restartable: bool,
    ) -> Self {
        Self {
            id: ThreadId::fresh(),
            target,
            top_block,
            frames: vec![Frame::script(body)],
            status: ThreadStatus::Running,
            warp_depth: 0,
            restartable,
            redrawn: false,
        }
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.status, ThreadStatus::Done | ThreadStatus::Killed)
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Innermost procedure-call locals, if any call frame is active.
    pub fn locals(&self) -> Option<&BTreeMap<String, Value>> {
        self.frames.iter().rev().find_map(|f| match &f.kind {
            FrameKind::Call { locals, .. } => Some(locals),
            _ => None,
        })
    }

    pub fn kill(&mut self) {
        self.status = ThreadStatus::Killed;
    }

    pub fn finish(&mut self) {
        self.frames.clear();
        self.status = ThreadStatus::Done;
    }

    /// `stop this script`: unwind to the innermost procedure call and return
    /// to its caller; outside any procedure the thread finishes.
    pub fn stop_script(&mut self) {
        while let Some(frame) = self.frames.pop() {
            if let FrameKind::Call { warp, .. } = frame.kind {
                if warp {
                    self.warp_depth = self.warp_depth.saturating_sub(1);
                }
                return;
            }
        }
        self.finish();
    }
}
