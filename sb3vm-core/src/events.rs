use crate::types::{BlockId, TargetId, ThreadId};
use serde::{Deserialize, Serialize};

/// Per-frame change-log. Hosts drain these with
/// [`Runtime::take_frame_events`](crate::engine::Runtime::take_frame_events)
/// to mirror lifecycle changes without diffing snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RuntimeEvent {
    ProjectLoaded {
        fingerprint: [u8; 32],
        targets: usize,
    },
    GreenFlag,
    ThreadStarted {
        thread_id: ThreadId,
        target: TargetId,
        top_block: BlockId,
    },
    /// A hat fired while its script was live and restarted it in place.
    ThreadRestarted {
        old: ThreadId,
        new: ThreadId,
    },
    ThreadDone {
        thread_id: ThreadId,
    },
    BroadcastFired {
        name: String,
        receivers: usize,
    },
    EdgeHatFired {
        target: TargetId,
        block: BlockId,
    },
    CloneCreated {
        source: TargetId,
        clone: TargetId,
    },
    CloneDeleted {
        target: TargetId,
    },
    SoundStarted {
        target: TargetId,
        name: String,
    },
    AllSoundsStopped,
    TimerReset,
    StepBudgetExhausted {
        thread_id: ThreadId,
    },
    StopAll,
}
