mod boundary;
mod clock;
mod pomo;
mod sequence;

pub use boundary::{BoundaryTimer, ManualTimer, PendingTimer, TimerToken, TokioTimer};
pub use clock::{AdvanceCallback, RestoreReport, SequenceClock};
pub use pomo::{
    clamp_pomo_count, CompletionLatch, PomoSettings, PomoTimer, MAX_POMO_COUNT, MIN_POMO_COUNT,
};
pub use sequence::{PhaseSequence, Segment, SegmentKind};
