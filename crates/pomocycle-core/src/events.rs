use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::SegmentKind;

/// Every state change of a [`crate::PomoTimer`] produces an Event.
/// Hosts forward them to notifications, widgets and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        segment_index: usize,
        segment_kind: SegmentKind,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        segment_index: usize,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        segment_index: usize,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    /// The sequence was rebuilt with a new pomo count or new durations.
    SequenceResized {
        pomo_count: usize,
        segments: usize,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    /// A boundary was crossed and a new segment began.
    SegmentAdvanced {
        segment_index: usize,
        segment_kind: SegmentKind,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// The last segment ended. Emitted at most once per run.
    SequenceFinished {
        segments: usize,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        paused: bool,
        finished: bool,
        segment_index: usize,
        segment_kind: SegmentKind,
        segment_label: String,
        remaining_secs: u64,
        segment_secs: u64,
        progress: f64,
        pomo_count: usize,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::TimerStarted { at, .. }
            | Event::TimerPaused { at, .. }
            | Event::TimerResumed { at, .. }
            | Event::TimerReset { at }
            | Event::SequenceResized { at, .. }
            | Event::SegmentAdvanced { at, .. }
            | Event::SequenceFinished { at, .. }
            | Event::StateSnapshot { at, .. } => *at,
        }
    }
}
