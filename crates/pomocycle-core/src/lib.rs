//! # pomocycle Core Library
//!
//! The scheduling core of a Pomodoro timer. It turns a wall-clock instant and
//! a sequence of work/rest/long-break durations into "which segment am I in
//! and how much time is left", and keeps one boundary timer armed so the host
//! hears about each segment change when it happens.
//!
//! ## Architecture
//!
//! - **Phase sequence**: immutable list of timed segments for one cycle
//! - **Sequence clock**: anchor-based time arithmetic plus a chained one-shot
//!   boundary timer; no countdown is ever stored
//! - **Pomo timer**: owns a clock, picks the cycle shape, emits [`Event`]s
//! - **Storage**: TOML configuration and a flat key-value store (SQLite or
//!   in-memory) for save/restore across process restarts
//!
//! ## Key Components
//!
//! - [`PhaseSequence`]: ordered segments of one cycle
//! - [`SequenceClock`]: wall-clock to segment mapping and boundary timers
//! - [`PomoTimer`]: Pomodoro-specific owner of a clock
//! - [`BoundaryTimer`]: host-provided one-shot timer ([`ManualTimer`],
//!   [`TokioTimer`])
//! - [`KeyValueStore`]: persistence seam ([`Database`], [`MemoryStore`])

pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use storage::{Config, Database, KeyValueStore, MemoryStore};
pub use timer::{
    BoundaryTimer, ManualTimer, PhaseSequence, PomoSettings, PomoTimer, RestoreReport, Segment,
    SegmentKind, SequenceClock, TimerToken, TokioTimer,
};
