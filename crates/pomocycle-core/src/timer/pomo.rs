//! Pomodoro owner of a sequence clock.
//!
//! `PomoTimer` decides the shape of the cycle (how many work/rest pairs, how
//! long each phase lasts), turns clock activity into [`Event`]s, and runs the
//! end-of-sequence action exactly once per run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::boundary::{BoundaryTimer, TimerToken};
use super::clock::{read_value, RestoreReport, SequenceClock};
use super::sequence::{PhaseSequence, SegmentKind};
use crate::error::{Result, ValidationError};
use crate::events::Event;
use crate::storage::kv::{keys, KeyValueStore};

pub const MIN_POMO_COUNT: usize = 1;
pub const MAX_POMO_COUNT: usize = 6;

/// Inputs for building a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PomoSettings {
    pub pomo_count: usize,
    pub work: Duration,
    pub rest: Duration,
    pub long_break: Duration,
    pub segment_stagger: Duration,
}

impl PomoSettings {
    pub fn clamped_count(&self) -> usize {
        clamp_pomo_count(self.pomo_count)
    }

    /// # Errors
    /// Fails if any duration is zero.
    pub fn build_sequence(&self) -> Result<PhaseSequence, ValidationError> {
        PhaseSequence::build(self.clamped_count(), self.work, self.rest, self.long_break)
    }
}

impl Default for PomoSettings {
    fn default() -> Self {
        Self {
            pomo_count: 4,
            work: Duration::from_secs(25 * 60),
            rest: Duration::from_secs(5 * 60),
            long_break: Duration::from_secs(15 * 60),
            segment_stagger: Duration::ZERO,
        }
    }
}

pub fn clamp_pomo_count(count: usize) -> usize {
    count.clamp(MIN_POMO_COUNT, MAX_POMO_COUNT)
}

/// Lets a one-time action through once until re-armed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompletionLatch {
    tripped: bool,
}

impl CompletionLatch {
    /// True the first time only.
    pub fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.tripped, true)
    }

    pub fn rearm(&mut self) {
        self.tripped = false;
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

#[derive(Debug)]
pub struct PomoTimer<T: BoundaryTimer> {
    clock: SequenceClock<T>,
    settings: PomoSettings,
    finished: CompletionLatch,
}

impl<T: BoundaryTimer> PomoTimer<T> {
    /// Build the cycle from `settings` (count clamped to 1..=6) and park the
    /// clock at segment 0.
    ///
    /// # Errors
    /// Fails if any duration in `settings` is zero.
    pub fn new(settings: PomoSettings, timer: T, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let settings = PomoSettings {
            pomo_count: settings.clamped_count(),
            ..settings
        };
        let sequence = settings.build_sequence()?;
        let clock = SequenceClock::new(sequence, timer, now, |_| {})
            .with_segment_stagger(settings.segment_stagger);
        Ok(Self {
            clock,
            settings,
            finished: CompletionLatch::default(),
        })
    }

    /// Install a callback that sees every advance index, including the
    /// final `len`.
    pub fn with_observer(mut self, on_advance: impl FnMut(usize) + Send + 'static) -> Self {
        self.clock.set_on_advance(on_advance);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn clock(&self) -> &SequenceClock<T> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SequenceClock<T> {
        &mut self.clock
    }

    pub fn settings(&self) -> &PomoSettings {
        &self.settings
    }

    pub fn sequence(&self) -> &PhaseSequence {
        self.clock.sequence()
    }

    pub fn pomo_count(&self) -> usize {
        self.settings.pomo_count
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.finished.is_tripped() || self.clock.is_finished(now)
    }

    pub fn current_kind(&self, now: DateTime<Utc>) -> SegmentKind {
        let index = self.clock.current_index(now);
        self.sequence()
            .kind(index)
            .unwrap_or(SegmentKind::LongBreak)
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        let index = self.clock.current_index(now);
        let kind = self.current_kind(now);
        Event::StateSnapshot {
            paused: self.clock.is_paused(),
            finished: self.is_finished(now),
            segment_index: index,
            segment_kind: kind,
            segment_label: kind.label().to_string(),
            remaining_secs: self.clock.time_remaining(now).as_secs(),
            segment_secs: self
                .sequence()
                .duration(index)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            progress: self.clock.progress(now),
            pomo_count: self.settings.pomo_count,
            at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, now: DateTime<Utc>) -> Option<Event> {
        self.finished.rearm();
        self.clock.start(now, None);
        Some(Event::TimerStarted {
            segment_index: 0,
            segment_kind: self.current_kind(now),
            remaining_secs: self.clock.time_remaining(now).as_secs(),
            at: now,
        })
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.clock.pause(now) {
            return None;
        }
        Some(Event::TimerPaused {
            segment_index: self.clock.current_index(now),
            remaining_secs: self.clock.time_remaining(now).as_secs(),
            at: now,
        })
    }

    /// Continue a paused run. A finished run stays finished until `start`
    /// or `reset`.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.finished.is_tripped() || !self.clock.resume(now) {
            return None;
        }
        Some(Event::TimerResumed {
            segment_index: self.clock.current_index(now),
            remaining_secs: self.clock.time_remaining(now).as_secs(),
            at: now,
        })
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.clock.is_paused() {
            self.resume(now)
        } else {
            self.pause(now)
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) -> Option<Event> {
        self.finished.rearm();
        self.clock.reset(now, None);
        Some(Event::TimerReset { at: now })
    }

    /// Change the number of work segments. The count is clamped to 1..=6.
    ///
    /// # Errors
    /// Fails if the current durations cannot build a sequence.
    pub fn resize(&mut self, now: DateTime<Utc>, pomo_count: usize) -> Result<Event, ValidationError> {
        let settings = PomoSettings {
            pomo_count: clamp_pomo_count(pomo_count),
            ..self.settings
        };
        self.apply_settings(now, settings)
    }

    /// Change the three phase durations.
    ///
    /// # Errors
    /// Fails if any duration is zero; the running sequence is left alone.
    pub fn set_durations(
        &mut self,
        now: DateTime<Utc>,
        work: Duration,
        rest: Duration,
        long_break: Duration,
    ) -> Result<Event, ValidationError> {
        let settings = PomoSettings {
            work,
            rest,
            long_break,
            ..self.settings
        };
        self.apply_settings(now, settings)
    }

    /// Bring the timer in line with settings that may have changed while
    /// the process was away. Returns `None` when nothing differs.
    ///
    /// # Errors
    /// Fails if `settings` cannot build a sequence.
    pub fn reconcile(
        &mut self,
        now: DateTime<Utc>,
        settings: PomoSettings,
    ) -> Result<Option<Event>, ValidationError> {
        let settings = PomoSettings {
            pomo_count: settings.clamped_count(),
            ..settings
        };
        let sequence = settings.build_sequence()?;
        if &sequence == self.sequence() && settings.segment_stagger == self.settings.segment_stagger {
            self.settings = settings;
            return Ok(None);
        }
        self.apply_settings(now, settings).map(Some)
    }

    /// Deliver a boundary timer. Returns the events it produced.
    pub fn handle_fire(&mut self, token: TimerToken, now: DateTime<Utc>) -> Vec<Event> {
        let Some(index) = self.clock.fire(token, now) else {
            return Vec::new();
        };

        let len = self.sequence().len();
        if index < len {
            let Ok(segment) = self.sequence().segment(index).copied() else {
                return Vec::new();
            };
            return vec![Event::SegmentAdvanced {
                segment_index: index,
                segment_kind: segment.kind,
                duration_secs: segment.duration().as_secs(),
                at: now,
            }];
        }

        // Stop the clock so nothing re-arms past the end.
        self.clock.pause(now);
        if self.finished.trip() {
            info!(pomo_count = self.settings.pomo_count, "pomodoro cycle complete");
            vec![Event::SequenceFinished { segments: len, at: now }]
        } else {
            Vec::new()
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Save clock anchors plus the segment list and pomo count.
    ///
    /// # Errors
    /// Returns an error if the store rejects a write.
    pub fn save_state(&self, store: &mut dyn KeyValueStore, now: DateTime<Utc>) -> Result<()> {
        self.clock.save_state(store, now)?;
        store.set(keys::ORDER, &serde_json::to_string(self.sequence())?)?;
        store.set(keys::POMO_COUNT, &self.settings.pomo_count.to_string())?;
        Ok(())
    }

    /// Restore a saved timer. The sequence comes from `order` when it is
    /// readable, otherwise from `pomoCount` and the current durations; the
    /// clock anchors are then restored on top.
    pub fn restore_state(&mut self, store: &dyn KeyValueStore, now: DateTime<Utc>) -> RestoreReport {
        let order = read_value(store, keys::ORDER, |raw| {
            serde_json::from_str::<PhaseSequence>(raw).ok()
        });
        let count = read_value(store, keys::POMO_COUNT, |raw| raw.trim().parse::<usize>().ok());

        let mut report = RestoreReport::default();
        let sequence = match (order, count) {
            (Some(sequence), _) => {
                report.restored.push(keys::ORDER);
                self.adopt_durations(&sequence);
                Some(sequence)
            }
            (None, Some(count)) => {
                report.defaulted.push(keys::ORDER);
                self.settings.pomo_count = clamp_pomo_count(count);
                match self.settings.build_sequence() {
                    Ok(sequence) => {
                        report.restored.push(keys::POMO_COUNT);
                        Some(sequence)
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot rebuild saved sequence, keeping current");
                        report.defaulted.push(keys::POMO_COUNT);
                        None
                    }
                }
            }
            (None, None) => {
                report.defaulted.push(keys::ORDER);
                report.defaulted.push(keys::POMO_COUNT);
                None
            }
        };
        if let Some(sequence) = sequence {
            self.clock.replace_sequence(sequence);
        }

        let clock_report = self.clock.restore_state(store, now);
        report.restored.extend(clock_report.restored);
        report.defaulted.extend(clock_report.defaulted);
        report.saved_at = clock_report.saved_at;

        self.finished = CompletionLatch::default();
        if self.clock.is_paused() && self.clock.is_finished(now) {
            self.finished.trip();
        }
        report
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Take pomo count and phase durations from a restored sequence.
    fn adopt_durations(&mut self, sequence: &PhaseSequence) {
        self.settings.pomo_count = sequence.work_count();
        for segment in sequence.segments() {
            match segment.kind {
                SegmentKind::Work => self.settings.work = segment.duration(),
                SegmentKind::Rest => self.settings.rest = segment.duration(),
                SegmentKind::LongBreak => self.settings.long_break = segment.duration(),
            }
        }
    }

    fn apply_settings(&mut self, now: DateTime<Utc>, settings: PomoSettings) -> Result<Event, ValidationError> {
        let sequence = settings.build_sequence()?;
        let was_running = !self.clock.is_paused();

        self.settings = settings;
        self.finished.rearm();
        self.clock.set_segment_stagger(settings.segment_stagger);
        self.clock.reset(now, Some(sequence));
        if was_running {
            self.clock.resume(now);
        }
        info!(
            pomo_count = settings.pomo_count,
            segments = self.sequence().len(),
            running = was_running,
            "sequence rebuilt"
        );
        Ok(Event::SequenceResized {
            pomo_count: settings.pomo_count,
            segments: self.sequence().len(),
            total_secs: self.sequence().total_duration().as_secs(),
            at: now,
        })
    }
}
