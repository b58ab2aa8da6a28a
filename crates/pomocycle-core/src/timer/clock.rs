//! Sequence clock.
//!
//! Maps wall-clock instants onto a [`PhaseSequence`]: which segment is
//! current and how long it has left. Nothing counts down. The clock keeps an
//! anchor instant, the pause state and the total time spent paused, and every
//! query is recomputed from those plus the `now` it is given. That makes a
//! saved clock restorable after any amount of real time has passed.
//!
//! ## Boundaries
//!
//! While running, the clock keeps exactly one [`BoundaryTimer`] armed for the
//! end of the current segment. When the host delivers that timer back through
//! [`SequenceClock::fire`], the clock reports the new segment index to its
//! advance callback and arms the next boundary. Index `len` means the whole
//! sequence finished; nothing is armed after it.
//!
//! ```text
//! reset -> (paused) -- resume --> (running) -- fire* --> finished
//!                     <-- pause --
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use super::boundary::{BoundaryTimer, TimerToken};
use super::sequence::PhaseSequence;
use crate::error::{Result, ValidationError};
use crate::storage::kv::{keys, KeyValueStore};

/// Called with the index of the segment just entered, or `len` when the
/// sequence has finished.
pub type AdvanceCallback = Box<dyn FnMut(usize) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArmedBoundary {
    token: TimerToken,
    index: usize,
}

/// Which persisted fields a restore used and which fell back to the
/// in-memory value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<&'static str>,
    pub defaulted: Vec<&'static str>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl RestoreReport {
    /// Nothing was found in the store.
    pub fn is_fresh(&self) -> bool {
        self.restored.is_empty()
    }

    fn note(&mut self, key: &'static str, found: bool) {
        if found {
            self.restored.push(key);
        } else {
            self.defaulted.push(key);
        }
    }
}

pub struct SequenceClock<T: BoundaryTimer> {
    sequence: PhaseSequence,
    anchor_start: DateTime<Utc>,
    is_paused: bool,
    pause_start: DateTime<Utc>,
    /// Paused time folded in by `resume`, excluding any open pause.
    pause_offset_ms: i64,
    /// Extra time granted to segment `i`, multiplied by `i`.
    stagger_ms: i64,
    timer: T,
    armed: Option<ArmedBoundary>,
    /// Highest index handed to `on_advance` since the last reset.
    advanced_to: usize,
    next_token: u64,
    on_advance: AdvanceCallback,
}

impl<T: BoundaryTimer> SequenceClock<T> {
    /// Create a clock that is reset (paused at segment 0) as of `now`.
    pub fn new(
        sequence: PhaseSequence,
        timer: T,
        now: DateTime<Utc>,
        on_advance: impl FnMut(usize) + Send + 'static,
    ) -> Self {
        Self {
            sequence,
            anchor_start: now,
            is_paused: true,
            pause_start: now,
            pause_offset_ms: 0,
            stagger_ms: 0,
            timer,
            armed: None,
            advanced_to: 0,
            next_token: 0,
            on_advance: Box::new(on_advance),
        }
    }

    /// Grant segment `i` an extra `i * stagger` before its boundary.
    pub fn with_segment_stagger(mut self, stagger: Duration) -> Self {
        self.set_segment_stagger(stagger);
        self
    }

    pub fn set_segment_stagger(&mut self, stagger: Duration) {
        self.stagger_ms = i64::try_from(stagger.as_millis()).unwrap_or(i64::MAX);
    }

    pub fn set_on_advance(&mut self, on_advance: impl FnMut(usize) + Send + 'static) {
        self.on_advance = Box::new(on_advance);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn sequence(&self) -> &PhaseSequence {
        &self.sequence
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn anchor_start(&self) -> DateTime<Utc> {
        self.anchor_start
    }

    pub fn pause_start(&self) -> DateTime<Utc> {
        self.pause_start
    }

    pub fn pause_offset(&self) -> Duration {
        Duration::from_millis(self.pause_offset_ms.max(0) as u64)
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Index of the boundary the outstanding timer is armed for.
    pub fn armed_index(&self) -> Option<usize> {
        self.armed.map(|a| a.index)
    }

    pub fn armed_token(&self) -> Option<TimerToken> {
        self.armed.map(|a| a.token)
    }

    /// Running time since the anchor, with every paused interval removed.
    pub fn effective_elapsed(&self, now: DateTime<Utc>) -> Duration {
        Duration::from_millis(self.elapsed_ms(now) as u64)
    }

    /// The segment `now` falls in. Past the end of the sequence this is the
    /// last index; check [`Self::is_finished`] to tell the two apart.
    ///
    /// Never behind a segment already announced through `on_advance`, even
    /// while its predecessor's rounded remaining time still reads zero.
    pub fn current_index(&self, now: DateTime<Utc>) -> usize {
        let last = self.sequence.len().saturating_sub(1);
        let elapsed = self.elapsed_ms(now);
        let by_time = (0..self.sequence.len())
            .find(|&i| round_secs(self.segment_end_ms(i) - elapsed) >= 0)
            .unwrap_or(last);
        by_time.max(self.advanced_to.min(last))
    }

    /// Highest index handed to the advance callback since the last reset.
    pub fn advanced_to(&self) -> usize {
        self.advanced_to
    }

    /// Whole seconds until segment `index` ends, never negative. For a
    /// segment that has not started yet this includes every segment before
    /// it.
    ///
    /// # Errors
    /// Fails with `ValidationError::OutOfBounds` for an index outside the
    /// sequence.
    pub fn time_remaining_at(
        &self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<Duration, ValidationError> {
        self.sequence.segment(index)?;
        Ok(Duration::from_secs(self.remaining_secs(index, now)))
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        Duration::from_secs(self.remaining_secs(self.current_index(now), now))
    }

    /// 0.0 .. 1.0 progress across the whole sequence.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let total = self.sequence.total_ms();
        if total == 0 {
            return 0.0;
        }
        let index = self.current_index(now);
        let remaining_ms = (self.remaining_secs(index, now) as i64).saturating_mul(1000);
        let into_segment = (self.sequence.duration_ms_at(index) as i64 - remaining_ms).max(0);
        let done = self.sequence.cumulative_ms(index) as i64 + into_segment;
        (done as f64 / total as f64).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        let last = self.sequence.len().saturating_sub(1);
        self.elapsed_ms(now) >= self.segment_end_ms(last)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Reset, then resume.
    pub fn start(&mut self, now: DateTime<Utc>, sequence: Option<PhaseSequence>) {
        self.reset(now, sequence);
        self.resume(now);
    }

    /// Back to segment 0, paused, with no pause time on record.
    pub fn reset(&mut self, now: DateTime<Utc>, sequence: Option<PhaseSequence>) {
        if let Some(sequence) = sequence {
            self.sequence = sequence;
        }
        self.disarm();
        self.is_paused = true;
        self.pause_start = now;
        self.anchor_start = now;
        self.pause_offset_ms = 0;
        self.advanced_to = 0;
    }

    /// Returns false if already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paused {
            return false;
        }
        self.disarm();
        self.is_paused = true;
        self.pause_start = now;
        true
    }

    /// Returns false if already running.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_paused {
            return false;
        }
        let paused_for = (now - self.pause_start).num_milliseconds().max(0);
        self.pause_offset_ms = self.pause_offset_ms.saturating_add(paused_for);
        self.is_paused = false;
        self.arm(self.current_index(now), now);
        true
    }

    pub fn unpause(&mut self, now: DateTime<Utc>) -> bool {
        self.resume(now)
    }

    /// Pause if running, resume if paused. Returns whether the clock is now
    /// running.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paused {
            self.resume(now);
        } else {
            self.pause(now);
        }
        !self.is_paused
    }

    /// Handle a timer delivered by the host.
    ///
    /// Returns the index passed to the advance callback, or `None` when the
    /// token is stale, the delivery came early (the boundary is re-armed) or
    /// the target was already announced.
    pub fn fire(&mut self, token: TimerToken, now: DateTime<Utc>) -> Option<usize> {
        let armed = match self.armed {
            Some(armed) if armed.token == token => armed,
            _ => {
                debug!(token = token.get(), "ignoring stale boundary timer");
                return None;
            }
        };
        self.armed = None;
        if self.is_paused {
            return None;
        }

        let early_ms = self.segment_end_ms(armed.index) - self.elapsed_ms(now);
        if early_ms > 0 {
            debug!(index = armed.index, early_ms, "boundary timer fired early, re-arming");
            self.arm(armed.index, now);
            return None;
        }

        let len = self.sequence.len();
        let target = if self.is_finished(now) {
            len
        } else {
            (armed.index + 1).max(self.current_index(now))
        };
        if target > armed.index + 1 {
            debug!(from = armed.index, to = target, "caught up over missed boundaries");
        }

        let announce = target > self.advanced_to;
        if announce {
            self.advanced_to = target;
            (self.on_advance)(target);
        } else {
            debug!(target, advanced_to = self.advanced_to, "boundary already announced");
        }

        if target < len {
            self.arm(target, now);
        } else if announce {
            info!(segments = len, "sequence finished");
        }
        announce.then_some(target)
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write the anchor state to `store`.
    ///
    /// # Errors
    /// Returns an error if the store rejects a write or the durations cannot
    /// be serialized.
    pub fn save_state(&self, store: &mut dyn KeyValueStore, now: DateTime<Utc>) -> Result<()> {
        store.set(keys::IS_PAUSED, if self.is_paused { "true" } else { "false" })?;
        store.set(keys::START_TIME, &format_instant(self.anchor_start))?;
        store.set(keys::PAUSE_START, &format_instant(self.pause_start))?;
        store.set(
            keys::PAUSE_OFFSET,
            &(self.pause_offset_ms as f64 / 1000.0).to_string(),
        )?;
        store.set(
            keys::TIME_AMOUNTS,
            &serde_json::to_string(&self.sequence.durations_secs())?,
        )?;
        store.set(keys::SAVE_TIME, &format_instant(now))?;
        debug!(paused = self.is_paused, "saved clock state");
        Ok(())
    }

    /// Load anchor state from `store`.
    ///
    /// Every field is independent: a missing or unreadable value keeps the
    /// current in-memory one. If the restored clock is running, one boundary
    /// is armed for the segment `now` falls in; boundaries missed while the
    /// process was gone are not replayed.
    pub fn restore_state(&mut self, store: &dyn KeyValueStore, now: DateTime<Utc>) -> RestoreReport {
        let mut report = RestoreReport::default();

        let paused = read_value(store, keys::IS_PAUSED, |raw| raw.parse::<bool>().ok());
        report.note(keys::IS_PAUSED, paused.is_some());
        if let Some(paused) = paused {
            self.is_paused = paused;
        }

        let anchor = read_value(store, keys::START_TIME, parse_instant);
        report.note(keys::START_TIME, anchor.is_some());
        if let Some(anchor) = anchor {
            self.anchor_start = anchor;
        }

        let pause_start = read_value(store, keys::PAUSE_START, parse_instant);
        report.note(keys::PAUSE_START, pause_start.is_some());
        if let Some(pause_start) = pause_start {
            self.pause_start = pause_start;
        }

        let offset = read_value(store, keys::PAUSE_OFFSET, parse_seconds_ms);
        report.note(keys::PAUSE_OFFSET, offset.is_some());
        if let Some(offset) = offset {
            self.pause_offset_ms = offset;
        }

        let amounts = read_value(store, keys::TIME_AMOUNTS, |raw| {
            serde_json::from_str::<Vec<f64>>(raw).ok()
        })
        .and_then(|secs| match self.sequence.with_durations_secs(&secs) {
            Ok(sequence) => Some(sequence),
            Err(e) => {
                warn!(key = keys::TIME_AMOUNTS, error = %e, "saved durations do not fit sequence");
                None
            }
        });
        report.note(keys::TIME_AMOUNTS, amounts.is_some());
        if let Some(sequence) = amounts {
            self.sequence = sequence;
        }

        report.saved_at = read_value(store, keys::SAVE_TIME, parse_instant);

        // Boundaries already behind the restored anchors count as announced,
        // except the end of the sequence, which the new owner still has to
        // hear about.
        let last = self.sequence.len().saturating_sub(1);
        self.advanced_to = self.crossed_boundaries(now).min(last);
        self.disarm();
        if !self.is_paused {
            self.arm(self.current_index(now), now);
        }
        debug!(
            paused = self.is_paused,
            index = self.current_index(now),
            defaulted = ?report.defaulted,
            "restored clock state"
        );
        report
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Swap the sequence without touching the anchors. Used while restoring,
    /// before the anchors themselves are loaded.
    pub(crate) fn replace_sequence(&mut self, sequence: PhaseSequence) {
        self.disarm();
        self.sequence = sequence;
        self.advanced_to = 0;
    }

    /// Number of segment ends at or before the effective elapsed time.
    fn crossed_boundaries(&self, now: DateTime<Utc>) -> usize {
        let elapsed = self.elapsed_ms(now);
        (0..self.sequence.len())
            .take_while(|&i| self.segment_end_ms(i) <= elapsed)
            .count()
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let mut elapsed = (now - self.anchor_start).num_milliseconds();
        if self.is_paused {
            elapsed -= (now - self.pause_start).num_milliseconds();
        }
        (elapsed - self.pause_offset_ms).max(0)
    }

    fn segment_end_ms(&self, index: usize) -> i64 {
        let end = self.sequence.cumulative_ms(index + 1) as i64;
        end.saturating_add(self.stagger_ms.saturating_mul(index as i64))
    }

    fn remaining_secs(&self, index: usize, now: DateTime<Utc>) -> u64 {
        round_secs(self.segment_end_ms(index) - self.elapsed_ms(now)).max(0) as u64
    }

    fn arm(&mut self, index: usize, now: DateTime<Utc>) {
        self.disarm();
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let delay_ms = (self.segment_end_ms(index) - self.elapsed_ms(now)).max(0);
        self.timer.arm(token, Duration::from_millis(delay_ms as u64));
        self.armed = Some(ArmedBoundary { token, index });
        debug!(index, token = token.get(), delay_ms, "armed boundary timer");
    }

    fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            self.timer.cancel(armed.token);
            debug!(index = armed.index, token = armed.token.get(), "cancelled boundary timer");
        }
    }
}

impl<T: BoundaryTimer + fmt::Debug> fmt::Debug for SequenceClock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceClock")
            .field("sequence", &self.sequence)
            .field("anchor_start", &self.anchor_start)
            .field("is_paused", &self.is_paused)
            .field("pause_start", &self.pause_start)
            .field("pause_offset_ms", &self.pause_offset_ms)
            .field("stagger_ms", &self.stagger_ms)
            .field("timer", &self.timer)
            .field("armed", &self.armed)
            .field("advanced_to", &self.advanced_to)
            .finish_non_exhaustive()
    }
}

/// Round to the nearest whole second, halves away from zero.
fn round_secs(ms: i64) -> i64 {
    (ms as f64 / 1000.0).round() as i64
}

pub(crate) fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn parse_seconds_ms(raw: &str) -> Option<i64> {
    let secs = raw.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as i64)
}

/// Read and parse one key. Missing keys are expected on a first run; read
/// errors and unparsable values are logged.
pub(crate) fn read_value<V>(
    store: &dyn KeyValueStore,
    key: &'static str,
    parse: impl FnOnce(&str) -> Option<V>,
) -> Option<V> {
    match store.get(key) {
        Ok(Some(raw)) => {
            let value = parse(&raw);
            if value.is_none() {
                warn!(key, raw = %raw, "ignoring unreadable saved value");
            }
            value
        }
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "failed to read saved value");
            None
        }
    }
}
