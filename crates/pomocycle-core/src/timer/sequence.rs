//! Phase sequences: the ordered work/rest/long-break segments of one cycle.
//!
//! A sequence is never edited in place. Changing the segment count or any
//! duration builds a new sequence, and whoever owns the clock resets onto it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const COLLECTION: &str = "phase sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Work,
    Rest,
    LongBreak,
}

impl SegmentKind {
    pub fn label(self) -> &'static str {
        match self {
            SegmentKind::Work => "Work",
            SegmentKind::Rest => "Rest",
            SegmentKind::LongBreak => "Long Break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl Segment {
    pub fn new(kind: SegmentKind, duration: Duration) -> Self {
        Self {
            kind,
            duration_ms: duration_to_ms(duration),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// One full timer cycle: `n` work/rest pairs followed by a long break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Segment>", into = "Vec<Segment>")]
pub struct PhaseSequence {
    segments: Vec<Segment>,
}

impl PhaseSequence {
    /// Build `work_segments` repetitions of `[Work, Rest]` followed by one
    /// `LongBreak`.
    ///
    /// The count is not clamped here; callers own that policy.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidValue` when `work_segments` is zero
    /// or any duration is zero.
    pub fn build(
        work_segments: usize,
        work: Duration,
        rest: Duration,
        long_break: Duration,
    ) -> Result<Self, ValidationError> {
        if work_segments == 0 {
            return Err(ValidationError::invalid(
                "work_segments",
                "at least one work segment is required",
            ));
        }
        for (field, duration) in [("work", work), ("rest", rest), ("long_break", long_break)] {
            if duration_to_ms(duration) == 0 {
                return Err(ValidationError::invalid(field, "duration must be positive"));
            }
        }

        let mut segments = Vec::with_capacity(work_segments * 2 + 1);
        for _ in 0..work_segments {
            segments.push(Segment::new(SegmentKind::Work, work));
            segments.push(Segment::new(SegmentKind::Rest, rest));
        }
        segments.push(Segment::new(SegmentKind::LongBreak, long_break));
        Ok(Self { segments })
    }

    /// Accept an explicit segment list, checking the cycle shape.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidValue` if the list is empty, does not
    /// end in a long break, does not alternate work/rest before that, or
    /// holds a zero duration.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, ValidationError> {
        let Some((last, body)) = segments.split_last() else {
            return Err(ValidationError::invalid("segments", "sequence is empty"));
        };
        if last.kind != SegmentKind::LongBreak {
            return Err(ValidationError::invalid(
                "segments",
                "last segment must be a long break",
            ));
        }
        if body.len() % 2 != 0 {
            return Err(ValidationError::invalid(
                "segments",
                "work and rest segments must come in pairs",
            ));
        }
        for (i, segment) in body.iter().enumerate() {
            let expected = if i % 2 == 0 {
                SegmentKind::Work
            } else {
                SegmentKind::Rest
            };
            if segment.kind != expected {
                return Err(ValidationError::invalid(
                    "segments",
                    format!("segment {i} should be {}", expected.label()),
                ));
            }
        }
        if segments.iter().any(|s| s.duration_ms == 0) {
            return Err(ValidationError::invalid("segments", "duration must be positive"));
        }
        Ok(Self { segments })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Never true for a validated sequence.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// # Errors
    /// Fails with `ValidationError::OutOfBounds` outside `[0, len)`.
    pub fn segment(&self, index: usize) -> Result<&Segment, ValidationError> {
        self.segments
            .get(index)
            .ok_or_else(|| ValidationError::out_of_bounds(COLLECTION, index, self.len()))
    }

    /// # Errors
    /// Fails with `ValidationError::OutOfBounds` outside `[0, len)`.
    pub fn duration(&self, index: usize) -> Result<Duration, ValidationError> {
        self.segment(index).map(Segment::duration)
    }

    /// # Errors
    /// Fails with `ValidationError::OutOfBounds` outside `[0, len)`.
    pub fn kind(&self, index: usize) -> Result<SegmentKind, ValidationError> {
        self.segment(index).map(|s| s.kind)
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_ms())
    }

    /// Sum of the durations of segments `[0, index)`. `index == len` yields
    /// the total.
    ///
    /// # Errors
    /// Fails with `ValidationError::OutOfBounds` when `index > len`.
    pub fn cumulative_duration_before(&self, index: usize) -> Result<Duration, ValidationError> {
        if index > self.len() {
            return Err(ValidationError::out_of_bounds(COLLECTION, index, self.len()));
        }
        Ok(Duration::from_millis(self.cumulative_ms(index)))
    }

    /// Number of work segments (the pomo count).
    pub fn work_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Work)
            .count()
    }

    /// Segment durations in seconds, in order.
    pub fn durations_secs(&self) -> Vec<f64> {
        self.segments
            .iter()
            .map(|s| s.duration_ms as f64 / 1000.0)
            .collect()
    }

    /// Same shape, new durations (seconds).
    ///
    /// # Errors
    /// Fails if the number of durations differs from `len` or any value is
    /// not a positive finite number.
    pub fn with_durations_secs(&self, secs: &[f64]) -> Result<Self, ValidationError> {
        if secs.len() != self.len() {
            return Err(ValidationError::invalid(
                "timeAmounts",
                format!("expected {} durations, got {}", self.len(), secs.len()),
            ));
        }
        let mut segments = Vec::with_capacity(secs.len());
        for (segment, &value) in self.segments.iter().zip(secs) {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::invalid(
                    "timeAmounts",
                    format!("{value} is not a positive duration"),
                ));
            }
            segments.push(Segment::new(segment.kind, Duration::from_secs_f64(value)));
        }
        Self::from_segments(segments)
    }

    pub(crate) fn total_ms(&self) -> u64 {
        self.cumulative_ms(self.len())
    }

    pub(crate) fn cumulative_ms(&self, index: usize) -> u64 {
        self.segments
            .iter()
            .take(index)
            .map(|s| s.duration_ms)
            .fold(0u64, u64::saturating_add)
    }

    pub(crate) fn duration_ms_at(&self, index: usize) -> u64 {
        self.segments.get(index).map(|s| s.duration_ms).unwrap_or(0)
    }
}

impl Default for PhaseSequence {
    /// Four 25-minute work segments, 5-minute rests, 15-minute long break.
    fn default() -> Self {
        let mut segments = Vec::with_capacity(9);
        for _ in 0..4 {
            segments.push(Segment::new(SegmentKind::Work, Duration::from_secs(25 * 60)));
            segments.push(Segment::new(SegmentKind::Rest, Duration::from_secs(5 * 60)));
        }
        segments.push(Segment::new(SegmentKind::LongBreak, Duration::from_secs(15 * 60)));
        Self { segments }
    }
}

impl TryFrom<Vec<Segment>> for PhaseSequence {
    type Error = ValidationError;

    fn try_from(segments: Vec<Segment>) -> Result<Self, Self::Error> {
        Self::from_segments(segments)
    }
}

impl From<PhaseSequence> for Vec<Segment> {
    fn from(sequence: PhaseSequence) -> Self {
        sequence.segments
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
