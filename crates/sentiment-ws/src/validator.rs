//! Sequence validation for the inbound event stream.
//!
//! `validate_at` is a pure classification of one event against the set of
//! sequence numbers already accepted and the next expected sequence number.
//! `SequenceTracker` owns that state and applies the caller contract
//! (record on acceptance, advance `expected`).

use sentiment_core::{now_ms, StreamEvent};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum tolerated distance between event time and local time.
pub const DEFAULT_STALE_AFTER_MS: i64 = 300_000;

/// Accuracy penalty for an event missing `id`, `title` or `timestamp`.
pub const MISSING_FIELDS_PENALTY: f64 = -0.1;
/// Accuracy penalty for a repeated sequence number.
pub const DUPLICATE_PENALTY: f64 = -0.05;
/// Accuracy penalty for an event outside the freshness window.
pub const STALE_PENALTY: f64 = -0.1;
/// Accuracy penalty per presumed-lost event in a sequence gap.
pub const LOSS_PENALTY_PER_EVENT: f64 = -0.1;

/// Why an event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingFields,
    Duplicate,
    Stale,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFields => "missing_fields",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub is_duplicate: bool,
    /// Accepted with a sequence number below `expected` (not resequenced).
    pub is_out_of_order: bool,
    /// Size of the gap before this event, if it skipped ahead.
    pub lost_count: u64,
    pub accuracy_delta: f64,
    pub rejection: Option<Rejection>,
}

impl ValidationOutcome {
    fn accepted(lost_count: u64, is_out_of_order: bool) -> Self {
        Self {
            accepted: true,
            is_duplicate: false,
            is_out_of_order,
            lost_count,
            accuracy_delta: LOSS_PENALTY_PER_EVENT * lost_count as f64,
            rejection: None,
        }
    }

    fn rejected(rejection: Rejection, accuracy_delta: f64) -> Self {
        Self {
            accepted: false,
            is_duplicate: rejection == Rejection::Duplicate,
            is_out_of_order: false,
            lost_count: 0,
            accuracy_delta,
            rejection: Some(rejection),
        }
    }
}

/// Validate `event` against the current wall clock.
pub fn validate(event: &StreamEvent, seen: &BTreeSet<u64>, expected: u64) -> ValidationOutcome {
    validate_at(event, seen, expected, now_ms(), DEFAULT_STALE_AFTER_MS)
}

/// Validate `event` at the given local time.
///
/// Checks run in order missing fields, duplicate, staleness; the first
/// failure decides the outcome. Loss is only accounted for accepted events.
pub fn validate_at(
    event: &StreamEvent,
    seen: &BTreeSet<u64>,
    expected: u64,
    now_ms: i64,
    stale_after_ms: i64,
) -> ValidationOutcome {
    if !event.has_required_fields() {
        return ValidationOutcome::rejected(Rejection::MissingFields, MISSING_FIELDS_PENALTY);
    }

    if seen.contains(&event.sequence_number) {
        return ValidationOutcome::rejected(Rejection::Duplicate, DUPLICATE_PENALTY);
    }

    if event.age_ms(now_ms).saturating_abs() > stale_after_ms {
        return ValidationOutcome::rejected(Rejection::Stale, STALE_PENALTY);
    }

    let lost_count = event.sequence_number.saturating_sub(expected);
    ValidationOutcome::accepted(lost_count, event.sequence_number < expected)
}

/// Owns the seen-set and expected sequence number for one stream.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    seen: BTreeSet<u64>,
    expected: u64,
    /// Seen numbers further than this below `expected` are forgotten.
    window: u64,
    stale_after_ms: i64,
}

impl SequenceTracker {
    /// The mock server numbers events from 1.
    pub const FIRST_SEQUENCE: u64 = 1;

    pub fn new(window: u64, stale_after_ms: i64) -> Self {
        Self {
            seen: BTreeSet::new(),
            expected: Self::FIRST_SEQUENCE,
            window,
            stale_after_ms,
        }
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Validate `event` and record it if accepted.
    pub fn observe(&mut self, event: &StreamEvent) -> ValidationOutcome {
        self.observe_at(event, now_ms())
    }

    pub fn observe_at(&mut self, event: &StreamEvent, now_ms: i64) -> ValidationOutcome {
        let outcome = validate_at(
            event,
            &self.seen,
            self.expected,
            now_ms,
            self.stale_after_ms,
        );

        if outcome.accepted {
            self.seen.insert(event.sequence_number);
            self.expected = self.expected.max(event.sequence_number).saturating_add(1);
            self.prune();
        }

        outcome
    }

    /// Forget all history (new stream).
    pub fn reset(&mut self) {
        self.seen.clear();
        self.expected = Self::FIRST_SEQUENCE;
    }

    fn prune(&mut self) {
        let floor = self.expected.saturating_sub(self.window);
        if floor > 0 {
            self.seen = self.seen.split_off(&floor);
        }
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(10_000, DEFAULT_STALE_AFTER_MS)
    }
}
