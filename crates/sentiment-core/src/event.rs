//! Sentiment event types.
//!
//! `StreamEvent` is the unit carried by `{"type":"data"}` frames. Identity is
//! the `id` token, ordering is the `sequenceNumber`.

use crate::error::CoreError;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sentiment polarity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(CoreError::UnknownSentiment(other.to_string())),
        }
    }
}

/// Unique event token.
///
/// The mock server emits numeric ids (`Date.now() + Math.random()`), other
/// producers use strings. Both are normalised to their textual form, so a
/// numeric id and its string rendering compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
            Null(()),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Number(n) => Self(n.to_string()),
            RawId::Null(()) => Self::default(),
        })
    }
}

/// A sequence-numbered sentiment event.
///
/// Business fields are never mutated after creation. Fields that are absent
/// on the wire decode to empty values so the sequence validator can classify
/// them instead of the JSON decoder rejecting the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(default)]
    pub id: EventId,
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: String,
    /// Creation time in epoch milliseconds (0 = missing).
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub sentiment: Sentiment,
}

impl StreamEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        id: impl Into<EventId>,
        sequence_number: u64,
        title: impl Into<String>,
        source: impl Into<String>,
        sentiment: Sentiment,
    ) -> Self {
        Self {
            id: id.into(),
            sequence_number,
            title: title.into(),
            source: source.into(),
            timestamp: now_ms(),
            sentiment,
        }
    }

    /// Override the creation timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// `id`, `title` and `timestamp` are all present.
    pub fn has_required_fields(&self) -> bool {
        !self.id.is_empty() && !self.title.is_empty() && self.timestamp != 0
    }

    /// Age of the event relative to `now_ms` (negative if from the future).
    ///
    /// Saturates at the `i64` bounds for out-of-range timestamps.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }
}
