//! Alert subscription data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Corridor;
use crate::error::Error;

/// Which side of the threshold a subscriber wants to hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fire when the best rate is at or above the threshold
    Above,
    /// Fire when the best rate is at or below the threshold
    Below,
}

impl Direction {
    /// Whether `rate` satisfies this direction against `threshold` (inclusive)
    pub fn is_met(self, rate: Decimal, threshold: Decimal) -> bool {
        match self {
            Direction::Above => rate >= threshold,
            Direction::Below => rate <= threshold,
        }
    }

    /// Lowercase name, as stored and serialized
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(Direction::Above),
            "below" => Ok(Direction::Below),
            other => Err(Error::validation(format!(
                "direction must be 'above' or 'below', got '{other}'"
            ))),
        }
    }
}

/// A standing request to be notified when a corridor's best rate crosses a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
    /// Unique identifier
    pub id: Uuid,

    /// Contact address notifications go to
    pub recipient: String,

    /// Corridor being watched
    pub corridor: Corridor,

    /// Threshold direction
    pub direction: Direction,

    /// Threshold rate (never negative)
    pub threshold: Decimal,

    // State
    /// Cleared by the owner only; inactive subscriptions never fire again
    pub active: bool,

    /// Best rate at the last delivered notification
    pub last_triggered_rate: Option<Decimal>,

    /// Time of the last delivered notification
    pub last_triggered_at: Option<DateTime<Utc>>,

    /// Number of delivered notifications
    pub trigger_count: i64,

    // Metadata
    /// When the subscription was created
    pub created_at: DateTime<Utc>,

    /// When the subscription was last updated
    pub updated_at: DateTime<Utc>,
}

impl AlertSubscription {
    /// Create a new active, never-triggered subscription
    pub fn new(recipient: String, corridor: Corridor, direction: Direction, threshold: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            recipient,
            corridor,
            direction,
            threshold,
            active: true,
            last_triggered_rate: None,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if a best rate satisfies the threshold condition
    pub fn check(&self, rate: Decimal) -> bool {
        self.direction.is_met(rate, self.threshold)
    }

    /// Whether `rate` is within `epsilon` of the last delivered rate
    pub fn is_duplicate(&self, rate: Decimal, epsilon: Decimal) -> bool {
        self.last_triggered_rate
            .is_some_and(|last| (last - rate).abs() < epsilon)
    }

    /// Apply the bookkeeping of a delivered notification
    pub fn mark_triggered(&mut self, rate: Decimal, at: DateTime<Utc>) {
        self.last_triggered_rate = Some(rate);
        self.last_triggered_at = Some(at);
        self.trigger_count += 1;
        self.updated_at = at;
    }
}

/// Threshold as submitted by a client, either a JSON number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdInput {
    /// Numeric literal
    Number(serde_json::Number),
    /// Free-form text from a form field
    Text(String),
}

impl ThresholdInput {
    /// Raw text to be parsed as a decimal
    pub fn as_text(&self) -> String {
        match self {
            ThresholdInput::Number(n) => n.to_string(),
            ThresholdInput::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&str> for ThresholdInput {
    fn from(value: &str) -> Self {
        ThresholdInput::Text(value.to_string())
    }
}

/// Input for creating a new subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// E-mail address to notify
    pub recipient: String,
    /// Corridor to watch
    pub corridor: Corridor,
    /// `above` or `below`
    pub direction: String,
    /// Threshold rate, as a number or text
    pub threshold: ThresholdInput,
}
