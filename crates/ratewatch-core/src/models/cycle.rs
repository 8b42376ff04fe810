//! Reports produced by ingestion cycles and evaluation passes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Corridor;

/// A provider that produced no stored quote during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    /// Provider that failed
    pub provider: String,
    /// Corridor it was asked to quote
    pub corridor: Corridor,
    /// Timeout, source error, or store error
    pub reason: String,
}

/// Outcome of one ingestion cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Provider x corridor pairs attempted
    pub attempted: usize,
    /// Quotes fetched and stored
    pub succeeded: usize,
    /// Pairs that produced no stored quote
    pub failed: usize,
    /// One entry per failed pair
    pub failures: Vec<FetchFailure>,
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// When the last pair settled
    pub finished_at: DateTime<Utc>,
}

impl CycleSummary {
    /// True when every attempted pair failed
    pub fn is_total_failure(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Notifications delivered (and recorded)
    pub notifications_sent: usize,
    /// Active subscriptions looked at
    pub subscriptions_checked: usize,
    /// Skipped because the corridor has no rates yet
    pub skipped_no_data: usize,
    /// Condition met but the rate has not moved since the last notification
    pub suppressed_duplicates: usize,
    /// Notifier reported a failure; state left untouched for retry
    pub delivery_failures: usize,
    /// Store errors while reading rates or recording a trigger
    pub errors: usize,
}
