//! Quote and rate data models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Corridor;

/// A single observation from a provider for one corridor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Provider that issued the quote (e.g. "Wise")
    pub provider: String,
    /// Corridor the quote applies to
    pub corridor: Corridor,
    /// Quote currency received per unit of base currency
    pub rate: Decimal,
    /// Transfer fee, in the same units as `rate`
    pub fee: Decimal,
    /// Delivery time label, e.g. "1 hr"
    pub eta: String,
    /// When the quote was observed
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Fee-adjusted value, used for display ranking only
    pub fn net_value(&self) -> Decimal {
        self.rate - self.fee
    }
}

/// The latest known quote for a `(provider, corridor)` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    /// Provider name, unique within a corridor
    pub provider: String,
    /// Corridor the quote applies to
    pub corridor: Corridor,
    /// Units of quote currency per unit of base currency
    pub rate: Decimal,
    /// Flat transfer fee in the base currency
    pub fee: Decimal,
    /// Advertised delivery time
    pub eta: String,
    /// When the provider produced the quote
    pub observed_at: DateTime<Utc>,

    /// When this provider first reported on the corridor
    pub first_seen_at: DateTime<Utc>,
    /// When the record was last replaced
    pub updated_at: DateTime<Utc>,
    /// Operator-selected recommended pick for the corridor
    pub is_recommended: bool,
}

impl RateRecord {
    /// Build a fresh record from a quote
    pub fn from_quote(quote: &Quote, now: DateTime<Utc>) -> Self {
        Self {
            provider: quote.provider.clone(),
            corridor: quote.corridor.clone(),
            rate: quote.rate,
            fee: quote.fee,
            eta: quote.eta.clone(),
            observed_at: quote.observed_at,
            first_seen_at: now,
            updated_at: now,
            is_recommended: false,
        }
    }

    /// Replace the quote data, keeping first-seen time and recommendation
    pub fn apply(&mut self, quote: &Quote, now: DateTime<Utc>) {
        self.rate = quote.rate;
        self.fee = quote.fee;
        self.eta.clone_from(&quote.eta);
        self.observed_at = quote.observed_at;
        self.updated_at = now;
    }

    /// Fee-adjusted value, used for display ranking only
    pub fn net_value(&self) -> Decimal {
        self.rate - self.fee
    }
}

/// Highest raw rate on a corridor at evaluation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRate {
    /// Provider offering the rate
    pub provider: String,
    /// Corridor the rate applies to
    pub corridor: Corridor,
    /// Highest raw rate on the corridor
    pub rate: Decimal,
    /// When the provider produced the quote
    pub observed_at: DateTime<Utc>,
}

impl From<&RateRecord> for BestRate {
    fn from(record: &RateRecord) -> Self {
        Self {
            provider: record.provider.clone(),
            corridor: record.corridor.clone(),
            rate: record.rate,
            observed_at: record.observed_at,
        }
    }
}

/// A row of the ranked rate table shown to users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateView {
    /// Provider name
    pub provider: String,
    /// Raw exchange rate
    pub rate: Decimal,
    /// Flat transfer fee
    pub fee: Decimal,
    /// Advertised delivery time
    pub eta: String,
    /// Rate net of the fee, used for ranking
    pub net_value: Decimal,
    /// Whether this is the corridor's recommended pick
    pub is_recommended: bool,
    /// When the quote was observed
    pub observed_at: DateTime<Utc>,
}

/// Pick the highest rate, keeping the earliest-inserted provider on ties.
///
/// `records` must be in first-seen order.
pub fn highest_rate<'a, I>(records: I) -> Option<&'a RateRecord>
where
    I: IntoIterator<Item = &'a RateRecord>,
{
    records.into_iter().fold(None, |best, record| match best {
        Some(current) if current.rate >= record.rate => Some(current),
        _ => Some(record),
    })
}

/// Sort records by net value descending; the sort is stable so equal net
/// values keep first-seen order.
pub fn rank_by_net_value(records: &mut [RateRecord]) {
    records.sort_by(|a, b| b.net_value().cmp(&a.net_value()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(provider: &str, rate: Decimal, fee: Decimal) -> RateRecord {
        let quote = Quote {
            provider: provider.to_string(),
            corridor: Corridor::new("USA", "USD", "BDT"),
            rate,
            fee,
            eta: "1 hr".to_string(),
            observed_at: Utc::now(),
        };
        RateRecord::from_quote(&quote, Utc::now())
    }

    #[test]
    fn test_highest_rate_prefers_first_seen_on_tie() {
        let records = vec![
            record("Wise", dec!(124.1), dec!(3.2)),
            record("Xoom", dec!(124.2), dec!(4.9)),
            record("Remitly", dec!(124.2), dec!(4.5)),
        ];

        let best = highest_rate(&records).unwrap();
        assert_eq!(best.provider, "Xoom");
        assert!(highest_rate(&[]).is_none());
    }

    #[test]
    fn test_rank_by_net_value() {
        let mut records = vec![
            record("Wise", dec!(124.2), dec!(3.2)),
            record("Western Union", dec!(122.8), dec!(2.0)),
            record("Xoom", dec!(124.1), dec!(4.9)),
        ];

        rank_by_net_value(&mut records);

        let order: Vec<_> = records.iter().map(|r| r.provider.as_str()).collect();
        assert_eq!(order, ["Wise", "Western Union", "Xoom"]);
        assert_eq!(records[0].net_value(), dec!(121.0));
    }
}
