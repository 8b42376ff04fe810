//! Simulated provider producing quotes around a fixed base rate

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::{QuoteSource, SourceError};
use crate::error::{Error, Result};
use crate::models::{Corridor, Quote};

/// Quotes the base rate plus uniform noise in `[-jitter, +jitter]`
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    name: String,
    base_rate: f64,
    fee: Decimal,
    eta: String,
    jitter: f64,
    failure_rate: f64,
}

impl SimulatedSource {
    /// Create a simulated provider
    pub fn new(name: String, base_rate: f64, fee: f64, eta: String) -> Result<Self> {
        if !(base_rate.is_finite() && base_rate > 0.0) {
            return Err(Error::config(format!("{name}: base_rate must be positive")));
        }
        let fee = Decimal::from_f64(fee)
            .filter(|f| !f.is_sign_negative())
            .ok_or_else(|| Error::config(format!("{name}: fee must be a non-negative number")))?;

        Ok(Self {
            name,
            base_rate,
            fee: fee.round_dp(4),
            eta,
            jitter: 0.0,
            failure_rate: 0.0,
        })
    }

    /// Set the noise amplitude
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    /// Set the probability that a fetch reports the provider as unavailable
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    fn sample(&self) -> std::result::Result<Decimal, SourceError> {
        let mut rng = rand::thread_rng();

        if self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate) {
            return Err(SourceError::Network("simulated outage".to_string()));
        }

        let noise = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let rate = (self.base_rate + noise).max(0.0);

        Decimal::from_f64(rate)
            .map(|r| r.round_dp(4))
            .ok_or_else(|| SourceError::Parse(format!("unrepresentable rate {rate}")))
    }
}

#[async_trait]
impl QuoteSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, corridor: &Corridor) -> std::result::Result<Quote, SourceError> {
        let rate = self.sample()?;

        Ok(Quote {
            provider: self.name.clone(),
            corridor: corridor.clone(),
            rate,
            fee: self.fee,
            eta: self.eta.clone(),
            observed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn corridor() -> Corridor {
        Corridor::new("USA", "USD", "BDT")
    }

    #[tokio::test]
    async fn test_quotes_stay_within_jitter() {
        let source = SimulatedSource::new("Wise".into(), 124.2, 3.2, "1 hr".into())
            .unwrap()
            .with_jitter(1.0);

        for _ in 0..50 {
            let quote = source.fetch(&corridor()).await.unwrap();
            assert!(quote.rate >= dec!(123.2) && quote.rate <= dec!(125.2));
            assert_eq!(quote.fee, dec!(3.2));
            assert_eq!(quote.provider, "Wise");
            assert_eq!(quote.corridor, corridor());
        }
    }

    #[tokio::test]
    async fn test_without_jitter_quotes_base_rate() {
        let source = SimulatedSource::new("Xoom".into(), 124.1, 4.9, "10 min".into()).unwrap();
        let quote = source.fetch(&corridor()).await.unwrap();
        assert_eq!(quote.rate, dec!(124.1));
    }

    #[tokio::test]
    async fn test_always_failing_source() {
        let source = SimulatedSource::new("Remitly".into(), 123.5, 4.5, "2 hr".into())
            .unwrap()
            .with_failure_rate(1.0);
        assert!(matches!(
            source.fetch(&corridor()).await,
            Err(SourceError::Network(_))
        ));
    }

    #[test]
    fn test_rejects_negative_fee() {
        assert!(SimulatedSource::new("Bad".into(), 1.0, -1.0, "now".into()).is_err());
    }
}
