//! Quote source adapters
//!
//! Each provider is reached through a [`QuoteSource`]. Sources are fallible and
//! independent: a failing provider yields a [`SourceError`] and never affects
//! the others.

mod http;
mod simulated;

pub use http::HttpQuoteSource;
pub use simulated::SimulatedSource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::models::{Corridor, Quote};

/// Reasons a provider could not produce a quote
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No answer within the fetch timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure or non-success status
    #[error("network error: {0}")]
    Network(String),

    /// Response did not contain a usable quote
    #[error("failed to parse quote: {0}")]
    Parse(String),

    /// Provider does not quote the corridor
    #[error("corridor {0} not served by this provider")]
    Unsupported(String),
}

/// A single provider that can quote a corridor
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Provider name, used as the rate store key
    fn name(&self) -> &str;

    /// Fetch a best-effort quote for `corridor`
    async fn fetch(&self, corridor: &Corridor) -> std::result::Result<Quote, SourceError>;
}

/// Instantiate every configured provider
pub fn build_sources(
    providers: &[ProviderConfig],
    fetch_timeout: Duration,
) -> Result<Vec<Arc<dyn QuoteSource>>> {
    providers
        .iter()
        .map(|provider| -> Result<Arc<dyn QuoteSource>> {
            match provider {
                ProviderConfig::Simulated {
                    name,
                    base_rate,
                    fee,
                    eta,
                    jitter,
                    failure_rate,
                } => Ok(Arc::new(
                    SimulatedSource::new(name.clone(), *base_rate, *fee, eta.clone())?
                        .with_jitter(*jitter)
                        .with_failure_rate(*failure_rate),
                )),
                ProviderConfig::Http { name, url } => Ok(Arc::new(HttpQuoteSource::new(
                    name.clone(),
                    url.clone(),
                    fetch_timeout,
                )?)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionConfig;

    #[test]
    fn test_build_default_sources() {
        let config = IngestionConfig::default();
        let sources = build_sources(&config.providers, config.fetch_timeout).unwrap();

        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["Wise", "Remitly", "Xoom", "Western Union", "MoneyGram"]);
    }
}
