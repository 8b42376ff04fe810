//! Provider backed by a JSON quote endpoint

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::{QuoteSource, SourceError};
use crate::error::{Error, Result};
use crate::models::{Corridor, Quote};

/// Response body expected from the endpoint
#[derive(Debug, Deserialize)]
struct QuoteBody {
    rate: Decimal,
    #[serde(default)]
    fee: Decimal,
    #[serde(default)]
    eta: Option<String>,
}

/// Fetches `GET <url>?sender_country=..&base=..&quote=..` and expects
/// `{"rate": .., "fee": .., "eta": ".."}` back.
pub struct HttpQuoteSource {
    name: String,
    url: String,
    timeout: Duration,
    client: Client,
}

impl HttpQuoteSource {
    /// Create a new HTTP quote source
    pub fn new(name: String, url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("{name}: failed to create HTTP client: {e}")))?;

        Ok(Self {
            name,
            url,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, corridor: &Corridor) -> std::result::Result<Quote, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("sender_country", corridor.sender_country.as_str()),
                ("base", corridor.base_currency.as_str()),
                ("quote", corridor.quote_currency.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(self.timeout)
                } else {
                    SourceError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::Unsupported(corridor.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Network(format!("{} returned {status}", self.name)));
        }

        let body: QuoteBody = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        if body.rate <= Decimal::ZERO {
            return Err(SourceError::Parse(format!("non-positive rate {}", body.rate)));
        }
        if body.fee.is_sign_negative() {
            return Err(SourceError::Parse(format!("negative fee {}", body.fee)));
        }

        debug!(provider = %self.name, corridor = %corridor, rate = %body.rate, "Fetched quote");

        Ok(Quote {
            provider: self.name.clone(),
            corridor: corridor.clone(),
            rate: body.rate,
            fee: body.fee,
            eta: body.eta.unwrap_or_default(),
            observed_at: Utc::now(),
        })
    }
}
