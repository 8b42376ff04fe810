//! Ingestion cycles
//!
//! One cycle asks every configured source for every configured corridor,
//! stores whatever came back, and reports what did not. A provider failing
//! only costs that provider its update for the cycle; its previous record
//! stays in place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Corridor, CycleSummary, FetchFailure, Quote, RateRecord};
use crate::sources::{QuoteSource, SourceError};
use crate::store::RateStore;

/// Runs ingestion cycles against a fixed set of sources and corridors
pub struct IngestionCoordinator {
    sources: Vec<Arc<dyn QuoteSource>>,
    store: Arc<dyn RateStore>,
    corridors: Vec<Corridor>,
    fetch_timeout: Duration,
}

impl IngestionCoordinator {
    /// Create a new coordinator
    pub fn new(
        sources: Vec<Arc<dyn QuoteSource>>,
        store: Arc<dyn RateStore>,
        corridors: Vec<Corridor>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            store,
            corridors,
            fetch_timeout,
        }
    }

    /// Corridors this coordinator ingests
    pub fn corridors(&self) -> &[Corridor] {
        &self.corridors
    }

    /// Run one cycle. All upserts have completed when this returns.
    pub async fn run_cycle(&self) -> CycleSummary {
        let started_at = Utc::now();
        let started = Instant::now();

        let fetches = self.corridors.iter().flat_map(|corridor| {
            self.sources
                .iter()
                .map(move |source| self.fetch_one(source.as_ref(), corridor))
        });
        let results = join_all(fetches).await;

        let attempted = results.len();
        let mut succeeded = 0;
        let mut failures = Vec::new();

        for (provider, corridor, result) in results {
            let outcome = match result {
                Ok(quote) => self
                    .store_quote(&quote)
                    .await
                    .map_err(|e| format!("store write failed: {e}")),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(record) => {
                    succeeded += 1;
                    metrics::counter!("ratewatch_quotes_fetched_total", "provider" => provider.clone())
                        .increment(1);
                    debug!(provider = %provider, corridor = %corridor, rate = %record.rate, "Quote stored");
                }
                Err(reason) => {
                    metrics::counter!("ratewatch_quotes_failed_total", "provider" => provider.clone())
                        .increment(1);
                    warn!(provider = %provider, corridor = %corridor, reason = %reason, "Provider update skipped");
                    failures.push(FetchFailure {
                        provider,
                        corridor,
                        reason,
                    });
                }
            }
        }

        metrics::histogram!("ratewatch_ingestion_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let summary = CycleSummary {
            attempted,
            succeeded,
            failed: failures.len(),
            failures,
            started_at,
            finished_at: Utc::now(),
        };

        if summary.is_total_failure() {
            warn!(attempted = summary.attempted, "No provider delivered a quote this cycle");
        }
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Ingestion cycle complete"
        );

        summary
    }

    async fn fetch_one(
        &self,
        source: &dyn QuoteSource,
        corridor: &Corridor,
    ) -> (String, Corridor, std::result::Result<Quote, SourceError>) {
        let result = match tokio::time::timeout(self.fetch_timeout, source.fetch(corridor)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.fetch_timeout)),
        };
        (source.name().to_string(), corridor.clone(), result)
    }

    /// Upsert, retrying once on a write conflict
    async fn store_quote(&self, quote: &Quote) -> Result<RateRecord> {
        match self.store.upsert(quote).await {
            Err(e) if e.is_write_conflict() => {
                debug!(provider = %quote.provider, corridor = %quote.corridor, "Retrying conflicting upsert");
                self.store.upsert(quote).await
            }
            other => other,
        }
    }
}
