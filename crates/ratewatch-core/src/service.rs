//! The RateWatch engine
//!
//! [`RateWatch`] wires the stores, the ingestion coordinator and the alert
//! evaluator together and is the only thing the HTTP API and the CLI talk to.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::alerting::{build_notifier, AlertEvaluator, Notifier, SubscriptionService};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingestion::IngestionCoordinator;
use crate::models::{
    AlertSubscription, Corridor, CycleSummary, EvaluationReport, RateView, SubscriptionRequest,
};
use crate::sources::{build_sources, QuoteSource};
use crate::store::Stores;

/// Rate ingestion and threshold alert engine
pub struct RateWatch {
    stores: Stores,
    ingestion: IngestionCoordinator,
    evaluator: AlertEvaluator,
    subscriptions: SubscriptionService,
    corridors: Vec<Corridor>,
    default_pick: String,
    ingestion_running: Mutex<()>,
    evaluation_running: Mutex<()>,
}

impl RateWatch {
    /// Build the engine from configuration: open storage, instantiate the
    /// configured providers and notifier.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let stores = Stores::connect(&config.storage).await?;
        let sources = build_sources(&config.ingestion.providers, config.ingestion.fetch_timeout)?;
        let notifier = build_notifier(&config.notifier, &config.alerting.default_pick)?;

        info!(
            providers = sources.len(),
            corridors = config.ingestion.corridors.len(),
            backend = ?config.storage.backend,
            "RateWatch initialized"
        );

        Ok(Self::new(stores, sources, notifier, config))
    }

    /// Build the engine from already constructed parts
    pub fn new(
        stores: Stores,
        sources: Vec<Arc<dyn QuoteSource>>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let corridors = config.ingestion.corridors.clone();

        Self {
            ingestion: IngestionCoordinator::new(
                sources,
                stores.rates.clone(),
                corridors.clone(),
                config.ingestion.fetch_timeout,
            ),
            evaluator: AlertEvaluator::new(stores.clone(), notifier, config.alerting.epsilon),
            subscriptions: SubscriptionService::new(stores.subscriptions.clone(), corridors.clone()),
            stores,
            corridors,
            default_pick: config.alerting.default_pick.clone(),
            ingestion_running: Mutex::new(()),
            evaluation_running: Mutex::new(()),
        }
    }

    /// Supported corridors
    pub fn corridors(&self) -> &[Corridor] {
        &self.corridors
    }

    fn ensure_supported(&self, corridor: &Corridor) -> Result<()> {
        if self.corridors.contains(corridor) {
            Ok(())
        } else {
            Err(Error::not_found("corridor", corridor.to_string()))
        }
    }

    // --- Rates ---

    /// Ranked rate table for a corridor, best net value first
    pub async fn list_rates(&self, corridor: &Corridor) -> Result<Vec<RateView>> {
        self.ensure_supported(corridor)?;
        let recommended = self.recommended(corridor).await?;

        let rates = self
            .stores
            .rates
            .all_rates(corridor)
            .await?
            .into_iter()
            .map(|record| RateView {
                net_value: record.net_value(),
                is_recommended: record.provider == recommended,
                provider: record.provider,
                rate: record.rate,
                fee: record.fee,
                eta: record.eta,
                observed_at: record.observed_at,
            })
            .collect();

        Ok(rates)
    }

    /// Recommended provider for a corridor, or the configured default pick
    pub async fn recommended(&self, corridor: &Corridor) -> Result<String> {
        self.ensure_supported(corridor)?;
        Ok(self
            .stores
            .rates
            .recommended(corridor)
            .await?
            .unwrap_or_else(|| self.default_pick.clone()))
    }

    /// Mark a provider that has reported on the corridor as its recommended pick
    pub async fn set_recommended(&self, corridor: &Corridor, provider: &str) -> Result<()> {
        self.ensure_supported(corridor)?;
        self.stores.rates.set_recommended(corridor, provider).await?;
        info!(corridor = %corridor, provider = %provider, "Recommended provider updated");
        Ok(())
    }

    // --- Subscriptions ---

    /// Validate and store a new subscription
    pub async fn create_subscription(&self, request: SubscriptionRequest) -> Result<AlertSubscription> {
        self.subscriptions.create(request).await
    }

    /// Get a subscription by ID
    pub async fn get_subscription(&self, id: Uuid) -> Result<AlertSubscription> {
        self.subscriptions.get(id).await
    }

    /// All subscriptions, oldest first
    pub async fn list_subscriptions(&self) -> Result<Vec<AlertSubscription>> {
        self.subscriptions.list().await
    }

    /// Soft-deactivate a subscription
    pub async fn deactivate_subscription(&self, id: Uuid) -> Result<AlertSubscription> {
        self.subscriptions.deactivate(id).await
    }

    // --- Cycles ---

    /// Run one ingestion cycle; rejected while another is still running
    pub async fn run_ingestion_cycle(&self) -> Result<CycleSummary> {
        let _running = self
            .ingestion_running
            .try_lock()
            .map_err(|_| Error::CycleInProgress("ingestion"))?;
        Ok(self.ingestion.run_cycle().await)
    }

    /// Run one evaluation pass; rejected while another is still running
    pub async fn run_evaluation_pass(&self) -> Result<EvaluationReport> {
        let _running = self
            .evaluation_running
            .try_lock()
            .map_err(|_| Error::CycleInProgress("evaluation"))?;
        self.evaluator.run_pass().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::LogNotifier;
    use crate::models::ThresholdInput;
    use crate::sources::SimulatedSource;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn steady(name: &str, rate: f64, fee: f64) -> Arc<dyn QuoteSource> {
        Arc::new(
            SimulatedSource::new(name.to_string(), rate, fee, "1 hr".to_string())
                .unwrap()
                .with_jitter(0.0),
        )
    }

    fn engine() -> RateWatch {
        RateWatch::new(
            Stores::in_memory(),
            vec![
                steady("Wise", 124.2, 3.2),
                steady("Remitly", 123.5, 4.5),
                steady("Xoom", 124.1, 4.9),
            ],
            Arc::new(LogNotifier::new("Wise")),
            &Config::default(),
        )
    }

    fn usa() -> Corridor {
        Corridor::new("USA", "USD", "BDT")
    }

    #[tokio::test]
    async fn test_ingest_then_list_rates() {
        let engine = engine();
        let summary = engine.run_ingestion_cycle().await.unwrap();
        assert_eq!(summary.attempted, 9);
        assert_eq!(summary.succeeded, 9);

        let rates = engine.list_rates(&usa()).await.unwrap();
        let providers: Vec<_> = rates.iter().map(|r| r.provider.as_str()).collect();
        assert_eq!(providers, ["Wise", "Xoom", "Remitly"]);
        assert_eq!(rates[0].net_value, dec!(121.0));
        assert!(rates[0].is_recommended);
        assert_eq!(rates.iter().filter(|r| r.is_recommended).count(), 1);
    }

    #[tokio::test]
    async fn test_recommendation_override() {
        let engine = engine();
        assert_eq!(engine.recommended(&usa()).await.unwrap(), "Wise");

        engine.run_ingestion_cycle().await.unwrap();
        engine.set_recommended(&usa(), "Xoom").await.unwrap();
        assert_eq!(engine.recommended(&usa()).await.unwrap(), "Xoom");

        let rates = engine.list_rates(&usa()).await.unwrap();
        let flagged: Vec<_> = rates.iter().filter(|r| r.is_recommended).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].provider, "Xoom");

        let err = engine.set_recommended(&usa(), "Nobody").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_corridor_is_not_found() {
        let engine = engine();
        let err = engine
            .list_rates(&Corridor::new("Qatar", "USD", "BDT"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_subscription_fires_once_per_rate() {
        let engine = engine();
        let sub = engine
            .create_subscription(SubscriptionRequest {
                recipient: "ana@example.com".into(),
                corridor: usa(),
                direction: "above".into(),
                threshold: ThresholdInput::from("124.0"),
            })
            .await
            .unwrap();

        assert_eq!(engine.run_evaluation_pass().await.unwrap().skipped_no_data, 1);

        engine.run_ingestion_cycle().await.unwrap();
        assert_eq!(engine.run_evaluation_pass().await.unwrap().notifications_sent, 1);
        assert_eq!(engine.run_evaluation_pass().await.unwrap().notifications_sent, 0);

        let stored = engine.get_subscription(sub.id).await.unwrap();
        assert_eq!(stored.last_triggered_rate, Some(dec!(124.2)));

        engine.deactivate_subscription(sub.id).await.unwrap();
        assert_eq!(engine.run_evaluation_pass().await.unwrap().subscriptions_checked, 0);
        assert_eq!(engine.list_subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_ingestion_is_rejected() {
        struct Slow;

        #[async_trait::async_trait]
        impl QuoteSource for Slow {
            fn name(&self) -> &str {
                "Slow"
            }

            async fn fetch(
                &self,
                corridor: &Corridor,
            ) -> std::result::Result<crate::models::Quote, crate::sources::SourceError> {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                Ok(crate::models::Quote {
                    provider: "Slow".into(),
                    corridor: corridor.clone(),
                    rate: dec!(120),
                    fee: dec!(1),
                    eta: "1 day".into(),
                    observed_at: chrono::Utc::now(),
                })
            }
        }

        let engine = RateWatch::new(
            Stores::in_memory(),
            vec![Arc::new(Slow)],
            Arc::new(LogNotifier::new("Wise")),
            &Config::default(),
        );

        let (first, second) = tokio::join!(engine.run_ingestion_cycle(), engine.run_ingestion_cycle());
        assert_eq!(first.unwrap().succeeded, 3);
        assert!(matches!(second, Err(Error::CycleInProgress("ingestion"))));

        // Evaluation is guarded separately
        assert!(engine.run_evaluation_pass().await.is_ok());
    }
}
