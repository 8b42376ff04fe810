//! Threshold evaluation over active subscriptions

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::notifier::Notifier;
use crate::error::Result;
use crate::models::{AlertSubscription, BestRate, Corridor, EvaluationReport, RateRecord};
use crate::store::Stores;

/// What a pass knows about one corridor, read once and shared by every
/// subscription on it
enum CorridorView {
    Ready { best: BestRate, context: Vec<RateRecord> },
    Empty,
    Unavailable,
}

/// Outcome of checking a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    NotMet,
    NoData,
    Duplicate,
    Delivered,
    DeliveryFailed,
    Error,
}

/// Checks every active subscription against its corridor's best rate and
/// notifies the ones that crossed their threshold.
///
/// Holds no state between passes: trigger bookkeeping lives on the
/// subscription and is only written after a successful delivery.
pub struct AlertEvaluator {
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    epsilon: Decimal,
}

impl AlertEvaluator {
    /// Create a new alert evaluator
    pub fn new(stores: Stores, notifier: Arc<dyn Notifier>, epsilon: Decimal) -> Self {
        Self {
            stores,
            notifier,
            epsilon,
        }
    }

    /// Run one pass at the current time
    pub async fn run_pass(&self) -> Result<EvaluationReport> {
        self.evaluate_at(Utc::now()).await
    }

    /// Run one pass, stamping triggers with `now`.
    ///
    /// Fails only if the active subscriptions cannot be listed; every other
    /// failure is counted in the report.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> Result<EvaluationReport> {
        let started = std::time::Instant::now();
        let subscriptions = self.stores.subscriptions.list_active().await?;

        debug!(count = subscriptions.len(), "Evaluating subscriptions");

        let mut views: HashMap<Corridor, CorridorView> = HashMap::new();
        let mut report = EvaluationReport::default();

        for subscription in &subscriptions {
            if !views.contains_key(&subscription.corridor) {
                let view = self.load_corridor(&subscription.corridor).await;
                views.insert(subscription.corridor.clone(), view);
            }
            let view = &views[&subscription.corridor];

            report.subscriptions_checked += 1;
            match self.evaluate_subscription(subscription, view, now).await {
                Decision::NotMet => {}
                Decision::NoData => report.skipped_no_data += 1,
                Decision::Duplicate => report.suppressed_duplicates += 1,
                Decision::Delivered => report.notifications_sent += 1,
                Decision::DeliveryFailed => report.delivery_failures += 1,
                Decision::Error => report.errors += 1,
            }
        }

        metrics::histogram!("ratewatch_evaluation_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        info!(
            checked = report.subscriptions_checked,
            sent = report.notifications_sent,
            suppressed = report.suppressed_duplicates,
            delivery_failures = report.delivery_failures,
            errors = report.errors,
            "Evaluation pass complete"
        );

        Ok(report)
    }

    async fn load_corridor(&self, corridor: &Corridor) -> CorridorView {
        let best = match self.stores.rates.best_rate(corridor).await {
            Ok(Some(best)) => best,
            Ok(None) => return CorridorView::Empty,
            Err(e) => {
                error!(corridor = %corridor, error = %e, "Failed to read best rate");
                return CorridorView::Unavailable;
            }
        };

        match self.stores.rates.all_rates(corridor).await {
            Ok(context) => CorridorView::Ready { best, context },
            Err(e) => {
                error!(corridor = %corridor, error = %e, "Failed to read corridor rates");
                CorridorView::Unavailable
            }
        }
    }

    async fn evaluate_subscription(
        &self,
        subscription: &AlertSubscription,
        view: &CorridorView,
        now: DateTime<Utc>,
    ) -> Decision {
        let (best, context) = match view {
            CorridorView::Ready { best, context } => (best, context),
            CorridorView::Empty => {
                debug!(subscription_id = %subscription.id, corridor = %subscription.corridor, "No rates yet");
                return Decision::NoData;
            }
            CorridorView::Unavailable => return Decision::Error,
        };

        if !subscription.check(best.rate) {
            debug!(
                subscription_id = %subscription.id,
                rate = %best.rate,
                threshold = %subscription.threshold,
                direction = %subscription.direction,
                "Threshold not met"
            );
            return Decision::NotMet;
        }

        if subscription.is_duplicate(best.rate, self.epsilon) {
            debug!(subscription_id = %subscription.id, rate = %best.rate, "Rate unchanged since last alert");
            metrics::counter!("ratewatch_notifications_suppressed_total").increment(1);
            return Decision::Duplicate;
        }

        if let Err(e) = self.notifier.send(subscription, best.rate, context).await {
            warn!(subscription_id = %subscription.id, error = %e, "Notification delivery failed");
            metrics::counter!("ratewatch_notifications_failed_total").increment(1);
            return Decision::DeliveryFailed;
        }
        metrics::counter!("ratewatch_notifications_sent_total").increment(1);

        match self
            .stores
            .subscriptions
            .record_trigger(subscription.id, best.rate, now)
            .await
        {
            Ok(Some(_)) => {
                info!(
                    subscription_id = %subscription.id,
                    provider = %best.provider,
                    rate = %best.rate,
                    "Alert triggered"
                );
                Decision::Delivered
            }
            Ok(None) => {
                warn!(subscription_id = %subscription.id, "Subscription removed or deactivated before trigger was recorded");
                Decision::Error
            }
            Err(e) => {
                error!(subscription_id = %subscription.id, error = %e, "Failed to record trigger");
                Decision::Error
            }
        }
    }
}
