//! Alerting for RateWatch
//!
//! Threshold evaluation over active subscriptions, subscription intake, and
//! notification delivery.

mod evaluator;
mod notifier;
mod subscriptions;

pub use evaluator::AlertEvaluator;
pub use notifier::{
    build_notifier, AlertMessage, LogNotifier, NotificationError, Notifier, WebhookNotifier,
};
pub use subscriptions::{parse_threshold, SubscriptionService};
