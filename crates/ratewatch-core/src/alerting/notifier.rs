//! Notification delivery for rate alerts

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::{NotifierConfig, NotifierKind};
use crate::error::{Error, Result};
use crate::models::{AlertSubscription, RateRecord};

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Transport failure or timeout
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Relay answered with a non-success status
    #[error("Rejected by relay: {0}")]
    Rejected(String),
}

/// Delivers a message for a firing subscription.
///
/// Called at most once per firing decision; a failure leaves the
/// subscription untouched so the next pass tries again.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert for `subscription` at `current_rate`. `context` is the
    /// corridor's ranked rate table.
    async fn send(
        &self,
        subscription: &AlertSubscription,
        current_rate: Decimal,
        context: &[RateRecord],
    ) -> std::result::Result<(), NotificationError>;
}

/// Rendered alert content, shared by every notifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    /// Subscription that fired
    pub subscription_id: Uuid,
    /// Address to deliver to
    pub recipient: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
    /// Corridor in `COUNTRY:BASE/QUOTE` form
    pub corridor: String,
    /// `above` or `below`
    pub direction: String,
    /// Threshold the subscriber asked for
    pub threshold: Decimal,
    /// Best rate that crossed the threshold
    pub current_rate: Decimal,
    /// Provider named as the recommended pick
    pub recommended_provider: String,
    /// When the message was composed
    pub generated_at: DateTime<Utc>,
}

impl AlertMessage {
    /// Compose the message. The recommended provider is the pick marked in
    /// `context`, falling back to `default_pick`.
    pub fn compose(
        subscription: &AlertSubscription,
        current_rate: Decimal,
        context: &[RateRecord],
        default_pick: &str,
    ) -> Self {
        let corridor = &subscription.corridor;
        let pair = corridor.pair();
        let recommended = context
            .iter()
            .find(|r| r.is_recommended)
            .map_or(default_pick, |r| r.provider.as_str())
            .to_string();

        let subject = format!(
            "Rate Alert: {pair} is {} {}",
            subscription.direction, subscription.threshold
        );

        let mut body = format!(
            "Current {pair} rate from {}: {} {} per {}\n\
             You asked to be notified when the rate goes {} {}.\n\
             Recommended provider right now: {recommended}\n",
            corridor.sender_country,
            current_rate.round_dp(6),
            corridor.quote_currency,
            corridor.base_currency,
            subscription.direction,
            subscription.threshold,
        );

        if !context.is_empty() {
            body.push_str("\nProvider        Rate        Fee     Arrives\n");
            for record in context {
                body.push_str(&format!(
                    "{:<15} {:>10} {:>8}   {}\n",
                    record.provider,
                    record.rate.round_dp(4),
                    record.fee.round_dp(2),
                    record.eta
                ));
            }
        }

        Self {
            subscription_id: subscription.id,
            recipient: subscription.recipient.clone(),
            subject,
            body,
            corridor: corridor.to_string(),
            direction: subscription.direction.to_string(),
            threshold: subscription.threshold,
            current_rate,
            recommended_provider: recommended,
            generated_at: Utc::now(),
        }
    }
}

/// Logs alerts instead of delivering them
pub struct LogNotifier {
    default_pick: String,
}

impl LogNotifier {
    /// Create a new log notifier
    pub fn new(default_pick: impl Into<String>) -> Self {
        Self {
            default_pick: default_pick.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        subscription: &AlertSubscription,
        current_rate: Decimal,
        context: &[RateRecord],
    ) -> std::result::Result<(), NotificationError> {
        let message = AlertMessage::compose(subscription, current_rate, context, &self.default_pick);
        info!(
            subscription_id = %subscription.id,
            recipient = %message.recipient,
            subject = %message.subject,
            recommended = %message.recommended_provider,
            "Alert notification"
        );
        Ok(())
    }
}

/// Posts alerts as JSON to a relay that owns e-mail/SMS delivery
pub struct WebhookNotifier {
    client: Client,
    url: String,
    default_pick: String,
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    pub fn new(url: impl Into<String>, timeout: Duration, default_pick: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            default_pick: default_pick.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        subscription: &AlertSubscription,
        current_rate: Decimal,
        context: &[RateRecord],
    ) -> std::result::Result<(), NotificationError> {
        let message = AlertMessage::compose(subscription, current_rate, context, &self.default_pick);

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!(
                "relay returned {status}: {body}"
            )));
        }

        info!(subscription_id = %subscription.id, url = %self.url, "Webhook notification sent");
        Ok(())
    }
}

/// Build the configured notifier
pub fn build_notifier(config: &NotifierConfig, default_pick: &str) -> Result<Arc<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier::new(default_pick))),
        NotifierKind::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or_else(|| Error::config("notifier.webhook_url is required"))?;
            Ok(Arc::new(WebhookNotifier::new(url, config.timeout, default_pick)?))
        }
    }
}
