//! Subscription intake and lifecycle

use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{AlertSubscription, Corridor, Direction, SubscriptionRequest, ThresholdInput};
use crate::store::SubscriptionStore;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Validates and stores subscriptions on behalf of their owners
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    corridors: Vec<Corridor>,
}

impl SubscriptionService {
    /// Create a service accepting subscriptions for `corridors` only
    pub fn new(store: Arc<dyn SubscriptionStore>, corridors: Vec<Corridor>) -> Self {
        Self { store, corridors }
    }

    /// Validate `request` and store a new active subscription.
    ///
    /// Any invalid field yields [`Error::Validation`] and nothing is written.
    pub async fn create(&self, request: SubscriptionRequest) -> Result<AlertSubscription> {
        let recipient = request.recipient.trim();
        if !EMAIL.is_match(recipient) {
            return Err(Error::validation(format!(
                "'{recipient}' is not a valid e-mail address"
            )));
        }

        let direction = Direction::from_str(&request.direction)?;
        let threshold = parse_threshold(&request.threshold)?;

        if !self.corridors.contains(&request.corridor) {
            return Err(Error::validation(format!(
                "corridor {} is not supported",
                request.corridor
            )));
        }

        let subscription =
            AlertSubscription::new(recipient.to_string(), request.corridor, direction, threshold);
        self.store.insert(&subscription).await?;

        info!(
            subscription_id = %subscription.id,
            corridor = %subscription.corridor,
            direction = %subscription.direction,
            threshold = %subscription.threshold,
            "Subscription created"
        );

        Ok(subscription)
    }

    /// Get a subscription by ID
    pub async fn get(&self, id: Uuid) -> Result<AlertSubscription> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("subscription", id.to_string()))
    }

    /// All subscriptions, oldest first
    pub async fn list(&self) -> Result<Vec<AlertSubscription>> {
        self.store.list().await
    }

    /// Soft-deactivate a subscription; repeating it is harmless
    pub async fn deactivate(&self, id: Uuid) -> Result<AlertSubscription> {
        let subscription = self
            .store
            .deactivate(id)
            .await?
            .ok_or_else(|| Error::not_found("subscription", id.to_string()))?;

        info!(subscription_id = %id, "Subscription deactivated");
        Ok(subscription)
    }
}

/// Parse a threshold as a finite, non-negative decimal
pub fn parse_threshold(input: &ThresholdInput) -> Result<Decimal> {
    let text = input.as_text();
    let value = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| Error::validation(format!("threshold '{text}' is not a number")))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::validation(format!(
            "threshold must not be negative, got {value}"
        )));
    }
    Ok(value.normalize())
}
