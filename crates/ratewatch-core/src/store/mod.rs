//! Storage layer for RateWatch
//!
//! Two stores with exclusive ownership of their records: the [`RateStore`]
//! keeps the latest quote per `(provider, corridor)`, the
//! [`SubscriptionStore`] keeps alert subscriptions. Every write is atomic per
//! key so ingestion and evaluation can run side by side.

mod memory;
mod postgres;

pub use memory::{MemoryRateStore, MemorySubscriptionStore};
pub use postgres::{PgRateStore, PgSubscriptionStore, PostgresPool};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::models::{AlertSubscription, BestRate, Corridor, Quote, RateRecord};

/// Latest known quote per provider and corridor
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Insert or replace the record for `(quote.provider, quote.corridor)`
    async fn upsert(&self, quote: &Quote) -> Result<RateRecord>;

    /// Highest raw rate on the corridor, earliest-seen provider on ties.
    /// `None` when nobody has reported for the corridor.
    async fn best_rate(&self, corridor: &Corridor) -> Result<Option<BestRate>>;

    /// All records for the corridor, ranked by net value descending
    async fn all_rates(&self, corridor: &Corridor) -> Result<Vec<RateRecord>>;

    /// Mark `provider` as the corridor's recommended pick, clearing any other
    async fn set_recommended(&self, corridor: &Corridor, provider: &str) -> Result<()>;

    /// Provider currently marked as recommended on the corridor
    async fn recommended(&self, corridor: &Corridor) -> Result<Option<String>>;
}

/// Durable alert subscriptions
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Persist a new subscription
    async fn insert(&self, subscription: &AlertSubscription) -> Result<()>;

    /// Get a subscription by ID
    async fn get(&self, id: Uuid) -> Result<Option<AlertSubscription>>;

    /// All subscriptions, oldest first
    async fn list(&self) -> Result<Vec<AlertSubscription>>;

    /// Active subscriptions, oldest first
    async fn list_active(&self) -> Result<Vec<AlertSubscription>>;

    /// Record a delivered notification in a single write. `None` if the
    /// subscription does not exist or has been deactivated.
    async fn record_trigger(
        &self,
        id: Uuid,
        rate: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<AlertSubscription>>;

    /// Soft-deactivate. Idempotent; `None` if the subscription does not exist.
    async fn deactivate(&self, id: Uuid) -> Result<Option<AlertSubscription>>;
}

/// Store handles bundle
#[derive(Clone)]
pub struct Stores {
    /// Rate store
    pub rates: Arc<dyn RateStore>,
    /// Subscription store
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl Stores {
    /// Process-local stores
    pub fn in_memory() -> Self {
        Self {
            rates: Arc::new(MemoryRateStore::new()),
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
        }
    }

    /// Open the configured backend, running migrations for Postgres
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::Postgres => {
                let pool = PostgresPool::new(&config.database).await?;
                pool.migrate().await?;
                Ok(Self {
                    rates: Arc::new(PgRateStore::new(&pool)),
                    subscriptions: Arc::new(PgSubscriptionStore::new(&pool)),
                })
            }
        }
    }
}
