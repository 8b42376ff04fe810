//! PostgreSQL-backed stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::{RateStore, SubscriptionStore};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{AlertSubscription, BestRate, Corridor, Direction, Quote, RateRecord};

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

const RATE_COLUMNS: &str = "provider, sender_country, base_currency, quote_currency, \
     rate, fee, eta, observed_at, first_seen_at, updated_at, is_recommended";

/// Rate store over the `rate_records` table
#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Create a new rate store
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn upsert(&self, quote: &Quote) -> Result<RateRecord> {
        let now = Utc::now();
        let key = format!("{}@{}", quote.provider, quote.corridor);

        let row = sqlx::query_as::<_, RateRow>(&format!(
            r#"
            INSERT INTO rate_records (
                provider, sender_country, base_currency, quote_currency,
                rate, fee, eta, observed_at, first_seen_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (provider, sender_country, base_currency, quote_currency) DO UPDATE SET
                rate = EXCLUDED.rate,
                fee = EXCLUDED.fee,
                eta = EXCLUDED.eta,
                observed_at = EXCLUDED.observed_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {RATE_COLUMNS}
            "#
        ))
        .bind(&quote.provider)
        .bind(&quote.corridor.sender_country)
        .bind(&quote.corridor.base_currency)
        .bind(&quote.corridor.quote_currency)
        .bind(quote.rate)
        .bind(quote.fee)
        .bind(&quote.eta)
        .bind(quote.observed_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_write(e, key))?;

        Ok(row.into())
    }

    async fn best_rate(&self, corridor: &Corridor) -> Result<Option<BestRate>> {
        let row = sqlx::query_as::<_, RateRow>(&format!(
            r#"
            SELECT {RATE_COLUMNS} FROM rate_records
            WHERE sender_country = $1 AND base_currency = $2 AND quote_currency = $3
            ORDER BY rate DESC, seq ASC
            LIMIT 1
            "#
        ))
        .bind(&corridor.sender_country)
        .bind(&corridor.base_currency)
        .bind(&corridor.quote_currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BestRate::from(&RateRecord::from(r))))
    }

    async fn all_rates(&self, corridor: &Corridor) -> Result<Vec<RateRecord>> {
        let rows = sqlx::query_as::<_, RateRow>(&format!(
            r#"
            SELECT {RATE_COLUMNS} FROM rate_records
            WHERE sender_country = $1 AND base_currency = $2 AND quote_currency = $3
            ORDER BY (rate - fee) DESC, seq ASC
            "#
        ))
        .bind(&corridor.sender_country)
        .bind(&corridor.base_currency)
        .bind(&corridor.quote_currency)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_recommended(&self, corridor: &Corridor, provider: &str) -> Result<()> {
        let key = format!("recommended@{corridor}");
        let mut tx = self.pool.begin().await?;

        // Lock the corridor's rows so concurrent picks serialize
        let providers: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT provider FROM rate_records
            WHERE sender_country = $1 AND base_currency = $2 AND quote_currency = $3
            FOR UPDATE
            "#,
        )
        .bind(&corridor.sender_country)
        .bind(&corridor.base_currency)
        .bind(&corridor.quote_currency)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::from_write(e, key.clone()))?;

        if !providers.iter().any(|(p,)| p == provider) {
            return Err(Error::not_found("provider", format!("{provider} on {corridor}")));
        }

        sqlx::query(
            r#"
            UPDATE rate_records SET is_recommended = FALSE
            WHERE sender_country = $1 AND base_currency = $2 AND quote_currency = $3
              AND is_recommended
            "#,
        )
        .bind(&corridor.sender_country)
        .bind(&corridor.base_currency)
        .bind(&corridor.quote_currency)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::from_write(e, key.clone()))?;

        sqlx::query(
            r#"
            UPDATE rate_records SET is_recommended = TRUE
            WHERE provider = $1 AND sender_country = $2 AND base_currency = $3 AND quote_currency = $4
            "#,
        )
        .bind(provider)
        .bind(&corridor.sender_country)
        .bind(&corridor.base_currency)
        .bind(&corridor.quote_currency)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::from_write(e, key.clone()))?;

        tx.commit().await.map_err(|e| Error::from_write(e, key))?;
        Ok(())
    }

    async fn recommended(&self, corridor: &Corridor) -> Result<Option<String>> {
        let provider: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT provider FROM rate_records
            WHERE sender_country = $1 AND base_currency = $2 AND quote_currency = $3
              AND is_recommended
            LIMIT 1
            "#,
        )
        .bind(&corridor.sender_country)
        .bind(&corridor.base_currency)
        .bind(&corridor.quote_currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(provider.map(|(p,)| p))
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, recipient, sender_country, base_currency, quote_currency, \
     direction, threshold, active, last_triggered_rate, last_triggered_at, trigger_count, \
     created_at, updated_at";

/// Subscription store over the `alert_subscriptions` table
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    /// Create a new subscription store
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert(&self, subscription: &AlertSubscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_subscriptions (
                id, recipient, sender_country, base_currency, quote_currency,
                direction, threshold, active, last_triggered_rate, last_triggered_at,
                trigger_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id)
        .bind(&subscription.recipient)
        .bind(&subscription.corridor.sender_country)
        .bind(&subscription.corridor.base_currency)
        .bind(&subscription.corridor.quote_currency)
        .bind(subscription.direction.as_str())
        .bind(subscription.threshold)
        .bind(subscription.active)
        .bind(subscription.last_triggered_rate)
        .bind(subscription.last_triggered_at)
        .bind(subscription.trigger_count)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_write(e, subscription.id.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AlertSubscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM alert_subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> Result<Vec<AlertSubscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM alert_subscriptions ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_active(&self) -> Result<Vec<AlertSubscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM alert_subscriptions WHERE active ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_trigger(
        &self,
        id: Uuid,
        rate: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<AlertSubscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE alert_subscriptions SET
                last_triggered_rate = $2,
                last_triggered_at = $3,
                trigger_count = trigger_count + 1,
                updated_at = $3
            WHERE id = $1 AND active
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(rate)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_write(e, id.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn deactivate(&self, id: Uuid) -> Result<Option<AlertSubscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE alert_subscriptions SET
                updated_at = CASE WHEN active THEN $2 ELSE updated_at END,
                active = FALSE
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_write(e, id.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }
}

// Database row types for mapping

#[derive(sqlx::FromRow)]
struct RateRow {
    provider: String,
    sender_country: String,
    base_currency: String,
    quote_currency: String,
    rate: Decimal,
    fee: Decimal,
    eta: String,
    observed_at: DateTime<Utc>,
    first_seen_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_recommended: bool,
}

impl From<RateRow> for RateRecord {
    fn from(row: RateRow) -> Self {
        RateRecord {
            provider: row.provider,
            corridor: Corridor::new(row.sender_country, row.base_currency, row.quote_currency),
            rate: row.rate,
            fee: row.fee,
            eta: row.eta,
            observed_at: row.observed_at,
            first_seen_at: row.first_seen_at,
            updated_at: row.updated_at,
            is_recommended: row.is_recommended,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    recipient: String,
    sender_country: String,
    base_currency: String,
    quote_currency: String,
    direction: String,
    threshold: Decimal,
    active: bool,
    last_triggered_rate: Option<Decimal>,
    last_triggered_at: Option<DateTime<Utc>>,
    trigger_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for AlertSubscription {
    type Error = Error;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        let direction: Direction = row.direction.parse().map_err(|_| {
            Error::internal(format!(
                "subscription {} has unknown direction '{}'",
                row.id, row.direction
            ))
        })?;

        Ok(AlertSubscription {
            id: row.id,
            recipient: row.recipient,
            corridor: Corridor::new(row.sender_country, row.base_currency, row.quote_currency),
            direction,
            threshold: row.threshold,
            active: row.active,
            last_triggered_rate: row.last_triggered_rate,
            last_triggered_at: row.last_triggered_at,
            trigger_count: row.trigger_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
