//! In-process stores

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{RateStore, SubscriptionStore};
use crate::error::{Error, Result};
use crate::models::{
    highest_rate, rank_by_net_value, AlertSubscription, BestRate, Corridor, Quote, RateRecord,
};

#[derive(Default)]
struct RateTable {
    /// Records in first-seen order
    records: Vec<RateRecord>,
    /// (provider, corridor) -> position in `records`
    index: HashMap<(String, Corridor), usize>,
}

/// Rate store backed by an insertion-ordered table behind a lock
#[derive(Default)]
pub struct MemoryRateStore {
    table: RwLock<RateTable>,
}

impl MemoryRateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all corridors
    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    /// Whether no provider has ever reported
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn upsert(&self, quote: &Quote) -> Result<RateRecord> {
        let now = Utc::now();
        let key = (quote.provider.clone(), quote.corridor.clone());

        let mut guard = self.table.write();
        let table = &mut *guard;
        if let Some(&pos) = table.index.get(&key) {
            let record = &mut table.records[pos];
            record.apply(quote, now);
            return Ok(record.clone());
        }

        let record = RateRecord::from_quote(quote, now);
        let pos = table.records.len();
        table.records.push(record.clone());
        table.index.insert(key, pos);
        Ok(record)
    }

    async fn best_rate(&self, corridor: &Corridor) -> Result<Option<BestRate>> {
        let table = self.table.read();
        let best = highest_rate(table.records.iter().filter(|r| &r.corridor == corridor));
        Ok(best.map(BestRate::from))
    }

    async fn all_rates(&self, corridor: &Corridor) -> Result<Vec<RateRecord>> {
        let mut records: Vec<RateRecord> = self
            .table
            .read()
            .records
            .iter()
            .filter(|r| &r.corridor == corridor)
            .cloned()
            .collect();
        rank_by_net_value(&mut records);
        Ok(records)
    }

    async fn set_recommended(&self, corridor: &Corridor, provider: &str) -> Result<()> {
        let mut guard = self.table.write();
        let table = &mut *guard;
        let key = (provider.to_string(), corridor.clone());
        if !table.index.contains_key(&key) {
            return Err(Error::not_found("provider", format!("{provider} on {corridor}")));
        }

        for record in table.records.iter_mut().filter(|r| &r.corridor == corridor) {
            record.is_recommended = record.provider == provider;
        }
        Ok(())
    }

    async fn recommended(&self, corridor: &Corridor) -> Result<Option<String>> {
        Ok(self
            .table
            .read()
            .records
            .iter()
            .find(|r| &r.corridor == corridor && r.is_recommended)
            .map(|r| r.provider.clone()))
    }
}

/// Subscription store backed by a concurrent map; each entry is locked
/// independently, so updates are atomic per subscription.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: DashMap<Uuid, AlertSubscription>,
}

impl MemorySubscriptionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self, filter: impl Fn(&AlertSubscription) -> bool) -> Vec<AlertSubscription> {
        let mut subs: Vec<AlertSubscription> = self
            .subscriptions
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        subs
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn insert(&self, subscription: &AlertSubscription) -> Result<()> {
        if self.subscriptions.contains_key(&subscription.id) {
            return Err(Error::StoreWriteConflict(subscription.id.to_string()));
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AlertSubscription>> {
        Ok(self.subscriptions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<AlertSubscription>> {
        Ok(self.sorted(|_| true))
    }

    async fn list_active(&self) -> Result<Vec<AlertSubscription>> {
        Ok(self.sorted(|s| s.active))
    }

    async fn record_trigger(
        &self,
        id: Uuid,
        rate: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<AlertSubscription>> {
        Ok(self.subscriptions.get_mut(&id).and_then(|mut entry| {
            if !entry.active {
                return None;
            }
            entry.mark_triggered(rate, at);
            Some(entry.value().clone())
        }))
    }

    async fn deactivate(&self, id: Uuid) -> Result<Option<AlertSubscription>> {
        Ok(self.subscriptions.get_mut(&id).map(|mut entry| {
            if entry.active {
                entry.active = false;
                entry.updated_at = Utc::now();
            }
            entry.value().clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn corridor() -> Corridor {
        Corridor::new("USA", "USD", "BDT")
    }

    fn quote(provider: &str, rate: Decimal, fee: Decimal) -> Quote {
        Quote {
            provider: provider.to_string(),
            corridor: corridor(),
            rate,
            fee,
            eta: "1 hr".to_string(),
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_best_rate_scenario() {
        let store = MemoryRateStore::new();
        store.upsert(&quote("A", dec!(124.2), dec!(3.2))).await.unwrap();
        store.upsert(&quote("B", dec!(123.5), dec!(4.5))).await.unwrap();
        store.upsert(&quote("C", dec!(124.1), dec!(4.9))).await.unwrap();

        let best = store.best_rate(&corridor()).await.unwrap().unwrap();
        assert_eq!(best.provider, "A");
        assert_eq!(best.rate, dec!(124.2));

        let other = Corridor::new("UAE", "USD", "BDT");
        assert!(store.best_rate(&other).await.unwrap().is_none());
        assert!(store.all_rates(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_resolve_to_first_inserted() {
        let store = MemoryRateStore::new();
        store.upsert(&quote("Late", dec!(120), dec!(1))).await.unwrap();
        store.upsert(&quote("Early", dec!(124), dec!(1))).await.unwrap();
        store.upsert(&quote("Other", dec!(124), dec!(1))).await.unwrap();
        // Re-quoting the first provider up to the max keeps its original position
        store.upsert(&quote("Late", dec!(124), dec!(1))).await.unwrap();

        let best = store.best_rate(&corridor()).await.unwrap().unwrap();
        assert_eq!(best.provider, "Late");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_key() {
        let store = MemoryRateStore::new();
        let q = quote("Wise", dec!(124.2), dec!(3.2));

        store.upsert(&q).await.unwrap();
        let before = store.all_rates(&corridor()).await.unwrap();
        store.upsert(&q).await.unwrap();
        let after = store.all_rates(&corridor()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(after.len(), 1);
        assert_eq!(
            (&after[0].rate, &after[0].fee, &after[0].eta),
            (&before[0].rate, &before[0].fee, &before[0].eta)
        );
        assert_eq!(after[0].first_seen_at, before[0].first_seen_at);
    }

    #[tokio::test]
    async fn test_all_rates_ranked_by_net_value() {
        let store = MemoryRateStore::new();
        store.upsert(&quote("Wise", dec!(124.2), dec!(3.2))).await.unwrap();
        store.upsert(&quote("Xoom", dec!(124.1), dec!(4.9))).await.unwrap();
        store.upsert(&quote("Western Union", dec!(122.8), dec!(2.0))).await.unwrap();

        let providers: Vec<_> = store
            .all_rates(&corridor())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.provider)
            .collect();
        assert_eq!(providers, ["Wise", "Western Union", "Xoom"]);
    }

    #[tokio::test]
    async fn test_recommendation_survives_upsert() {
        let store = MemoryRateStore::new();
        store.upsert(&quote("Wise", dec!(124.2), dec!(3.2))).await.unwrap();
        store.upsert(&quote("Xoom", dec!(124.1), dec!(4.9))).await.unwrap();

        assert_eq!(store.recommended(&corridor()).await.unwrap(), None);
        store.set_recommended(&corridor(), "Xoom").await.unwrap();
        store.set_recommended(&corridor(), "Wise").await.unwrap();
        store.upsert(&quote("Wise", dec!(125.0), dec!(3.2))).await.unwrap();

        assert_eq!(
            store.recommended(&corridor()).await.unwrap().as_deref(),
            Some("Wise")
        );
        let flagged = store
            .all_rates(&corridor())
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_recommended)
            .count();
        assert_eq!(flagged, 1);

        let err = store.set_recommended(&corridor(), "Nobody").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let store = MemorySubscriptionStore::new();
        let sub = AlertSubscription::new(
            "a@example.com".into(),
            corridor(),
            Direction::Above,
            dec!(124.0),
        );
        store.insert(&sub).await.unwrap();
        assert!(store.insert(&sub).await.unwrap_err().is_write_conflict());

        let at = Utc::now();
        let updated = store
            .record_trigger(sub.id, dec!(124.2), at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.last_triggered_rate, Some(dec!(124.2)));
        assert_eq!(updated.last_triggered_at, Some(at));
        assert_eq!(updated.trigger_count, 1);

        let inactive = store.deactivate(sub.id).await.unwrap().unwrap();
        assert!(!inactive.active);
        assert!(store.list_active().await.unwrap().is_empty());
        assert_eq!(store.list().await.unwrap().len(), 1);

        // Deactivation is terminal and repeatable
        assert!(!store.deactivate(sub.id).await.unwrap().unwrap().active);
        assert!(store.deactivate(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store
            .record_trigger(Uuid::new_v4(), dec!(1), at)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_trigger_after_deactivation_is_not_recorded() {
        let store = MemorySubscriptionStore::new();
        let sub = AlertSubscription::new(
            "a@example.com".into(),
            corridor(),
            Direction::Above,
            dec!(124.0),
        );
        store.insert(&sub).await.unwrap();
        let inactive = store.deactivate(sub.id).await.unwrap().unwrap();

        let recorded = store
            .record_trigger(sub.id, dec!(124.2), Utc::now())
            .await
            .unwrap();
        assert!(recorded.is_none());

        let stored = store.get(sub.id).await.unwrap().unwrap();
        assert_eq!(stored, inactive);
        assert_eq!(stored.trigger_count, 0);
        assert_eq!(stored.last_triggered_rate, None);
    }

    proptest! {
        #[test]
        fn prop_best_rate_is_max_of_all_rates(
            rates in proptest::collection::vec((0u32..50, 0i64..1_000_000), 1..20)
        ) {
            let store = MemoryRateStore::new();
            tokio_test::block_on(async {
                for (provider, units) in &rates {
                    let q = quote(&format!("P{provider}"), Decimal::new(*units, 4), dec!(0));
                    store.upsert(&q).await.unwrap();
                }
            });

            let best = tokio_test::block_on(store.best_rate(&corridor())).unwrap().unwrap();
            let all = tokio_test::block_on(store.all_rates(&corridor())).unwrap();
            let max = all.iter().map(|r| r.rate).max().unwrap();
            prop_assert_eq!(best.rate, max);
        }
    }
}
