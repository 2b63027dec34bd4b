//! Pool coordinator composing the active and shadow stacks
//!
//! [`ModelPool`] exposes one identity surface over both structures and the
//! protected modify path. It owns a coarse gate lock of its own, acquired in
//! addition to the sub-structures' locks, so every coordinator-level call on
//! one pool observes a consistent state across both stacks. Lower-level
//! callers may bypass the coordinator through [`ModelPool::active`] and
//! [`ModelPool::shadow`] at the cost of that cross-structure guarantee.

use std::any::{Any, TypeId};
use std::sync::atomic::Ordering;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::active::{ActiveStack, Unref};
use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::model::{ModelFactory, PoolModel};
use crate::shadow::{ShadowPush, ShadowStack};
use crate::sync::checkpoint;

/// One process-wide shared pool per model type, created on first use and
/// never torn down.
static SHARED_POOLS: LazyLock<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> =
    LazyLock::new(DashMap::new);

/// Identity-keyed pool of reference-counted models with a bounded shadow
/// cache for fast re-acquisition.
///
/// Sync entry points must not be called from within an async runtime; every
/// operation has an async twin sharing the same locks.
pub struct ModelPool<M: PoolModel> {
    active: ActiveStack<M>,
    shadow: ShadowStack<M>,
    factory: Option<Arc<dyn ModelFactory<M>>>,
    config: PoolConfiguration,
    gate: Mutex<()>,
    metrics: MetricsTracker,
}

impl<M: PoolModel> Default for ModelPool<M> {
    fn default() -> Self {
        Self::new(PoolConfiguration::default())
    }
}

impl<M: PoolModel> ModelPool<M> {
    /// Create a pool without a factory; renting an unknown identifier fails
    /// with [`PoolError::FactoryMissing`].
    pub fn new(config: PoolConfiguration) -> Self {
        Self {
            active: ActiveStack::new(config.segment_size),
            shadow: ShadowStack::new(config.shadow_capacity),
            factory: None,
            config,
            gate: Mutex::new(()),
            metrics: MetricsTracker::new(),
        }
    }

    /// Create a pool with a factory for constructing absent identifiers.
    pub fn with_factory(
        config: PoolConfiguration,
        factory: impl ModelFactory<M> + 'static,
    ) -> Self {
        let mut pool = Self::new(config);
        pool.factory = Some(Arc::new(factory));
        pool
    }

    /// The process-wide shared pool for this model type, created with the
    /// default configuration on first use.
    pub fn shared() -> Arc<Self> {
        let entry = SHARED_POOLS
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Arc::new(Self::default()) as Arc<dyn Any + Send + Sync>);
        Arc::clone(entry.value())
            .downcast::<Self>()
            .unwrap_or_else(|_| unreachable!("shared registry holds one pool per model type"))
    }

    /// The underlying active stack, for callers that want to bypass the
    /// coordinator's cross-structure lock.
    pub fn active(&self) -> &ActiveStack<M> {
        &self.active
    }

    /// The underlying shadow stack.
    pub fn shadow(&self) -> &ShadowStack<M> {
        &self.shadow
    }

    /// True if either the active or the shadow stack holds `id`.
    pub fn contains(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        Ok(self.active.contains(id, cancel)? || self.shadow.contains(id, cancel)?)
    }

    pub async fn contains_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        Ok(self.active.contains_async(id, cancel).await?
            || self.shadow.contains_async(id, cancel).await?)
    }

    /// True only if the active stack holds `id`; shadow membership does not
    /// count as rented.
    pub fn is_rented(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        self.active.contains(id, cancel)
    }

    pub async fn is_rented_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        self.active.contains_async(id, cancel).await
    }

    /// Protected in-place mutation: take a temporary reference on the
    /// target, copy `patch`'s state into it, then release the reference
    /// unconditionally. Returns `false` when `id` is not active; shadow
    /// entries are not modifiable in place. Update errors propagate only
    /// after the reference is released.
    pub fn modify(
        &self,
        id: &M::Id,
        patch: &M,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        let (_, target) = self.active.try_ref(id, cancel)?;
        let Some(target) = target else {
            return Ok(false);
        };
        let outcome = target.update(patch);
        self.active.try_unref(id, None)?;
        outcome?;
        self.metrics.total_modified.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Async [`ModelPool::modify`]; uses the model's async update variant.
    pub async fn modify_async(
        &self,
        id: &M::Id,
        patch: &M,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        let (_, target) = self.active.try_ref_async(id, cancel).await?;
        let Some(target) = target else {
            return Ok(false);
        };
        let outcome = target.update_async(patch).await;
        self.active.try_unref_async(id, None).await?;
        outcome?;
        self.metrics.total_modified.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// [`ModelPool::modify`] targeting the patch's own identifier.
    pub fn apply_patch(&self, patch: &M, cancel: Option<&CancellationToken>) -> PoolResult<bool> {
        self.modify(&patch.id(), patch, cancel)
    }

    /// Modify a batch of (id, patch) pairs under a single gate hold, so the
    /// whole batch observes a consistent pool state. The first update error
    /// aborts the batch after its reference is released.
    pub fn modify_many<'a>(
        &self,
        patches: impl IntoIterator<Item = (&'a M::Id, &'a M)>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<bool>>
    where
        M: 'a,
    {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        let mut results = Vec::new();
        for (id, patch) in patches {
            checkpoint(cancel)?;
            let (_, target) = self.active.try_ref(id, None)?;
            let Some(target) = target else {
                results.push(false);
                continue;
            };
            let outcome = target.update(patch);
            self.active.try_unref(id, None)?;
            outcome?;
            self.metrics.total_modified.fetch_add(1, Ordering::Relaxed);
            results.push(true);
        }
        Ok(results)
    }

    /// Async [`ModelPool::modify_many`]; uses the models' async update
    /// variant under the same single gate hold.
    pub async fn modify_many_async<'a>(
        &self,
        patches: impl IntoIterator<Item = (&'a M::Id, &'a M)>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<bool>>
    where
        M: 'a,
    {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        let mut results = Vec::new();
        for (id, patch) in patches {
            checkpoint(cancel)?;
            let (_, target) = self.active.try_ref_async(id, None).await?;
            let Some(target) = target else {
                results.push(false);
                continue;
            };
            let outcome = target.update_async(patch).await;
            self.active.try_unref_async(id, None).await?;
            outcome?;
            self.metrics.total_modified.fetch_add(1, Ordering::Relaxed);
            results.push(true);
        }
        Ok(results)
    }

    /// Rent the model for `id`: an active hit takes a reference, a shadow
    /// hit revives the cached model into the active stack, and otherwise the
    /// factory constructs a fresh one.
    pub fn rent(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<Arc<M>> {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        let (_, hit) = self.active.try_ref(id, cancel)?;
        if let Some(model) = hit {
            self.metrics.total_rented.fetch_add(1, Ordering::Relaxed);
            return Ok(model);
        }
        if let Some(model) = self.shadow.pop(id, cancel)? {
            self.active.add(Arc::clone(&model), 1, None)?;
            self.metrics.shadow_hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.total_rented.fetch_add(1, Ordering::Relaxed);
            return Ok(model);
        }
        let factory = self.factory.as_ref().ok_or(PoolError::FactoryMissing)?;
        let model = factory.create(id)?;
        self.active.add(Arc::clone(&model), 1, None)?;
        self.metrics.factory_builds.fetch_add(1, Ordering::Relaxed);
        self.metrics.total_rented.fetch_add(1, Ordering::Relaxed);
        debug!(id = ?id, "rented freshly constructed model");
        Ok(model)
    }

    /// Async [`ModelPool::rent`], bounded by the configured operation
    /// timeout when one is set.
    pub async fn rent_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Arc<M>> {
        let fut = self.rent_async_inner(id, cancel);
        match self.config.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| PoolError::Timeout(timeout))?,
            None => fut.await,
        }
    }

    async fn rent_async_inner(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Arc<M>> {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        let (_, hit) = self.active.try_ref_async(id, cancel).await?;
        if let Some(model) = hit {
            self.metrics.total_rented.fetch_add(1, Ordering::Relaxed);
            return Ok(model);
        }
        if let Some(model) = self.shadow.pop_async(id, cancel).await? {
            self.active.add_async(Arc::clone(&model), 1, None).await?;
            self.metrics.shadow_hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.total_rented.fetch_add(1, Ordering::Relaxed);
            return Ok(model);
        }
        let factory = self.factory.as_ref().ok_or(PoolError::FactoryMissing)?;
        let model = factory.create(id)?;
        self.active.add_async(Arc::clone(&model), 1, None).await?;
        self.metrics.factory_builds.fetch_add(1, Ordering::Relaxed);
        self.metrics.total_rented.fetch_add(1, Ordering::Relaxed);
        Ok(model)
    }

    /// Return a rented model. The last outstanding reference moves the
    /// model from the active stack into the shadow stack. Returns `false`
    /// when `id` was not rented.
    pub fn return_model(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        match self.active.release(id, cancel)? {
            Unref::Absent => Ok(false),
            Unref::Live(_, _) => {
                self.metrics.total_returned.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Unref::Released(model) => {
                if let ShadowPush::Evicted(_) = self.shadow.push(model, None)? {
                    self.metrics.shadow_evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.total_returned.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
        }
    }

    pub async fn return_model_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        match self.active.release_async(id, cancel).await? {
            Unref::Absent => Ok(false),
            Unref::Live(_, _) => {
                self.metrics.total_returned.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Unref::Released(model) => {
                if let ShadowPush::Evicted(_) = self.shadow.push_async(model, None).await? {
                    self.metrics.shadow_evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.total_returned.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
        }
    }

    /// Clear shadow entries at or above `min_age` staleness; `-1` clears
    /// unconditionally. Returns entries freed.
    pub fn clear_shadow(
        &self,
        min_age: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize> {
        checkpoint(cancel)?;
        let _gate = self.gate.blocking_lock();
        self.shadow.clear_aged(min_age, cancel)
    }

    pub async fn clear_shadow_async(
        &self,
        min_age: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize> {
        checkpoint(cancel)?;
        let _gate = self.gate.lock().await;
        self.shadow.clear_aged_async(min_age, cancel).await
    }

    /// Live model count in the active stack.
    pub fn count(&self) -> usize {
        self.active.count()
    }

    pub async fn count_async(&self) -> usize {
        self.active.count_async().await
    }

    /// Occupied shadow entry count.
    pub fn shadow_count(&self) -> usize {
        self.shadow.count()
    }

    pub async fn shadow_count_async(&self) -> usize {
        self.shadow.count_async().await
    }

    /// Shadow capacity, fixed at construction.
    pub fn shadow_capacity(&self) -> usize {
        self.shadow.capacity()
    }

    /// Active slot capacity.
    pub fn capacity(&self) -> usize {
        self.active.capacity()
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.metrics
            .get_metrics(self.active.count(), self.shadow.count(), self.active.capacity())
    }

    pub async fn get_metrics_async(&self) -> PoolMetrics {
        self.metrics.get_metrics(
            self.active.count_async().await,
            self.shadow.count_async().await,
            self.active.capacity_async().await,
        )
    }

    /// Export metrics as a HashMap
    pub fn export_metrics(&self) -> std::collections::HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&std::collections::HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.active.count(),
            self.active.capacity(),
            self.active.segment_size(),
            self.shadow.count(),
            self.shadow.capacity(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct Account {
        id: u64,
        balance: PlMutex<i64>,
    }

    impl Account {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                balance: PlMutex::new(0),
            })
        }

        fn with_balance(id: u64, balance: i64) -> Arc<Self> {
            let account = Self::new(id);
            *account.balance.lock() = balance;
            account
        }
    }

    impl PoolModel for Account {
        type Id = u64;

        fn id(&self) -> u64 {
            self.id
        }

        fn update(&self, source: &Self) -> PoolResult<()> {
            if source.id != self.id {
                return Err(PoolError::IdentityMismatch {
                    expected: format!("{:?}", self.id),
                    found: format!("{:?}", source.id),
                });
            }
            let incoming = *source.balance.lock();
            if incoming < 0 {
                return Err(PoolError::UpdateFailed(String::from(
                    "balance cannot go negative",
                )));
            }
            *self.balance.lock() = incoming;
            Ok(())
        }
    }

    fn pool_with_factory(shadow_capacity: usize) -> ModelPool<Account> {
        let config = PoolConfiguration::new()
            .with_segment_size(4)
            .with_shadow_capacity(shadow_capacity);
        ModelPool::with_factory(config, |id: &u64| -> PoolResult<Arc<Account>> {
            Ok(Account::new(*id))
        })
    }

    #[test]
    fn modify_updates_an_active_model_in_place() {
        let pool = pool_with_factory(0);
        let model = pool.rent(&1, None).unwrap();

        let patch = Account::with_balance(1, 250);
        assert!(pool.modify(&1, &patch, None).unwrap());
        assert_eq!(*model.balance.lock(), 250);
        // The temporary reference was released.
        assert_eq!(pool.active().refs_of(&1, None).unwrap(), 1);
    }

    #[test]
    fn modify_absent_id_returns_false() {
        let pool = pool_with_factory(0);
        let patch = Account::with_balance(9, 1);
        assert!(!pool.modify(&9, &patch, None).unwrap());
    }

    #[test]
    fn modify_releases_the_reference_on_update_failure() {
        let pool = pool_with_factory(0);
        pool.rent(&1, None).unwrap();

        let mismatched = Account::with_balance(2, 9);
        let err = pool.modify(&1, &mismatched, None).unwrap_err();
        assert!(matches!(err, PoolError::IdentityMismatch { .. }));
        assert_eq!(pool.active().refs_of(&1, None).unwrap(), 1);
    }

    #[test]
    fn modify_surfaces_domain_update_failures() {
        let pool = pool_with_factory(0);
        let model = pool.rent(&1, None).unwrap();

        let rejected = Account::with_balance(1, -5);
        let err = pool.modify(&1, &rejected, None).unwrap_err();
        assert!(matches!(err, PoolError::UpdateFailed(_)));
        // The failed patch left the model untouched and the reference released.
        assert_eq!(*model.balance.lock(), 0);
        assert_eq!(pool.active().refs_of(&1, None).unwrap(), 1);
    }

    #[test]
    fn shadow_entries_are_not_modifiable() {
        let pool = pool_with_factory(4);
        pool.rent(&1, None).unwrap();
        pool.return_model(&1, None).unwrap();
        assert!(pool.shadow().contains(&1, None).unwrap());

        let patch = Account::with_balance(1, 5);
        assert!(!pool.modify(&1, &patch, None).unwrap());
    }

    #[test]
    fn contains_spans_both_structures() {
        let pool = pool_with_factory(4);
        pool.rent(&1, None).unwrap();
        assert!(pool.contains(&1, None).unwrap());
        assert!(pool.is_rented(&1, None).unwrap());

        pool.return_model(&1, None).unwrap();
        assert!(pool.contains(&1, None).unwrap());
        assert!(!pool.is_rented(&1, None).unwrap());

        assert!(!pool.contains(&2, None).unwrap());
    }

    #[test]
    fn rent_prefers_active_then_shadow_then_factory() {
        let pool = pool_with_factory(4);

        let first = pool.rent(&1, None).unwrap();
        assert_eq!(pool.get_metrics().factory_builds, 1);

        // Active hit: same instance, refcount climbs.
        let again = pool.rent(&1, None).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(pool.active().refs_of(&1, None).unwrap(), 2);

        pool.return_model(&1, None).unwrap();
        pool.return_model(&1, None).unwrap();
        assert!(!pool.is_rented(&1, None).unwrap());

        // Shadow hit: the cached instance comes back, no factory call.
        *first.balance.lock() = 42;
        let revived = pool.rent(&1, None).unwrap();
        assert!(Arc::ptr_eq(&first, &revived));
        assert_eq!(*revived.balance.lock(), 42);
        let metrics = pool.get_metrics();
        assert_eq!(metrics.factory_builds, 1);
        assert_eq!(metrics.shadow_hits, 1);
    }

    #[test]
    fn rent_without_factory_fails_for_unknown_id() {
        let pool: ModelPool<Account> =
            ModelPool::new(PoolConfiguration::new().with_segment_size(4));
        assert!(matches!(
            pool.rent(&1, None),
            Err(PoolError::FactoryMissing)
        ));
    }

    #[test]
    fn return_model_unknown_id_is_false() {
        let pool = pool_with_factory(2);
        assert!(!pool.return_model(&5, None).unwrap());
    }

    #[test]
    fn clear_shadow_with_threshold() {
        let pool = pool_with_factory(4);
        for id in 1..=3 {
            pool.rent(&id, None).unwrap();
            pool.return_model(&id, None).unwrap();
        }
        assert_eq!(pool.shadow_count(), 3);
        // Ages: 1 -> 2, 2 -> 1, 3 -> 0.
        assert_eq!(pool.clear_shadow(2, None).unwrap(), 1);
        assert_eq!(pool.shadow_count(), 2);
        assert_eq!(pool.clear_shadow(-1, None).unwrap(), 2);
        assert_eq!(pool.shadow_count(), 0);
    }

    #[test]
    fn modify_many_under_one_gate_hold() {
        let pool = pool_with_factory(0);
        pool.rent(&1, None).unwrap();
        pool.rent(&2, None).unwrap();

        let p1 = Account::with_balance(1, 10);
        let p2 = Account::with_balance(2, 20);
        let p3 = Account::with_balance(3, 30);
        let ids = [1u64, 2, 3];
        let results = pool
            .modify_many(
                ids.iter().zip([&*p1, &*p2, &*p3]),
                None,
            )
            .unwrap();
        assert_eq!(results, vec![true, true, false]);
        assert_eq!(pool.get_metrics().total_modified, 2);
    }

    #[tokio::test]
    async fn modify_many_async_matches_sync() {
        let pool = pool_with_factory(0);
        pool.rent_async(&1, None).await.unwrap();
        pool.rent_async(&2, None).await.unwrap();

        let p1 = Account::with_balance(1, 10);
        let p2 = Account::with_balance(2, 20);
        let p3 = Account::with_balance(3, 30);
        let ids = [1u64, 2, 3];
        let results = pool
            .modify_many_async(ids.iter().zip([&*p1, &*p2, &*p3]), None)
            .await
            .unwrap();
        assert_eq!(results, vec![true, true, false]);
        assert_eq!(pool.get_metrics_async().await.total_modified, 2);
    }

    #[test]
    fn shared_pool_is_one_instance_per_type() {
        let a = ModelPool::<Account>::shared();
        let b = ModelPool::<Account>::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn metrics_and_health_reflect_pool_state() {
        let pool = pool_with_factory(2);
        pool.rent(&1, None).unwrap();
        pool.rent(&2, None).unwrap();
        pool.return_model(&2, None).unwrap();

        let metrics = pool.get_metrics();
        assert_eq!(metrics.total_rented, 2);
        assert_eq!(metrics.total_returned, 1);
        assert_eq!(metrics.active_count, 1);
        assert_eq!(metrics.shadow_count, 1);

        let health = pool.get_health_status();
        assert_eq!(health.active_count, 1);
        assert_eq!(health.shadow_capacity, 2);

        let prometheus = pool.export_metrics_prometheus("accounts", None);
        assert!(prometheus.contains("modelpool_models_active{pool=\"accounts\"} 1"));
    }

    #[tokio::test]
    async fn async_rent_modify_return_cycle() {
        let pool = pool_with_factory(2);

        let model = pool.rent_async(&7, None).await.unwrap();
        assert!(pool.is_rented_async(&7, None).await.unwrap());

        let patch = Account::with_balance(7, 99);
        assert!(pool.modify_async(&7, &patch, None).await.unwrap());
        assert_eq!(*model.balance.lock(), 99);

        assert!(pool.return_model_async(&7, None).await.unwrap());
        assert!(!pool.is_rented_async(&7, None).await.unwrap());
        assert!(pool.contains_async(&7, None).await.unwrap());
        assert_eq!(pool.shadow_count_async().await, 1);

        assert_eq!(pool.clear_shadow_async(-1, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_coordinator_calls() {
        let pool = pool_with_factory(0);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            pool.rent_async(&1, Some(&token)).await,
            Err(PoolError::Cancelled)
        ));
        assert_eq!(pool.count_async().await, 0);
    }
}
