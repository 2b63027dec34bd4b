//! Bounded age-ordered cache of recently released models
//!
//! The shadow stack retains models evicted from the active population so a
//! later rent of the same identifier can skip reconstruction. Recency is a
//! relative age rank adjusted on every mutation, not a timestamp: each push
//! or pop ages every other occupied entry by one, and a full stack evicts
//! the entry with the maximum accumulated age. Aging is O(capacity) per
//! mutation, which trades CPU for slot locality on the small capacities an
//! eviction cache runs at.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::errors::PoolResult;
use crate::model::PoolModel;
use crate::sync::{Locked, ModelIter};

/// One (age, model) cell. `age == -1` iff the entry is free.
struct ShadowEntry<M> {
    age: i64,
    model: Option<Arc<M>>,
}

impl<M> ShadowEntry<M> {
    fn free() -> Self {
        Self {
            age: -1,
            model: None,
        }
    }
}

/// Outcome of a [`ShadowStack::push`].
pub enum ShadowPush<M> {
    /// Capacity is zero; the push was a no-op.
    Disabled,
    /// The model took a free entry.
    Inserted,
    /// The identifier was already present; its entry was made most recent.
    Refreshed,
    /// The stack was full; the oldest entry was overwritten.
    Evicted(Arc<M>),
}

impl<M> fmt::Debug for ShadowPush<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShadowPush::Disabled => "Disabled",
            ShadowPush::Inserted => "Inserted",
            ShadowPush::Refreshed => "Refreshed",
            ShadowPush::Evicted(_) => "Evicted",
        })
    }
}

pub(crate) struct ShadowCore<M: PoolModel> {
    entries: Box<[ShadowEntry<M>]>,
    count: usize,
    version: u64,
}

impl<M: PoolModel> ShadowCore<M> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| ShadowEntry::free()).collect(),
            count: 0,
            version: 0,
        }
    }

    fn position(&self, id: &M::Id) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.model.as_ref().is_some_and(|m| m.equals_by_id(id)))
    }

    fn push(&mut self, model: Arc<M>) -> ShadowPush<M> {
        if self.entries.is_empty() {
            return ShadowPush::Disabled;
        }
        let id = model.id();

        // Re-push of a present identifier refreshes it: age 0, everything
        // else ages by one.
        if let Some(hit) = self.position(&id) {
            for (i, entry) in self.entries.iter_mut().enumerate() {
                if i != hit && entry.model.is_some() {
                    entry.age += 1;
                }
            }
            self.entries[hit].age = 0;
            self.entries[hit].model = Some(model);
            self.version += 1;
            return ShadowPush::Refreshed;
        }

        // Single scan: age every occupied entry while tracking the first
        // free slot and the oldest occupied one. Age ties break by position.
        let mut free: Option<usize> = None;
        let mut oldest: Option<(usize, i64)> = None;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.model.is_some() {
                entry.age += 1;
                if oldest.is_none_or(|(_, age)| entry.age > age) {
                    oldest = Some((i, entry.age));
                }
            } else if free.is_none() {
                free = Some(i);
            }
        }

        self.version += 1;
        match free {
            Some(i) => {
                self.entries[i] = ShadowEntry {
                    age: 0,
                    model: Some(model),
                };
                self.count += 1;
                ShadowPush::Inserted
            }
            None => {
                let (i, age) = oldest.expect("full stack has an oldest entry");
                let evicted = self.entries[i]
                    .model
                    .take()
                    .expect("oldest entry is occupied");
                self.entries[i] = ShadowEntry {
                    age: 0,
                    model: Some(model),
                };
                trace!(age, "shadow stack evicted oldest entry");
                ShadowPush::Evicted(evicted)
            }
        }
    }

    fn pop(&mut self, id: &M::Id) -> Option<Arc<M>> {
        let hit = self.position(id)?;
        let model = self.entries[hit].model.take();
        self.entries[hit].age = -1;
        self.count -= 1;
        // Removal is a recency event too, mirroring push's bookkeeping.
        for entry in self.entries.iter_mut() {
            if entry.model.is_some() {
                entry.age += 1;
            }
        }
        self.version += 1;
        model
    }

    /// Read-only selection of the oldest entry; ages are untouched.
    fn peek_oldest(&self) -> Option<Arc<M>> {
        let mut oldest: Option<(i64, &Arc<M>)> = None;
        for entry in self.entries.iter() {
            if let Some(model) = &entry.model {
                if oldest.is_none_or(|(age, _)| entry.age > age) {
                    oldest = Some((entry.age, model));
                }
            }
        }
        oldest.map(|(_, model)| Arc::clone(model))
    }

    fn age_of(&self, id: &M::Id) -> i64 {
        match self.position(id) {
            Some(i) => self.entries[i].age,
            None => -1,
        }
    }

    /// Free entries whose age is at or above `min_age`; a negative
    /// `min_age` clears unconditionally. Returns entries freed.
    fn clear_aged(&mut self, min_age: i64) -> usize {
        let mut freed = 0;
        for entry in self.entries.iter_mut() {
            if entry.model.is_some() && (min_age < 0 || entry.age >= min_age) {
                *entry = ShadowEntry::free();
                freed += 1;
            }
        }
        if freed > 0 {
            self.count -= freed;
            self.version += 1;
        }
        freed
    }

    fn fetch_from(&self, pos: usize) -> Option<(usize, Arc<M>)> {
        for (i, entry) in self.entries.iter().enumerate().skip(pos) {
            if let Some(model) = &entry.model {
                return Some((i + 1, Arc::clone(model)));
            }
        }
        None
    }
}

/// Bounded recency cache with age-based eviction and explicit
/// pop-by-identity.
///
/// Capacity is fixed for life; a capacity of zero makes every operation a
/// no-op, and [`ShadowStack::disabled`] (also `Default`) constructs that
/// empty form without allocating, so it serves as the shared empty instance.
pub struct ShadowStack<M: PoolModel> {
    capacity: usize,
    inner: Locked<ShadowCore<M>>,
}

impl<M: PoolModel> Default for ShadowStack<M> {
    fn default() -> Self {
        Self::disabled()
    }
}

impl<M: PoolModel> ShadowStack<M> {
    /// Create a stack holding at most `capacity` models.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Locked::new(ShadowCore::new(capacity)),
        }
    }

    /// The permanently-empty form; every operation is a no-op.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Insert, refresh or evict-and-insert; see [`ShadowPush`]. All other
    /// occupied entries age by one.
    pub fn push(
        &self,
        model: Arc<M>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<ShadowPush<M>> {
        self.inner.run(cancel, |core| core.push(model))
    }

    pub async fn push_async(
        &self,
        model: Arc<M>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<ShadowPush<M>> {
        self.inner.run_async(cancel, |core| core.push(model)).await
    }

    /// Push a batch atomically; entries age once per pushed model.
    pub fn push_many(
        &self,
        models: impl IntoIterator<Item = Arc<M>>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<ShadowPush<M>>> {
        self.inner
            .run_batch(models, cancel, |core, model| core.push(model))
    }

    pub async fn push_many_async(
        &self,
        models: impl IntoIterator<Item = Arc<M>>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<ShadowPush<M>>> {
        self.inner
            .run_batch_async(models, cancel, |core, model| core.push(model))
            .await
    }

    /// Remove and return the matching entry; remaining occupied entries age
    /// by one. `None` if absent.
    pub fn pop(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Option<Arc<M>>> {
        self.inner.run(cancel, |core| core.pop(id))
    }

    pub async fn pop_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Option<Arc<M>>> {
        self.inner.run_async(cancel, |core| core.pop(id)).await
    }

    /// Pop a batch of identifiers atomically.
    pub fn pop_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<Option<Arc<M>>>>
    where
        M::Id: 'a,
    {
        self.inner.run_batch(ids, cancel, |core, id| core.pop(id))
    }

    pub async fn pop_many_async<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<Option<Arc<M>>>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch_async(ids, cancel, |core, id| core.pop(id))
            .await
    }

    /// The least-recently-touched occupied entry, without removing it or
    /// touching any ages.
    pub fn peek_oldest(&self, cancel: Option<&CancellationToken>) -> PoolResult<Option<Arc<M>>> {
        self.inner.run(cancel, |core| core.peek_oldest())
    }

    pub async fn peek_oldest_async(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Option<Arc<M>>> {
        self.inner.run_async(cancel, |core| core.peek_oldest()).await
    }

    /// True iff an occupied entry matches `id`.
    pub fn contains(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<bool> {
        self.inner.run(cancel, |core| core.position(id).is_some())
    }

    pub async fn contains_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        self.inner
            .run_async(cancel, |core| core.position(id).is_some())
            .await
    }

    /// Membership check for a batch of identifiers atomically.
    pub fn contains_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<bool>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch(ids, cancel, |core, id| core.position(id).is_some())
    }

    pub async fn contains_many_async<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<bool>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch_async(ids, cancel, |core, id| core.position(id).is_some())
            .await
    }

    /// Current age rank of `id`, or `-1` if absent. Read-only.
    pub fn age_of(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<i64> {
        self.inner.run(cancel, |core| core.age_of(id))
    }

    /// Free every occupied entry; returns the count freed.
    pub fn clear(&self, cancel: Option<&CancellationToken>) -> PoolResult<usize> {
        self.inner.run(cancel, |core| core.clear_aged(-1))
    }

    pub async fn clear_async(&self, cancel: Option<&CancellationToken>) -> PoolResult<usize> {
        self.inner.run_async(cancel, |core| core.clear_aged(-1)).await
    }

    /// Free entries at or above `min_age`; negative clears unconditionally.
    pub fn clear_aged(
        &self,
        min_age: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize> {
        self.inner.run(cancel, |core| core.clear_aged(min_age))
    }

    pub async fn clear_aged_async(
        &self,
        min_age: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<usize> {
        self.inner
            .run_async(cancel, |core| core.clear_aged(min_age))
            .await
    }

    /// Occupied entry count.
    pub fn count(&self) -> usize {
        self.inner.with(|core| core.count)
    }

    pub async fn count_async(&self) -> usize {
        self.inner.with_async(|core| core.count).await
    }

    /// Fixed capacity; immutable for the life of the stack.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Version-guarded enumeration of occupied entries in array order; same
    /// contract as [`ActiveStack::iter`](crate::ActiveStack::iter).
    pub fn iter(&self) -> ShadowIter<'_, M> {
        let version = self.inner.with(|core| core.version);
        ShadowIter(ModelIter::new(
            &self.inner,
            version,
            ShadowCore::fetch_from,
            |core| core.version,
        ))
    }

    pub async fn iter_async(&self) -> ShadowIter<'_, M> {
        let version = self.inner.with_async(|core| core.version).await;
        ShadowIter(ModelIter::new(
            &self.inner,
            version,
            ShadowCore::fetch_from,
            |core| core.version,
        ))
    }
}

/// Lazy enumerator over a [`ShadowStack`]; see [`ShadowStack::iter`].
pub struct ShadowIter<'a, M: PoolModel>(ModelIter<'a, ShadowCore<M>, M>);

impl<M: PoolModel> ShadowIter<'_, M> {
    pub async fn next_async(&mut self) -> Option<PoolResult<Arc<M>>> {
        self.0.next_async().await
    }
}

impl<M: PoolModel> Iterator for ShadowIter<'_, M> {
    type Item = PoolResult<Arc<M>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}
