//! Segmented, reference-counted storage for live models
//!
//! The active stack owns a singly linked chain of fixed-size segments and
//! grows strictly by appending segments; capacity only shrinks through
//! [`ActiveStack::clear_empty`] or [`ActiveStack::defragment`]. The first
//! segment is permanent. At most one occupied slot exists per identifier
//! across the whole chain, and occupancy is determined solely by model
//! presence: a persisted occupied slot always carries a positive refcount.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{PoolError, PoolResult};
use crate::model::PoolModel;
use crate::sync::{Locked, ModelIter};

/// One (refcount, model) cell. `model == None` iff the slot is free; the
/// refcount is meaningless while free.
struct ModelSlot<M> {
    refs: i64,
    model: Option<Arc<M>>,
}

impl<M> Default for ModelSlot<M> {
    fn default() -> Self {
        Self {
            refs: 0,
            model: None,
        }
    }
}

/// A fixed-size block of slots plus the owning link to the next segment.
struct ActiveSegment<M> {
    slots: Box<[ModelSlot<M>]>,
    next: Option<Box<ActiveSegment<M>>>,
}

impl<M> ActiveSegment<M> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| ModelSlot::default()).collect(),
            next: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.model.is_none())
    }
}

/// Outcome of a core unref; the released model is only surfaced to the
/// coordinator, the public surface reports deletion as `(-1, None)`.
pub(crate) enum Unref<M> {
    Absent,
    Live(i64, Arc<M>),
    Released(Arc<M>),
}

/// Lock-free core; all locking happens in the public wrappers.
pub(crate) struct ActiveCore<M: PoolModel> {
    head: ActiveSegment<M>,
    segment_size: usize,
    capacity: usize,
    count: usize,
    version: u64,
}

impl<M: PoolModel> ActiveCore<M> {
    fn new(segment_size: usize) -> Self {
        Self {
            head: ActiveSegment::new(segment_size),
            segment_size,
            capacity: segment_size,
            count: 0,
            version: 0,
        }
    }

    fn segments(&self) -> impl Iterator<Item = &ActiveSegment<M>> {
        std::iter::successors(Some(&self.head), |seg| seg.next.as_deref())
    }

    fn locate(&self, id: &M::Id) -> Option<(usize, usize)> {
        for (si, seg) in self.segments().enumerate() {
            let hit = seg
                .slots
                .iter()
                .position(|slot| slot.model.as_ref().is_some_and(|m| m.equals_by_id(id)));
            if let Some(i) = hit {
                return Some((si, i));
            }
        }
        None
    }

    fn locate_free(&self) -> Option<(usize, usize)> {
        for (si, seg) in self.segments().enumerate() {
            if let Some(i) = seg.slots.iter().position(|slot| slot.model.is_none()) {
                return Some((si, i));
            }
        }
        None
    }

    fn slot_mut(&mut self, si: usize, i: usize) -> &mut ModelSlot<M> {
        let mut seg = &mut self.head;
        for _ in 0..si {
            seg = seg.next.as_deref_mut().expect("segment index within chain");
        }
        &mut seg.slots[i]
    }

    /// Append a fresh segment at the tail, growing capacity by one segment.
    fn append_segment(&mut self) -> (usize, usize) {
        let size = self.segment_size;
        let mut segments = 1;
        let mut link = &mut self.head.next;
        while let Some(node) = link {
            segments += 1;
            link = &mut node.next;
        }
        *link = Some(Box::new(ActiveSegment::new(size)));
        self.capacity += size;
        debug!(
            segments = segments + 1,
            capacity = self.capacity,
            "grew active stack"
        );
        (segments, 0)
    }

    fn add(&mut self, model: Arc<M>, refs: i64) -> i64 {
        let id = model.id();
        if let Some((si, i)) = self.locate(&id) {
            let slot = self.slot_mut(si, i);
            slot.refs += refs;
            let total = slot.refs;
            self.version += 1;
            return total;
        }
        let (si, i) = match self.locate_free() {
            Some(free) => free,
            None => self.append_segment(),
        };
        let slot = self.slot_mut(si, i);
        slot.refs = refs;
        slot.model = Some(model);
        self.count += 1;
        self.version += 1;
        refs
    }

    fn remove(&mut self, id: &M::Id) -> Option<Arc<M>> {
        let (si, i) = self.locate(id)?;
        let model = {
            let slot = self.slot_mut(si, i);
            slot.refs = 0;
            slot.model.take()
        };
        self.count -= 1;
        self.version += 1;
        model
    }

    fn try_ref(&mut self, id: &M::Id) -> (i64, Option<Arc<M>>) {
        match self.locate(id) {
            None => (-1, None),
            Some((si, i)) => {
                let slot = self.slot_mut(si, i);
                slot.refs += 1;
                let result = (slot.refs, slot.model.clone());
                self.version += 1;
                result
            }
        }
    }

    fn unref(&mut self, id: &M::Id) -> Unref<M> {
        let Some((si, i)) = self.locate(id) else {
            return Unref::Absent;
        };
        let (outcome, freed) = {
            let slot = self.slot_mut(si, i);
            slot.refs -= 1;
            if slot.refs <= 0 {
                slot.refs = 0;
                let model = slot.model.take().expect("occupied slot holds a model");
                (Unref::Released(model), true)
            } else {
                let model = slot.model.clone().expect("occupied slot holds a model");
                (Unref::Live(slot.refs, model), false)
            }
        };
        if freed {
            self.count -= 1;
        }
        self.version += 1;
        outcome
    }

    fn refs_of(&self, id: &M::Id) -> i64 {
        for seg in self.segments() {
            for slot in &seg.slots {
                if slot.model.as_ref().is_some_and(|m| m.equals_by_id(id)) {
                    return slot.refs;
                }
            }
        }
        -1
    }

    /// Single left-to-right reclamation pass over the non-permanent tail of
    /// the chain. When a segment is unlinked, the segment that moved up into
    /// its place is kept without examination; the first examined non-empty
    /// segment ends the pass.
    fn clear_empty(&mut self) -> usize {
        let seg_size = self.segment_size;

        let mut rest = Vec::new();
        let mut next = self.head.next.take();
        while let Some(mut seg) = next {
            next = seg.next.take();
            rest.push(seg);
        }

        let mut kept: Vec<Box<ActiveSegment<M>>> = Vec::new();
        let mut reclaimed = 0;
        let mut tail = rest.into_iter();
        while let Some(seg) = tail.next() {
            if seg.is_empty() {
                reclaimed += seg_size;
                if let Some(survivor) = tail.next() {
                    kept.push(survivor);
                }
            } else {
                kept.push(seg);
                kept.extend(tail);
                break;
            }
        }

        let mut link = &mut self.head.next;
        for seg in kept {
            *link = Some(seg);
            if let Some(node) = link {
                link = &mut node.next;
            }
        }

        if reclaimed > 0 {
            self.capacity -= reclaimed;
            self.version += 1;
            debug!(
                reclaimed,
                capacity = self.capacity,
                "reclaimed empty segments"
            );
        }
        reclaimed
    }

    /// Compact occupied slots to the lowest-indexed positions in stable scan
    /// order, then reclaim segments left empty. Returns slots moved.
    fn defragment(&mut self) -> usize {
        let mut drained: Vec<(usize, i64, Arc<M>)> = Vec::new();
        let mut idx = 0;
        let mut seg = Some(&mut self.head);
        while let Some(s) = seg {
            for slot in s.slots.iter_mut() {
                if let Some(model) = slot.model.take() {
                    drained.push((idx, slot.refs, model));
                    slot.refs = 0;
                }
                idx += 1;
            }
            seg = s.next.as_deref_mut();
        }

        let mut moved = 0;
        let mut place = drained.into_iter();
        let mut pending = place.next();
        let mut idx = 0;
        let mut seg = Some(&mut self.head);
        'fill: while let Some(s) = seg {
            for slot in s.slots.iter_mut() {
                let Some((old_idx, refs, model)) = pending.take() else {
                    break 'fill;
                };
                slot.refs = refs;
                slot.model = Some(model);
                if old_idx != idx {
                    moved += 1;
                }
                idx += 1;
                pending = place.next();
            }
            seg = s.next.as_deref_mut();
        }

        if moved > 0 {
            self.version += 1;
        }
        let reclaimed = self.clear_empty();
        debug!(moved, reclaimed, "defragmented active stack");
        moved
    }

    /// Scan-order element fetch for enumeration; `pos` is a linear slot
    /// index across the segment chain.
    fn fetch_from(&self, pos: usize) -> Option<(usize, Arc<M>)> {
        let mut idx = 0;
        for seg in self.segments() {
            for slot in &seg.slots {
                if idx >= pos {
                    if let Some(model) = &slot.model {
                        return Some((idx + 1, Arc::clone(model)));
                    }
                }
                idx += 1;
            }
        }
        None
    }
}

/// Identity-indexed, reference-counted storage with dynamic growth and no
/// implicit eviction.
///
/// Every operation exists in a sync and an async shape over the same hybrid
/// mutex, so sync and async callers mutually exclude each other. Sync entry
/// points must not be called from within an async runtime. Batch operations
/// acquire the lock once for the whole batch.
pub struct ActiveStack<M: PoolModel> {
    segment_size: usize,
    inner: Locked<ActiveCore<M>>,
}

impl<M: PoolModel> ActiveStack<M> {
    /// Create a stack whose segments each hold `segment_size` slots. The
    /// first segment is allocated immediately and never reclaimed.
    pub fn new(segment_size: usize) -> Self {
        let segment_size = segment_size.max(1);
        Self {
            segment_size,
            inner: Locked::new(ActiveCore::new(segment_size)),
        }
    }

    fn guard_refs(refs: i64) -> PoolResult<()> {
        if refs <= 0 {
            return Err(PoolError::InvalidRefCount(refs));
        }
        Ok(())
    }

    /// Add a model with an initial refcount, or add `refs` to the existing
    /// entry for the same identifier. Returns the refcount after the
    /// operation. `refs` must be positive; the contract violation is
    /// rejected before any lock is taken.
    pub fn add(
        &self,
        model: Arc<M>,
        refs: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<i64> {
        Self::guard_refs(refs)?;
        self.inner.run(cancel, |core| core.add(model, refs))
    }

    pub async fn add_async(
        &self,
        model: Arc<M>,
        refs: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<i64> {
        Self::guard_refs(refs)?;
        self.inner.run_async(cancel, |core| core.add(model, refs)).await
    }

    /// Add a batch of models atomically, each with the same initial refcount.
    pub fn add_many(
        &self,
        models: impl IntoIterator<Item = Arc<M>>,
        refs: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<i64>> {
        Self::guard_refs(refs)?;
        self.inner
            .run_batch(models, cancel, |core, model| core.add(model, refs))
    }

    pub async fn add_many_async(
        &self,
        models: impl IntoIterator<Item = Arc<M>>,
        refs: i64,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<i64>> {
        Self::guard_refs(refs)?;
        self.inner
            .run_batch_async(models, cancel, |core, model| core.add(model, refs))
            .await
    }

    /// Delete the slot for `id` unconditionally, regardless of its
    /// refcount. Returns the removed model if one was present.
    pub fn remove(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Option<Arc<M>>> {
        self.inner.run(cancel, |core| core.remove(id))
    }

    pub async fn remove_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Option<Arc<M>>> {
        self.inner.run_async(cancel, |core| core.remove(id)).await
    }

    /// Same as [`ActiveStack::remove`], keyed by the model's own identifier.
    pub fn remove_model(&self, model: &M, cancel: Option<&CancellationToken>) -> PoolResult<bool> {
        let id = model.id();
        self.inner.run(cancel, |core| core.remove(&id).is_some())
    }

    /// Remove a batch of identifiers atomically.
    pub fn remove_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<Option<Arc<M>>>>
    where
        M::Id: 'a,
    {
        self.inner.run_batch(ids, cancel, |core, id| core.remove(id))
    }

    pub async fn remove_many_async<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<Option<Arc<M>>>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch_async(ids, cancel, |core, id| core.remove(id))
            .await
    }

    /// Increment the refcount of the matching slot; returns the new count
    /// and the model, or `(-1, None)` if the identifier is absent.
    pub fn try_ref(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<(i64, Option<Arc<M>>)> {
        self.inner.run(cancel, |core| core.try_ref(id))
    }

    pub async fn try_ref_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<(i64, Option<Arc<M>>)> {
        self.inner.run_async(cancel, |core| core.try_ref(id)).await
    }

    /// Int-only [`ActiveStack::try_ref`] keyed by the model itself.
    pub fn try_ref_model(&self, model: &M, cancel: Option<&CancellationToken>) -> PoolResult<i64> {
        let id = model.id();
        self.inner.run(cancel, |core| core.try_ref(&id).0)
    }

    /// Increment a batch of refcounts atomically; `-1` per absent id.
    pub fn ref_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<i64>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch(ids, cancel, |core, id| core.try_ref(id).0)
    }

    pub async fn ref_many_async<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<i64>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch_async(ids, cancel, |core, id| core.try_ref(id).0)
            .await
    }

    /// Decrement the refcount of the matching slot. Reaching zero frees the
    /// slot; deletion is reported as `(-1, None)` so a live zero refcount is
    /// never observable. Absent identifiers also yield `(-1, None)`.
    pub fn try_unref(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<(i64, Option<Arc<M>>)> {
        self.inner.run(cancel, |core| match core.unref(id) {
            Unref::Absent | Unref::Released(_) => (-1, None),
            Unref::Live(refs, model) => (refs, Some(model)),
        })
    }

    pub async fn try_unref_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<(i64, Option<Arc<M>>)> {
        self.inner
            .run_async(cancel, |core| match core.unref(id) {
                Unref::Absent | Unref::Released(_) => (-1, None),
                Unref::Live(refs, model) => (refs, Some(model)),
            })
            .await
    }

    /// Int-only [`ActiveStack::try_unref`] keyed by the model itself.
    pub fn try_unref_model(
        &self,
        model: &M,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<i64> {
        let id = model.id();
        self.inner.run(cancel, |core| match core.unref(&id) {
            Unref::Absent | Unref::Released(_) => -1,
            Unref::Live(refs, _) => refs,
        })
    }

    /// Decrement a batch of refcounts atomically; `-1` per absent or freed id.
    pub fn unref_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<i64>>
    where
        M::Id: 'a,
    {
        self.inner.run_batch(ids, cancel, |core, id| match core.unref(id) {
            Unref::Absent | Unref::Released(_) => -1,
            Unref::Live(refs, _) => refs,
        })
    }

    pub async fn unref_many_async<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a M::Id>,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Vec<i64>>
    where
        M::Id: 'a,
    {
        self.inner
            .run_batch_async(ids, cancel, |core, id| match core.unref(id) {
                Unref::Absent | Unref::Released(_) => -1,
                Unref::Live(refs, _) => refs,
            })
            .await
    }

    /// Unref that surfaces the released model on deletion; the rent/return
    /// layer needs it to feed the shadow stack.
    pub(crate) fn release(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Unref<M>> {
        self.inner.run(cancel, |core| core.unref(id))
    }

    pub(crate) async fn release_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Unref<M>> {
        self.inner.run_async(cancel, |core| core.unref(id)).await
    }

    /// True iff the identifier occupies a slot with a positive refcount.
    pub fn contains(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<bool> {
        self.inner.run(cancel, |core| core.refs_of(id) > 0)
    }

    pub async fn contains_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<bool> {
        self.inner.run_async(cancel, |core| core.refs_of(id) > 0).await
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
            .run_batch(ids, cancel, |core, id| core.refs_of(id) > 0)
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
            .run_batch_async(ids, cancel, |core, id| core.refs_of(id) > 0)
            .await
    }

    /// Current refcount for `id`, or `-1` if absent. Read-only.
    pub fn refs_of(&self, id: &M::Id, cancel: Option<&CancellationToken>) -> PoolResult<i64> {
        self.inner.run(cancel, |core| core.refs_of(id))
    }

    pub async fn refs_of_async(
        &self,
        id: &M::Id,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<i64> {
        self.inner.run_async(cancel, |core| core.refs_of(id)).await
    }

    /// Reclaim fully-empty segments after the permanent first one. Returns
    /// the slot capacity reclaimed.
    pub fn clear_empty(&self, cancel: Option<&CancellationToken>) -> PoolResult<usize> {
        self.inner.run(cancel, |core| core.clear_empty())
    }

    pub async fn clear_empty_async(&self, cancel: Option<&CancellationToken>) -> PoolResult<usize> {
        self.inner.run_async(cancel, |core| core.clear_empty()).await
    }

    /// Compact occupied slots to the front of the chain in stable scan
    /// order, then reclaim segments left empty. Returns the number of slots
    /// moved. Invalidates in-flight enumerations.
    pub fn defragment(&self, cancel: Option<&CancellationToken>) -> PoolResult<usize> {
        self.inner.run(cancel, |core| core.defragment())
    }

    pub async fn defragment_async(&self, cancel: Option<&CancellationToken>) -> PoolResult<usize> {
        self.inner.run_async(cancel, |core| core.defragment()).await
    }

    /// Number of live models.
    pub fn count(&self) -> usize {
        self.inner.with(|core| core.count)
    }

    pub async fn count_async(&self) -> usize {
        self.inner.with_async(|core| core.count).await
    }

    /// Total slot capacity across all segments.
    pub fn capacity(&self) -> usize {
        self.inner.with(|core| core.capacity)
    }

    pub async fn capacity_async(&self) -> usize {
        self.inner.with_async(|core| core.capacity).await
    }

    /// Configured slots per segment.
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Version-guarded enumeration of live models in scan order. The lock
    /// is re-acquired per element and released before yielding; any mutation
    /// since the snapshot fails the enumeration with
    /// [`PoolError::EnumerationConflict`].
    pub fn iter(&self) -> ActiveIter<'_, M> {
        let version = self.inner.with(|core| core.version);
        ActiveIter(ModelIter::new(
            &self.inner,
            version,
            ActiveCore::fetch_from,
            |core| core.version,
        ))
    }

    pub async fn iter_async(&self) -> ActiveIter<'_, M> {
        let version = self.inner.with_async(|core| core.version).await;
        ActiveIter(ModelIter::new(
            &self.inner,
            version,
            ActiveCore::fetch_from,
            |core| core.version,
        ))
    }
}

/// Lazy enumerator over an [`ActiveStack`]; see [`ActiveStack::iter`].
pub struct ActiveIter<'a, M: PoolModel>(ModelIter<'a, ActiveCore<M>, M>);

impl<M: PoolModel> ActiveIter<'_, M> {
    /// Async element fetch; the sync form is the [`Iterator`] impl.
    pub async fn next_async(&mut self) -> Option<PoolResult<Arc<M>>> {
        self.0.next_async().await
    }
}

impl<M: PoolModel> Iterator for ActiveIter<'_, M> {
    type Item = PoolResult<Arc<M>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Widget {
        id: u64,
        label: Mutex<String>,
    }

    impl PartialEq for Widget {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id && *self.label.lock() == *other.label.lock()
        }
    }

    impl Widget {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                label: Mutex::new(format!("widget-{id}")),
            })
        }
    }

    impl PoolModel for Widget {
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
            *self.label.lock() = source.label.lock().clone();
            Ok(())
        }
    }

    #[test]
    fn add_rejects_non_positive_refs() {
        let stack = ActiveStack::new(4);
        assert!(matches!(
            stack.add(Widget::new(1), 0, None),
            Err(PoolError::InvalidRefCount(0))
        ));
        assert!(matches!(
            stack.add(Widget::new(1), -3, None),
            Err(PoolError::InvalidRefCount(-3))
        ));
        assert_eq!(stack.count(), 0);
    }

    #[test]
    fn add_then_unref_frees_the_slot() {
        let stack = ActiveStack::new(4);
        assert_eq!(stack.add(Widget::new(7), 1, None).unwrap(), 1);
        assert_eq!(stack.try_unref(&7, None).unwrap(), (-1, None));
        assert!(!stack.contains(&7, None).unwrap());
        assert_eq!(stack.count(), 0);
    }

    #[test]
    fn refcount_sequence() {
        let stack = ActiveStack::new(4);
        assert_eq!(stack.add(Widget::new(1), 1, None).unwrap(), 1);
        assert_eq!(stack.try_ref(&1, None).unwrap().0, 2);
        assert_eq!(stack.try_ref(&1, None).unwrap().0, 3);
        assert_eq!(stack.try_unref(&1, None).unwrap().0, 2);
        assert_eq!(stack.try_unref(&1, None).unwrap().0, 1);
        assert_eq!(stack.try_unref(&1, None).unwrap(), (-1, None));
        assert!(!stack.contains(&1, None).unwrap());
    }

    #[test]
    fn add_existing_id_accumulates_refs() {
        let stack = ActiveStack::new(4);
        assert_eq!(stack.add(Widget::new(3), 1, None).unwrap(), 1);
        assert_eq!(stack.add(Widget::new(3), 2, None).unwrap(), 3);
        assert_eq!(stack.count(), 1);
        assert_eq!(stack.refs_of(&3, None).unwrap(), 3);
    }

    #[test]
    fn remove_ignores_refcount() {
        let stack = ActiveStack::new(4);
        stack.add(Widget::new(9), 5, None).unwrap();
        let removed = stack.remove(&9, None).unwrap();
        assert_eq!(removed.unwrap().id, 9);
        assert_eq!(stack.count(), 0);
        assert!(stack.remove(&9, None).unwrap().is_none());
    }

    #[test]
    fn grows_by_whole_segments() {
        let stack = ActiveStack::new(5);
        for id in 0..12 {
            stack.add(Widget::new(id), 1, None).unwrap();
        }
        assert_eq!(stack.capacity(), 15);
        assert_eq!(stack.count(), 12);
    }

    #[test]
    fn clear_empty_reclaims_one_segment_per_pass_step() {
        let stack = ActiveStack::new(5);
        for id in 0..12 {
            stack.add(Widget::new(id), 1, None).unwrap();
        }
        for id in 5..12 {
            stack.remove(&id, None).unwrap();
        }
        // Segments two and three are both empty; the pass unlinks the second
        // and keeps its successor unexamined.
        assert_eq!(stack.clear_empty(None).unwrap(), 5);
        assert_eq!(stack.capacity(), 10);
        assert_eq!(stack.count(), 5);
    }

    #[test]
    fn clear_empty_stops_at_first_occupied_segment() {
        let stack = ActiveStack::new(4);
        for id in 0..12 {
            stack.add(Widget::new(id), 1, None).unwrap();
        }
        // Empty only the third segment; the occupied second one ends the pass.
        for id in 8..12 {
            stack.remove(&id, None).unwrap();
        }
        assert_eq!(stack.clear_empty(None).unwrap(), 0);
        assert_eq!(stack.capacity(), 12);
    }

    #[test]
    fn defragment_compacts_and_reclaims() {
        let stack = ActiveStack::new(4);
        for id in 0..9 {
            stack.add(Widget::new(id), 1, None).unwrap();
        }
        assert_eq!(stack.capacity(), 12);
        for id in 0..4 {
            stack.remove(&id, None).unwrap();
        }
        stack.remove(&8, None).unwrap();

        let moved = stack.defragment(None).unwrap();
        assert_eq!(moved, 4);
        assert_eq!(stack.count(), 4);
        assert_eq!(stack.capacity(), 8);

        let order: Vec<u64> = stack.iter().map(|m| m.unwrap().id).collect();
        assert_eq!(order, vec![4, 5, 6, 7]);
    }

    #[test]
    fn enumeration_fails_after_mutation() {
        let stack = ActiveStack::new(4);
        stack.add(Widget::new(1), 1, None).unwrap();
        stack.add(Widget::new(2), 1, None).unwrap();

        let mut iter = stack.iter();
        assert_eq!(iter.next().unwrap().unwrap().id, 1);

        stack.add(Widget::new(3), 1, None).unwrap();
        assert!(matches!(
            iter.next(),
            Some(Err(PoolError::EnumerationConflict { .. }))
        ));
        assert!(iter.next().is_none());

        // The structure itself stays usable.
        assert_eq!(stack.count(), 3);
    }

    #[test]
    fn batch_operations_share_one_lock_hold() {
        let stack = ActiveStack::new(4);
        let refs = stack
            .add_many((0..6).map(Widget::new), 1, None)
            .unwrap();
        assert_eq!(refs, vec![1; 6]);

        let ids: Vec<u64> = (0..6).collect();
        let counts = stack.ref_many(ids.iter(), None).unwrap();
        assert_eq!(counts, vec![2; 6]);

        let counts = stack.unref_many(ids.iter(), None).unwrap();
        assert_eq!(counts, vec![1; 6]);
        assert_eq!(stack.count(), 6);

        let removed = stack.remove_many(ids[..2].iter(), None).unwrap();
        assert!(removed.iter().all(|m| m.is_some()));
        let present = stack.contains_many(ids.iter(), None).unwrap();
        assert_eq!(present, vec![false, false, true, true, true, true]);
    }

    #[tokio::test]
    async fn async_batch_surfaces_match_sync() {
        let stack = ActiveStack::new(4);
        stack
            .add_many_async((0..4).map(Widget::new), 1, None)
            .await
            .unwrap();

        let ids: Vec<u64> = (0..4).collect();
        let counts = stack.ref_many_async(ids.iter(), None).await.unwrap();
        assert_eq!(counts, vec![2; 4]);
        let counts = stack.unref_many_async(ids.iter(), None).await.unwrap();
        assert_eq!(counts, vec![1; 4]);
        let present = stack.contains_many_async(ids.iter(), None).await.unwrap();
        assert_eq!(present, vec![true; 4]);

        let removed = stack.remove_many_async(ids[..2].iter(), None).await.unwrap();
        assert!(removed.iter().all(|m| m.is_some()));
        assert_eq!(stack.count_async().await, 2);
    }

    #[test]
    fn cancelled_token_rejects_before_lock() {
        let stack = ActiveStack::new(4);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            stack.add(Widget::new(1), 1, Some(&token)),
            Err(PoolError::Cancelled)
        ));
        assert_eq!(stack.count(), 0);
    }

    #[test]
    fn model_keyed_variants() {
        let stack = ActiveStack::new(4);
        let w = Widget::new(42);
        stack.add(Arc::clone(&w), 1, None).unwrap();
        assert_eq!(stack.try_ref_model(&w, None).unwrap(), 2);
        assert_eq!(stack.try_unref_model(&w, None).unwrap(), 1);
        assert!(stack.remove_model(&w, None).unwrap());
        assert!(!stack.remove_model(&w, None).unwrap());
    }

    #[tokio::test]
    async fn async_entry_points_are_observably_equivalent() {
        let stack = ActiveStack::new(4);
        assert_eq!(stack.add_async(Widget::new(1), 1, None).await.unwrap(), 1);
        assert_eq!(stack.try_ref_async(&1, None).await.unwrap().0, 2);
        assert_eq!(stack.try_unref_async(&1, None).await.unwrap().0, 1);
        assert!(stack.contains_async(&1, None).await.unwrap());
        assert_eq!(stack.count_async().await, 1);

        let mut iter = stack.iter_async().await;
        let first = iter.next_async().await.unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert!(iter.next_async().await.is_none());
    }
}
