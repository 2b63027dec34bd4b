//! Hybrid sync/async locking shared by the pool structures
//!
//! Each structure keeps its algorithms on a plain core type that never locks;
//! the public surface goes through [`Locked`], which offers both a blocking
//! and a suspending acquisition over the same `tokio` mutex, so sync and
//! async callers mutually exclude each other on one wait queue. Batch
//! operations run under a single acquisition and are materialized eagerly;
//! the lock is never held across a point where control returns to the caller.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::{PoolError, PoolResult};

/// Cancellation checkpoint, used before lock acquisition and once per
/// element inside batch loops.
pub(crate) fn checkpoint(cancel: Option<&CancellationToken>) -> PoolResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(PoolError::Cancelled),
        _ => Ok(()),
    }
}

/// A core value behind the structure's hybrid mutex.
pub(crate) struct Locked<C> {
    state: Mutex<C>,
}

impl<C> Locked<C> {
    pub(crate) fn new(core: C) -> Self {
        Self {
            state: Mutex::new(core),
        }
    }

    /// Blocking acquisition without a cancellation checkpoint.
    ///
    /// Panics if called from within an async runtime; async callers go
    /// through [`Locked::with_async`].
    pub(crate) fn with<R>(&self, op: impl FnOnce(&mut C) -> R) -> R {
        op(&mut self.state.blocking_lock())
    }

    /// Suspending acquisition without a cancellation checkpoint.
    pub(crate) async fn with_async<R>(&self, op: impl FnOnce(&mut C) -> R) -> R {
        op(&mut *self.state.lock().await)
    }

    /// Run one operation under a blocking acquisition.
    pub(crate) fn run<R>(
        &self,
        cancel: Option<&CancellationToken>,
        op: impl FnOnce(&mut C) -> R,
    ) -> PoolResult<R> {
        checkpoint(cancel)?;
        Ok(self.with(op))
    }

    /// Run one operation under a suspending acquisition.
    pub(crate) async fn run_async<R>(
        &self,
        cancel: Option<&CancellationToken>,
        op: impl FnOnce(&mut C) -> R,
    ) -> PoolResult<R> {
        checkpoint(cancel)?;
        Ok(self.with_async(op).await)
    }

    /// Run a per-item operation over a batch, atomically as a whole: the
    /// lock is acquired once and held for the entire batch. Cancellation
    /// mid-batch releases the lock and leaves already-applied items applied.
    pub(crate) fn run_batch<T, R>(
        &self,
        items: impl IntoIterator<Item = T>,
        cancel: Option<&CancellationToken>,
        mut op: impl FnMut(&mut C, T) -> R,
    ) -> PoolResult<Vec<R>> {
        checkpoint(cancel)?;
        let mut core = self.state.blocking_lock();
        let mut results = Vec::new();
        for item in items {
            checkpoint(cancel)?;
            results.push(op(&mut core, item));
        }
        Ok(results)
    }

    /// Async variant of [`Locked::run_batch`].
    pub(crate) async fn run_batch_async<T, R>(
        &self,
        items: impl IntoIterator<Item = T>,
        cancel: Option<&CancellationToken>,
        mut op: impl FnMut(&mut C, T) -> R,
    ) -> PoolResult<Vec<R>> {
        checkpoint(cancel)?;
        let mut core = self.state.lock().await;
        let mut results = Vec::new();
        for item in items {
            checkpoint(cancel)?;
            results.push(op(&mut core, item));
        }
        Ok(results)
    }
}

/// Version-guarded lazy enumeration over a locked core.
///
/// The version is snapshotted at creation; every element fetch re-acquires
/// the lock, re-checks the version and fails with
/// [`PoolError::EnumerationConflict`] if the structure was mutated since the
/// snapshot. The lock is released before each element is yielded.
pub(crate) struct ModelIter<'a, C, M> {
    lock: &'a Locked<C>,
    version: u64,
    pos: usize,
    done: bool,
    fetch: fn(&C, usize) -> Option<(usize, Arc<M>)>,
    read_version: fn(&C) -> u64,
}

impl<'a, C, M> ModelIter<'a, C, M> {
    pub(crate) fn new(
        lock: &'a Locked<C>,
        version: u64,
        fetch: fn(&C, usize) -> Option<(usize, Arc<M>)>,
        read_version: fn(&C) -> u64,
    ) -> Self {
        Self {
            lock,
            version,
            pos: 0,
            done: false,
            fetch,
            read_version,
        }
    }

    fn step(&mut self, core: &C) -> Option<PoolResult<Arc<M>>> {
        let current = (self.read_version)(core);
        if current != self.version {
            self.done = true;
            return Some(Err(PoolError::EnumerationConflict {
                started: self.version,
                current,
            }));
        }
        match (self.fetch)(core, self.pos) {
            Some((next, model)) => {
                self.pos = next;
                Some(Ok(model))
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Async element fetch; the sync form is the [`Iterator`] impl.
    pub(crate) async fn next_async(&mut self) -> Option<PoolResult<Arc<M>>> {
        if self.done {
            return None;
        }
        let lock = self.lock;
        lock.with_async(|core| self.step(core)).await
    }
}

impl<C, M> Iterator for ModelIter<'_, C, M> {
    type Item = PoolResult<Arc<M>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let lock = self.lock;
        lock.with(|core| self.step(core))
    }
}
