//! The model contract consumed by the pool structures
//!
//! The pool never inspects model state. It only needs a stable identifier,
//! an identity predicate, and (for the protected modify path) an in-place
//! update operation that copies the state of one model into another.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PoolResult;

/// Contract every pooled model implements.
///
/// Identity, not structural equality, is the sole key: the pool compares
/// entries exclusively through [`PoolModel::equals_by_id`].
///
/// Models are shared behind `Arc` while pooled, so `update` takes `&self`;
/// mutable state belongs behind the model's own interior mutability.
#[async_trait]
pub trait PoolModel: Send + Sync + 'static {
    /// Identifier type, unique within one pool instance.
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// The model's identifier.
    fn id(&self) -> Self::Id;

    /// Identity predicate against an identifier.
    fn equals_by_id(&self, id: &Self::Id) -> bool {
        self.id() == *id
    }

    /// Copy `source`'s state into `self`.
    ///
    /// Implementations must reject identity-incompatible sources with
    /// [`PoolError::IdentityMismatch`](crate::PoolError::IdentityMismatch);
    /// domain-level rejections of an otherwise well-targeted patch should
    /// surface as [`PoolError::UpdateFailed`](crate::PoolError::UpdateFailed).
    fn update(&self, source: &Self) -> PoolResult<()>;

    /// Async variant of [`PoolModel::update`]; defaults to the sync form.
    async fn update_async(&self, source: &Self) -> PoolResult<()> {
        self.update(source)
    }
}

/// Factory used by the rent path to construct a model for an absent
/// identifier. Passed into the pool at construction as an explicit value,
/// so the pool stays decoupled from any particular construction mechanism.
pub trait ModelFactory<M: PoolModel>: Send + Sync {
    fn create(&self, id: &M::Id) -> PoolResult<Arc<M>>;
}

impl<M, F> ModelFactory<M> for F
where
    M: PoolModel,
    F: Fn(&M::Id) -> PoolResult<Arc<M>> + Send + Sync,
{
    fn create(&self, id: &M::Id) -> PoolResult<Arc<M>> {
        self(id)
    }
}
