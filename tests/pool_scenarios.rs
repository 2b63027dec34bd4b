//! End-to-end scenarios across the active stack, shadow stack and coordinator.

use std::sync::Arc;

use parking_lot::Mutex;
use shadowpool::{
    ActiveStack, ModelPool, PoolConfiguration, PoolError, PoolModel, PoolResult, ShadowStack,
};

#[derive(Debug)]
struct Entity {
    id: u64,
    payload: Mutex<String>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && *self.payload.lock() == *other.payload.lock()
    }
}

impl Entity {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            payload: Mutex::new(format!("entity-{id}")),
        })
    }
}

impl PoolModel for Entity {
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
        *self.payload.lock() = source.payload.lock().clone();
        Ok(())
    }
}

#[test]
fn segmented_growth_and_reclamation() {
    let stack = ActiveStack::new(5);
    for id in 0..12 {
        assert_eq!(stack.add(Entity::new(id), 1, None).unwrap(), 1);
    }
    assert_eq!(stack.capacity(), 15);
    assert_eq!(stack.count(), 12);

    for id in 5..12 {
        assert!(stack.remove(&id, None).unwrap().is_some());
    }
    assert_eq!(stack.clear_empty(None).unwrap(), 5);
    assert_eq!(stack.capacity(), 10);
    assert_eq!(stack.count(), 5);

    let survivors: Vec<u64> = stack.iter().map(|m| m.unwrap().id).collect();
    assert_eq!(survivors, vec![0, 1, 2, 3, 4]);
}

#[test]
fn count_tracks_distinct_live_identifiers() {
    let stack = ActiveStack::new(3);
    stack.add(Entity::new(1), 1, None).unwrap();
    stack.add(Entity::new(2), 3, None).unwrap();
    stack.add(Entity::new(1), 2, None).unwrap();
    assert_eq!(stack.count(), 2);

    stack.try_unref(&2, None).unwrap();
    stack.try_unref(&2, None).unwrap();
    assert_eq!(stack.count(), 2);
    stack.try_unref(&2, None).unwrap();
    assert_eq!(stack.count(), 1);

    stack.remove(&1, None).unwrap();
    assert_eq!(stack.count(), 0);
    assert_eq!(stack.try_unref(&1, None).unwrap(), (-1, None));
    assert_eq!(stack.count(), 0);
}

#[test]
fn shadow_keeps_model_state_across_rent_cycles() {
    let config = PoolConfiguration::new()
        .with_segment_size(4)
        .with_shadow_capacity(2);
    let pool = ModelPool::with_factory(config, |id: &u64| -> PoolResult<Arc<Entity>> {
        Ok(Entity::new(*id))
    });

    let entity = pool.rent(&1, None).unwrap();
    *entity.payload.lock() = String::from("dirty");
    pool.return_model(&1, None).unwrap();

    // Push two more identifiers through; capacity 2 evicts entity 1.
    for id in 2..=3 {
        pool.rent(&id, None).unwrap();
        pool.return_model(&id, None).unwrap();
    }
    assert!(!pool.contains(&1, None).unwrap());
    assert_eq!(pool.get_metrics().shadow_evictions, 1);

    // A fresh rent reconstructs from the factory.
    let rebuilt = pool.rent(&1, None).unwrap();
    assert!(!Arc::ptr_eq(&entity, &rebuilt));
    assert_eq!(*rebuilt.payload.lock(), "entity-1");
}

#[test]
fn shadow_eviction_order_is_by_accumulated_age() {
    let stack = ShadowStack::new(3);
    for id in 1..=3 {
        stack.push(Entity::new(id), None).unwrap();
    }
    // Touch 1 so 2 becomes the oldest.
    stack.push(Entity::new(1), None).unwrap();
    assert_eq!(stack.peek_oldest(None).unwrap().unwrap().id, 2);

    stack.push(Entity::new(4), None).unwrap();
    assert!(!stack.contains(&2, None).unwrap());
    assert_eq!(stack.count(), 3);
}

#[test]
fn enumeration_conflict_spans_structures_independently() {
    let active = ActiveStack::new(4);
    let shadow = ShadowStack::new(4);
    active.add(Entity::new(1), 1, None).unwrap();
    shadow.push(Entity::new(2), None).unwrap();

    let mut active_iter = active.iter();
    // Mutating the shadow stack does not invalidate the active enumeration.
    shadow.push(Entity::new(3), None).unwrap();
    assert!(active_iter.next().unwrap().is_ok());

    let mut shadow_iter = shadow.iter();
    shadow.pop(&2, None).unwrap();
    assert!(matches!(
        shadow_iter.next(),
        Some(Err(PoolError::EnumerationConflict { .. }))
    ));
}

#[tokio::test]
async fn async_rent_cycle_with_shadow_revival() {
    let config = PoolConfiguration::new()
        .with_segment_size(4)
        .with_shadow_capacity(4);
    let pool = ModelPool::with_factory(config, |id: &u64| -> PoolResult<Arc<Entity>> {
        Ok(Entity::new(*id))
    });

    let entity = pool.rent_async(&9, None).await.unwrap();
    *entity.payload.lock() = String::from("kept");
    pool.return_model_async(&9, None).await.unwrap();
    assert_eq!(pool.shadow_count_async().await, 1);

    let revived = pool.rent_async(&9, None).await.unwrap();
    assert!(Arc::ptr_eq(&entity, &revived));
    assert_eq!(*revived.payload.lock(), "kept");
    assert_eq!(pool.get_metrics_async().await.shadow_hits, 1);
}
