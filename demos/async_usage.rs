//! Async rent cycle with cancellation.
//!
//! Run with: cargo run --example async_usage

use std::sync::Arc;

use parking_lot::Mutex;
use shadowpool::{ModelPool, PoolConfiguration, PoolError, PoolModel, PoolResult};
use tokio_util::sync::CancellationToken;

struct Job {
    id: u32,
    status: Mutex<String>,
}

impl PoolModel for Job {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }

    fn update(&self, source: &Self) -> PoolResult<()> {
        if source.id != self.id {
            return Err(PoolError::IdentityMismatch {
                expected: format!("{:?}", self.id),
                found: format!("{:?}", source.id),
            });
        }
        *self.status.lock() = source.status.lock().clone();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> PoolResult<()> {
    let config = PoolConfiguration::new()
        .with_segment_size(8)
        .with_shadow_capacity(4);
    let pool = ModelPool::with_factory(config, |id: &u32| -> PoolResult<Arc<Job>> {
        Ok(Arc::new(Job {
            id: *id,
            status: Mutex::new(String::from("queued")),
        }))
    });

    let job = pool.rent_async(&1, None).await?;
    *job.status.lock() = String::from("running");
    println!("rented job {}: {}", job.id, job.status.lock());

    pool.return_model_async(&1, None).await?;
    println!("returned; shadow holds {} entries", pool.shadow_count_async().await);

    let revived = pool.rent_async(&1, None).await?;
    println!("revived job {}: {}", revived.id, revived.status.lock());
    pool.return_model_async(&1, None).await?;

    // A cancelled token rejects the operation before any lock is taken.
    let token = CancellationToken::new();
    token.cancel();
    match pool.rent_async(&2, Some(&token)).await {
        Err(PoolError::Cancelled) => println!("cancelled rent was rejected"),
        _ => println!("unexpected outcome"),
    }

    Ok(())
}
