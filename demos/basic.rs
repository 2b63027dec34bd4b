//! Basic rent / modify / return cycle against a factory-backed pool.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use parking_lot::Mutex;
use shadowpool::{ModelPool, PoolConfiguration, PoolError, PoolModel, PoolResult};

struct Document {
    id: u64,
    body: Mutex<String>,
}

impl PoolModel for Document {
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
        *self.body.lock() = source.body.lock().clone();
        Ok(())
    }
}

fn main() -> PoolResult<()> {
    let config = PoolConfiguration::new()
        .with_segment_size(8)
        .with_shadow_capacity(4);
    let pool = ModelPool::with_factory(config, |id: &u64| -> PoolResult<Arc<Document>> {
        Ok(Arc::new(Document {
            id: *id,
            body: Mutex::new(format!("document {id}")),
        }))
    });

    let doc = pool.rent(&1, None)?;
    println!("rented: {}", doc.body.lock());

    // A protected modify copies the patch's state into the live model.
    let patch = Document {
        id: 1,
        body: Mutex::new(String::from("document 1, revised")),
    };
    pool.modify(&1, &patch, None)?;
    println!("modified: {}", doc.body.lock());

    pool.return_model(&1, None)?;
    println!("returned; shadow holds {} entries", pool.shadow_count());

    // Renting again revives the cached instance instead of rebuilding.
    let again = pool.rent(&1, None)?;
    println!("re-rented same instance: {}", Arc::ptr_eq(&doc, &again));

    Ok(())
}
