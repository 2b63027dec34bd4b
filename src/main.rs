// shadowpool - identity-keyed object pool with a shadow cache
// This is just a binary wrapper - the actual library is in lib.rs

use std::sync::{Arc, Mutex};

use shadowpool::{ModelPool, PoolConfiguration, PoolModel, PoolResult};

struct Session {
    id: u32,
    state: Mutex<String>,
}

impl PoolModel for Session {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }

    fn update(&self, source: &Self) -> PoolResult<()> {
        *self.state.lock().unwrap() = source.state.lock().unwrap().clone();
        Ok(())
    }
}

fn main() {
    println!("=== shadowpool demo ===");
    println!();

    let config = PoolConfiguration::new()
        .with_segment_size(8)
        .with_shadow_capacity(4);
    let pool = ModelPool::with_factory(config, |id: &u32| -> PoolResult<Arc<Session>> {
        Ok(Arc::new(Session {
            id: *id,
            state: Mutex::new(String::from("fresh")),
        }))
    });

    let session = pool.rent(&1, None).unwrap();
    println!("rented session {}: {}", session.id, session.state.lock().unwrap());

    *session.state.lock().unwrap() = String::from("warmed");
    pool.return_model(&1, None).unwrap();
    println!("returned; shadow holds {} entries", pool.shadow_count());

    let revived = pool.rent(&1, None).unwrap();
    println!("re-rented session {}: {}", revived.id, revived.state.lock().unwrap());

    println!();
    println!("metrics:");
    print!("{}", pool.export_metrics_prometheus("demo", None));
}
