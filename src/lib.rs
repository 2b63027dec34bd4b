//! # shadowpool
//!
//! Identity-keyed object pool handing out reference-counted, shared models,
//! with a bounded "shadow" cache that retains recently released models for
//! fast re-acquisition.
//!
//! ## Features
//!
//! - Segmented active stack with manual slot management and refcounting
//! - Bounded shadow stack with age-based (timestamp-free) eviction
//! - Pool coordinator with protected in-place mutation ("modify")
//! - Rent/return layer with pluggable model factories
//! - Hybrid sync/async surface over one mutex per structure
//! - Version-guarded enumeration that fails fast on concurrent mutation
//! - Cancellation tokens, metrics export, health reporting
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use shadowpool::{ModelPool, PoolConfiguration, PoolModel, PoolResult};
//!
//! struct Profile {
//!     id: u32,
//!     name: Mutex<String>,
//! }
//!
//! impl PoolModel for Profile {
//!     type Id = u32;
//!
//!     fn id(&self) -> u32 {
//!         self.id
//!     }
//!
//!     fn update(&self, source: &Self) -> PoolResult<()> {
//!         *self.name.lock().unwrap() = source.name.lock().unwrap().clone();
//!         Ok(())
//!     }
//! }
//!
//! let config = PoolConfiguration::new().with_shadow_capacity(8);
//! let pool = ModelPool::with_factory(config, |id: &u32| -> PoolResult<Arc<Profile>> {
//!     Ok(Arc::new(Profile {
//!         id: *id,
//!         name: Mutex::new(format!("profile-{id}")),
//!     }))
//! });
//!
//! let profile = pool.rent(&1, None).unwrap();
//! assert_eq!(*profile.name.lock().unwrap(), "profile-1");
//!
//! // Returning the last reference parks the model in the shadow cache,
//! // so renting it again skips the factory.
//! pool.return_model(&1, None).unwrap();
//! let again = pool.rent(&1, None).unwrap();
//! assert!(Arc::ptr_eq(&profile, &again));
//! ```

mod active;
mod config;
mod errors;
mod health;
mod metrics;
mod model;
mod pool;
mod shadow;
mod sync;

pub use active::{ActiveIter, ActiveStack};
pub use config::PoolConfiguration;
pub use errors::{PoolError, PoolResult};
pub use health::HealthStatus;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use model::{ModelFactory, PoolModel};
pub use pool::ModelPool;
pub use shadow::{ShadowIter, ShadowPush, ShadowStack};
