//! Pool configuration options

use std::time::Duration;

/// Configuration for pool behavior
///
/// Both sizes are fixed at construction: the active stack grows by whole
/// segments of `segment_size` slots, and the shadow stack capacity is
/// immutable for the life of the pool.
///
/// # Examples
///
/// ```
/// use shadowpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_segment_size(64)
///     .with_shadow_capacity(16)
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.segment_size, 64);
/// assert_eq!(config.shadow_capacity, 16);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Slots per active-stack segment
    pub segment_size: usize,

    /// Shadow stack capacity; 0 disables the shadow cache entirely
    pub shadow_capacity: usize,

    /// Timeout for async rent operations
    pub operation_timeout: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            segment_size: 32,
            shadow_capacity: 0,
            operation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active-stack segment size
    ///
    /// # Examples
    ///
    /// ```
    /// use shadowpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_segment_size(8);
    /// assert_eq!(config.segment_size, 8);
    /// ```
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Set the shadow stack capacity
    pub fn with_shadow_capacity(mut self, capacity: usize) -> Self {
        self.shadow_capacity = capacity;
        self
    }

    /// Set the async operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}
