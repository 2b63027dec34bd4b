//! Health monitoring for model pools

/// Health status of a model pool
///
/// # Examples
///
/// ```
/// use shadowpool::HealthStatus;
///
/// let health = HealthStatus::new(3, 32, 32, 0, 8);
/// assert!(health.is_healthy());
/// assert_eq!(health.active_count, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Active utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Live models in the active stack
    pub active_count: usize,

    /// Active slot capacity
    pub capacity: usize,

    /// Occupied shadow entries
    pub shadow_count: usize,

    /// Shadow capacity
    pub shadow_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(
        active: usize,
        capacity: usize,
        segment_size: usize,
        shadow_count: usize,
        shadow_capacity: usize,
    ) -> Self {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        // More than two whole segments of free slots suggests the chain is
        // fragmented enough for clear_empty or defragment to help.
        if capacity.saturating_sub(active) > segment_size * 2 {
            warnings.push(format!(
                "Fragmented active stack: {} of {} slots free",
                capacity - active,
                capacity
            ));
        }

        if shadow_capacity > 0 && shadow_count == shadow_capacity {
            warnings.push("Shadow stack is full; further returns will evict".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            active_count: active,
            capacity,
            shadow_count,
            shadow_capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
