//! Metrics collection and export for model pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use shadowpool::PoolMetrics;
///
/// let metrics = PoolMetrics {
///     total_rented: 10,
///     total_returned: 8,
///     total_modified: 3,
///     shadow_hits: 2,
///     shadow_evictions: 1,
///     factory_builds: 5,
///     active_count: 2,
///     shadow_count: 4,
///     capacity: 32,
///     utilization: 2.0 / 32.0,
/// };
///
/// let exported = metrics.export();
/// assert_eq!(exported["total_rented"], "10");
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetrics {
    /// Total successful rents
    pub total_rented: usize,

    /// Total models returned to the pool
    pub total_returned: usize,

    /// Total successful protected modifications
    pub total_modified: usize,

    /// Rents served from the shadow stack
    pub shadow_hits: usize,

    /// Shadow entries overwritten by age-based eviction
    pub shadow_evictions: usize,

    /// Models constructed by the factory
    pub factory_builds: usize,

    /// Current live models in the active stack
    pub active_count: usize,

    /// Current occupied shadow entries
    pub shadow_count: usize,

    /// Active stack slot capacity
    pub capacity: usize,

    /// Active utilization ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_rented".to_string(), self.total_rented.to_string());
        metrics.insert(
            "total_returned".to_string(),
            self.total_returned.to_string(),
        );
        metrics.insert(
            "total_modified".to_string(),
            self.total_modified.to_string(),
        );
        metrics.insert("shadow_hits".to_string(), self.shadow_hits.to_string());
        metrics.insert(
            "shadow_evictions".to_string(),
            self.shadow_evictions.to_string(),
        );
        metrics.insert(
            "factory_builds".to_string(),
            self.factory_builds.to_string(),
        );
        metrics.insert("active_count".to_string(), self.active_count.to_string());
        metrics.insert("shadow_count".to_string(), self.shadow_count.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use shadowpool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let metrics = PoolMetrics {
    ///     total_rented: 1, total_returned: 0, total_modified: 0,
    ///     shadow_hits: 0, shadow_evictions: 0, factory_builds: 1,
    ///     active_count: 1, shadow_count: 0, capacity: 32,
    ///     utilization: 1.0 / 32.0,
    /// };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&metrics, "sessions", Some(&tags));
    /// assert!(output.contains("modelpool_models_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        // Gauge metrics
        output.push_str("# HELP modelpool_models_active Current live models\n");
        output.push_str("# TYPE modelpool_models_active gauge\n");
        output.push_str(&format!(
            "modelpool_models_active{{{}}} {}\n",
            labels, metrics.active_count
        ));

        output.push_str("# HELP modelpool_shadow_occupied Current occupied shadow entries\n");
        output.push_str("# TYPE modelpool_shadow_occupied gauge\n");
        output.push_str(&format!(
            "modelpool_shadow_occupied{{{}}} {}\n",
            labels, metrics.shadow_count
        ));

        output.push_str("# HELP modelpool_utilization Active stack utilization ratio\n");
        output.push_str("# TYPE modelpool_utilization gauge\n");
        output.push_str(&format!(
            "modelpool_utilization{{{}}} {:.2}\n",
            labels, metrics.utilization
        ));

        // Counter metrics
        output.push_str("# HELP modelpool_rented_total Total successful rents\n");
        output.push_str("# TYPE modelpool_rented_total counter\n");
        output.push_str(&format!(
            "modelpool_rented_total{{{}}} {}\n",
            labels, metrics.total_rented
        ));

        output.push_str("# HELP modelpool_returned_total Total models returned\n");
        output.push_str("# TYPE modelpool_returned_total counter\n");
        output.push_str(&format!(
            "modelpool_returned_total{{{}}} {}\n",
            labels, metrics.total_returned
        ));

        output.push_str("# HELP modelpool_modified_total Total protected modifications\n");
        output.push_str("# TYPE modelpool_modified_total counter\n");
        output.push_str(&format!(
            "modelpool_modified_total{{{}}} {}\n",
            labels, metrics.total_modified
        ));

        output.push_str("# HELP modelpool_shadow_hits_total Rents served from the shadow stack\n");
        output.push_str("# TYPE modelpool_shadow_hits_total counter\n");
        output.push_str(&format!(
            "modelpool_shadow_hits_total{{{}}} {}\n",
            labels, metrics.shadow_hits
        ));

        output.push_str("# HELP modelpool_shadow_evictions_total Shadow entries evicted by age\n");
        output.push_str("# TYPE modelpool_shadow_evictions_total counter\n");
        output.push_str(&format!(
            "modelpool_shadow_evictions_total{{{}}} {}\n",
            labels, metrics.shadow_evictions
        ));

        output.push_str("# HELP modelpool_factory_builds_total Models constructed by the factory\n");
        output.push_str("# TYPE modelpool_factory_builds_total counter\n");
        output.push_str(&format!(
            "modelpool_factory_builds_total{{{}}} {}\n",
            labels, metrics.factory_builds
        ));

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
pub(crate) struct MetricsTracker {
    pub total_rented: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub total_modified: AtomicUsize,
    pub shadow_hits: AtomicUsize,
    pub shadow_evictions: AtomicUsize,
    pub factory_builds: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            total_rented: AtomicUsize::new(0),
            total_returned: AtomicUsize::new(0),
            total_modified: AtomicUsize::new(0),
            shadow_hits: AtomicUsize::new(0),
            shadow_evictions: AtomicUsize::new(0),
            factory_builds: AtomicUsize::new(0),
        }
    }

    pub fn get_metrics(&self, active: usize, shadow: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_rented: self.total_rented.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_modified: self.total_modified.load(Ordering::Relaxed),
            shadow_hits: self.shadow_hits.load(Ordering::Relaxed),
            shadow_evictions: self.shadow_evictions.load(Ordering::Relaxed),
            factory_builds: self.factory_builds.load(Ordering::Relaxed),
            active_count: active,
            shadow_count: shadow,
            capacity,
            utilization,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
