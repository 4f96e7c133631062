//! Point-in-time view of loader metrics.

/// Copy of every [`LoaderMetrics`](super::LoaderMetrics) counter at one
/// instant. Plain data, safe to ship across threads or serialize by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub planning_passes: u64,
    pub planning_skipped: u64,

    pub sectors_requested: u64,
    pub sectors_loaded: u64,
    pub sectors_culled: u64,
    pub sectors_degraded: u64,
    pub loads_coalesced: u64,

    pub fetches_started: u64,
    pub fetches_completed: u64,
    pub fetches_retried: u64,
    pub fetches_failed: u64,
    pub bytes_fetched: u64,

    pub decodes_completed: u64,
    pub decodes_failed: u64,
    pub decode_micros: u64,

    pub geometry_cache_hits: u64,
    pub geometry_cache_misses: u64,
    pub geometry_cache_evictions: u64,
    pub mesh_cache_hits: u64,
    pub mesh_cache_misses: u64,
    pub mesh_cache_evictions: u64,
}

impl MetricsSnapshot {
    /// Mean decode time in microseconds, zero when nothing decoded yet.
    pub fn mean_decode_micros(&self) -> u64 {
        if self.decodes_completed == 0 {
            0
        } else {
            self.decode_micros / self.decodes_completed
        }
    }

    /// Geometry-cache hit rate in `[0, 1]`, zero before any lookup.
    pub fn geometry_cache_hit_rate(&self) -> f64 {
        let total = self.geometry_cache_hits + self.geometry_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.geometry_cache_hits as f64 / total as f64
        }
    }
}
