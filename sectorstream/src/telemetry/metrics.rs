//! Lock-free counters for loader pipeline events.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::MetricsSnapshot;

/// Atomic event counters shared across the loader.
///
/// All methods are cheap relaxed increments; call sites sit on hot paths
/// (per sector, per fetch) and must never contend.
#[derive(Debug, Default)]
pub struct LoaderMetrics {
    // === Planning ===
    planning_passes: AtomicU64,
    planning_skipped: AtomicU64,

    // === Sector loads ===
    sectors_requested: AtomicU64,
    sectors_loaded: AtomicU64,
    sectors_culled: AtomicU64,
    sectors_degraded: AtomicU64,
    loads_coalesced: AtomicU64,

    // === Fetch ===
    fetches_started: AtomicU64,
    fetches_completed: AtomicU64,
    fetches_retried: AtomicU64,
    fetches_failed: AtomicU64,
    bytes_fetched: AtomicU64,

    // === Decode ===
    decodes_completed: AtomicU64,
    decodes_failed: AtomicU64,
    decode_micros: AtomicU64,

    // === Caches ===
    geometry_cache_hits: AtomicU64,
    geometry_cache_misses: AtomicU64,
    geometry_cache_evictions: AtomicU64,
    mesh_cache_hits: AtomicU64,
    mesh_cache_misses: AtomicU64,
    mesh_cache_evictions: AtomicU64,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // === Planning ===

    /// A planning pass ran to completion.
    pub fn planning_pass(&self) {
        self.planning_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// A planning pass short-circuited (loading suspended or camera moving).
    pub fn planning_skipped(&self) {
        self.planning_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // === Sector loads ===

    /// A sector load was dispatched to the repository.
    pub fn sector_requested(&self) {
        self.sectors_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// A sector load resolved (including degraded results).
    pub fn sector_loaded(&self) {
        self.sectors_loaded.fetch_add(1, Ordering::Relaxed);
    }

    /// A wanted sector was dropped by the occlusion refilter.
    pub fn sector_culled(&self) {
        self.sectors_culled.fetch_add(1, Ordering::Relaxed);
    }

    /// A load degraded to discarded after unrecoverable failure.
    pub fn sector_degraded(&self) {
        self.sectors_degraded.fetch_add(1, Ordering::Relaxed);
    }

    /// A load joined an already in-flight request for the same key.
    pub fn load_coalesced(&self) {
        self.loads_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    // === Fetch ===

    pub fn fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_completed(&self, bytes: u64) {
        self.fetches_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn fetch_retried(&self) {
        self.fetches_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    // === Decode ===

    pub fn decode_completed(&self, duration_us: u64) {
        self.decodes_completed.fetch_add(1, Ordering::Relaxed);
        self.decode_micros.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decodes_failed.fetch_add(1, Ordering::Relaxed);
    }

    // === Caches ===

    pub fn geometry_cache_hit(&self) {
        self.geometry_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn geometry_cache_miss(&self) {
        self.geometry_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn geometry_cache_evicted(&self, count: u64) {
        self.geometry_cache_evictions
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn mesh_cache_hit(&self) {
        self.mesh_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mesh_cache_miss(&self) {
        self.mesh_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mesh_cache_evicted(&self, count: u64) {
        self.mesh_cache_evictions
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            planning_passes: self.planning_passes.load(Ordering::Relaxed),
            planning_skipped: self.planning_skipped.load(Ordering::Relaxed),
            sectors_requested: self.sectors_requested.load(Ordering::Relaxed),
            sectors_loaded: self.sectors_loaded.load(Ordering::Relaxed),
            sectors_culled: self.sectors_culled.load(Ordering::Relaxed),
            sectors_degraded: self.sectors_degraded.load(Ordering::Relaxed),
            loads_coalesced: self.loads_coalesced.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_completed: self.fetches_completed.load(Ordering::Relaxed),
            fetches_retried: self.fetches_retried.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            decodes_completed: self.decodes_completed.load(Ordering::Relaxed),
            decodes_failed: self.decodes_failed.load(Ordering::Relaxed),
            decode_micros: self.decode_micros.load(Ordering::Relaxed),
            geometry_cache_hits: self.geometry_cache_hits.load(Ordering::Relaxed),
            geometry_cache_misses: self.geometry_cache_misses.load(Ordering::Relaxed),
            geometry_cache_evictions: self.geometry_cache_evictions.load(Ordering::Relaxed),
            mesh_cache_hits: self.mesh_cache_hits.load(Ordering::Relaxed),
            mesh_cache_misses: self.mesh_cache_misses.load(Ordering::Relaxed),
            mesh_cache_evictions: self.mesh_cache_evictions.load(Ordering::Relaxed),
        }
    }
}
