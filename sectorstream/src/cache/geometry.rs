//! Reference-counted cache for assembled sector geometry.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::decode::SectorGeometry;
use crate::model::{LevelOfDetail, ModelId, SectorId};
use crate::telemetry::LoaderMetrics;

/// Cache address of one sector's geometry at one level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub model: ModelId,
    pub sector: SectorId,
    pub lod: LevelOfDetail,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.sector, self.lod)
    }
}

/// Shared read access to cached geometry.
///
/// Cloning a handle clones the inner `Arc` only; the cache's explicit
/// refcount is managed by the orchestrator through
/// [`GeometryCache::release`], not by handle drops.
#[derive(Debug, Clone)]
pub struct GeometryHandle {
    key: CacheKey,
    geometry: Arc<SectorGeometry>,
}

impl GeometryHandle {
    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn geometry(&self) -> &SectorGeometry {
        &self.geometry
    }
}

struct Entry {
    geometry: Arc<SectorGeometry>,
    refcount: u32,
    size_bytes: usize,
    seq: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Entry>,
    /// Insertion order, lazily pruned: a deque slot is live only while its
    /// seq matches the entry's current seq.
    insert_order: VecDeque<(u64, CacheKey)>,
    total_bytes: usize,
    next_seq: u64,
}

/// Refcounted sector-geometry cache with FIFO eviction of idle entries.
///
/// Entries are pinned while their refcount is positive. Capacity pressure
/// evicts the oldest-inserted idle entry first; when everything is pinned
/// the cache runs over capacity rather than dropping live geometry.
pub struct GeometryCache {
    state: Mutex<State>,
    capacity_bytes: usize,
    metrics: Arc<LoaderMetrics>,
}

impl GeometryCache {
    pub fn new(capacity_bytes: usize, metrics: Arc<LoaderMetrics>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity_bytes,
            metrics,
        }
    }

    /// Look up `key`, incrementing its refcount on a hit.
    pub fn get(&self, key: CacheKey) -> Option<GeometryHandle> {
        let mut state = self.state.lock();
        match state.entries.get_mut(&key) {
            Some(entry) => {
                entry.refcount += 1;
                self.metrics.geometry_cache_hit();
                Some(GeometryHandle {
                    key,
                    geometry: Arc::clone(&entry.geometry),
                })
            }
            None => {
                self.metrics.geometry_cache_miss();
                None
            }
        }
    }

    /// Insert freshly assembled geometry with refcount 1.
    ///
    /// If the key is already present the existing geometry wins: its
    /// refcount is bumped and the existing handle returned, so racing
    /// inserts can never split the refcount across two entries.
    pub fn insert(&self, key: CacheKey, geometry: Arc<SectorGeometry>) -> GeometryHandle {
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.refcount += 1;
            return GeometryHandle {
                key,
                geometry: Arc::clone(&entry.geometry),
            };
        }

        let size_bytes = geometry.size_bytes();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            Entry {
                geometry: Arc::clone(&geometry),
                refcount: 1,
                size_bytes,
                seq,
            },
        );
        state.insert_order.push_back((seq, key));
        state.total_bytes += size_bytes;
        trace!(key = %key, bytes = size_bytes, "geometry cached");

        self.evict_pressure(&mut state);

        GeometryHandle { key, geometry }
    }

    /// Drop one reference to `key`.
    ///
    /// At refcount zero the entry stays resident but becomes eligible for
    /// eviction. Releasing an unknown or already-idle key is ignored with a
    /// warning; it indicates a bookkeeping bug upstream.
    pub fn release(&self, key: CacheKey) {
        let mut state = self.state.lock();
        match state.entries.get_mut(&key) {
            Some(entry) if entry.refcount > 0 => {
                entry.refcount -= 1;
            }
            _ => {
                warn!(key = %key, "release of unknown or idle geometry ignored");
            }
        }
    }

    /// Current refcount of `key`, if cached.
    pub fn refcount(&self, key: CacheKey) -> Option<u32> {
        self.state.lock().entries.get(&key).map(|e| e.refcount)
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        self.state.lock().entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    /// Drop everything, refcounts included. Dispose-time only.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.insert_order.clear();
        state.total_bytes = 0;
    }

    /// Evict oldest-inserted idle entries until back under capacity.
    fn evict_pressure(&self, state: &mut State) {
        let mut evicted = 0u64;
        while state.total_bytes > self.capacity_bytes {
            let Some(victim) = Self::oldest_idle(state) else {
                break;
            };
            if let Some(entry) = state.entries.remove(&victim) {
                state.total_bytes -= entry.size_bytes;
                evicted += 1;
                trace!(key = %victim, bytes = entry.size_bytes, "geometry evicted");
            }
        }
        if evicted > 0 {
            self.metrics.geometry_cache_evicted(evicted);
        }
    }

    /// First key in insertion order whose entry is live and idle.
    fn oldest_idle(state: &mut State) -> Option<CacheKey> {
        // Prune dead deque slots from the front as we scan; slots behind a
        // pinned entry must stay (that entry may become idle later).
        while let Some(&(seq, key)) = state.insert_order.front() {
            match state.entries.get(&key) {
                Some(entry) if entry.seq == seq => {
                    if entry.refcount == 0 {
                        state.insert_order.pop_front();
                        return Some(key);
                    }
                    break;
                }
                _ => {
                    state.insert_order.pop_front();
                }
            }
        }
        // Front is pinned; scan the remainder without pruning.
        let position = state.insert_order.iter().position(|&(seq, key)| {
            state
                .entries
                .get(&key)
                .is_some_and(|entry| entry.seq == seq && entry.refcount == 0)
        })?;
        let (_, key) = state.insert_order.remove(position)?;
        Some(key)
    }
}

impl fmt::Debug for GeometryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GeometryCache")
            .field("entries", &state.entries.len())
            .field("total_bytes", &state.total_bytes)
            .field("capacity_bytes", &self.capacity_bytes)
            .finish()
    }
}
