//! Shared-mesh cache with least-frequently-retrieved eviction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::decode::MeshGeometry;
use crate::model::ModelId;
use crate::telemetry::LoaderMetrics;

/// Cache address of one peripheral mesh file.
///
/// Keyed per model: file names are only unique within one model's base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshFileKey {
    pub model: ModelId,
    pub file_name: String,
}

impl fmt::Display for MeshFileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.file_name)
    }
}

struct Entry {
    mesh: Arc<MeshGeometry>,
    retrievals: u64,
    seq: u64,
    size_bytes: usize,
}

#[derive(Default)]
struct State {
    entries: HashMap<MeshFileKey, Entry>,
    total_bytes: usize,
    next_seq: u64,
}

/// Cache of decoded peripheral meshes reused across sectors.
///
/// Under capacity pressure the entry with the fewest retrievals goes first,
/// oldest insertion breaking ties. No refcounts: sectors hold their meshes
/// via `Arc`, so eviction only drops the cache's own reference.
pub struct MeshFileCache {
    state: Mutex<State>,
    capacity_bytes: usize,
    metrics: Arc<LoaderMetrics>,
}

impl MeshFileCache {
    pub fn new(capacity_bytes: usize, metrics: Arc<LoaderMetrics>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity_bytes,
            metrics,
        }
    }

    /// Look up a mesh, bumping its retrieval count on a hit.
    pub fn get(&self, key: &MeshFileKey) -> Option<Arc<MeshGeometry>> {
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.retrievals += 1;
                self.metrics.mesh_cache_hit();
                Some(Arc::clone(&entry.mesh))
            }
            None => {
                self.metrics.mesh_cache_miss();
                None
            }
        }
    }

    /// Insert a freshly decoded mesh.
    ///
    /// Re-inserting an existing key replaces the entry and restarts its
    /// retrieval count; the coalescer upstream makes that path rare.
    pub fn insert(&self, key: MeshFileKey, mesh: Arc<MeshGeometry>) {
        let mut state = self.state.lock();
        let size_bytes = mesh.data.len();

        if let Some(old) = state.entries.remove(&key) {
            state.total_bytes -= old.size_bytes;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        trace!(key = %key, bytes = size_bytes, "mesh cached");
        state.entries.insert(
            key,
            Entry {
                mesh,
                retrievals: 0,
                seq,
                size_bytes,
            },
        );
        state.total_bytes += size_bytes;

        self.evict_pressure(&mut state);
    }

    pub fn contains(&self, key: &MeshFileKey) -> bool {
        self.state.lock().entries.contains_key(key)
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

    /// Retrieval count of `key`, if cached.
    pub fn retrievals(&self, key: &MeshFileKey) -> Option<u64> {
        self.state.lock().entries.get(key).map(|e| e.retrievals)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }

    fn evict_pressure(&self, state: &mut State) {
        let mut evicted = 0u64;
        while state.total_bytes > self.capacity_bytes && state.entries.len() > 1 {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.retrievals, entry.seq))
                .map(|(key, _)| key.clone());
            let Some(victim) = victim else { break };
            if let Some(entry) = state.entries.remove(&victim) {
                state.total_bytes -= entry.size_bytes;
                evicted += 1;
                trace!(key = %victim, bytes = entry.size_bytes, "mesh evicted");
            }
        }
        if evicted > 0 {
            self.metrics.mesh_cache_evicted(evicted);
        }
    }
}

impl fmt::Debug for MeshFileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MeshFileCache")
            .field("entries", &state.entries.len())
            .field("total_bytes", &state.total_bytes)
            .field("capacity_bytes", &self.capacity_bytes)
            .finish()
    }
}
