//! Geometry caching.
//!
//! Two caches with deliberately different eviction policies:
//!
//! - [`GeometryCache`] holds assembled per-sector geometry, reference
//!   counted. Under capacity pressure it evicts the oldest-inserted entry
//!   whose refcount is zero; pinned entries are never evicted.
//! - [`MeshFileCache`] holds decoded peripheral meshes shared between
//!   sectors and evicts the least-frequently-retrieved entry first.
//!
//! The policies stay separate on purpose: consumed sectors age out in
//! insertion order once the renderer lets go of them, while shared meshes
//! earn residency through reuse.

mod geometry;
mod mesh;

pub use geometry::{CacheKey, GeometryCache, GeometryHandle};
pub use mesh::{MeshFileCache, MeshFileKey};

/// Capacity limits for both caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Byte budget for assembled sector geometry.
    pub geometry_capacity_bytes: usize,
    /// Byte budget for decoded shared meshes.
    pub mesh_capacity_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            geometry_capacity_bytes: 256 * 1024 * 1024,
            mesh_capacity_bytes: 64 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_geometry_capacity_bytes(mut self, bytes: usize) -> Self {
        self.geometry_capacity_bytes = bytes;
        self
    }

    pub fn with_mesh_capacity_bytes(mut self, bytes: usize) -> Self {
        self.mesh_capacity_bytes = bytes;
        self
    }
}
