//! Decoding boundary: raw fetched bytes to renderer-ready geometry.
//!
//! Wire formats are opaque to the loader. A host supplies a [`SectorDecoder`]
//! that understands its own formats; the loader only routes bytes through the
//! worker pool and assembles the decoded payloads into [`SectorGeometry`].

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::model::LevelOfDetail;

/// Which decoder a payload routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeKind {
    /// Coarse faces file backing the simple representation.
    SimpleFaces,
    /// Sector index file of the detailed representation.
    DetailedIndex,
    /// Peripheral mesh file shared between sectors.
    SharedMesh,
}

impl fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeKind::SimpleFaces => "simple-faces",
            DecodeKind::DetailedIndex => "detailed-index",
            DecodeKind::SharedMesh => "shared-mesh",
        };
        write!(f, "{name}")
    }
}

/// Decode failure. Never retried; the owning sector degrades to discarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed {kind} payload: {message}")]
    Malformed { kind: DecodeKind, message: String },
    #[error("unsupported format version {version} in {kind} payload")]
    UnsupportedVersion { kind: DecodeKind, version: u32 },
    #[error("decoder returned {actual} payload where {expected} was expected")]
    UnexpectedPayload {
        expected: DecodeKind,
        actual: DecodeKind,
    },
}

/// Decoded coarse faces.
#[derive(Debug, Clone, PartialEq)]
pub struct FacesGeometry {
    pub face_count: u32,
    /// Renderer-ready buffer, opaque to the loader.
    pub data: Bytes,
}

/// Decoded detailed-sector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexGeometry {
    pub primitive_count: u32,
    pub data: Bytes,
}

/// Decoded shared mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub triangle_count: u32,
    pub data: Bytes,
}

/// Output of one decode call.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Faces(FacesGeometry),
    Index(IndexGeometry),
    Mesh(MeshGeometry),
}

impl DecodedPayload {
    pub fn kind(&self) -> DecodeKind {
        match self {
            DecodedPayload::Faces(_) => DecodeKind::SimpleFaces,
            DecodedPayload::Index(_) => DecodeKind::DetailedIndex,
            DecodedPayload::Mesh(_) => DecodeKind::SharedMesh,
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            DecodedPayload::Faces(faces) => faces.data.len(),
            DecodedPayload::Index(index) => index.data.len(),
            DecodedPayload::Mesh(mesh) => mesh.data.len(),
        }
    }
}

/// Pure decode function, executed on the worker pool.
///
/// Implementations must be stateless with respect to the loader: bytes in,
/// payload out, no access to caches or trackers.
pub trait SectorDecoder: Send + Sync + 'static {
    fn decode(&self, kind: DecodeKind, bytes: Bytes) -> Result<DecodedPayload, DecodeError>;
}

/// Geometry assembled for one sector at one level of detail.
///
/// `Simple` sectors carry faces only; `Detailed` sectors carry the index plus
/// the peripheral meshes, the latter shared with the mesh cache via `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorGeometry {
    pub lod: LevelOfDetail,
    pub faces: Option<FacesGeometry>,
    pub index: Option<IndexGeometry>,
    pub meshes: Vec<Arc<MeshGeometry>>,
}

impl SectorGeometry {
    pub fn simple(faces: FacesGeometry) -> Self {
        Self {
            lod: LevelOfDetail::Simple,
            faces: Some(faces),
            index: None,
            meshes: Vec::new(),
        }
    }

    pub fn detailed(index: IndexGeometry, meshes: Vec<Arc<MeshGeometry>>) -> Self {
        Self {
            lod: LevelOfDetail::Detailed,
            faces: None,
            index: Some(index),
            meshes,
        }
    }

    /// Resident byte estimate used for cache capacity accounting.
    ///
    /// Shared meshes are counted in full for every referencing sector, which
    /// over-counts shared data but keeps eviction pressure conservative.
    pub fn size_bytes(&self) -> usize {
        let faces = self.faces.as_ref().map_or(0, |f| f.data.len());
        let index = self.index.as_ref().map_or(0, |i| i.data.len());
        let meshes: usize = self.meshes.iter().map(|m| m.data.len()).sum();
        faces + index + meshes
    }
}
