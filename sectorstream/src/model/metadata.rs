//! Per-sector metadata and the serializable scene description.
//!
//! Models ship a JSON scene description listing every sector with its bounds
//! and file descriptors. The loader parses this once at registration and
//! never mutates it afterwards.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tree::{SectorTree, TreeError};
use super::types::{LevelOfDetail, ModelId, SectorCost, SectorId};
use crate::math::Aabb;

/// Screen-coverage factors of a sector's simple representation, one per
/// dominant viewing axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageFactors {
    pub xy: f32,
    pub yz: f32,
    pub xz: f32,
}

impl CoverageFactors {
    /// Mean of the three axis factors, used as the per-pixel weight when the
    /// estimator rasterizes this sector's bounds.
    pub fn mean(&self) -> f32 {
        (self.xy + self.yz + self.xz) / 3.0
    }
}

/// Descriptor of the coarse faces file backing `LevelOfDetail::Simple`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleFile {
    pub file_name: String,
    /// Estimated transfer size in bytes.
    pub download_size: u64,
    pub estimated_draw_calls: u32,
    pub coverage_factors: CoverageFactors,
}

/// Descriptor of the index + peripheral mesh files backing
/// `LevelOfDetail::Detailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedFile {
    pub file_name: String,
    /// Mesh files shared with sibling sectors, fetched alongside the index.
    #[serde(default)]
    pub peripheral_files: Vec<String>,
    /// Estimated transfer size in bytes, index and peripherals combined.
    pub download_size: u64,
    pub estimated_draw_calls: u32,
}

/// Static metadata for one sector of a model's octree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorMetadata {
    pub id: SectorId,
    /// Absent only on the root sector.
    pub parent_id: Option<SectorId>,
    #[serde(default)]
    pub children: Vec<SectorId>,
    /// Octree depth, root at 0.
    pub depth: u32,
    /// Slash-separated octant path from the root, e.g. `"0/2/5/"`.
    pub path: String,
    pub bounds: Aabb,
    pub simple: SimpleFile,
    pub detailed: DetailedFile,
}

impl SectorMetadata {
    /// Estimated cost of holding this sector at `lod`.
    pub fn cost(&self, lod: LevelOfDetail) -> SectorCost {
        match lod {
            LevelOfDetail::Discarded => SectorCost::default(),
            LevelOfDetail::Simple => {
                SectorCost::new(self.simple.download_size, self.simple.estimated_draw_calls)
            }
            LevelOfDetail::Detailed => SectorCost::new(
                self.detailed.download_size,
                self.detailed.estimated_draw_calls,
            ),
        }
    }
}

/// On-disk scene description format: a version tag plus the flat sector list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    #[serde(default)]
    pub version: u32,
    pub sectors: Vec<SectorMetadata>,
}

/// Failure to turn a scene description into a registrable model.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("scene description is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Everything the loader needs to stream one model.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub id: ModelId,
    /// Base URL all of this model's file names resolve against.
    pub base_url: String,
    pub tree: Arc<SectorTree>,
}

impl ModelMetadata {
    /// Build model metadata from an already-parsed sector list.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] when the sector list does not form a valid
    /// tree (duplicate ids, dangling parents, multiple roots).
    pub fn new(
        id: ModelId,
        base_url: impl Into<String>,
        sectors: Vec<SectorMetadata>,
    ) -> Result<Self, TreeError> {
        Ok(Self {
            id,
            base_url: base_url.into(),
            tree: Arc::new(SectorTree::build(sectors)?),
        })
    }

    /// Parse a JSON scene description and build model metadata from it.
    pub fn from_scene_json(
        id: ModelId,
        base_url: impl Into<String>,
        json: &str,
    ) -> Result<Self, MetadataError> {
        let description: SceneDescription = serde_json::from_str(json)?;
        Ok(Self::new(id, base_url, description.sectors)?)
    }
}
