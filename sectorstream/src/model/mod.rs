//! Core data model: identifiers, levels of detail, sector metadata and the
//! immutable per-model sector tree.
//!
//! Everything in this module is plain data. Trees are built once when a model
//! is registered and shared immutably (`Arc<SectorTree>`) between the planner,
//! the repository and the orchestrator.

mod metadata;
mod tree;
mod types;

pub use metadata::{
    CoverageFactors, DetailedFile, MetadataError, ModelMetadata, SceneDescription, SectorMetadata,
    SimpleFile,
};
pub use tree::{Ancestors, SectorTree, TreeError};
pub use types::{
    Budget, CameraState, ClippingState, ConsumedSector, LevelOfDetail, LoadingHints, ModelId,
    Projection, SectorCost, SectorId, WantedSector,
};
