//! Sectorstream - streaming loader for sector-partitioned 3D models.
//!
//! Massive engineering models are published as octrees of sectors, each
//! available at a compact simple representation and a full-detail one. This
//! library keeps the best affordable subset of those sectors resident:
//! visibility-weighted planning against a download and draw-call budget,
//! fetch and decode pipelines with request coalescing, refcounted geometry
//! caching and an orchestration daemon that reacts to camera movement.
//!
//! # High-Level API
//!
//! Most hosts only need the [`SectorLoader`] facade:
//!
//! ```ignore
//! use std::sync::Arc;
//! use sectorstream::{HttpBinaryFileProvider, LoaderConfig, SectorLoader};
//!
//! let provider = Arc::new(HttpBinaryFileProvider::new()?);
//! let loader = SectorLoader::new(provider, Arc::new(MyDecoder), LoaderConfig::default());
//!
//! loader.add_model(metadata);
//! let mut consumed = loader.subscribe_consumed();
//! loader.update_camera(camera);
//!
//! while let Ok(sector) = consumed.recv().await {
//!     // attach sector.geometry to the scene graph
//! }
//! ```
//!
//! The lower layers (planning in [`culling`], loading in [`repository`],
//! caching in [`cache`]) are public for hosts that need finer control.

pub mod cache;
pub mod culling;
pub mod decode;
pub mod logging;
pub mod math;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod repository;
pub mod telemetry;
pub mod tracker;
pub mod workers;

pub use cache::{CacheConfig, CacheKey, GeometryHandle};
pub use decode::{
    DecodeError, DecodeKind, DecodedPayload, FacesGeometry, IndexGeometry, MeshGeometry,
    SectorDecoder, SectorGeometry,
};
pub use model::{
    Budget, CameraState, ClippingState, ConsumedSector, LevelOfDetail, LoadingHints, ModelId,
    ModelMetadata, SectorId,
};
pub use orchestrator::{LoaderConfig, LoadingState, SceneSink, SectorLoader};
pub use provider::{BinaryFileProvider, FetchConfig, FetchError, HttpBinaryFileProvider};
pub use telemetry::MetricsSnapshot;

/// Version of the sectorstream library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
