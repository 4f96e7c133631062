//! Sector loading pipeline: fetch, decode, cache.
//!
//! The repository turns a `(model, sector, level)` request into cached,
//! renderer-ready geometry. Simple sectors are one faces file; detailed
//! sectors are an index file plus peripheral mesh files shared with sibling
//! sectors, fetched concurrently and pooled in the mesh cache.
//!
//! Loads never surface errors to the caller. A fetch that exhausts its
//! retries or a payload that fails to decode degrades the sector to
//! [`LevelOfDetail::Discarded`]; the failure is logged and counted, and the
//! next planning pass may try again.

mod coalesce;

pub use coalesce::{CoalescerStats, LoadCoalescer, Registration};

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheKey, GeometryCache, MeshFileCache, MeshFileKey};
use crate::decode::{
    DecodeError, DecodeKind, DecodedPayload, MeshGeometry, SectorDecoder, SectorGeometry,
};
use crate::model::{
    ConsumedSector, LevelOfDetail, ModelId, ModelMetadata, SectorId, SectorMetadata,
};
use crate::provider::{fetch_with_retry, BinaryFileProvider, FetchConfig};
use crate::telemetry::LoaderMetrics;
use crate::workers::{PoolError, WorkerPool};

/// Why a sector load could not produce geometry. Internal to the pipeline;
/// callers only ever observe the degraded result.
#[derive(Debug, Clone, Error)]
pub(crate) enum LoadError {
    #[error(transparent)]
    Fetch(#[from] crate::provider::FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Broadcast to waiters coalesced onto a sector load.
///
/// Deliberately not the geometry handle itself: every consumer must acquire
/// its own cache reference so release accounting stays one-to-one.
#[derive(Debug, Clone, Copy)]
enum LoadOutcome {
    Loaded,
    Degraded,
}

/// Fetches, decodes and caches sector geometry.
///
/// Cloned `Arc`s of the caches and metrics are shared with the orchestrator;
/// the repository only ever adds entries and bumps refcounts, release is the
/// caller's side of the contract.
pub struct SectorRepository<P, D> {
    provider: Arc<P>,
    decoder: Arc<D>,
    pool: Arc<WorkerPool>,
    geometry_cache: Arc<GeometryCache>,
    mesh_cache: Arc<MeshFileCache>,
    fetch_config: FetchConfig,
    metrics: Arc<LoaderMetrics>,
    sector_loads: LoadCoalescer<CacheKey, LoadOutcome>,
    mesh_loads: LoadCoalescer<MeshFileKey, Result<Arc<MeshGeometry>, LoadError>>,
}

impl<P, D> SectorRepository<P, D>
where
    P: BinaryFileProvider,
    D: SectorDecoder,
{
    pub fn new(
        provider: Arc<P>,
        decoder: Arc<D>,
        pool: Arc<WorkerPool>,
        geometry_cache: Arc<GeometryCache>,
        mesh_cache: Arc<MeshFileCache>,
        fetch_config: FetchConfig,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        Self {
            provider,
            decoder,
            pool,
            geometry_cache,
            mesh_cache,
            fetch_config,
            metrics,
            sector_loads: LoadCoalescer::new(),
            mesh_loads: LoadCoalescer::new(),
        }
    }

    /// Load `sector` of `model` at `lod`.
    ///
    /// Discarded requests resolve immediately without touching the caches.
    /// On success the returned geometry handle carries one cache reference
    /// owned by the caller. Concurrent requests for the same key share a
    /// single fetch + decode.
    pub async fn load_sector(
        &self,
        model: &ModelMetadata,
        sector: SectorId,
        lod: LevelOfDetail,
    ) -> ConsumedSector {
        self.metrics.sector_requested();

        if lod == LevelOfDetail::Discarded {
            return self.discarded(model.id, sector);
        }
        let Some(metadata) = model.tree.get(sector) else {
            warn!(model = %model.id, sector = %sector, "sector absent from tree, discarding");
            self.metrics.sector_degraded();
            return self.discarded(model.id, sector);
        };
        let key = CacheKey {
            model: model.id,
            sector,
            lod,
        };

        loop {
            if let Some(handle) = self.geometry_cache.get(key) {
                return ConsumedSector {
                    model: model.id,
                    sector,
                    lod,
                    geometry: Some(handle),
                };
            }

            match self.sector_loads.register(key) {
                Registration::Wait(mut rx) => {
                    self.metrics.load_coalesced();
                    match rx.recv().await {
                        // Re-check the cache to acquire our own reference.
                        Ok(LoadOutcome::Loaded) => continue,
                        Ok(LoadOutcome::Degraded) => return self.discarded(model.id, sector),
                        // Lead vanished without completing; take over.
                        Err(_) => continue,
                    }
                }
                Registration::Lead => {
                    let started = Instant::now();
                    let result = if lod == LevelOfDetail::Simple {
                        self.load_simple(model, metadata).await
                    } else {
                        self.load_detailed(model, metadata).await
                    };
                    return match result {
                        Ok(geometry) => {
                            let handle = self.geometry_cache.insert(key, Arc::new(geometry));
                            self.sector_loads.complete(&key, LoadOutcome::Loaded);
                            self.metrics.sector_loaded();
                            debug!(
                                key = %key,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "sector loaded"
                            );
                            ConsumedSector {
                                model: model.id,
                                sector,
                                lod,
                                geometry: Some(handle),
                            }
                        }
                        Err(error) => {
                            self.sector_loads.complete(&key, LoadOutcome::Degraded);
                            self.metrics.sector_degraded();
                            warn!(
                                key = %key,
                                error = %error,
                                "sector load failed, degrading to discarded"
                            );
                            self.discarded(model.id, sector)
                        }
                    };
                }
            }
        }
    }

    pub fn sector_coalescer_stats(&self) -> CoalescerStats {
        self.sector_loads.stats()
    }

    pub fn mesh_coalescer_stats(&self) -> CoalescerStats {
        self.mesh_loads.stats()
    }

    fn discarded(&self, model: ModelId, sector: SectorId) -> ConsumedSector {
        ConsumedSector {
            model,
            sector,
            lod: LevelOfDetail::Discarded,
            geometry: None,
        }
    }

    async fn load_simple(
        &self,
        model: &ModelMetadata,
        metadata: &SectorMetadata,
    ) -> Result<SectorGeometry, LoadError> {
        let bytes = fetch_with_retry(
            self.provider.as_ref(),
            &model.base_url,
            &metadata.simple.file_name,
            &self.fetch_config,
            &self.metrics,
        )
        .await?;
        match self.decode_on_pool(DecodeKind::SimpleFaces, bytes).await? {
            DecodedPayload::Faces(faces) => Ok(SectorGeometry::simple(faces)),
            other => Err(unexpected(DecodeKind::SimpleFaces, &other)),
        }
    }

    /// Fetch the index and every peripheral mesh concurrently. Both branches
    /// run to completion even when the other fails, so in-flight mesh loads
    /// always reach their coalescer completion.
    async fn load_detailed(
        &self,
        model: &ModelMetadata,
        metadata: &SectorMetadata,
    ) -> Result<SectorGeometry, LoadError> {
        let detailed = &metadata.detailed;

        let index = async {
            let bytes = fetch_with_retry(
                self.provider.as_ref(),
                &model.base_url,
                &detailed.file_name,
                &self.fetch_config,
                &self.metrics,
            )
            .await?;
            match self.decode_on_pool(DecodeKind::DetailedIndex, bytes).await? {
                DecodedPayload::Index(index) => Ok(index),
                other => Err(unexpected(DecodeKind::DetailedIndex, &other)),
            }
        };

        let meshes = async {
            let results = futures::future::join_all(
                detailed
                    .peripheral_files
                    .iter()
                    .map(|file_name| self.shared_mesh(model, file_name)),
            )
            .await;
            let mut meshes = Vec::with_capacity(results.len());
            for result in results {
                meshes.push(result?);
            }
            Ok::<_, LoadError>(meshes)
        };

        let (index, meshes) = futures::join!(index, meshes);
        Ok(SectorGeometry::detailed(index?, meshes?))
    }

    /// Resolve one peripheral mesh, preferring the mesh cache. Concurrent
    /// requests for the same file share a single fetch + decode; waiters can
    /// take the `Arc` straight off the broadcast because mesh entries carry
    /// no per-consumer accounting.
    async fn shared_mesh(
        &self,
        model: &ModelMetadata,
        file_name: &str,
    ) -> Result<Arc<MeshGeometry>, LoadError> {
        let key = MeshFileKey {
            model: model.id,
            file_name: file_name.to_string(),
        };

        loop {
            if let Some(mesh) = self.mesh_cache.get(&key) {
                return Ok(mesh);
            }

            match self.mesh_loads.register(key.clone()) {
                Registration::Wait(mut rx) => {
                    self.metrics.load_coalesced();
                    match rx.recv().await {
                        Ok(outcome) => return outcome,
                        Err(_) => continue,
                    }
                }
                Registration::Lead => {
                    let outcome = self.fetch_and_decode_mesh(model, file_name).await;
                    if let Ok(mesh) = &outcome {
                        self.mesh_cache.insert(key.clone(), Arc::clone(mesh));
                    }
                    self.mesh_loads.complete(&key, outcome.clone());
                    return outcome;
                }
            }
        }
    }

    async fn fetch_and_decode_mesh(
        &self,
        model: &ModelMetadata,
        file_name: &str,
    ) -> Result<Arc<MeshGeometry>, LoadError> {
        let bytes = fetch_with_retry(
            self.provider.as_ref(),
            &model.base_url,
            file_name,
            &self.fetch_config,
            &self.metrics,
        )
        .await?;
        match self.decode_on_pool(DecodeKind::SharedMesh, bytes).await? {
            DecodedPayload::Mesh(mesh) => Ok(Arc::new(mesh)),
            other => Err(unexpected(DecodeKind::SharedMesh, &other)),
        }
    }

    /// Run a decode on the worker pool, timing the decode itself rather
    /// than the queue wait.
    async fn decode_on_pool(
        &self,
        kind: DecodeKind,
        bytes: Bytes,
    ) -> Result<DecodedPayload, LoadError> {
        let decoder = Arc::clone(&self.decoder);
        let (result, elapsed) = self
            .pool
            .post_work(move || {
                let started = Instant::now();
                let result = decoder.decode(kind, bytes);
                (result, started.elapsed())
            })
            .await?;
        match result {
            Ok(payload) => {
                self.metrics.decode_completed(elapsed.as_micros() as u64);
                Ok(payload)
            }
            Err(error) => {
                self.metrics.decode_failed();
                Err(error.into())
            }
        }
    }
}

fn unexpected(expected: DecodeKind, payload: &DecodedPayload) -> LoadError {
    LoadError::Decode(DecodeError::UnexpectedPayload {
        expected,
        actual: payload.kind(),
    })
}
