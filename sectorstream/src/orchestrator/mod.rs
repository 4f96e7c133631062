//! The loader facade and its background orchestration daemon.
//!
//! [`SectorLoader`] is the single entry point for host applications. It owns
//! a background daemon task that consumes fire-and-forget control messages
//! (camera, budget, clipping, hints, model add/remove), debounces them into
//! planning passes, dispatches the resulting load work to the repository and
//! delivers results through broadcast event streams and an optional
//! [`SceneSink`].
//!
//! # Architecture
//!
//! ```text
//! Host ──► SectorLoader ──► control mpsc ──► OrchestratorDaemon
//!                                               │  debounce + plan
//!                                               │  dispatch batches
//!                                               ▼
//!                                         SectorRepository
//!                                               │
//!                  completions mpsc  ◄──────────┘
//!                        │
//!                        ▼
//!            release / track / sink attach
//!                        │
//!          broadcast ConsumedSector + LoadingState
//! ```
//!
//! # Example
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
//!     println!("{} {} now {}", sector.model, sector.sector, sector.lod);
//! }
//! loader.dispose().await;
//! ```

mod daemon;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use self::daemon::{ControlMessage, OrchestratorDaemon};
use crate::cache::{CacheConfig, GeometryCache, GeometryHandle, MeshFileCache};
use crate::culling::{
    SoftwareCoverageEstimator, VisibilityEstimator, DEFAULT_RASTER_HEIGHT, DEFAULT_RASTER_WIDTH,
};
use crate::decode::SectorDecoder;
use crate::model::{
    Budget, CameraState, ClippingState, ConsumedSector, LoadingHints, ModelId, ModelMetadata,
    SectorId,
};
use crate::provider::{BinaryFileProvider, FetchConfig};
use crate::repository::SectorRepository;
use crate::telemetry::{LoaderMetrics, MetricsSnapshot};
use crate::workers::{default_pool_size, WorkerPool};

/// Quiet window after the last control input before a planning pass runs.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Upper bound on how long continuous input can defer a planning pass.
pub const DEFAULT_AUDIT_WINDOW: Duration = Duration::from_millis(500);

/// Sectors dispatched per occlusion-refiltered batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Capacity of the control and completion channels.
pub const DEFAULT_CONTROL_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the broadcast event channels.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Loader construction parameters.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Budget used until the host sends its first `update_budget`.
    pub budget: Budget,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub debounce_window: Duration,
    pub audit_window: Duration,
    pub batch_size: usize,
    /// Decode worker threads.
    pub decode_workers: usize,
    /// Raster dimensions of the default software coverage estimator.
    pub raster_width: usize,
    pub raster_height: usize,
    pub control_channel_capacity: usize,
    pub event_channel_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            budget: Budget::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            audit_window: DEFAULT_AUDIT_WINDOW,
            batch_size: DEFAULT_BATCH_SIZE,
            decode_workers: default_pool_size(),
            raster_width: DEFAULT_RASTER_WIDTH,
            raster_height: DEFAULT_RASTER_HEIGHT,
            control_channel_capacity: DEFAULT_CONTROL_CHANNEL_CAPACITY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl LoaderConfig {
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_audit_window(mut self, window: Duration) -> Self {
        self.audit_window = window;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers;
        self
    }

    pub fn with_raster_size(mut self, width: usize, height: usize) -> Self {
        self.raster_width = width;
        self.raster_height = height;
        self
    }
}

/// Aggregate progress of the current loading session.
///
/// Counters reset when a planning pass starts with nothing in flight. A pass
/// that dispatches nothing while nothing is in flight reports the idle state
/// `{ false, 0, 0, 0 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub is_loading: bool,
    /// Dispatched loads that have resolved, whether or not they were applied.
    pub items_loaded: usize,
    pub items_requested: usize,
    /// Wanted sectors dropped by the occlusion refilter this session.
    pub items_culled: usize,
}

/// The loader's only write access into the host scene graph.
///
/// Called from the orchestrator daemon; implementations should hand off
/// quickly rather than block it.
pub trait SceneSink: Send + Sync {
    /// Attach `geometry` at the node addressed by `(model, sector)`,
    /// replacing whatever was attached there before.
    fn attach(&self, model: ModelId, sector: SectorId, geometry: &GeometryHandle);

    /// Remove any geometry attached at `(model, sector)`.
    fn detach(&self, model: ModelId, sector: SectorId);
}

/// Streaming loader facade.
///
/// All update methods are fire-and-forget: they enqueue a control message and
/// return immediately. Registration is validated synchronously; registering a
/// duplicate model id or removing an unknown one is a programmer error and
/// panics at the call site.
///
/// Constructors spawn the background daemon and must be called within a Tokio
/// runtime.
pub struct SectorLoader {
    control_tx: mpsc::Sender<ControlMessage>,
    consumed_tx: broadcast::Sender<ConsumedSector>,
    state_tx: broadcast::Sender<LoadingState>,
    registry: Arc<DashMap<ModelId, ModelMetadata>>,
    pool: Arc<WorkerPool>,
    metrics: Arc<LoaderMetrics>,
    shutdown: CancellationToken,
    daemon_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SectorLoader {
    /// Loader with the built-in software coverage estimator and no sink.
    pub fn new<P, D>(provider: Arc<P>, decoder: Arc<D>, config: LoaderConfig) -> Self
    where
        P: BinaryFileProvider,
        D: SectorDecoder,
    {
        let estimator = Box::new(SoftwareCoverageEstimator::new(
            config.raster_width,
            config.raster_height,
        ));
        Self::with_parts(provider, decoder, estimator, None, config)
    }

    /// Loader delivering into `sink` in addition to the event streams.
    pub fn with_sink<P, D>(
        provider: Arc<P>,
        decoder: Arc<D>,
        sink: Arc<dyn SceneSink>,
        config: LoaderConfig,
    ) -> Self
    where
        P: BinaryFileProvider,
        D: SectorDecoder,
    {
        let estimator = Box::new(SoftwareCoverageEstimator::new(
            config.raster_width,
            config.raster_height,
        ));
        Self::with_parts(provider, decoder, estimator, Some(sink), config)
    }

    /// Fully parameterized constructor; the other constructors delegate here.
    pub fn with_parts<P, D>(
        provider: Arc<P>,
        decoder: Arc<D>,
        estimator: Box<dyn VisibilityEstimator>,
        sink: Option<Arc<dyn SceneSink>>,
        config: LoaderConfig,
    ) -> Self
    where
        P: BinaryFileProvider,
        D: SectorDecoder,
    {
        let metrics = Arc::new(LoaderMetrics::new());
        let geometry_cache = Arc::new(GeometryCache::new(
            config.cache.geometry_capacity_bytes,
            Arc::clone(&metrics),
        ));
        let mesh_cache = Arc::new(MeshFileCache::new(
            config.cache.mesh_capacity_bytes,
            Arc::clone(&metrics),
        ));
        let pool = Arc::new(WorkerPool::with_size(config.decode_workers));
        let repository = Arc::new(SectorRepository::new(
            provider,
            decoder,
            Arc::clone(&pool),
            Arc::clone(&geometry_cache),
            Arc::clone(&mesh_cache),
            config.fetch.clone(),
            Arc::clone(&metrics),
        ));

        let registry: Arc<DashMap<ModelId, ModelMetadata>> = Arc::new(DashMap::new());
        let (control_tx, control_rx) = mpsc::channel(config.control_channel_capacity);
        let (consumed_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (state_tx, _) = broadcast::channel(config.event_channel_capacity);

        let daemon = OrchestratorDaemon::new(
            repository,
            estimator,
            sink,
            Arc::clone(&registry),
            geometry_cache,
            Arc::clone(&metrics),
            config,
            control_rx,
            consumed_tx.clone(),
            state_tx.clone(),
        );

        let shutdown = CancellationToken::new();
        let daemon_handle = tokio::spawn(daemon.run(shutdown.clone()));
        info!("sector loader started");

        Self {
            control_tx,
            consumed_tx,
            state_tx,
            registry,
            pool,
            metrics,
            shutdown,
            daemon_handle: Mutex::new(Some(daemon_handle)),
        }
    }

    /// Register a model for streaming.
    ///
    /// # Panics
    ///
    /// Panics if a model with the same id is already registered.
    pub fn add_model(&self, metadata: ModelMetadata) {
        let model = metadata.id;
        match self.registry.entry(model) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                panic!("model {model} is already registered");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(metadata);
            }
        }
        self.send(ControlMessage::ModelAdded(model));
    }

    /// Unregister a model; its resident geometry is released and pending
    /// results for it are filtered from the event streams.
    ///
    /// # Panics
    ///
    /// Panics if no model with this id is registered.
    pub fn remove_model(&self, model: ModelId) {
        if self.registry.remove(&model).is_none() {
            panic!("model {model} is not registered");
        }
        self.send(ControlMessage::ModelRemoved(model));
    }

    pub fn update_camera(&self, camera: CameraState) {
        self.send(ControlMessage::UpdateCamera(camera));
    }

    pub fn update_budget(&self, budget: Budget) {
        self.send(ControlMessage::UpdateBudget(budget));
    }

    pub fn update_clipping(&self, clipping: ClippingState) {
        self.send(ControlMessage::UpdateClipping(clipping));
    }

    pub fn update_loading_hints(&self, hints: LoadingHints) {
        self.send(ControlMessage::UpdateHints(hints));
    }

    /// Subscribe to delivered sectors. Subscribers joining late only see
    /// results delivered after subscribing.
    pub fn subscribe_consumed(&self) -> broadcast::Receiver<ConsumedSector> {
        self.consumed_tx.subscribe()
    }

    /// Subscribe to loading-session progress events.
    pub fn subscribe_loading_state(&self) -> broadcast::Receiver<LoadingState> {
        self.state_tx.subscribe()
    }

    /// Point-in-time copy of the pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the daemon, join it and shut the decode pool down.
    ///
    /// Idempotent. Control messages sent after disposal are dropped with a
    /// warning.
    pub async fn dispose(&self) {
        self.shutdown.cancel();
        let handle = self.daemon_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(error = %error, "loader daemon did not shut down cleanly");
            }
            self.pool.shutdown();
            info!("sector loader disposed");
        }
    }

    fn send(&self, message: ControlMessage) {
        if let Err(error) = self.control_tx.try_send(message) {
            warn!(error = %error, "control message dropped");
        }
    }
}

impl Drop for SectorLoader {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
