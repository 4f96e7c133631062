//! The background task behind [`SectorLoader`](super::SectorLoader).
//!
//! One loop owns every piece of mutable loader state: pending camera and
//! budget values, the resident tracker, session counters and the dispatch
//! ledger. Control messages, load completions and the debounce timer are
//! multiplexed through a single `select!`, so no lock is ever held across an
//! await and results apply in a deterministic order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{LoaderConfig, LoadingState, SceneSink};
use crate::cache::{CacheKey, GeometryCache};
use crate::culling::{plan, PlanRequest, SectorBox, VisibilityEstimator};
use crate::decode::SectorDecoder;
use crate::math::Aabb;
use crate::model::{
    Budget, CameraState, ClippingState, ConsumedSector, LevelOfDetail, LoadingHints, ModelId,
    ModelMetadata, SectorId, WantedSector,
};
use crate::provider::BinaryFileProvider;
use crate::repository::SectorRepository;
use crate::telemetry::LoaderMetrics;
use crate::tracker::ResidentSectorTracker;

/// Placeholder deadline while no pass is pending; that select branch is
/// disabled, so it is never actually slept on.
const FAR_DEADLINE: Duration = Duration::from_secs(3600);

/// Control-plane inputs forwarded by the facade.
#[derive(Debug)]
pub(super) enum ControlMessage {
    UpdateCamera(CameraState),
    UpdateBudget(Budget),
    UpdateClipping(ClippingState),
    UpdateHints(LoadingHints),
    ModelAdded(ModelId),
    ModelRemoved(ModelId),
}

/// A resolved repository load, tagged with the pass that dispatched it.
#[derive(Debug)]
struct LoadCompletion {
    consumed: ConsumedSector,
    generation: u64,
}

/// Progress counters for the current loading session. A session spans from
/// one pass that found work until the loader drains back to idle.
#[derive(Debug, Default)]
struct SessionCounters {
    loaded: usize,
    requested: usize,
    culled: usize,
}

/// Background task that owns all mutable loader state.
pub(super) struct OrchestratorDaemon<P, D> {
    control_rx: mpsc::Receiver<ControlMessage>,
    completion_rx: mpsc::Receiver<LoadCompletion>,
    core: DaemonCore<P, D>,
}

impl<P, D> OrchestratorDaemon<P, D>
where
    P: BinaryFileProvider,
    D: SectorDecoder,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        repository: Arc<SectorRepository<P, D>>,
        estimator: Box<dyn VisibilityEstimator>,
        sink: Option<Arc<dyn SceneSink>>,
        registry: Arc<DashMap<ModelId, ModelMetadata>>,
        geometry_cache: Arc<GeometryCache>,
        metrics: Arc<LoaderMetrics>,
        config: LoaderConfig,
        control_rx: mpsc::Receiver<ControlMessage>,
        consumed_tx: broadcast::Sender<ConsumedSector>,
        state_tx: broadcast::Sender<LoadingState>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(config.control_channel_capacity);
        let now = Instant::now();
        Self {
            control_rx,
            completion_rx,
            core: DaemonCore {
                repository,
                estimator,
                sink,
                registry,
                geometry_cache,
                metrics,
                tracker: ResidentSectorTracker::new(),
                completion_tx,
                consumed_tx,
                state_tx,
                camera: CameraState::default(),
                budget: config.budget,
                clipping: ClippingState::default(),
                hints: LoadingHints::default(),
                debounce_window: config.debounce_window,
                audit_window: config.audit_window,
                batch_size: config.batch_size.max(1),
                dirty: false,
                dirty_since: now,
                last_input: now,
                generation: 0,
                in_flight: 0,
                latest_dispatch: HashMap::new(),
                session: SessionCounters::default(),
            },
        }
    }

    /// Drive the daemon until `shutdown` fires.
    ///
    /// Completions are drained before new control input so the tracker is
    /// current when the next pass plans, and a pass only runs once the
    /// control channel has gone quiet for the debounce window (capped by the
    /// audit window under continuous input).
    pub(super) async fn run(self, shutdown: CancellationToken) {
        let Self {
            mut control_rx,
            mut completion_rx,
            mut core,
        } = self;

        info!(
            debounce_ms = core.debounce_window.as_millis() as u64,
            audit_ms = core.audit_window.as_millis() as u64,
            batch_size = core.batch_size,
            "orchestrator daemon starting"
        );

        loop {
            let deadline = core.pass_deadline();
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("orchestrator daemon shutting down");
                    break;
                }
                Some(completion) = completion_rx.recv() => {
                    core.handle_completion(completion);
                }
                Some(message) = control_rx.recv() => {
                    core.apply_message(message);
                }
                _ = time::sleep_until(deadline.unwrap_or_else(|| Instant::now() + FAR_DEADLINE)),
                        if deadline.is_some() => {
                    core.run_pass().await;
                }
            }
        }

        info!("orchestrator daemon stopped");
    }
}

/// The mutable state and pass logic, separated from the channel ends so the
/// select loop can poll receivers while handlers borrow the core.
struct DaemonCore<P, D> {
    repository: Arc<SectorRepository<P, D>>,
    estimator: Box<dyn VisibilityEstimator>,
    sink: Option<Arc<dyn SceneSink>>,
    registry: Arc<DashMap<ModelId, ModelMetadata>>,
    geometry_cache: Arc<GeometryCache>,
    metrics: Arc<LoaderMetrics>,
    tracker: ResidentSectorTracker,
    completion_tx: mpsc::Sender<LoadCompletion>,
    consumed_tx: broadcast::Sender<ConsumedSector>,
    state_tx: broadcast::Sender<LoadingState>,

    camera: CameraState,
    budget: Budget,
    clipping: ClippingState,
    hints: LoadingHints,

    debounce_window: Duration,
    audit_window: Duration,
    batch_size: usize,

    dirty: bool,
    dirty_since: Instant,
    last_input: Instant,
    /// Monotonic planning-pass counter; every dispatch carries the pass it
    /// came from so stale completions can be told apart.
    generation: u64,
    in_flight: usize,
    /// Newest dispatch generation per sector. A completion only applies if
    /// its generation still matches; the entry leaves the map when it does,
    /// or when a later pass stops wanting the transition.
    latest_dispatch: HashMap<(ModelId, SectorId), u64>,
    session: SessionCounters,
}

impl<P, D> DaemonCore<P, D>
where
    P: BinaryFileProvider,
    D: SectorDecoder,
{
    fn apply_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::UpdateCamera(camera) => self.camera = camera,
            ControlMessage::UpdateBudget(budget) => self.budget = budget,
            ControlMessage::UpdateClipping(clipping) => self.clipping = clipping,
            ControlMessage::UpdateHints(hints) => self.hints = hints,
            ControlMessage::ModelAdded(model) => {
                debug!(model = %model, "model registered");
            }
            ControlMessage::ModelRemoved(model) => self.purge_model(model),
        }
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        let now = Instant::now();
        if !self.dirty {
            self.dirty = true;
            self.dirty_since = now;
        }
        self.last_input = now;
    }

    /// When the next pass should run, or `None` while nothing changed.
    fn pass_deadline(&self) -> Option<Instant> {
        self.dirty.then(|| {
            let debounced = self.last_input + self.debounce_window;
            let audit = self.dirty_since + self.audit_window;
            debounced.min(audit)
        })
    }

    /// Plan against the current inputs and dispatch whatever the resident
    /// set is missing.
    async fn run_pass(&mut self) {
        self.dirty = false;

        if self.hints.suspend_loading || self.camera.in_motion {
            self.metrics.planning_skipped();
            debug!(
                suspended = self.hints.suspend_loading,
                in_motion = self.camera.in_motion,
                "planning pass skipped"
            );
            return;
        }

        self.metrics.planning_pass();
        self.generation += 1;

        let models = self.registered_models();
        let resident = self.resident_bounds(&models);
        let output = plan(
            PlanRequest {
                models: &models,
                camera: self.camera,
                clipping: &self.clipping,
                budget: self.budget,
                resident,
            },
            self.estimator.as_mut(),
            &self.metrics,
        )
        .await;

        let changes: Vec<WantedSector> = output
            .wanted
            .into_iter()
            .filter(|wanted| self.tracker.has_changed(wanted.model, wanted.sector, wanted.lod))
            .collect();

        if changes.is_empty() && self.in_flight == 0 {
            self.reset_session();
            debug!(generation = self.generation, "plan matches resident set, loader idle");
            self.emit_state();
            return;
        }
        if self.in_flight == 0 {
            self.reset_session();
        }

        let mut dispatched = 0usize;
        for batch in changes.chunks(self.batch_size) {
            for wanted in self.refilter(batch) {
                self.dispatch(wanted);
                dispatched += 1;
            }
        }
        // Forget dispatches this plan did not re-issue so their pending
        // completions drop as stale.
        let generation = self.generation;
        self.latest_dispatch.retain(|_, issued| *issued == generation);
        debug!(
            generation,
            changes = changes.len(),
            dispatched,
            "plan changes dispatched"
        );
        self.emit_state();
    }

    /// Drop load intents the estimator now knows are occluded. Unloads and
    /// forced sectors always pass.
    fn refilter(&mut self, batch: &[WantedSector]) -> Vec<WantedSector> {
        let mut boxes = Vec::new();
        for wanted in batch {
            if wanted.lod == LevelOfDetail::Discarded || wanted.is_forced() {
                continue;
            }
            if let Some(sector_box) = self.sector_box(wanted.model, wanted.sector) {
                boxes.push(sector_box);
            }
        }
        let submitted: HashSet<(ModelId, SectorId)> =
            boxes.iter().map(|b| (b.model, b.sector)).collect();
        let visible = self.estimator.filter_occluded(&boxes);

        let mut kept = Vec::with_capacity(batch.len());
        for wanted in batch {
            let key = (wanted.model, wanted.sector);
            if submitted.contains(&key) && !visible.contains(&key) {
                self.session.culled += 1;
                self.metrics.sector_culled();
                debug!(
                    model = %wanted.model,
                    sector = %wanted.sector,
                    "load dropped by occlusion refilter"
                );
                continue;
            }
            kept.push(*wanted);
        }
        kept
    }

    fn dispatch(&mut self, wanted: WantedSector) {
        let Some(model) = self.registry.get(&wanted.model).map(|entry| entry.value().clone())
        else {
            return;
        };
        let generation = self.generation;
        self.latest_dispatch.insert((wanted.model, wanted.sector), generation);
        self.in_flight += 1;
        self.session.requested += 1;

        let repository = Arc::clone(&self.repository);
        let completion_tx = self.completion_tx.clone();
        let sector = wanted.sector;
        let lod = wanted.lod;
        debug!(
            model = %wanted.model,
            sector = %sector,
            lod = %lod,
            generation,
            "sector load dispatched"
        );
        tokio::spawn(async move {
            let consumed = repository.load_sector(&model, sector, lod).await;
            // Send failure only happens at shutdown.
            let _ = completion_tx.send(LoadCompletion { consumed, generation }).await;
        });
    }

    /// Apply one resolved load: retire whatever it replaces, update the
    /// tracker and the sink, then announce it. Results overtaken by a
    /// newer pass, or whose model is gone, only get their cache reference
    /// released.
    fn handle_completion(&mut self, completion: LoadCompletion) {
        let LoadCompletion { consumed, generation } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);
        self.session.loaded += 1;

        let key = (consumed.model, consumed.sector);
        let superseded = self
            .latest_dispatch
            .get(&key)
            .map_or(true, |latest| *latest != generation);
        let removed = !self.registry.contains_key(&consumed.model);

        if superseded || removed {
            if consumed.lod != LevelOfDetail::Discarded {
                self.geometry_cache.release(CacheKey {
                    model: consumed.model,
                    sector: consumed.sector,
                    lod: consumed.lod,
                });
            }
            debug!(
                model = %consumed.model,
                sector = %consumed.sector,
                lod = %consumed.lod,
                superseded,
                removed,
                "stale load result dropped"
            );
            self.emit_state();
            return;
        }
        self.latest_dispatch.remove(&key);

        let previous = self.tracker.current(consumed.model, consumed.sector);
        if previous != LevelOfDetail::Discarded && previous != consumed.lod {
            self.geometry_cache.release(CacheKey {
                model: consumed.model,
                sector: consumed.sector,
                lod: previous,
            });
        }
        self.tracker.update(consumed.model, consumed.sector, consumed.lod);

        if let Some(sink) = &self.sink {
            match &consumed.geometry {
                Some(geometry) => sink.attach(consumed.model, consumed.sector, geometry),
                None => sink.detach(consumed.model, consumed.sector),
            }
        }
        let _ = self.consumed_tx.send(consumed);
        self.emit_state();
    }

    /// Release everything resident for a model the host unregistered and
    /// forget its outstanding dispatches, so their completions drop.
    fn purge_model(&mut self, model: ModelId) {
        self.latest_dispatch.retain(|(entry_model, _), _| *entry_model != model);
        let Some(resident) = self.tracker.remove_model(model) else {
            debug!(model = %model, "model unregistered, nothing resident");
            return;
        };
        let released = resident.len();
        for (sector, lod) in resident {
            self.geometry_cache.release(CacheKey { model, sector, lod });
            if let Some(sink) = &self.sink {
                sink.detach(model, sector);
            }
        }
        info!(model = %model, released, "model unregistered, resident sectors released");
    }

    /// Registry snapshot in id order, so passes see models deterministically.
    fn registered_models(&self) -> Vec<ModelMetadata> {
        let mut models: Vec<ModelMetadata> = self
            .registry
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        models.sort_by_key(|model| model.id);
        models
    }

    /// Bounds of everything currently resident, submitted as occluders.
    fn resident_bounds(&self, models: &[ModelMetadata]) -> Vec<Aabb> {
        let mut bounds = Vec::with_capacity(self.tracker.resident_count());
        for (model, sector, _) in self.tracker.resident_sectors() {
            let Some(metadata) = models.iter().find(|candidate| candidate.id == model) else {
                continue;
            };
            if let Some(sector_meta) = metadata.tree.get(sector) {
                bounds.push(sector_meta.bounds);
            }
        }
        bounds
    }

    fn sector_box(&self, model: ModelId, sector: SectorId) -> Option<SectorBox> {
        let entry = self.registry.get(&model)?;
        let metadata = entry.tree.get(sector)?;
        Some(SectorBox {
            model,
            sector,
            bounds: metadata.bounds,
            coverage: metadata.simple.coverage_factors.mean(),
        })
    }

    fn reset_session(&mut self) {
        self.session = SessionCounters::default();
    }

    fn current_state(&self) -> LoadingState {
        LoadingState {
            is_loading: self.in_flight > 0,
            items_loaded: self.session.loaded,
            items_requested: self.session.requested,
            items_culled: self.session.culled,
        }
    }

    fn emit_state(&self) {
        let _ = self.state_tx.send(self.current_state());
    }
}
