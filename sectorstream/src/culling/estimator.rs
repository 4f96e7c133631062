//! Screen-coverage estimation for sector prioritization.
//!
//! The planner wants to know how much of the screen each sector's bounds
//! would cover, with already-resident geometry counted as occluders. That
//! is naturally a GPU job (render id-encoded boxes, read back); the
//! [`VisibilityEstimator`] trait keeps the planner independent of any
//! graphics API, and [`SoftwareCoverageEstimator`] ships a deterministic
//! low-resolution rasterizer good enough for prioritization.

use std::collections::{HashMap, HashSet};

use futures::future::{ready, BoxFuture};
use glam::Mat4;
use thiserror::Error;

use crate::math::Aabb;
use crate::model::{ModelId, SectorId};

pub const DEFAULT_RASTER_WIDTH: usize = 64;
pub const DEFAULT_RASTER_HEIGHT: usize = 64;

/// One candidate (or occluder) box submitted to the estimator.
#[derive(Debug, Clone)]
pub struct SectorBox {
    pub model: ModelId,
    pub sector: SectorId,
    pub bounds: Aabb,
    /// Per-pixel weight factor, typically the mean coverage factor of the
    /// sector's simple representation.
    pub coverage: f32,
}

/// Everything one coverage estimate sees.
#[derive(Debug, Clone, Default)]
pub struct EstimatorScene {
    pub view_projection: Mat4,
    pub candidates: Vec<SectorBox>,
    /// Bounds of geometry already resident, rendered depth-only so hidden
    /// candidates score zero.
    pub occluders: Vec<Aabb>,
}

/// Accumulated coverage weight per sector.
pub type CoverageMap = HashMap<(ModelId, SectorId), f32>;

#[derive(Debug, Clone, Error)]
#[error("visibility estimation failed: {message}")]
pub struct EstimatorError {
    pub message: String,
}

impl EstimatorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Coverage estimation capability.
///
/// `estimate` renders the scene and accumulates per-sector weights; the
/// readback is a suspension point for GPU implementations, hence the boxed
/// future. `filter_occluded` answers against the buffers of the most recent
/// estimate without re-rendering, so the orchestrator can cheaply re-check
/// a batch just before dispatch.
pub trait VisibilityEstimator: Send + Sync {
    fn estimate(
        &mut self,
        scene: EstimatorScene,
    ) -> BoxFuture<'_, Result<CoverageMap, EstimatorError>>;

    /// Subset of `candidates` still visible against the last estimate's
    /// occluder depth. Before any estimate, everything passes.
    fn filter_occluded(&self, candidates: &[SectorBox]) -> HashSet<(ModelId, SectorId)>;
}

/// Projected axis-aligned screen footprint of a box.
struct ScreenRect {
    x0: usize,
    x1: usize,
    y0: usize,
    y1: usize,
    /// Depth of the corner nearest the camera, in `[0, 1]`.
    min_depth: f32,
    /// Depth of the corner farthest from the camera, in `[0, 1]`.
    max_depth: f32,
}

/// Deterministic software implementation: a small id + depth raster.
///
/// Occluders write their far-side depth and candidates test their near-side
/// depth, so occlusion errs toward keeping sectors visible. Covered pixels
/// are weighted by a radial falloff favoring the screen center.
pub struct SoftwareCoverageEstimator {
    width: usize,
    height: usize,
    occluder_depth: Vec<f32>,
    depth: Vec<f32>,
    ids: Vec<Option<(ModelId, SectorId)>>,
    weights: Vec<f32>,
    last_view_projection: Mat4,
    has_frame: bool,
}

impl SoftwareCoverageEstimator {
    pub fn new(width: usize, height: usize) -> Self {
        let pixels = width * height;
        Self {
            width,
            height,
            occluder_depth: vec![f32::INFINITY; pixels],
            depth: vec![f32::INFINITY; pixels],
            ids: vec![None; pixels],
            weights: vec![0.0; pixels],
            last_view_projection: Mat4::IDENTITY,
            has_frame: false,
        }
    }

    fn rasterize(&mut self, scene: &EstimatorScene) -> CoverageMap {
        self.last_view_projection = scene.view_projection;
        self.has_frame = true;

        self.occluder_depth.fill(f32::INFINITY);
        for occluder in &scene.occluders {
            if let Some(rect) = project(&scene.view_projection, occluder, self.width, self.height)
            {
                for pixel in pixel_range(&rect, self.width) {
                    self.occluder_depth[pixel] = self.occluder_depth[pixel].min(rect.max_depth);
                }
            }
        }

        self.depth.copy_from_slice(&self.occluder_depth);
        self.ids.fill(None);
        for candidate in &scene.candidates {
            if candidate.coverage <= 0.0 {
                continue;
            }
            let Some(rect) =
                project(&scene.view_projection, &candidate.bounds, self.width, self.height)
            else {
                continue;
            };
            for pixel in pixel_range(&rect, self.width) {
                if rect.min_depth < self.depth[pixel] {
                    self.depth[pixel] = rect.min_depth;
                    self.ids[pixel] = Some((candidate.model, candidate.sector));
                    self.weights[pixel] = candidate.coverage;
                }
            }
        }

        let mut coverage = CoverageMap::new();
        for (pixel, id) in self.ids.iter().enumerate() {
            if let Some(key) = id {
                *coverage.entry(*key).or_insert(0.0) +=
                    self.weights[pixel] * self.falloff_at(pixel);
            }
        }
        coverage
    }

    /// Center-favoring radial falloff over normalized screen coordinates:
    /// 1 at the center, 0 at the corners.
    fn falloff_at(&self, pixel: usize) -> f32 {
        let px = (pixel % self.width) as f32 + 0.5;
        let py = (pixel / self.width) as f32 + 0.5;
        let nx = px / self.width as f32 * 2.0 - 1.0;
        let ny = py / self.height as f32 * 2.0 - 1.0;
        (1.0 - (nx * nx + ny * ny) * 0.5).max(0.0)
    }
}

impl Default for SoftwareCoverageEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RASTER_WIDTH, DEFAULT_RASTER_HEIGHT)
    }
}

impl VisibilityEstimator for SoftwareCoverageEstimator {
    fn estimate(
        &mut self,
        scene: EstimatorScene,
    ) -> BoxFuture<'_, Result<CoverageMap, EstimatorError>> {
        let coverage = self.rasterize(&scene);
        Box::pin(ready(Ok(coverage)))
    }

    fn filter_occluded(&self, candidates: &[SectorBox]) -> HashSet<(ModelId, SectorId)> {
        if !self.has_frame {
            return candidates
                .iter()
                .map(|c| (c.model, c.sector))
                .collect();
        }

        let mut visible = HashSet::new();
        'candidates: for candidate in candidates {
            let Some(rect) = project(
                &self.last_view_projection,
                &candidate.bounds,
                self.width,
                self.height,
            ) else {
                continue;
            };
            for pixel in pixel_range(&rect, self.width) {
                if rect.min_depth < self.occluder_depth[pixel] {
                    visible.insert((candidate.model, candidate.sector));
                    continue 'candidates;
                }
            }
        }
        visible
    }
}

fn pixel_range(rect: &ScreenRect, width: usize) -> impl Iterator<Item = usize> + '_ {
    (rect.y0..=rect.y1).flat_map(move |y| (rect.x0..=rect.x1).map(move |x| y * width + x))
}

fn project(view_projection: &Mat4, bounds: &Aabb, width: usize, height: usize) -> Option<ScreenRect> {
    let mut min_x = f32::MAX;
    let mut max_x = f32::MIN;
    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;
    let mut min_depth = f32::MAX;
    let mut max_depth = f32::MIN;
    let mut projected_any = false;
    let mut behind_any = false;

    for corner in bounds.corners() {
        let clip = *view_projection * corner.extend(1.0);
        if clip.w <= f32::EPSILON {
            behind_any = true;
            continue;
        }
        let ndc = clip.truncate() / clip.w;
        min_x = min_x.min(ndc.x);
        max_x = max_x.max(ndc.x);
        min_y = min_y.min(ndc.y);
        max_y = max_y.max(ndc.y);
        min_depth = min_depth.min(ndc.z);
        max_depth = max_depth.max(ndc.z);
        projected_any = true;
    }

    if !projected_any {
        // Entirely behind the camera.
        return None;
    }
    if behind_any {
        // Straddles the camera plane; the projection is unbounded, so cover
        // the whole viewport at the near plane.
        return Some(ScreenRect {
            x0: 0,
            x1: width - 1,
            y0: 0,
            y1: height - 1,
            min_depth: 0.0,
            max_depth: 1.0,
        });
    }
    if max_x < -1.0 || min_x > 1.0 || max_y < -1.0 || min_y > 1.0 || min_depth > 1.0 {
        return None;
    }

    let to_pixel = |ndc: f32, size: usize| -> usize {
        let clamped = ndc.clamp(-1.0, 1.0);
        (((clamped * 0.5 + 0.5) * size as f32) as usize).min(size - 1)
    };

    Some(ScreenRect {
        x0: to_pixel(min_x, width),
        x1: to_pixel(max_x, width),
        y0: to_pixel(min_y, height),
        y1: to_pixel(max_y, height),
        min_depth: min_depth.clamp(0.0, 1.0),
        max_depth: max_depth.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    use glam::Vec3;
    use parking_lot::Mutex;

    /// Scriptable estimator: returns preset weights, optionally fails, and
    /// reports a preset visible set (`None` keeps everything visible).
    /// Records the last scene submitted so tests can inspect it.
    #[derive(Default)]
    pub struct MockEstimatorState {
        pub weights: Mutex<CoverageMap>,
        pub visible: Mutex<Option<HashSet<(ModelId, SectorId)>>>,
        pub fail: AtomicBool,
        pub estimates: AtomicU32,
        pub last_scene: Mutex<Option<EstimatorScene>>,
    }

    #[derive(Default)]
    pub struct MockVisibilityEstimator {
        pub state: Arc<MockEstimatorState>,
    }

    impl MockVisibilityEstimator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_weight(&self, model: ModelId, sector: SectorId, weight: f32) {
            self.state.weights.lock().insert((model, sector), weight);
        }
    }

    impl VisibilityEstimator for MockVisibilityEstimator {
        fn estimate(
            &mut self,
            scene: EstimatorScene,
        ) -> BoxFuture<'_, Result<CoverageMap, EstimatorError>> {
            self.state.estimates.fetch_add(1, Ordering::SeqCst);
            *self.state.last_scene.lock() = Some(scene);
            let result = if self.state.fail.load(Ordering::SeqCst) {
                Err(EstimatorError::new("injected estimator failure"))
            } else {
                Ok(self.state.weights.lock().clone())
            };
            Box::pin(ready(result))
        }

        fn filter_occluded(&self, candidates: &[SectorBox]) -> HashSet<(ModelId, SectorId)> {
            let keys: HashSet<(ModelId, SectorId)> =
                candidates.iter().map(|c| (c.model, c.sector)).collect();
            match self.state.visible.lock().as_ref() {
                Some(visible) => keys.intersection(visible).copied().collect(),
                None => keys,
            }
        }
    }

    fn looking_at_origin() -> Mat4 {
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y)
    }

    fn candidate(sector: u64, bounds: Aabb) -> SectorBox {
        SectorBox {
            model: ModelId(1),
            sector: SectorId(sector),
            bounds,
            coverage: 1.0,
        }
    }

    async fn estimate(
        estimator: &mut SoftwareCoverageEstimator,
        scene: EstimatorScene,
    ) -> CoverageMap {
        estimator.estimate(scene).await.unwrap()
    }

    #[tokio::test]
    async fn test_visible_box_accumulates_coverage() {
        let mut estimator = SoftwareCoverageEstimator::new(32, 32);
        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: vec![candidate(1, Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)))],
            occluders: Vec::new(),
        };

        let coverage = estimate(&mut estimator, scene).await;
        assert!(coverage[&(ModelId(1), SectorId(1))] > 0.0);
    }

    #[tokio::test]
    async fn test_occluder_in_front_hides_candidate() {
        let mut estimator = SoftwareCoverageEstimator::new(32, 32);
        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: vec![candidate(1, Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)))],
            // Between the camera and the candidate, wider than it.
            occluders: vec![Aabb::new(Vec3::new(-2.0, -2.0, 4.0), Vec3::new(2.0, 2.0, 6.0))],
        };

        let coverage = estimate(&mut estimator, scene).await;
        assert!(!coverage.contains_key(&(ModelId(1), SectorId(1))));
    }

    #[tokio::test]
    async fn test_candidate_in_front_of_occluder_survives() {
        let mut estimator = SoftwareCoverageEstimator::new(32, 32);
        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: vec![candidate(
                1,
                Aabb::new(Vec3::new(-1.0, -1.0, 4.0), Vec3::new(1.0, 1.0, 6.0)),
            )],
            // Behind the candidate.
            occluders: vec![Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))],
        };

        let coverage = estimate(&mut estimator, scene).await;
        assert!(coverage[&(ModelId(1), SectorId(1))] > 0.0);
    }

    #[tokio::test]
    async fn test_nearer_candidate_wins_shared_pixels() {
        let mut estimator = SoftwareCoverageEstimator::new(32, 32);
        let near = candidate(1, Aabb::new(Vec3::new(-1.0, -1.0, 4.0), Vec3::new(1.0, 1.0, 5.0)));
        let far = candidate(2, Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 0.0)));
        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: vec![far.clone(), near.clone()],
            occluders: Vec::new(),
        };

        let coverage = estimate(&mut estimator, scene).await;
        let near_weight = coverage.get(&(ModelId(1), SectorId(1))).copied().unwrap_or(0.0);
        let far_weight = coverage.get(&(ModelId(1), SectorId(2))).copied().unwrap_or(0.0);
        assert!(near_weight > 0.0);
        assert!(near_weight > far_weight);
    }

    #[tokio::test]
    async fn test_centered_box_outscores_peripheral_box() {
        let mut estimator = SoftwareCoverageEstimator::new(64, 64);
        let centered = candidate(1, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
        let peripheral = candidate(
            2,
            Aabb::new(Vec3::new(4.5, -0.5, -0.5), Vec3::new(5.5, 0.5, 0.5)),
        );
        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: vec![centered, peripheral],
            occluders: Vec::new(),
        };

        let coverage = estimate(&mut estimator, scene).await;
        let center_weight = coverage.get(&(ModelId(1), SectorId(1))).copied().unwrap_or(0.0);
        let edge_weight = coverage.get(&(ModelId(1), SectorId(2))).copied().unwrap_or(0.0);
        assert!(edge_weight > 0.0);
        assert!(center_weight > edge_weight);
    }

    #[tokio::test]
    async fn test_box_around_camera_is_conservatively_visible() {
        let mut estimator = SoftwareCoverageEstimator::new(16, 16);
        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: vec![candidate(1, Aabb::new(Vec3::splat(-50.0), Vec3::splat(50.0)))],
            occluders: Vec::new(),
        };

        let coverage = estimate(&mut estimator, scene).await;
        assert!(coverage[&(ModelId(1), SectorId(1))] > 0.0);
    }

    #[tokio::test]
    async fn test_filter_occluded_uses_last_frame() {
        let mut estimator = SoftwareCoverageEstimator::new(32, 32);
        let blocked = candidate(1, Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let clear = candidate(
            2,
            Aabb::new(Vec3::new(-1.0, -1.0, 7.0), Vec3::new(1.0, 1.0, 8.0)),
        );

        // Before any estimate everything passes.
        let visible = estimator.filter_occluded(&[blocked.clone(), clear.clone()]);
        assert_eq!(visible.len(), 2);

        let scene = EstimatorScene {
            view_projection: looking_at_origin(),
            candidates: Vec::new(),
            occluders: vec![Aabb::new(Vec3::new(-2.0, -2.0, 4.0), Vec3::new(2.0, 2.0, 6.0))],
        };
        estimate(&mut estimator, scene).await;

        let visible = estimator.filter_occluded(&[blocked, clear]);
        assert!(!visible.contains(&(ModelId(1), SectorId(1))));
        assert!(visible.contains(&(ModelId(1), SectorId(2))));
    }

    #[tokio::test]
    async fn test_empty_scene_yields_empty_coverage() {
        let mut estimator = SoftwareCoverageEstimator::default();
        let coverage = estimate(&mut estimator, EstimatorScene::default()).await;
        assert!(coverage.is_empty());
    }
}
