//! Identifier, budget and streaming event types.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::cache::GeometryHandle;
use crate::math::{ClipMode, Plane};

/// Identifier for a registered model, assigned by the caller.
///
/// Must be unique within one loader instance; registering the same id twice
/// is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Identifier for one sector inside a model's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorId(pub u64);

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Level of detail a sector can be held at.
///
/// Ordered by fidelity: `Discarded < Simple < Detailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LevelOfDetail {
    /// Not resident; any previously delivered geometry should be dropped.
    #[default]
    Discarded,
    /// Coarse faces representation.
    Simple,
    /// Full-resolution representation (index plus peripheral meshes).
    Detailed,
}

impl fmt::Display for LevelOfDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LevelOfDetail::Discarded => "discarded",
            LevelOfDetail::Simple => "simple",
            LevelOfDetail::Detailed => "detailed",
        };
        write!(f, "{name}")
    }
}

/// A planner decision: hold `sector` of `model` at `lod`.
///
/// `priority` is the normalized screen-coverage share in `[0, 1]`, or
/// `f32::INFINITY` for proximity/clip-forced sectors that bypass the budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WantedSector {
    pub model: ModelId,
    pub sector: SectorId,
    pub lod: LevelOfDetail,
    pub priority: f32,
}

impl WantedSector {
    /// True for proximity/clip-forced entries that bypass budget admission.
    pub fn is_forced(&self) -> bool {
        self.priority.is_infinite()
    }
}

/// A resolved load: the geometry now standing in for `sector` of `model`.
///
/// `geometry` is absent for `Discarded` results, including loads degraded by
/// unrecoverable fetch or decode failure.
#[derive(Debug, Clone)]
pub struct ConsumedSector {
    pub model: ModelId,
    pub sector: SectorId,
    pub lod: LevelOfDetail,
    pub geometry: Option<GeometryHandle>,
}

/// Resource ceiling for one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    /// Upper bound on the summed download-size estimates of admitted sectors.
    pub download_size_bytes: u64,
    /// Upper bound on the summed draw-call estimates of admitted sectors.
    pub max_draw_calls: u32,
    /// Distance (world units) within which sectors are forced to `Detailed`
    /// regardless of budget.
    pub high_detail_proximity_threshold: f32,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            download_size_bytes: 32 * 1024 * 1024,
            max_draw_calls: 2000,
            high_detail_proximity_threshold: 10.0,
        }
    }
}

/// Additive cost of holding a sector resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectorCost {
    pub download_size: u64,
    pub draw_calls: u32,
}

impl SectorCost {
    pub fn new(download_size: u64, draw_calls: u32) -> Self {
        Self {
            download_size,
            draw_calls,
        }
    }

    /// True when this total stays inside `budget` in both dimensions.
    pub fn fits_within(&self, budget: &Budget) -> bool {
        self.download_size <= budget.download_size_bytes && self.draw_calls <= budget.max_draw_calls
    }
}

impl Add for SectorCost {
    type Output = SectorCost;

    fn add(self, rhs: SectorCost) -> SectorCost {
        SectorCost {
            download_size: self.download_size + rhs.download_size,
            draw_calls: self.draw_calls + rhs.draw_calls,
        }
    }
}

impl AddAssign for SectorCost {
    fn add_assign(&mut self, rhs: SectorCost) {
        self.download_size += rhs.download_size;
        self.draw_calls += rhs.draw_calls;
    }
}

impl Sum for SectorCost {
    fn sum<I: Iterator<Item = SectorCost>>(iter: I) -> SectorCost {
        iter.fold(SectorCost::default(), Add::add)
    }
}

/// Perspective projection parameters.
///
/// Kept as parameters rather than a bare matrix so the planner can derive the
/// reduced-far-plane projection used by the proximity pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_3,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

impl Projection {
    /// Projection matrix (right-handed, zero-to-one depth).
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Same projection with a different far plane.
    pub fn with_far(&self, far: f32) -> Projection {
        Projection { far, ..*self }
    }
}

/// Camera pose driving a planning pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Projection,
    /// While true, planning passes are skipped entirely.
    pub in_motion: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            view: Mat4::IDENTITY,
            projection: Projection::default(),
            in_motion: false,
        }
    }
}

impl CameraState {
    /// Combined view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.view
    }

    /// View-projection with the far plane pulled in to `far`.
    pub fn view_projection_with_far(&self, far: f32) -> Mat4 {
        self.projection.with_far(far).matrix() * self.view
    }
}

/// Active clip planes and how they combine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClippingState {
    pub planes: Vec<Plane>,
    pub mode: ClipMode,
}

/// Caller hints steering the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingHints {
    /// While true, planning passes are skipped and nothing is dispatched.
    pub suspend_loading: bool,
}
