//! Deciding what deserves to be resident: coverage estimation, per-pass
//! level assignment, and the budgeted planner on top of both.

mod estimator;
mod planner;
mod taken;

pub use estimator::{
    CoverageMap, EstimatorError, EstimatorScene, SectorBox, SoftwareCoverageEstimator,
    VisibilityEstimator, DEFAULT_RASTER_HEIGHT, DEFAULT_RASTER_WIDTH,
};
pub use planner::{plan, PlanOutput, PlanRequest, PlanSummary};
pub use taken::TakenSectorTree;

#[cfg(test)]
pub use estimator::tests::{MockEstimatorState, MockVisibilityEstimator};
