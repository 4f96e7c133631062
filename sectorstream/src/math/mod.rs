//! Geometry math shared by the culling planner and the visibility estimator.

mod aabb;
mod frustum;

pub use aabb::Aabb;
pub use frustum::{aabb_passes_clip, ClipMode, Frustum, Plane};
