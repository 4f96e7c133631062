//! Loader telemetry for observability.
//!
//! Lock-free atomic counters record pipeline events with minimal overhead;
//! point-in-time snapshots serve host-application dashboards.
//!
//! # Architecture
//!
//! ```text
//! Pipeline Stages ─────► LoaderMetrics ─────► MetricsSnapshot ─────► Host
//!                        (atomic counters)   (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sectorstream::telemetry::LoaderMetrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(LoaderMetrics::new());
//! metrics.sector_requested();
//! metrics.fetch_completed(48_000);
//! metrics.sector_loaded();
//!
//! let snapshot = metrics.snapshot();
//! println!("loaded: {}", snapshot.sectors_loaded);
//! ```

mod metrics;
mod snapshot;

pub use metrics::LoaderMetrics;
pub use snapshot::MetricsSnapshot;
