#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Multi-pass clustering of ski areas, lifts, and runs.
//!
//! Upstream feeds carry no explicit membership link between a ski area
//! and its lifts and runs, so membership is inferred from geometry and
//! activity tags in six strictly ordered passes over the object store:
//!
//! 1. drop crowdsourced polygons that enclose more than one registry
//!    ski area (shared-ticketing super-relations, not resorts),
//! 2. claim everything inside each crowdsourced polygon,
//! 3. grow each crowdsourced ski area outward in buffered half-km hops,
//! 4. merge registry ski areas into nearby crowdsourced ones, or grow
//!    them the same way,
//! 5. synthesize ski areas from runs nothing claimed,
//! 6. attach statistics, centroid geometry, and a geocoded location.
//!
//! Within a pass, the ski areas of one cursor batch are processed
//! concurrently; two areas racing for the same border object is
//! resolved by the store's append-with-uniqueness, so the object simply
//! ends up belonging to both.

mod augment;
mod buffered;
mod containment;
mod dedupe;
mod merge;
mod pipeline;
mod registry;
mod synthesize;
mod traversal;

use piste_map_store::StoreError;
use thiserror::Error;

pub use merge::{SkiAreaComposer, default_composer};
pub use pipeline::{PipelineSummary, run_pipeline, run_pipeline_with};

/// Distance, in kilometres, a buffered traversal expands around each
/// object per hop.
pub const SEARCH_BUFFER_KM: f64 = 0.5;

/// Distance, in kilometres, a registry ski area searches for
/// cross-source merge candidates.
pub const MERGE_BUFFER_KM: f64 = 0.25;

/// Errors that abort the clustering pipeline.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A store operation failed (recoverable invalid-polygon rejections
    /// are handled before this conversion).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A ski area reached a polygon pass without a usable id.
    #[error("ski area {key} has no id; cannot assign members")]
    MissingSkiAreaId {
        /// Store key of the offending ski area.
        key: String,
    },

    /// A traversal produced a search area that is neither a polygon nor
    /// a multipolygon.
    #[error("unexpected search geometry {kind} while clustering {id}")]
    UnexpectedGeometry {
        /// GeoJSON type name of the geometry.
        kind: String,
        /// Ski-area id being built when it happened.
        id: String,
    },

    /// A traversal query exceeded its TTL.
    #[error("traversal query timed out after {seconds}s while clustering {id}")]
    QueryTimeout {
        /// The TTL that elapsed, in seconds.
        seconds: u64,
        /// Ski-area id being built when it happened.
        id: String,
    },
}
