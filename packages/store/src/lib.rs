#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Object store interface for the clustering pipeline.
//!
//! The pipeline never sees a query language; it talks to the narrow
//! [`ObjectStore`] trait. The backing implementation is expected to be a
//! geospatial document store with polygon predicates and atomic batch
//! updates. [`MemoryStore`] is the in-process reference implementation
//! (R-tree envelope index plus exact `geo` predicates).
//!
//! Query polygons that a backing store would reject produce
//! [`StoreError::InvalidPolygon`] with one of three recognized messages;
//! callers classify those via [`StoreError::is_recoverable`] and continue
//! with an empty result.

pub mod memory;

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use piste_map_models::{Activity, MapObject, SkiArea, Source};
use thiserror::Error;

pub use memory::MemoryStore;

/// Maximum number of ski areas a cursor hands out per batch.
pub const SKI_AREA_BATCH_SIZE: usize = 50;

/// TTL a backing store should apply to traversal queries.
pub const TRAVERSAL_QUERY_TTL: Duration = Duration::from_secs(120);

/// TTL a backing store should apply to ski-area enumeration cursors.
pub const ENUMERATION_TTL: Duration = Duration::from_secs(3600);

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected a query polygon.
    #[error("{message}")]
    InvalidPolygon {
        /// The store's rejection message.
        message: String,
    },

    /// A referenced object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A stored geometry could not be interpreted.
    #[error("malformed stored geometry on object {key}")]
    MalformedGeometry {
        /// Key of the offending object.
        key: String,
    },
}

/// Rejection messages a geospatial backing store emits for query
/// polygons it cannot index. These are recoverable: the caller logs the
/// offending geometry and continues with an empty result.
const RECOVERABLE_POLYGON_MESSAGES: &[&str] = &[
    "Polygon is not valid",
    "Invalid loop in polygon",
    "Loop not closed",
];

impl StoreError {
    /// Whether this error is a recognized invalid-polygon rejection that
    /// the pipeline recovers from locally.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidPolygon { message } => RECOVERABLE_POLYGON_MESSAGES
                .iter()
                .any(|recognized| message.contains(recognized)),
            Self::NotFound { .. } | Self::MalformedGeometry { .. } => false,
        }
    }
}

/// Spatial predicate for [`ObjectStore::nearby`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicate {
    /// Object geometry intersects the query polygon.
    Intersects,
    /// Object geometry lies entirely within the query polygon.
    Contains,
}

/// Filter for ski-area enumeration.
#[derive(Debug, Clone, Default)]
pub struct SkiAreaFilter {
    /// Restrict to a single upstream feed.
    pub source: Option<Source>,
    /// Restrict to ski areas whose geometry is a polygon/multipolygon.
    pub only_polygons: bool,
    /// Restrict to ski areas whose geometry lies within this polygon.
    pub within_polygon: Option<geojson::Geometry>,
}

impl SkiAreaFilter {
    /// Filter on a single upstream feed.
    #[must_use]
    pub const fn source(source: Source) -> Self {
        Self {
            source: Some(source),
            only_polygons: false,
            within_polygon: None,
        }
    }

    /// Additionally restrict to polygon ski areas.
    #[must_use]
    pub const fn polygons(mut self) -> Self {
        self.only_polygons = true;
        self
    }

    /// Additionally restrict to ski areas inside `polygon`.
    #[must_use]
    pub fn within(mut self, polygon: geojson::Geometry) -> Self {
        self.within_polygon = Some(polygon);
        self
    }
}

/// Per-traversal search state shared by the pipeline and the store.
///
/// `activities` narrows as the traversal moves outward; `already_visited`
/// only grows. The context belongs to exactly one traversal and is never
/// shared across ski areas.
#[derive(Debug, Clone)]
pub struct SearchContext {
    /// Id of the ski area being built.
    pub id: String,
    /// Current activity filter; a match requires at least one overlap.
    pub activities: BTreeSet<Activity>,
    /// Fixed containment polygon (polygon phases only).
    pub search_polygon: Option<geojson::Geometry>,
    /// Skip objects already claimed by a polygon-phase pass.
    pub exclude_objects_in_ski_area_polygon: bool,
    /// Keys seen by this traversal so far.
    pub already_visited: BTreeSet<String>,
}

impl SearchContext {
    /// Creates a context for the given ski area id and seed activities.
    #[must_use]
    pub fn new(id: impl Into<String>, activities: BTreeSet<Activity>) -> Self {
        Self {
            id: id.into(),
            activities,
            search_polygon: None,
            exclude_objects_in_ski_area_polygon: false,
            already_visited: BTreeSet::new(),
        }
    }
}

/// A paged cursor over ski-area ids.
///
/// Batches are at most [`SKI_AREA_BATCH_SIZE`] ids; callers re-resolve
/// each batch through [`ObjectStore::ski_areas_by_ids`] so that removals
/// performed while the cursor is open are observed. The `ttl` is the
/// lease a backing store keeps the cursor alive for; the in-memory store
/// never expires one.
#[derive(Debug)]
pub struct SkiAreaCursor {
    batches: VecDeque<Vec<String>>,
    ttl: Duration,
}

impl SkiAreaCursor {
    /// Chunks `ids` into batches of `batch_size`.
    #[must_use]
    pub fn new(ids: Vec<String>, batch_size: usize, ttl: Duration) -> Self {
        let batches = ids
            .chunks(batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();
        Self { batches, ttl }
    }

    /// An exhausted cursor.
    #[must_use]
    pub fn empty(ttl: Duration) -> Self {
        Self {
            batches: VecDeque::new(),
            ttl,
        }
    }

    /// Next batch of ids, or `None` when exhausted.
    pub fn next_batch(&mut self) -> Option<Vec<String>> {
        self.batches.pop_front()
    }

    /// The lease duration requested for this cursor.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of ids remaining.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// The narrow geospatial interface the clustering pipeline operates on.
///
/// Every operation is atomic with respect to concurrent calls on the
/// same store; `rewrite_ski_area_refs` additionally serializes with
/// concurrent markings (an exclusive lock in a real backing store).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Enumerates ski areas matching `filter` as a paged cursor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPolygon`] when `filter.within_polygon`
    /// cannot be indexed; other failures of the backing store propagate.
    async fn ski_areas(&self, filter: &SkiAreaFilter) -> Result<SkiAreaCursor, StoreError>;

    /// Resolves ski areas by public id; unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    async fn ski_areas_by_ids(&self, ids: &[String]) -> Result<Vec<SkiArea>, StoreError>;

    /// Objects whose geometry satisfies `predicate` against `area`,
    /// excluding keys in `ctx.already_visited`, objects already claiming
    /// `ctx.id`, optionally objects already inside a ski-area polygon,
    /// and requiring at least one activity overlap with
    /// `ctx.activities`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPolygon`] when `area` is not an
    /// indexable polygon.
    async fn nearby(
        &self,
        area: &geojson::Geometry,
        predicate: SpatialPredicate,
        ctx: &SearchContext,
    ) -> Result<Vec<MapObject>, StoreError>;

    /// Appends `ski_area_id` to each object's membership set (unique),
    /// clears `is_basis_for_new_ski_area`, and ORs
    /// `is_in_ski_area_polygon` with `is_in_polygon`. Atomic per call;
    /// unknown keys are logged and skipped.
    ///
    /// # Errors
    ///
    /// Propagates backing-store write failures.
    async fn mark_ski_area(
        &self,
        ski_area_id: &str,
        is_in_polygon: bool,
        keys: &[String],
    ) -> Result<(), StoreError>;

    /// Removes one object. Removing a ski area also drops its id from
    /// every other object's membership set in the same atomic step.
    ///
    /// # Errors
    ///
    /// Propagates backing-store write failures.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Removes several objects atomically; see [`ObjectStore::remove`].
    ///
    /// # Errors
    ///
    /// Propagates backing-store write failures.
    async fn remove_batch(&self, keys: &[String]) -> Result<(), StoreError>;

    /// For every object referencing any id in `old_ids`, removes all of
    /// them and appends `new_id` (unique). Runs under an exclusive lock.
    ///
    /// # Errors
    ///
    /// Propagates backing-store write failures.
    async fn rewrite_ski_area_refs(
        &self,
        old_ids: &[String],
        new_id: &str,
    ) -> Result<(), StoreError>;

    /// One object with `is_basis_for_new_ski_area = true`, if any.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    async fn next_unassigned_run(&self) -> Result<Option<MapObject>, StoreError>;

    /// Clears the synthesis-basis flag on one object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown key.
    async fn clear_new_ski_area_basis(&self, key: &str) -> Result<(), StoreError>;

    /// Fetches one object by key.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    async fn get(&self, key: &str) -> Result<Option<MapObject>, StoreError>;

    /// Inserts a new object.
    ///
    /// # Errors
    ///
    /// Propagates backing-store write failures.
    async fn insert(&self, object: MapObject) -> Result<(), StoreError>;

    /// Upserts a ski area by key.
    ///
    /// # Errors
    ///
    /// Propagates backing-store write failures.
    async fn save_ski_area(&self, area: SkiArea) -> Result<(), StoreError>;

    /// Lifts and runs whose membership set references `ski_area_id`
    /// (other ski areas are never members).
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    async fn members_of(&self, ski_area_id: &str) -> Result<Vec<MapObject>, StoreError>;

    /// Snapshot of every object in the store.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    async fn all_objects(&self) -> Result<Vec<MapObject>, StoreError>;
}
