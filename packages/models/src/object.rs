//! The map-object discriminated union and its variant payloads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::{
    Activity, LiftKind, Location, RunConvention, RunDifficulty, Source, Statistics, Status,
};

/// Fields shared by every map object regardless of variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCore {
    /// Stable opaque identifier, unique within the store.
    pub key: String,
    /// Public identifier (often equal to `key`).
    pub id: String,
    /// GeoJSON shape of the feature.
    pub geometry: geojson::Geometry,
    /// Discipline tags on this feature.
    #[serde(default)]
    pub activities: BTreeSet<Activity>,
    /// Which upstream feed produced this record.
    pub source: Source,
    /// Ids of the ski areas this object belongs to.
    #[serde(default)]
    pub ski_areas: BTreeSet<String>,
    /// Set once the object has been claimed by a polygon-phase pass.
    /// Monotonic: never cleared after being set.
    #[serde(default)]
    pub is_in_ski_area_polygon: bool,
    /// Set by ingestion on runs that may seed a new ski area; cleared
    /// once the run has been consumed or rejected by synthesis.
    #[serde(default)]
    pub is_basis_for_new_ski_area: bool,
    /// Set when the upstream data placed this lift/run inside a
    /// `site=piste`-equivalent relation.
    #[serde(default)]
    pub is_in_ski_area_site: bool,
}

impl ObjectCore {
    /// Creates a core with `id == key`, no memberships, and all flags
    /// cleared.
    #[must_use]
    pub fn new(key: impl Into<String>, geometry: geojson::Geometry, source: Source) -> Self {
        let key = key.into();
        Self {
            id: key.clone(),
            key,
            geometry,
            activities: BTreeSet::new(),
            source,
            ski_areas: BTreeSet::new(),
            is_in_ski_area_polygon: false,
            is_basis_for_new_ski_area: false,
            is_in_ski_area_site: false,
        }
    }

    /// Whether at least one of `activities` is present on this object.
    #[must_use]
    pub fn has_any_activity(&self, activities: &BTreeSet<Activity>) -> bool {
        self.activities.iter().any(|a| activities.contains(a))
    }
}

/// Identity of an upstream record that contributed to a ski area.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// The upstream feed.
    pub source: Source,
    /// The record id within that feed.
    pub id: String,
}

/// Descriptive properties carried only by ski areas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkiAreaProperties {
    /// Resort name, when known.
    #[serde(default)]
    pub name: Option<String>,
    /// Upstream records this ski area was assembled from.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    /// Operational status.
    #[serde(default)]
    pub status: Option<Status>,
    /// Numeric summary of the member set, attached during augmentation.
    #[serde(default)]
    pub statistics: Option<Statistics>,
    /// Regional difficulty colour convention, derived from position.
    #[serde(default)]
    pub run_convention: Option<RunConvention>,
    /// Reverse-geocoded location, when a geocoder is configured.
    #[serde(default)]
    pub location: Option<Location>,
    /// Whether this ski area was synthesized from orphan runs rather
    /// than ingested from an upstream feed.
    #[serde(default)]
    pub generated: bool,
}

impl SkiAreaProperties {
    /// Whether any contributing record came from the given feed.
    #[must_use]
    pub fn has_source(&self, source: Source) -> bool {
        self.sources.iter().any(|s| s.source == source)
    }
}

/// A resort-level entity: an upstream polygon, an upstream point record,
/// or a synthesized centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkiArea {
    #[serde(flatten)]
    pub core: ObjectCore,
    /// Whether `core.geometry` is a polygon or multipolygon.
    pub is_polygon: bool,
    pub properties: SkiAreaProperties,
}

/// An uphill transport feature, typically a line geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lift {
    #[serde(flatten)]
    pub core: ObjectCore,
    /// What kind of transport this lift provides.
    pub kind: LiftKind,
    #[serde(default)]
    pub name: Option<String>,
}

/// A piste feature, a line or polygon geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(flatten)]
    pub core: ObjectCore,
    #[serde(default)]
    pub difficulty: Option<RunDifficulty>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Discriminant of a [`MapObject`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    SkiArea,
    Lift,
    Run,
}

/// A record in the object store: ski area, lift, or run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapObject {
    SkiArea(SkiArea),
    Lift(Lift),
    Run(Run),
}

impl MapObject {
    /// The variant discriminant.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::SkiArea(_) => ObjectKind::SkiArea,
            Self::Lift(_) => ObjectKind::Lift,
            Self::Run(_) => ObjectKind::Run,
        }
    }

    /// Shared core fields, read-only.
    #[must_use]
    pub const fn core(&self) -> &ObjectCore {
        match self {
            Self::SkiArea(a) => &a.core,
            Self::Lift(l) => &l.core,
            Self::Run(r) => &r.core,
        }
    }

    /// Shared core fields, mutable.
    pub const fn core_mut(&mut self) -> &mut ObjectCore {
        match self {
            Self::SkiArea(a) => &mut a.core,
            Self::Lift(l) => &mut l.core,
            Self::Run(r) => &mut r.core,
        }
    }

    /// Store key of this object.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.core().key
    }

    /// Public id of this object.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.core().id
    }

    /// GeoJSON geometry of this object.
    #[must_use]
    pub const fn geometry(&self) -> &geojson::Geometry {
        &self.core().geometry
    }

    #[must_use]
    pub const fn is_ski_area(&self) -> bool {
        matches!(self, Self::SkiArea(_))
    }

    #[must_use]
    pub const fn is_lift(&self) -> bool {
        matches!(self, Self::Lift(_))
    }

    #[must_use]
    pub const fn is_run(&self) -> bool {
        matches!(self, Self::Run(_))
    }

    /// Borrows the ski-area payload, if this is a ski area.
    #[must_use]
    pub const fn as_ski_area(&self) -> Option<&SkiArea> {
        match self {
            Self::SkiArea(a) => Some(a),
            Self::Lift(_) | Self::Run(_) => None,
        }
    }

    /// Consumes the object into its ski-area payload, if it is one.
    #[must_use]
    pub fn into_ski_area(self) -> Option<SkiArea> {
        match self {
            Self::SkiArea(a) => Some(a),
            Self::Lift(_) | Self::Run(_) => None,
        }
    }
}

impl From<SkiArea> for MapObject {
    fn from(area: SkiArea) -> Self {
        Self::SkiArea(area)
    }
}

impl From<Lift> for MapObject {
    fn from(lift: Lift) -> Self {
        Self::Lift(lift)
    }
}

impl From<Run> for MapObject {
    fn from(run: Run) -> Self {
        Self::Run(run)
    }
}
