#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared map-object model for the piste-map pipeline.
//!
//! Every record in the object store is one of three variants (ski area,
//! lift, or run) sharing a common core (key, geometry, activity set,
//! source feed, membership links). The clustering pipeline reads and
//! mutates these objects; ingestion produces them and the export layer
//! consumes them.

pub mod object;
pub mod statistics;

pub use object::{
    Lift, MapObject, ObjectCore, ObjectKind, Run, SkiArea, SkiAreaProperties, SourceRef,
};
pub use statistics::{LiftStatistics, RunStatistics, RunSummary, Statistics};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A skiable discipline tag carried by ski areas, lifts, and runs.
///
/// The pipeline treats the set as opaque except for the designated
/// ski-area-relevant subset [`Activity::SKI_AREA`], which drives
/// membership filtering and ski-area synthesis.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Activity {
    /// Alpine / downhill skiing.
    Downhill,
    /// Cross-country / nordic skiing.
    Nordic,
    /// Snowboarding terrain features.
    Snowboard,
    /// Backcountry touring.
    Backcountry,
    /// Winter hiking trails.
    Hike,
    /// Sledding runs.
    Sled,
}

impl Activity {
    /// The activities a ski area can be organized around.
    pub const SKI_AREA: &'static [Self] = &[Self::Downhill, Self::Nordic];

    /// Whether this activity is one a ski area can be organized around.
    #[must_use]
    pub fn is_ski_area_activity(self) -> bool {
        Self::SKI_AREA.contains(&self)
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Downhill,
            Self::Nordic,
            Self::Snowboard,
            Self::Backcountry,
            Self::Hike,
            Self::Sled,
        ]
    }
}

/// Which upstream feed produced a record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// The open crowdsourced map database.
    Crowdsourced,
    /// The curated ski-resort registry.
    Registry,
    /// Synthesized by the clustering pipeline itself.
    Generated,
}

/// Operational status of a ski area.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    /// Currently operating.
    Operating,
    /// Permanently closed.
    Abandoned,
    /// Closed but infrastructure still present.
    Disused,
    /// Planned or under construction.
    Proposed,
}

/// Regional convention for run-difficulty colour coding.
///
/// Derived from a ski area's position; European resorts grade runs with a
/// different colour scale than North American or Japanese ones.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunConvention {
    /// Green / blue / red / black scale.
    Europe,
    /// Green circle / blue square / black diamond scale.
    NorthAmerica,
    /// Japanese green / red / black scale.
    Japan,
}

/// Difficulty grade of a run, independent of regional colour coding.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunDifficulty {
    /// Beginner / learning terrain.
    Novice,
    /// Easy.
    Easy,
    /// Intermediate.
    Intermediate,
    /// Advanced.
    Advanced,
    /// Expert-only terrain.
    Expert,
    /// Ungroomed freeride terrain.
    Freeride,
}

/// Kind of uphill transport a lift provides.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LiftKind {
    /// Aerial tramway / cable car.
    CableCar,
    /// Detachable gondola.
    Gondola,
    /// Fixed-grip or detachable chair lift.
    ChairLift,
    /// Combined chair/gondola installation.
    MixedLift,
    /// Surface drag lift (t-bar, platter).
    DragLift,
    /// Rope tow.
    RopeTow,
    /// Conveyor-belt carpet.
    MagicCarpet,
    /// Funicular railway.
    Funicular,
}

/// A reverse-geocoded position attached to a ski area during augmentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: Option<String>,
    /// First-level administrative region name.
    pub region: Option<String>,
    /// Town or locality name.
    pub locality: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ski_area_activities_are_downhill_and_nordic() {
        assert!(Activity::Downhill.is_ski_area_activity());
        assert!(Activity::Nordic.is_ski_area_activity());
        assert!(!Activity::Snowboard.is_ski_area_activity());
        assert!(!Activity::Hike.is_ski_area_activity());
    }

    #[test]
    fn source_serializes_screaming_snake() {
        let json = serde_json::to_string(&Source::Crowdsourced).unwrap();
        assert_eq!(json, "\"CROWDSOURCED\"");
        let back: Source = serde_json::from_str("\"REGISTRY\"").unwrap();
        assert_eq!(back, Source::Registry);
    }

    #[test]
    fn activity_string_roundtrip() {
        for activity in Activity::all() {
            let s = activity.to_string();
            let back: Activity = s.parse().unwrap();
            assert_eq!(back, *activity);
        }
    }
}
