//! Numeric summary records attached to ski areas during augmentation.
//!
//! The computation lives in `piste_map_statistics`; only the record
//! shapes are defined here so they can ride along on
//! [`SkiAreaProperties`](crate::SkiAreaProperties).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Activity, LiftKind, RunDifficulty};

/// Count and combined haversine length of a group of runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub count: u32,
    /// Combined length in kilometres. Zero for polygon-only groups.
    pub combined_km: f64,
}

/// Run statistics broken down by activity and by difficulty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub count: u32,
    pub combined_km: f64,
    pub by_activity: BTreeMap<Activity, RunSummary>,
    pub by_difficulty: BTreeMap<RunDifficulty, RunSummary>,
}

/// Lift statistics broken down by transport kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftStatistics {
    pub count: u32,
    pub combined_km: f64,
    pub by_kind: BTreeMap<LiftKind, u32>,
}

/// The numeric summary of a ski area's member set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub runs: RunStatistics,
    pub lifts: LiftStatistics,
}
