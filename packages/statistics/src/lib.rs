#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Computes the numeric summary attached to each ski area during
//! augmentation: run counts and combined haversine lengths broken down
//! by activity and difficulty, lift counts by transport kind.
//!
//! Takes a member-object set and returns a [`Statistics`] record; it
//! never touches the store.

use piste_map_models::{LiftStatistics, MapObject, RunStatistics, Statistics};

/// Summarizes a ski area's member set.
///
/// Ski areas in `members` are ignored; only lifts and runs contribute.
#[must_use]
pub fn stats(members: &[MapObject]) -> Statistics {
    let mut runs = RunStatistics::default();
    let mut lifts = LiftStatistics::default();

    for member in members {
        match member {
            MapObject::Run(run) => {
                let km = piste_map_geometry::line_length_km(&run.core.geometry);
                runs.count += 1;
                runs.combined_km += km;

                for activity in &run.core.activities {
                    let entry = runs.by_activity.entry(*activity).or_default();
                    entry.count += 1;
                    entry.combined_km += km;
                }

                if let Some(difficulty) = run.difficulty {
                    let entry = runs.by_difficulty.entry(difficulty).or_default();
                    entry.count += 1;
                    entry.combined_km += km;
                }
            }
            MapObject::Lift(lift) => {
                lifts.count += 1;
                lifts.combined_km += piste_map_geometry::line_length_km(&lift.core.geometry);
                *lifts.by_kind.entry(lift.kind).or_default() += 1;
            }
            MapObject::SkiArea(_) => {}
        }
    }

    round_summaries(&mut runs);
    lifts.combined_km = round_km(lifts.combined_km);

    Statistics { runs, lifts }
}

/// Rounds lengths to the metre so repeated augmentation runs produce
/// identical records.
fn round_summaries(runs: &mut RunStatistics) {
    runs.combined_km = round_km(runs.combined_km);
    for summary in runs.by_activity.values_mut() {
        summary.combined_km = round_km(summary.combined_km);
    }
    for summary in runs.by_difficulty.values_mut() {
        summary.combined_km = round_km(summary.combined_km);
    }
}

fn round_km(km: f64) -> f64 {
    (km * 1000.0).round() / 1000.0
}
