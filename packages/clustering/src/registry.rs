//! Registry pass: merge registry ski areas into crowdsourced
//! neighbours, or grow the remainder by proximity.
//!
//! A registry record within 250 m of objects that already belong to a
//! ski area from the other feed is the same resort seen twice; it gets
//! merged instead of traversed. A merged survivor does not go on to
//! absorb further unassigned neighbours in this pass; the upstream
//! behaviour is preserved as-is (see DESIGN.md).

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt as _};
use piste_map_models::{SkiArea, Source};
use piste_map_store::{ObjectStore, SearchContext, SkiAreaFilter, SpatialPredicate};

use crate::merge::{SkiAreaComposer, merge_ski_areas};
use crate::{ClusterError, MERGE_BUFFER_KM, buffered, traversal};

#[derive(Debug, Default)]
pub(crate) struct RegistrySummary {
    pub merged: u64,
    pub assigned: u64,
}

enum Outcome {
    Merged,
    MergeDeclined,
    Assigned(u64),
}

pub(crate) async fn run<S: ObjectStore + ?Sized>(
    store: &S,
    composer: SkiAreaComposer,
) -> Result<RegistrySummary, ClusterError> {
    let filter = SkiAreaFilter::source(Source::Registry);
    let mut cursor = store.ski_areas(&filter).await?;
    let mut summary = RegistrySummary::default();

    while let Some(batch) = cursor.next_batch() {
        let areas = store.ski_areas_by_ids(&batch).await?;
        let concurrency = areas.len().max(1);

        let outcomes: Vec<Result<Outcome, ClusterError>> =
            stream::iter(areas.into_iter().map(|area| process_area(store, area, composer)))
                .buffer_unordered(concurrency)
                .collect()
                .await;

        for outcome in outcomes {
            match outcome? {
                Outcome::Merged => summary.merged += 1,
                Outcome::MergeDeclined => {}
                Outcome::Assigned(members) => summary.assigned += members,
            }
        }
    }

    Ok(summary)
}

async fn process_area<S: ObjectStore + ?Sized>(
    store: &S,
    area: SkiArea,
    composer: SkiAreaComposer,
) -> Result<Outcome, ClusterError> {
    let candidates = merge_candidates(store, &area).await?;

    if candidates.is_empty() {
        let members = buffered::assign_nearby(store, &area).await?;
        return Ok(Outcome::Assigned(members));
    }

    if merge_ski_areas(store, area, candidates, composer).await? {
        Ok(Outcome::Merged)
    } else {
        Ok(Outcome::MergeDeclined)
    }
}

/// Ski areas from another feed that objects within 250 m of `area`
/// already belong to.
async fn merge_candidates<S: ObjectStore + ?Sized>(
    store: &S,
    area: &SkiArea,
) -> Result<Vec<SkiArea>, ClusterError> {
    let Some(buffered) = piste_map_geometry::buffer_km(&area.core.geometry, MERGE_BUFFER_KM)
    else {
        return Ok(Vec::new());
    };
    let search_area = piste_map_geometry::from_geo(&buffered);

    let mut ctx = SearchContext::new(area.core.id.clone(), area.core.activities.clone());
    ctx.already_visited.insert(area.core.key.clone());

    let mut referenced: BTreeSet<String> = BTreeSet::new();
    for polygon in traversal::polygon_components(search_area, &area.core.id)? {
        let results =
            traversal::nearby_recovering(store, &polygon, SpatialPredicate::Intersects, &ctx)
                .await?;
        for object in results {
            ctx.already_visited.insert(object.key().to_string());
            referenced.extend(object.core().ski_areas.iter().cloned());
        }
    }

    if referenced.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = referenced.into_iter().collect();
    let resolved = store.ski_areas_by_ids(&ids).await?;
    Ok(resolved
        .into_iter()
        .filter(|candidate| candidate.core.source != area.core.source)
        .collect())
}
