//! Polygon containment pass over crowdsourced ski areas.
//!
//! The upstream polygon is trusted as ground truth: one containment
//! query claims everything inside it. Polygons that turn out to hold no
//! lifts or runs, or whose members mostly belong to an upstream site
//! relation (a grouping that bundles infrastructure without implying
//! one resort), are removed instead.

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt as _};
use piste_map_models::{Activity, MapObject, SkiArea, Source};
use piste_map_store::{ObjectStore, SearchContext, SkiAreaFilter};

use crate::{ClusterError, traversal};

#[derive(Debug, Default)]
pub(crate) struct ContainmentSummary {
    pub assigned: u64,
    pub removed_no_members: u64,
    pub removed_site_relation: u64,
}

enum Outcome {
    Assigned,
    RemovedNoMembers,
    RemovedSiteRelation,
}

pub(crate) async fn run<S: ObjectStore + ?Sized>(
    store: &S,
) -> Result<ContainmentSummary, ClusterError> {
    let filter = SkiAreaFilter::source(Source::Crowdsourced).polygons();
    let mut cursor = store.ski_areas(&filter).await?;
    let mut summary = ContainmentSummary::default();

    while let Some(batch) = cursor.next_batch() {
        let areas = store.ski_areas_by_ids(&batch).await?;
        let concurrency = areas.len().max(1);

        let outcomes: Vec<Result<Outcome, ClusterError>> =
            stream::iter(areas.into_iter().map(|area| process_area(store, area)))
                .buffer_unordered(concurrency)
                .collect()
                .await;

        for outcome in outcomes {
            match outcome? {
                Outcome::Assigned => summary.assigned += 1,
                Outcome::RemovedNoMembers => summary.removed_no_members += 1,
                Outcome::RemovedSiteRelation => summary.removed_site_relation += 1,
            }
        }
    }

    Ok(summary)
}

async fn process_area<S: ObjectStore + ?Sized>(
    store: &S,
    area: SkiArea,
) -> Result<Outcome, ClusterError> {
    if area.core.id.is_empty() {
        return Err(ClusterError::MissingSkiAreaId { key: area.core.key });
    }

    let originally_empty = area.core.activities.is_empty();
    let seed_activities: BTreeSet<Activity> = if originally_empty {
        // An untagged polygon could be either discipline; search for
        // both and derive the real set from what it contains.
        Activity::SKI_AREA.iter().copied().collect()
    } else {
        area.core.activities.clone()
    };

    let mut ctx = SearchContext::new(area.core.id.clone(), seed_activities.clone());
    ctx.search_polygon = Some(area.core.geometry.clone());
    ctx.already_visited.insert(area.core.key.clone());

    let visited = traversal::visit_object(
        store,
        &mut ctx,
        MapObject::SkiArea(area.clone()),
        seed_activities,
    )
    .await?;
    let members: Vec<MapObject> = visited
        .into_iter()
        .filter(|object| !object.is_ski_area())
        .collect();

    if members.is_empty() {
        log::info!(
            "removing ski area {}: no lifts or runs inside its polygon",
            area.core.key
        );
        store.remove(&area.core.key).await?;
        return Ok(Outcome::RemovedNoMembers);
    }

    let in_site = members
        .iter()
        .filter(|member| member.core().is_in_ski_area_site)
        .count();
    if in_site * 2 > members.len() {
        log::info!(
            "removing ski area {}: {in_site}/{} members belong to a site relation",
            area.core.key,
            members.len()
        );
        store.remove(&area.core.key).await?;
        return Ok(Outcome::RemovedSiteRelation);
    }

    let keys: Vec<String> = members
        .iter()
        .map(|member| member.key().to_string())
        .collect();
    store.mark_ski_area(&area.core.id, true, &keys).await?;

    if originally_empty {
        let mut updated = area;
        let mut activities: BTreeSet<Activity> = members
            .iter()
            .flat_map(|member| member.core().activities.iter().copied())
            .filter(|activity| activity.is_ski_area_activity())
            .collect();
        activities.extend(updated.core.activities.iter().copied());
        updated.core.activities = activities;
        store.save_ski_area(updated).await?;
    }

    Ok(Outcome::Assigned)
}
