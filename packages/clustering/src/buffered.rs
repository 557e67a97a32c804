//! Buffered proximity pass.
//!
//! Grows a ski area outward in half-km hops from its own geometry:
//! every object found becomes a new hop origin until the fill runs dry.
//! Objects already claimed by a polygon pass are off limits, and the
//! activity filter starts from the area's stored set and is never
//! broadened. Used for crowdsourced ski areas (after the containment
//! pass) and for registry ski areas with no merge partner.

use futures::stream::{self, StreamExt as _};
use piste_map_models::{MapObject, SkiArea, Source};
use piste_map_store::{ObjectStore, SearchContext, SkiAreaFilter};

use crate::{ClusterError, traversal};

/// Assigns nearby unclaimed objects to `area` and returns how many
/// members were marked.
pub(crate) async fn assign_nearby<S: ObjectStore + ?Sized>(
    store: &S,
    area: &SkiArea,
) -> Result<u64, ClusterError> {
    if area.core.id.is_empty() {
        return Err(ClusterError::MissingSkiAreaId {
            key: area.core.key.clone(),
        });
    }
    if area.core.activities.is_empty() {
        // Nothing can match an empty activity filter.
        return Ok(0);
    }

    let mut ctx = SearchContext::new(area.core.id.clone(), area.core.activities.clone());
    ctx.exclude_objects_in_ski_area_polygon = true;
    ctx.already_visited.insert(area.core.key.clone());

    let visited = traversal::visit_object(
        store,
        &mut ctx,
        MapObject::SkiArea(area.clone()),
        area.core.activities.clone(),
    )
    .await?;
    let members: Vec<MapObject> = visited
        .into_iter()
        .filter(|object| !object.is_ski_area())
        .collect();

    if members.is_empty() {
        return Ok(0);
    }

    let keys: Vec<String> = members
        .iter()
        .map(|member| member.key().to_string())
        .collect();
    store.mark_ski_area(&area.core.id, false, &keys).await?;
    Ok(keys.len() as u64)
}

/// Second pass: buffered assignment for every crowdsourced ski area.
pub(crate) async fn run<S: ObjectStore + ?Sized>(store: &S) -> Result<u64, ClusterError> {
    let filter = SkiAreaFilter::source(Source::Crowdsourced);
    let mut cursor = store.ski_areas(&filter).await?;
    let mut assigned = 0u64;

    while let Some(batch) = cursor.next_batch() {
        let areas = store.ski_areas_by_ids(&batch).await?;
        let concurrency = areas.len().max(1);

        let outcomes: Vec<Result<u64, ClusterError>> = stream::iter(
            areas
                .into_iter()
                .map(|area| async move { assign_nearby(store, &area).await }),
        )
        .buffer_unordered(concurrency)
        .collect()
        .await;

        for outcome in outcomes {
            assigned += outcome?;
        }
    }

    Ok(assigned)
}
