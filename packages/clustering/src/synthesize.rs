//! Synthesizes ski areas from runs nothing claimed.
//!
//! Ingestion marks every unassigned run as a potential basis for a new
//! ski area. Each one seeds a buffered fill; the resulting cluster
//! becomes a generated ski area at the centroid of its members. A
//! downhill cluster without a single lift is not a ski area (no way
//! up), so downhill is dropped and the cluster either survives as
//! nordic or stays orphan.
//!
//! Per-run failures are logged and skipped; this pass never aborts on
//! one bad seed.

use std::collections::BTreeSet;

use piste_map_models::{
    Activity, MapObject, ObjectCore, SkiArea, SkiAreaProperties, Source,
};
use piste_map_store::{ObjectStore, SearchContext};
use uuid::Uuid;

use crate::{ClusterError, traversal};

pub(crate) async fn run<S: ObjectStore + ?Sized>(store: &S) -> Result<u64, ClusterError> {
    let mut generated = 0u64;

    while let Some(seed) = store.next_unassigned_run().await? {
        let seed_key = seed.key().to_string();

        match synthesize_from(store, seed).await {
            Ok(true) => generated += 1,
            Ok(false) => {}
            Err(err) => {
                log::error!("failed to synthesize ski area from run {seed_key}: {err}");
                // The seed must stop being a candidate or this loop
                // would never terminate.
                store.clear_new_ski_area_basis(&seed_key).await?;
            }
        }
    }

    Ok(generated)
}

/// Builds one generated ski area from `seed`. Returns `false` when the
/// seed stays orphan.
async fn synthesize_from<S: ObjectStore + ?Sized>(
    store: &S,
    seed: MapObject,
) -> Result<bool, ClusterError> {
    let seed_key = seed.key().to_string();
    let new_id = Uuid::new_v4().to_string();

    let mut activities: BTreeSet<Activity> = seed
        .core()
        .activities
        .iter()
        .copied()
        .filter(|activity| activity.is_ski_area_activity())
        .collect();

    if activities.is_empty() {
        store.clear_new_ski_area_basis(&seed_key).await?;
        return Ok(false);
    }

    let mut ctx = SearchContext::new(new_id.clone(), activities.clone());
    ctx.already_visited.insert(seed_key.clone());

    let visited = traversal::visit_object(store, &mut ctx, seed, activities.clone()).await?;
    let mut members: Vec<MapObject> = visited
        .into_iter()
        .filter(|object| !object.is_ski_area())
        .collect();

    // Downhill requires a lift: without one, drop the activity and keep
    // only members that still qualify under what remains.
    if activities.contains(&Activity::Downhill) && !members.iter().any(MapObject::is_lift) {
        activities.remove(&Activity::Downhill);
        members.retain(|member| {
            member
                .core()
                .activities
                .iter()
                .any(|activity| activities.contains(activity))
        });
    }

    if activities.is_empty() || members.is_empty() {
        store.clear_new_ski_area_basis(&seed_key).await?;
        return Ok(false);
    }

    let geometries: Vec<geojson::Geometry> = members
        .iter()
        .map(|member| member.core().geometry.clone())
        .collect();
    let Some(centroid) = piste_map_geometry::centroid(&geometries) else {
        log::warn!("no centroid for cluster seeded by run {seed_key}; leaving orphan");
        store.clear_new_ski_area_basis(&seed_key).await?;
        return Ok(false);
    };

    let mut core = ObjectCore::new(new_id.clone(), centroid, Source::Crowdsourced);
    core.activities = activities;
    let area = SkiArea {
        core,
        is_polygon: true,
        properties: SkiAreaProperties {
            generated: true,
            ..SkiAreaProperties::default()
        },
    };

    log::info!(
        "generated ski area {new_id} from run {seed_key} with {} members",
        members.len()
    );

    let keys: Vec<String> = members
        .iter()
        .map(|member| member.key().to_string())
        .collect();
    store.save_ski_area(area).await?;
    store.mark_ski_area(&new_id, false, &keys).await?;

    Ok(true)
}
