//! Breadth-first flood fill over the object store.
//!
//! Each traversal owns a [`SearchContext`]. In the polygon phases the
//! context carries a fixed search polygon and the fill is a single
//! containment query; in the buffered phases each found object is
//! expanded by [`SEARCH_BUFFER_KM`](crate::SEARCH_BUFFER_KM) and the
//! fill keeps hopping until no new objects turn up. Activity sets only
//! narrow as the fill moves outward, which keeps a downhill cluster
//! from leaking into an adjacent nordic area through a shared
//! connector.
//!
//! The fill runs on an explicit FIFO queue rather than recursion; the
//! depth of a dense resort is bounded by its geographic extent, not by
//! the call stack.

use std::collections::{BTreeSet, VecDeque};

use piste_map_models::{Activity, MapObject};
use piste_map_store::{
    ObjectStore, SearchContext, SkiAreaCursor, SkiAreaFilter, SpatialPredicate, StoreError,
    TRAVERSAL_QUERY_TTL,
};

use crate::{ClusterError, SEARCH_BUFFER_KM};

/// Runs the flood fill seeded at `seed` and returns the seed plus every
/// object transitively found.
///
/// `seed_activities` is the activity filter for the seed's own search
/// hop; the phase drivers derive it from the seed (widened to the
/// ski-area activities when a polygon area carries none).
pub(crate) async fn visit_object<S: ObjectStore + ?Sized>(
    store: &S,
    ctx: &mut SearchContext,
    seed: MapObject,
    seed_activities: BTreeSet<Activity>,
) -> Result<Vec<MapObject>, ClusterError> {
    let mut found: Vec<MapObject> = Vec::new();
    let mut queue: VecDeque<(MapObject, BTreeSet<Activity>)> = VecDeque::new();
    queue.push_back((seed, seed_activities));

    while let Some((object, activities)) = queue.pop_front() {
        let search_area = match &ctx.search_polygon {
            Some(polygon) => polygon.clone(),
            None => {
                let Some(buffered) =
                    piste_map_geometry::buffer_km(object.geometry(), SEARCH_BUFFER_KM)
                else {
                    // Degenerate geometry: keep the object, skip the hop.
                    found.push(object);
                    continue;
                };
                piste_map_geometry::from_geo(&buffered)
            }
        };

        found.push(object);

        let polygons = polygon_components(search_area, &ctx.id)?;
        let predicate = if ctx.search_polygon.is_some() {
            SpatialPredicate::Contains
        } else {
            SpatialPredicate::Intersects
        };

        for polygon in polygons {
            ctx.activities.clone_from(&activities);
            let results = nearby_recovering(store, &polygon, predicate, ctx).await?;

            for result in &results {
                ctx.already_visited.insert(result.key().to_string());
            }

            if ctx.search_polygon.is_some() {
                // Polygon phase: the containment query is the whole
                // fill; nothing recurses.
                found.extend(results);
            } else {
                for child in results {
                    let narrowed: BTreeSet<Activity> = activities
                        .intersection(&child.core().activities)
                        .copied()
                        .collect();
                    queue.push_back((child, narrowed));
                }
            }
        }
    }

    Ok(found)
}

/// Splits a search area into its polygon components, failing on any
/// geometry a traversal must never produce.
pub(crate) fn polygon_components(
    area: geojson::Geometry,
    ski_area_id: &str,
) -> Result<Vec<geojson::Geometry>, ClusterError> {
    match area.value {
        geojson::Value::Polygon(_) => Ok(vec![area]),
        geojson::Value::MultiPolygon(parts) => Ok(parts
            .into_iter()
            .map(|rings| geojson::Geometry::new(geojson::Value::Polygon(rings)))
            .collect()),
        other => Err(ClusterError::UnexpectedGeometry {
            kind: other.type_name().to_string(),
            id: ski_area_id.to_string(),
        }),
    }
}

/// `nearby` with the traversal TTL applied and invalid-polygon
/// rejections recovered to an empty result.
pub(crate) async fn nearby_recovering<S: ObjectStore + ?Sized>(
    store: &S,
    area: &geojson::Geometry,
    predicate: SpatialPredicate,
    ctx: &SearchContext,
) -> Result<Vec<MapObject>, ClusterError> {
    let query = store.nearby(area, predicate, ctx);
    let result = tokio::time::timeout(TRAVERSAL_QUERY_TTL, query)
        .await
        .map_err(|_| ClusterError::QueryTimeout {
            seconds: TRAVERSAL_QUERY_TTL.as_secs(),
            id: ctx.id.clone(),
        })?;

    match result {
        Ok(objects) => Ok(objects),
        Err(err) if err.is_recoverable() => {
            log_invalid_polygon(&err, area, &ctx.id);
            Ok(Vec::new())
        }
        Err(err) => Err(err.into()),
    }
}

/// `ski_areas` with invalid-polygon rejections recovered to an empty
/// cursor.
pub(crate) async fn ski_areas_recovering<S: ObjectStore + ?Sized>(
    store: &S,
    filter: &SkiAreaFilter,
) -> Result<SkiAreaCursor, ClusterError> {
    match store.ski_areas(filter).await {
        Ok(cursor) => Ok(cursor),
        Err(err) if err.is_recoverable() => {
            if let Some(polygon) = &filter.within_polygon {
                log_invalid_polygon(&err, polygon, "enumeration");
            }
            Ok(SkiAreaCursor::empty(piste_map_store::ENUMERATION_TTL))
        }
        Err(err) => Err(err.into()),
    }
}

/// Keeps the offending geometry in the log for post-mortem analysis.
fn log_invalid_polygon(err: &StoreError, area: &geojson::Geometry, context: &str) {
    log::warn!(
        "recovered invalid search polygon ({err}) for {context}: {}",
        serde_json::to_string(area).unwrap_or_else(|_| "<unserializable>".to_string())
    );
}
