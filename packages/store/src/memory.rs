//! In-process reference implementation of [`ObjectStore`].
//!
//! Objects live in an ordered map keyed by store key; spatial queries go
//! through an R-tree of geometry envelopes and are confirmed with exact
//! `geo` predicates against the object's current geometry. Every trait
//! call takes the store lock once, which makes each call an atomic
//! batch. Stale R-tree entries (removed or re-saved objects) are
//! filtered out at query time against the live object map.

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Contains, Intersects};
use piste_map_models::{MapObject, SkiArea};
use rstar::{AABB, RTree, RTreeObject};
use tokio::sync::RwLock;

use crate::{
    ENUMERATION_TTL, ObjectStore, SKI_AREA_BATCH_SIZE, SearchContext, SkiAreaCursor, SkiAreaFilter,
    SpatialPredicate, StoreError,
};

/// Envelope index entry; exact geometry is always re-read from the
/// object map so entries never go out of date, only stale.
struct SpatialEntry {
    key: String,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, MapObject>,
    tree: RTree<SpatialEntry>,
}

/// In-memory geospatial object store.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Creates a store pre-populated with `objects`.
    pub async fn with_objects(objects: impl IntoIterator<Item = MapObject>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().await;
            for object in objects {
                insert_locked(&mut inner, object);
            }
        }
        store
    }
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidPolygon {
        message: message.into(),
    }
}

/// Validates a GeoJSON query polygon the way a geospatial backing store
/// would before indexing it, producing the store's recognized rejection
/// messages for malformed rings.
fn validate_query_polygon(geometry: &geojson::Geometry) -> Result<geo::Polygon<f64>, StoreError> {
    let geojson::Value::Polygon(rings) = &geometry.value else {
        return Err(invalid("Polygon is not valid: query is not a polygon"));
    };
    validate_rings(rings)
}

/// The `within` filter additionally accepts multipolygons (crowdsourced
/// ski-area boundaries are often split across ridges).
fn validate_query_area(geometry: &geojson::Geometry) -> Result<geo::Geometry<f64>, StoreError> {
    match &geometry.value {
        geojson::Value::Polygon(rings) => Ok(geo::Geometry::Polygon(validate_rings(rings)?)),
        geojson::Value::MultiPolygon(parts) => {
            let polygons = parts
                .iter()
                .map(|rings| validate_rings(rings))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(geo::Geometry::MultiPolygon(geo::MultiPolygon(polygons)))
        }
        _ => Err(invalid("Polygon is not valid: query is not a polygon")),
    }
}

fn validate_rings(rings: &[Vec<Vec<f64>>]) -> Result<geo::Polygon<f64>, StoreError> {
    if rings.is_empty() {
        return Err(invalid("Polygon is not valid: no rings"));
    }

    for ring in rings {
        if ring.len() < 4 {
            return Err(invalid(format!(
                "Invalid loop in polygon: ring has {} positions",
                ring.len()
            )));
        }
        if ring.first() != ring.last() {
            return Err(invalid("Loop not closed"));
        }
        for position in ring {
            if position.len() < 2 || !position[0].is_finite() || !position[1].is_finite() {
                return Err(invalid("Polygon is not valid: malformed position"));
            }
        }
    }

    let mut ring_strings = rings.iter().map(|ring| {
        geo::LineString::from(
            ring.iter()
                .map(|position| geo::Coord {
                    x: position[0],
                    y: position[1],
                })
                .collect::<Vec<_>>(),
        )
    });

    let exterior = ring_strings
        .next()
        .ok_or_else(|| invalid("Polygon is not valid: no rings"))?;
    Ok(geo::Polygon::new(exterior, ring_strings.collect()))
}

fn envelope_of(object: &MapObject) -> Option<AABB<[f64; 2]>> {
    let geom = piste_map_geometry::to_geo(object.geometry())?;
    let rect = geom.bounding_rect()?;
    Some(AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    ))
}

fn insert_locked(inner: &mut Inner, object: MapObject) {
    if let Some(envelope) = envelope_of(&object) {
        inner.tree.insert(SpatialEntry {
            key: object.key().to_string(),
            envelope,
        });
    }
    inner.objects.insert(object.key().to_string(), object);
}

fn remove_locked(inner: &mut Inner, key: &str) {
    let Some(removed) = inner.objects.remove(key) else {
        return;
    };

    // Ski-area removal must not leave dangling membership references.
    if let MapObject::SkiArea(area) = removed {
        let removed_id = area.core.id;
        for object in inner.objects.values_mut() {
            object.core_mut().ski_areas.remove(&removed_id);
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn ski_areas(&self, filter: &SkiAreaFilter) -> Result<SkiAreaCursor, StoreError> {
        let within = filter
            .within_polygon
            .as_ref()
            .map(validate_query_area)
            .transpose()?;

        let inner = self.inner.read().await;
        let ids: Vec<String> = inner
            .objects
            .values()
            .filter_map(MapObject::as_ski_area)
            .filter(|area| filter.source.is_none_or(|source| area.core.source == source))
            .filter(|area| !filter.only_polygons || area.is_polygon)
            .filter(|area| {
                within.as_ref().is_none_or(|polygon| {
                    piste_map_geometry::to_geo(&area.core.geometry)
                        .is_some_and(|geom| polygon.contains(&geom))
                })
            })
            .map(|area| area.core.id.clone())
            .collect();

        Ok(SkiAreaCursor::new(ids, SKI_AREA_BATCH_SIZE, ENUMERATION_TTL))
    }

    async fn ski_areas_by_ids(&self, ids: &[String]) -> Result<Vec<SkiArea>, StoreError> {
        let inner = self.inner.read().await;
        let by_id: BTreeMap<&str, &SkiArea> = inner
            .objects
            .values()
            .filter_map(MapObject::as_ski_area)
            .map(|area| (area.core.id.as_str(), area))
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied().cloned())
            .collect())
    }

    async fn nearby(
        &self,
        area: &geojson::Geometry,
        predicate: SpatialPredicate,
        ctx: &SearchContext,
    ) -> Result<Vec<MapObject>, StoreError> {
        let polygon = validate_query_polygon(area)?;
        let Some(rect) = polygon.bounding_rect() else {
            return Ok(Vec::new());
        };
        let query_envelope =
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let inner = self.inner.read().await;
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut found: Vec<MapObject> = Vec::new();

        for entry in inner.tree.locate_in_envelope_intersecting(&query_envelope) {
            if !seen.insert(entry.key.as_str()) {
                continue;
            }
            let Some(object) = inner.objects.get(&entry.key) else {
                continue;
            };

            let core = object.core();
            if ctx.already_visited.contains(&core.key)
                || core.ski_areas.contains(&ctx.id)
                || (ctx.exclude_objects_in_ski_area_polygon && core.is_in_ski_area_polygon)
                || !core.has_any_activity(&ctx.activities)
            {
                continue;
            }

            let Some(geom) = piste_map_geometry::to_geo(&core.geometry) else {
                continue;
            };
            let matches = match predicate {
                SpatialPredicate::Intersects => polygon.intersects(&geom),
                SpatialPredicate::Contains => polygon.contains(&geom),
            };
            if matches {
                found.push(object.clone());
            }
        }

        found.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(found)
    }

    async fn mark_ski_area(
        &self,
        ski_area_id: &str,
        is_in_polygon: bool,
        keys: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for key in keys {
            let Some(object) = inner.objects.get_mut(key) else {
                log::warn!("mark_ski_area: object {key} disappeared, skipping");
                continue;
            };
            let core = object.core_mut();
            core.ski_areas.insert(ski_area_id.to_string());
            core.is_basis_for_new_ski_area = false;
            core.is_in_ski_area_polygon |= is_in_polygon;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        remove_locked(&mut inner, key);
        Ok(())
    }

    async fn remove_batch(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for key in keys {
            remove_locked(&mut inner, key);
        }
        Ok(())
    }

    async fn rewrite_ski_area_refs(
        &self,
        old_ids: &[String],
        new_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for object in inner.objects.values_mut() {
            let ski_areas = &mut object.core_mut().ski_areas;
            let mut referenced = false;
            for old_id in old_ids {
                referenced |= ski_areas.remove(old_id);
            }
            if referenced {
                ski_areas.insert(new_id.to_string());
            }
        }
        Ok(())
    }

    async fn next_unassigned_run(&self) -> Result<Option<MapObject>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .objects
            .values()
            .find(|object| object.core().is_basis_for_new_ski_area)
            .cloned())
    }

    async fn clear_new_ski_area_basis(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let object = inner.objects.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        object.core_mut().is_basis_for_new_ski_area = false;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<MapObject>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.objects.get(key).cloned())
    }

    async fn insert(&self, object: MapObject) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        insert_locked(&mut inner, object);
        Ok(())
    }

    async fn save_ski_area(&self, area: SkiArea) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        insert_locked(&mut inner, MapObject::SkiArea(area));
        Ok(())
    }

    async fn members_of(&self, ski_area_id: &str) -> Result<Vec<MapObject>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .objects
            .values()
            .filter(|object| !object.is_ski_area())
            .filter(|object| object.core().ski_areas.contains(ski_area_id))
            .cloned()
            .collect())
    }

    async fn all_objects(&self) -> Result<Vec<MapObject>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.objects.values().cloned().collect())
    }
}
