//! GeoJSON ingestion and export.
//!
//! A map-object feature carries its geometry in the GeoJSON geometry
//! slot and everything else (`type`, `key`, `id`, `activities`,
//! `source`, flags) in `properties`. Features that fail to parse are
//! logged and skipped; one bad upstream row must not sink a batch run.

use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson};
use piste_map_models::MapObject;
use piste_map_store::{MemoryStore, ObjectStore as _};

/// Reads a `FeatureCollection` into map objects.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a GeoJSON
/// `FeatureCollection`; individual malformed features are skipped.
pub fn read_objects(path: &Path) -> Result<Vec<MapObject>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err("input must be a GeoJSON FeatureCollection".into());
    };

    let mut objects = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.into_iter().enumerate() {
        match feature_to_object(feature) {
            Ok(object) => objects.push(object),
            Err(err) => log::warn!("skipping feature {index}: {err}"),
        }
    }
    Ok(objects)
}

/// Writes every surviving ski area as a `FeatureCollection`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn write_ski_areas(
    path: &Path,
    store: &MemoryStore,
) -> Result<usize, Box<dyn std::error::Error>> {
    let areas: Vec<MapObject> = store
        .all_objects()
        .await?
        .into_iter()
        .filter(MapObject::is_ski_area)
        .collect();

    let features = areas
        .iter()
        .map(object_to_feature)
        .collect::<Result<Vec<_>, _>>()?;

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    std::fs::write(path, serde_json::to_string_pretty(&collection)?)?;
    Ok(areas.len())
}

fn feature_to_object(feature: Feature) -> Result<MapObject, Box<dyn std::error::Error>> {
    let geometry = feature.geometry.ok_or("feature has no geometry")?;
    let mut doc = feature.properties.unwrap_or_default();
    doc.insert("geometry".to_string(), serde_json::to_value(&geometry)?);
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
}

fn object_to_feature(object: &MapObject) -> Result<Feature, Box<dyn std::error::Error>> {
    let serde_json::Value::Object(mut doc) = serde_json::to_value(object)? else {
        return Err("object did not serialize to a JSON object".into());
    };
    doc.remove("geometry");

    Ok(Feature {
        bbox: None,
        geometry: Some(object.geometry().clone()),
        id: Some(geojson::feature::Id::String(object.id().to_string())),
        properties: Some(doc),
        foreign_members: None,
    })
}
