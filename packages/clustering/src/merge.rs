//! Cross-source ski-area merging.
//!
//! The composer is an injected pure function so the reconciliation
//! policy (which record survives, whose name wins) stays separate from
//! the store choreography: persist the survivor, rewrite every
//! membership reference, remove the losers. Reference rewrite and
//! removal run under the store's exclusive lock.

use piste_map_models::{SkiArea, Source, SourceRef};
use piste_map_store::ObjectStore;

use crate::ClusterError;

/// Combines several ski areas into one, or declines with `None`.
pub type SkiAreaComposer = fn(&[SkiArea]) -> Option<SkiArea>;

/// Default reconciliation policy.
///
/// Survivor: the first polygon input, else the first crowdsourced
/// input, else the first listed. The survivor keeps its geometry and
/// key; name prefers a crowdsourced record and falls back to any other;
/// sources and activities are unioned across all inputs.
#[must_use]
pub fn default_composer(inputs: &[SkiArea]) -> Option<SkiArea> {
    let survivor = inputs
        .iter()
        .find(|area| area.is_polygon)
        .or_else(|| {
            inputs
                .iter()
                .find(|area| area.core.source == Source::Crowdsourced)
        })
        .or_else(|| inputs.first())?;

    let mut merged = survivor.clone();

    merged.core.activities = inputs
        .iter()
        .flat_map(|area| area.core.activities.iter().copied())
        .collect();

    let mut sources: Vec<SourceRef> = Vec::new();
    for area in inputs {
        if area.properties.sources.is_empty() {
            // Records straight from ingestion may not carry an explicit
            // source list yet; their own identity stands in for it.
            push_unique(
                &mut sources,
                SourceRef {
                    source: area.core.source,
                    id: area.core.id.clone(),
                },
            );
        }
        for source_ref in &area.properties.sources {
            push_unique(&mut sources, source_ref.clone());
        }
    }
    merged.properties.sources = sources;

    merged.properties.name = inputs
        .iter()
        .filter(|area| area.core.source == Source::Crowdsourced)
        .find_map(|area| area.properties.name.clone())
        .or_else(|| inputs.iter().find_map(|area| area.properties.name.clone()));

    merged.properties.status = survivor
        .properties
        .status
        .or_else(|| inputs.iter().find_map(|area| area.properties.status));

    merged.is_polygon = inputs.iter().any(|area| area.is_polygon);

    Some(merged)
}

fn push_unique(sources: &mut Vec<SourceRef>, source_ref: SourceRef) {
    if !sources.contains(&source_ref) {
        sources.push(source_ref);
    }
}

/// Applies a merge: persists the composed survivor, rewrites every
/// membership reference from the losing ids to the surviving one, and
/// removes the losing records. Returns `false` when the composer
/// declines and nothing changes.
pub(crate) async fn merge_ski_areas<S: ObjectStore + ?Sized>(
    store: &S,
    primary: SkiArea,
    others: Vec<SkiArea>,
    composer: SkiAreaComposer,
) -> Result<bool, ClusterError> {
    let mut inputs = Vec::with_capacity(others.len() + 1);
    inputs.push(primary);
    inputs.extend(others);

    let Some(merged) = composer(&inputs) else {
        log::debug!("composer declined to merge {} ski areas", inputs.len());
        return Ok(false);
    };

    let survivor_key = merged.core.key.clone();
    let survivor_id = merged.core.id.clone();
    let losers: Vec<&SkiArea> = inputs
        .iter()
        .filter(|area| area.core.key != survivor_key)
        .collect();
    let loser_ids: Vec<String> = losers.iter().map(|area| area.core.id.clone()).collect();
    let loser_keys: Vec<String> = losers.iter().map(|area| area.core.key.clone()).collect();

    log::info!("merging {loser_ids:?} into ski area {survivor_id}");

    store.save_ski_area(merged).await?;
    store.rewrite_ski_area_refs(&loser_ids, &survivor_id).await?;
    store.remove_batch(&loser_keys).await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use piste_map_models::{Activity, ObjectCore, SkiAreaProperties};

    use super::*;

    /// The source-union law the composer must uphold: every input's
    /// origin appears on the survivor.
    fn source_union(inputs: &[SkiArea]) -> BTreeSet<SourceRef> {
        inputs
            .iter()
            .flat_map(|area| {
                if area.properties.sources.is_empty() {
                    vec![SourceRef {
                        source: area.core.source,
                        id: area.core.id.clone(),
                    }]
                } else {
                    area.properties.sources.clone()
                }
            })
            .collect()
    }

    fn area(key: &str, source: Source, is_polygon: bool, name: Option<&str>) -> SkiArea {
        let geometry = if is_polygon {
            geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
                vec![10.0, 46.0],
                vec![10.01, 46.0],
                vec![10.01, 46.01],
                vec![10.0, 46.0],
            ]]))
        } else {
            geojson::Geometry::new(geojson::Value::Point(vec![10.005, 46.005]))
        };
        let mut core = ObjectCore::new(key, geometry, source);
        core.activities.insert(Activity::Downhill);
        SkiArea {
            core,
            is_polygon,
            properties: SkiAreaProperties {
                name: name.map(String::from),
                sources: vec![SourceRef {
                    source,
                    id: key.to_string(),
                }],
                ..SkiAreaProperties::default()
            },
        }
    }

    #[test]
    fn polygon_input_survives() {
        let registry = area("reg-1", Source::Registry, false, Some("Registry Resort"));
        let crowd = area("osm-1", Source::Crowdsourced, true, None);
        let merged = default_composer(&[registry, crowd]).unwrap();

        assert_eq!(merged.core.key, "osm-1");
        assert!(merged.is_polygon);
        // No crowdsourced name; the registry one fills in.
        assert_eq!(merged.properties.name.as_deref(), Some("Registry Resort"));
    }

    #[test]
    fn crowdsourced_name_wins() {
        let registry = area("reg-1", Source::Registry, false, Some("Registry Resort"));
        let crowd = area("osm-1", Source::Crowdsourced, true, Some("Crowd Resort"));
        let merged = default_composer(&[registry, crowd]).unwrap();
        assert_eq!(merged.properties.name.as_deref(), Some("Crowd Resort"));
    }

    #[test]
    fn sources_are_unioned() {
        let registry = area("reg-1", Source::Registry, false, None);
        let crowd = area("osm-1", Source::Crowdsourced, true, None);
        let inputs = vec![registry, crowd];
        let expected = source_union(&inputs);

        let merged = default_composer(&inputs).unwrap();
        let actual: BTreeSet<SourceRef> = merged.properties.sources.into_iter().collect();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 2);
    }

    #[test]
    fn empty_inputs_compose_to_none() {
        assert!(default_composer(&[]).is_none());
    }

    #[test]
    fn activities_are_unioned() {
        let mut registry = area("reg-1", Source::Registry, false, None);
        registry.core.activities.insert(Activity::Nordic);
        let crowd = area("osm-1", Source::Crowdsourced, true, None);
        let merged = default_composer(&[registry, crowd]).unwrap();
        assert!(merged.core.activities.contains(&Activity::Nordic));
        assert!(merged.core.activities.contains(&Activity::Downhill));
    }
}
