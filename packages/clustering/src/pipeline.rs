//! The six-phase pipeline driver.
//!
//! Phases are strictly sequential: a pass only ever sees the store as
//! the previous pass left it. All concurrency lives inside a pass
//! (ski areas of one cursor batch run in parallel).

use piste_map_geocoder::ReverseGeocoder;
use piste_map_store::ObjectStore;

use crate::merge::{SkiAreaComposer, default_composer};
use crate::{ClusterError, augment, buffered, containment, dedupe, registry, synthesize};

/// What each pass did, for logging and assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Crowdsourced polygons removed as shared-ticketing
    /// super-relations.
    pub removed_ambiguous: u64,
    /// Crowdsourced polygons that claimed their contents.
    pub assigned_in_polygon: u64,
    /// Crowdsourced polygons removed for having no members.
    pub removed_no_members: u64,
    /// Crowdsourced polygons removed for a site-relation majority.
    pub removed_site_relation: u64,
    /// Members claimed by the buffered crowdsourced pass.
    pub assigned_nearby: u64,
    /// Registry ski areas merged into a cross-source neighbour.
    pub merged: u64,
    /// Members claimed by registry ski areas.
    pub registry_assigned: u64,
    /// Ski areas synthesized from orphan runs.
    pub generated: u64,
    /// Ski areas annotated in the augmentation pass.
    pub augmented: u64,
    /// Orphan crowdsourced ski areas removed in the augmentation pass.
    pub removed_orphans: u64,
}

/// Runs the whole pipeline with the default merge composer.
///
/// # Errors
///
/// Returns [`ClusterError`] on any fatal condition; recoverable
/// invalid-polygon rejections are logged and skipped internally.
pub async fn run_pipeline<S: ObjectStore + ?Sized>(
    store: &S,
    geocoder: Option<&dyn ReverseGeocoder>,
) -> Result<PipelineSummary, ClusterError> {
    run_pipeline_with(store, geocoder, default_composer).await
}

/// Runs the whole pipeline with an injected merge composer.
///
/// # Errors
///
/// Returns [`ClusterError`] on any fatal condition.
pub async fn run_pipeline_with<S: ObjectStore + ?Sized>(
    store: &S,
    geocoder: Option<&dyn ReverseGeocoder>,
    composer: SkiAreaComposer,
) -> Result<PipelineSummary, ClusterError> {
    let mut summary = PipelineSummary::default();

    log::info!("clustering: removing ambiguous ski area polygons");
    summary.removed_ambiguous = dedupe::run(store).await?;

    log::info!("clustering: assigning objects inside crowdsourced polygons");
    let containment = containment::run(store).await?;
    summary.assigned_in_polygon = containment.assigned;
    summary.removed_no_members = containment.removed_no_members;
    summary.removed_site_relation = containment.removed_site_relation;

    log::info!("clustering: assigning nearby objects to crowdsourced ski areas");
    summary.assigned_nearby = buffered::run(store).await?;

    log::info!("clustering: reconciling registry ski areas");
    let registry = registry::run(store, composer).await?;
    summary.merged = registry.merged;
    summary.registry_assigned = registry.assigned;

    log::info!("clustering: synthesizing ski areas from unassigned runs");
    summary.generated = synthesize::run(store).await?;

    log::info!("clustering: augmenting ski areas");
    let augment = augment::run(store, geocoder).await?;
    summary.augmented = augment.augmented;
    summary.removed_orphans = augment.removed_orphans;

    log::info!(
        "clustering complete: {} in-polygon, {} nearby, {} merged, {} generated, {} augmented",
        summary.assigned_in_polygon,
        summary.assigned_nearby,
        summary.merged,
        summary.generated,
        summary.augmented
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use piste_map_geocoder::GeocodeError;
    use piste_map_models::{
        Activity, Lift, LiftKind, Location, MapObject, ObjectCore, Run, SkiArea,
        SkiAreaProperties, Source, SourceRef,
    };
    use piste_map_store::MemoryStore;

    use super::*;

    fn rectangle(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![min_lng, min_lat],
            vec![max_lng, min_lat],
            vec![max_lng, max_lat],
            vec![min_lng, max_lat],
            vec![min_lng, min_lat],
        ]]))
    }

    fn point(lng: f64, lat: f64) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Point(vec![lng, lat]))
    }

    fn line(coords: &[(f64, f64)]) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::LineString(
            coords.iter().map(|(x, y)| vec![*x, *y]).collect(),
        ))
    }

    fn crowd_area(key: &str, geometry: geojson::Geometry, activities: &[Activity]) -> MapObject {
        let mut core = ObjectCore::new(key, geometry, Source::Crowdsourced);
        core.activities = activities.iter().copied().collect();
        MapObject::SkiArea(SkiArea {
            core,
            is_polygon: true,
            properties: SkiAreaProperties {
                name: Some(format!("{key} resort")),
                sources: vec![SourceRef {
                    source: Source::Crowdsourced,
                    id: key.to_string(),
                }],
                ..SkiAreaProperties::default()
            },
        })
    }

    fn registry_area(key: &str, lng: f64, lat: f64) -> MapObject {
        let mut core = ObjectCore::new(key, point(lng, lat), Source::Registry);
        core.activities.insert(Activity::Downhill);
        MapObject::SkiArea(SkiArea {
            core,
            is_polygon: false,
            properties: SkiAreaProperties {
                name: Some(format!("{key} resort")),
                sources: vec![SourceRef {
                    source: Source::Registry,
                    id: key.to_string(),
                }],
                ..SkiAreaProperties::default()
            },
        })
    }

    fn run_obj(
        key: &str,
        geometry: geojson::Geometry,
        activities: &[Activity],
        basis: bool,
    ) -> MapObject {
        let mut core = ObjectCore::new(key, geometry, Source::Crowdsourced);
        core.activities = activities.iter().copied().collect();
        core.is_basis_for_new_ski_area = basis;
        MapObject::Run(Run {
            core,
            difficulty: None,
            name: None,
        })
    }

    fn lift_obj(key: &str, geometry: geojson::Geometry, in_site: bool) -> MapObject {
        let mut core = ObjectCore::new(key, geometry, Source::Crowdsourced);
        core.activities.insert(Activity::Downhill);
        core.is_in_ski_area_site = in_site;
        MapObject::Lift(Lift {
            core,
            kind: LiftKind::ChairLift,
            name: None,
        })
    }

    async fn ski_areas_in(store: &MemoryStore) -> Vec<SkiArea> {
        store
            .all_objects()
            .await
            .unwrap()
            .into_iter()
            .filter_map(MapObject::into_ski_area)
            .collect()
    }

    async fn object(store: &MemoryStore, key: &str) -> MapObject {
        store.get(key).await.unwrap().unwrap()
    }

    /// Every membership reference resolves to a ski area that still
    /// exists, and the polygon flag never regressed.
    async fn assert_no_stale_references(store: &MemoryStore) {
        let objects = store.all_objects().await.unwrap();
        let ids: BTreeSet<String> = objects
            .iter()
            .filter_map(|o| o.as_ski_area())
            .map(|a| a.core.id.clone())
            .collect();
        for obj in &objects {
            for referenced in &obj.core().ski_areas {
                assert!(
                    ids.contains(referenced),
                    "{} references missing ski area {referenced}",
                    obj.key()
                );
            }
        }
    }

    #[tokio::test]
    async fn polygon_claims_its_contents() {
        let store = MemoryStore::with_objects([
            crowd_area("area-1", rectangle(10.0, 46.0, 10.01, 46.01), &[Activity::Downhill]),
            run_obj(
                "run-1",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                true,
            ),
            run_obj(
                "run-2",
                line(&[(10.003, 46.004), (10.007, 46.006)]),
                &[Activity::Downhill],
                true,
            ),
        ])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.assigned_in_polygon, 1);
        assert_eq!(summary.generated, 0, "claimed runs must not seed new areas");

        let areas = ski_areas_in(&store).await;
        assert_eq!(areas.len(), 1);
        let area = &areas[0];
        assert_eq!(area.core.id, "area-1");
        assert!(!area.is_polygon, "augmentation reshapes to a point");
        assert!(matches!(area.core.geometry.value, geojson::Value::Point(_)));

        let stats = area.properties.statistics.as_ref().unwrap();
        assert_eq!(stats.runs.count, 2);
        assert_eq!(stats.runs.by_activity[&Activity::Downhill].count, 2);

        for key in ["run-1", "run-2"] {
            let core = object(&store, key).await.core().clone();
            assert!(core.ski_areas.contains("area-1"));
            assert!(core.is_in_ski_area_polygon);
            assert!(!core.is_basis_for_new_ski_area);
        }

        assert_no_stale_references(&store).await;
    }

    #[tokio::test]
    async fn empty_polygon_is_removed() {
        let store = MemoryStore::with_objects([crowd_area(
            "area-1",
            rectangle(10.0, 46.0, 10.01, 46.01),
            &[Activity::Downhill],
        )])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.removed_no_members, 1);
        assert!(ski_areas_in(&store).await.is_empty());
    }

    #[tokio::test]
    async fn site_relation_majority_is_removed() {
        let mut objects = vec![crowd_area(
            "area-1",
            rectangle(10.0, 46.0, 10.01, 46.01),
            &[Activity::Downhill],
        )];
        for i in 0..5 {
            let offset = f64::from(i) * 0.001;
            objects.push(lift_obj(
                &format!("lift-{i}"),
                line(&[(10.002 + offset, 46.002), (10.002 + offset, 46.008)]),
                i < 4,
            ));
        }
        let store = MemoryStore::with_objects(objects).await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.removed_site_relation, 1);
        assert!(ski_areas_in(&store).await.is_empty());
    }

    #[tokio::test]
    async fn super_relation_polygon_is_removed() {
        let store = MemoryStore::with_objects([
            crowd_area("super", rectangle(10.0, 46.0, 10.4, 46.2), &[Activity::Downhill]),
            registry_area("reg-1", 10.1, 46.1),
            registry_area("reg-2", 10.3, 46.1),
        ])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.removed_ambiguous, 1);

        let areas = ski_areas_in(&store).await;
        let ids: BTreeSet<&str> = areas.iter().map(|a| a.core.id.as_str()).collect();
        assert_eq!(ids, BTreeSet::from(["reg-1", "reg-2"]));
    }

    #[tokio::test]
    async fn registry_point_merges_into_crowdsourced_neighbour() {
        let store = MemoryStore::with_objects([
            crowd_area("osm-1", rectangle(10.0, 46.0, 10.01, 46.01), &[Activity::Downhill]),
            run_obj(
                "run-1",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                true,
            ),
            registry_area("reg-1", 10.005, 46.005),
        ])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.merged, 1);

        let areas = ski_areas_in(&store).await;
        assert_eq!(areas.len(), 1, "only the survivor remains");
        let survivor = &areas[0];
        assert_eq!(survivor.core.id, "osm-1", "polygon input survives");

        let origins: BTreeSet<Source> = survivor
            .properties
            .sources
            .iter()
            .map(|s| s.source)
            .collect();
        assert_eq!(
            origins,
            BTreeSet::from([Source::Crowdsourced, Source::Registry])
        );

        let run_core = object(&store, "run-1").await.core().clone();
        assert_eq!(
            run_core.ski_areas,
            BTreeSet::from(["osm-1".to_string()]),
            "no duplicate or stale references"
        );

        assert_no_stale_references(&store).await;
    }

    #[tokio::test]
    async fn orphan_nordic_run_becomes_generated_ski_area() {
        let store = MemoryStore::with_objects([run_obj(
            "run-1",
            line(&[(7.0, 61.0), (7.005, 61.003)]),
            &[Activity::Nordic],
            true,
        )])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.generated, 1);

        let areas = ski_areas_in(&store).await;
        assert_eq!(areas.len(), 1);
        let area = &areas[0];
        assert!(area.properties.generated);
        assert_eq!(area.core.source, Source::Crowdsourced);
        assert_eq!(
            area.core.activities,
            BTreeSet::from([Activity::Nordic])
        );
        assert!(!area.is_polygon, "reshaped to a centroid point");
        assert!(matches!(area.core.geometry.value, geojson::Value::Point(_)));

        let run_core = object(&store, "run-1").await.core().clone();
        assert!(run_core.ski_areas.contains(&area.core.id));
        assert!(!run_core.is_basis_for_new_ski_area);
    }

    #[tokio::test]
    async fn downhill_cluster_without_lift_stays_orphan() {
        let store = MemoryStore::with_objects([run_obj(
            "run-1",
            line(&[(7.0, 61.0), (7.005, 61.003)]),
            &[Activity::Downhill],
            true,
        )])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.generated, 0);
        assert!(ski_areas_in(&store).await.is_empty());

        let run_core = object(&store, "run-1").await.core().clone();
        assert!(run_core.ski_areas.is_empty());
        assert!(!run_core.is_basis_for_new_ski_area, "flag consumed");
    }

    #[tokio::test]
    async fn downhill_cluster_with_lift_is_generated() {
        let store = MemoryStore::with_objects([
            run_obj(
                "run-1",
                line(&[(7.0, 61.0), (7.003, 61.002)]),
                &[Activity::Downhill],
                true,
            ),
            lift_obj(
                "lift-1",
                line(&[(7.001, 61.0005), (7.004, 61.0025)]),
                false,
            ),
        ])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.generated, 1);

        let areas = ski_areas_in(&store).await;
        assert_eq!(areas.len(), 1);
        assert!(areas[0].core.activities.contains(&Activity::Downhill));
        let stats = areas[0].properties.statistics.as_ref().unwrap();
        assert_eq!(stats.lifts.count, 1);
        assert_eq!(stats.runs.count, 1);
    }

    #[tokio::test]
    async fn buffered_pass_claims_nearby_objects() {
        let store = MemoryStore::with_objects([
            crowd_area("area-1", rectangle(10.0, 46.0, 10.01, 46.01), &[Activity::Downhill]),
            run_obj(
                "run-inside",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                true,
            ),
            // ~300 m east of the polygon edge.
            run_obj(
                "run-outside",
                line(&[(10.014, 46.002), (10.016, 46.008)]),
                &[Activity::Downhill],
                true,
            ),
        ])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert!(summary.assigned_nearby >= 1);
        assert_eq!(summary.generated, 0);

        let inside = object(&store, "run-inside").await.core().clone();
        assert!(inside.is_in_ski_area_polygon);

        let outside = object(&store, "run-outside").await.core().clone();
        assert!(outside.ski_areas.contains("area-1"));
        assert!(
            !outside.is_in_ski_area_polygon,
            "buffered claims never set the polygon flag"
        );
    }

    #[tokio::test]
    async fn activity_filter_keeps_nordic_run_out_of_downhill_area() {
        let store = MemoryStore::with_objects([
            crowd_area("area-1", rectangle(10.0, 46.0, 10.01, 46.01), &[Activity::Downhill]),
            run_obj(
                "run-downhill",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                false,
            ),
            run_obj(
                "run-nordic",
                line(&[(10.003, 46.003), (10.007, 46.007)]),
                &[Activity::Nordic],
                false,
            ),
        ])
        .await;

        run_pipeline(&store, None).await.unwrap();

        let nordic = object(&store, "run-nordic").await.core().clone();
        assert!(
            nordic.ski_areas.is_empty(),
            "a downhill traversal must not claim a nordic run"
        );
        let downhill = object(&store, "run-downhill").await.core().clone();
        assert!(downhill.ski_areas.contains("area-1"));
    }

    #[tokio::test]
    async fn untagged_polygon_takes_activities_from_members() {
        let store = MemoryStore::with_objects([
            crowd_area("area-1", rectangle(10.0, 46.0, 10.01, 46.01), &[]),
            run_obj(
                "run-1",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Nordic],
                false,
            ),
        ])
        .await;

        run_pipeline(&store, None).await.unwrap();

        let areas = ski_areas_in(&store).await;
        assert_eq!(areas.len(), 1);
        assert_eq!(
            areas[0].core.activities,
            BTreeSet::from([Activity::Nordic])
        );
    }

    #[tokio::test]
    async fn invalid_upstream_polygon_is_recovered() {
        // Unclosed ring: a backing store rejects it, the pipeline logs
        // and carries on, and the un-queryable area ends up removed for
        // having no members.
        let broken = geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![10.0, 46.0],
            vec![10.01, 46.0],
            vec![10.01, 46.01],
            vec![10.0, 46.01],
        ]]));

        let store = MemoryStore::with_objects([
            crowd_area("area-1", broken, &[Activity::Downhill]),
            run_obj(
                "run-1",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                false,
            ),
        ])
        .await;

        let summary = run_pipeline(&store, None).await.unwrap();
        assert_eq!(summary.removed_no_members, 1);
        assert!(ski_areas_in(&store).await.is_empty());
    }

    #[tokio::test]
    async fn pipeline_is_idempotent_on_its_own_output() {
        let store = MemoryStore::with_objects([
            crowd_area("osm-1", rectangle(10.0, 46.0, 10.01, 46.01), &[Activity::Downhill]),
            run_obj(
                "run-1",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                true,
            ),
            registry_area("reg-1", 10.005, 46.005),
            run_obj(
                "nordic-1",
                line(&[(7.0, 61.0), (7.005, 61.003)]),
                &[Activity::Nordic],
                true,
            ),
        ])
        .await;

        run_pipeline(&store, None).await.unwrap();
        let first = store.all_objects().await.unwrap();

        let summary = run_pipeline(&store, None).await.unwrap();
        let second = store.all_objects().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(summary.merged, 0);
        assert_eq!(summary.generated, 0);
        assert_eq!(summary.removed_orphans, 0);
    }

    struct FixedGeocoder;

    #[async_trait::async_trait]
    impl piste_map_geocoder::ReverseGeocoder for FixedGeocoder {
        async fn reverse(
            &self,
            _lng: f64,
            _lat: f64,
        ) -> Result<Option<Location>, GeocodeError> {
            Ok(Some(Location {
                country_code: Some("AT".to_string()),
                region: Some("Tirol".to_string()),
                locality: Some("Sölden".to_string()),
            }))
        }
    }

    #[tokio::test]
    async fn geocoder_populates_location() {
        let store = MemoryStore::with_objects([
            crowd_area("area-1", rectangle(10.0, 46.0, 10.01, 46.01), &[Activity::Downhill]),
            run_obj(
                "run-1",
                line(&[(10.002, 46.002), (10.008, 46.008)]),
                &[Activity::Downhill],
                false,
            ),
        ])
        .await;

        run_pipeline(&store, Some(&FixedGeocoder)).await.unwrap();

        let areas = ski_areas_in(&store).await;
        let location = areas[0].properties.location.as_ref().unwrap();
        assert_eq!(location.country_code.as_deref(), Some("AT"));
        assert_eq!(location.locality.as_deref(), Some("Sölden"));
    }
}
