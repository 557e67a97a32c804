//! Augmentation pass: statistics, centroid geometry, and location.
//!
//! Every surviving ski area is reshaped into a point record at the
//! centroid of its members, annotated with a numeric summary and the
//! regional run-difficulty convention, and, when a geocoder is
//! configured, a coarse reverse-geocoded location. Crowdsourced ski
//! areas that ended up with no members and no registry backing are
//! dropped instead.

use futures::stream::{self, StreamExt as _};
use piste_map_geocoder::ReverseGeocoder;
use piste_map_models::{MapObject, SkiArea, Source};
use piste_map_store::{ObjectStore, SkiAreaFilter};

use crate::ClusterError;

#[derive(Debug, Default)]
pub(crate) struct AugmentSummary {
    pub augmented: u64,
    pub removed_orphans: u64,
}

enum Outcome {
    Augmented,
    RemovedOrphan,
}

pub(crate) async fn run<S: ObjectStore + ?Sized>(
    store: &S,
    geocoder: Option<&dyn ReverseGeocoder>,
) -> Result<AugmentSummary, ClusterError> {
    let mut cursor = store.ski_areas(&SkiAreaFilter::default()).await?;
    let mut summary = AugmentSummary::default();

    while let Some(batch) = cursor.next_batch() {
        let areas = store.ski_areas_by_ids(&batch).await?;
        let concurrency = areas.len().max(1);

        let outcomes: Vec<Result<Outcome, ClusterError>> =
            stream::iter(areas.into_iter().map(|area| process_area(store, geocoder, area)))
                .buffer_unordered(concurrency)
                .collect()
                .await;

        for outcome in outcomes {
            match outcome? {
                Outcome::Augmented => summary.augmented += 1,
                Outcome::RemovedOrphan => summary.removed_orphans += 1,
            }
        }
    }

    Ok(summary)
}

async fn process_area<S: ObjectStore + ?Sized>(
    store: &S,
    geocoder: Option<&dyn ReverseGeocoder>,
    area: SkiArea,
) -> Result<Outcome, ClusterError> {
    let members: Vec<MapObject> = store.members_of(&area.core.id).await?;

    if members.is_empty() && !area.properties.has_source(Source::Registry) {
        log::info!(
            "removing orphan ski area {}: no members and no registry backing",
            area.core.key
        );
        store.remove(&area.core.key).await?;
        return Ok(Outcome::RemovedOrphan);
    }

    let mut updated = area;
    updated.properties.statistics = Some(piste_map_statistics::stats(&members));

    if !members.is_empty() {
        let geometries: Vec<geojson::Geometry> = members
            .iter()
            .map(|member| member.core().geometry.clone())
            .collect();
        if let Some(centroid) = piste_map_geometry::centroid(&geometries) {
            updated.core.geometry = centroid;
        }
    }

    updated.is_polygon = false;
    updated.properties.run_convention =
        Some(piste_map_geometry::run_convention(&updated.core.geometry));

    if let Some(geocoder) = geocoder {
        geocode_location(geocoder, &mut updated).await;
    }

    store.save_ski_area(updated).await?;
    Ok(Outcome::Augmented)
}

/// Best effort only: failures leave the previous location in place.
async fn geocode_location(geocoder: &dyn ReverseGeocoder, area: &mut SkiArea) {
    let Some(point) =
        piste_map_geometry::centroid_point(std::slice::from_ref(&area.core.geometry))
    else {
        return;
    };

    match geocoder.reverse(point.x(), point.y()).await {
        Ok(Some(location)) => area.properties.location = Some(location),
        Ok(None) => {}
        Err(err) => {
            log::warn!("reverse geocoding failed for ski area {}: {err}", area.core.key);
        }
    }
}
