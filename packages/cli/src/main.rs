#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch entry point for the clustering pipeline.
//!
//! Reads a GeoJSON `FeatureCollection` of map-object features (ski
//! areas, lifts, and runs, tagged by a `type` property) into the
//! in-memory store, runs the six clustering passes, and writes the
//! augmented ski areas back out as a `FeatureCollection`.

mod io;

use std::path::PathBuf;

use clap::Parser;
use piste_map_clustering::run_pipeline;
use piste_map_geocoder::{NominatimReverse, ReverseGeocoder};
use piste_map_store::MemoryStore;

#[derive(Parser)]
#[command(name = "piste_map_cli", about = "Ski-area clustering over a GeoJSON snapshot")]
struct Cli {
    /// GeoJSON FeatureCollection of ski areas, lifts, and runs.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the augmented ski-area FeatureCollection.
    #[arg(long)]
    output: PathBuf,

    /// Reverse-geocode ski-area locations during augmentation.
    #[arg(long)]
    geocode: bool,

    /// Nominatim `/reverse` endpoint (defaults to the public instance).
    #[arg(long)]
    nominatim_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let objects = io::read_objects(&cli.input)?;
    log::info!("loaded {} objects from {}", objects.len(), cli.input.display());

    let store = MemoryStore::with_objects(objects).await;

    let geocoder: Option<NominatimReverse> = cli.geocode.then(|| {
        cli.nominatim_url
            .clone()
            .map_or_else(NominatimReverse::default, NominatimReverse::new)
    });

    let summary = run_pipeline(
        &store,
        geocoder.as_ref().map(|g| g as &dyn ReverseGeocoder),
    )
    .await?;

    log::info!(
        "pipeline summary: {} in-polygon, {} nearby, {} merged, {} generated, {} augmented, {} removed",
        summary.assigned_in_polygon,
        summary.assigned_nearby,
        summary.merged,
        summary.generated,
        summary.augmented,
        summary.removed_ambiguous
            + summary.removed_no_members
            + summary.removed_site_relation
            + summary.removed_orphans
    );

    let written = io::write_ski_areas(&cli.output, &store).await?;
    log::info!("wrote {written} ski areas to {}", cli.output.display());

    Ok(())
}
