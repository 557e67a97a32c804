//! Ambiguous-duplicate removal (first pass).
//!
//! A crowdsourced polygon that encloses more than one registry ski area
//! is almost always a shared-ticketing super-relation spanning several
//! resorts, not a resort itself. Keeping it would swallow every lift
//! and run of its member resorts in the containment pass, so it is
//! dropped before any assignment happens.

use futures::stream::{self, StreamExt as _};
use piste_map_models::Source;
use piste_map_store::{ObjectStore, SkiAreaFilter};

use crate::{ClusterError, traversal};

pub(crate) async fn run<S: ObjectStore + ?Sized>(store: &S) -> Result<u64, ClusterError> {
    let filter = SkiAreaFilter::source(Source::Crowdsourced).polygons();
    let mut cursor = store.ski_areas(&filter).await?;
    let mut removed = 0u64;

    while let Some(batch) = cursor.next_batch() {
        let areas = store.ski_areas_by_ids(&batch).await?;
        let concurrency = areas.len().max(1);

        let outcomes: Vec<Result<bool, ClusterError>> =
            stream::iter(areas.into_iter().map(|area| async move {
                let enclosed = traversal::ski_areas_recovering(
                    store,
                    &SkiAreaFilter::source(Source::Registry).within(area.core.geometry.clone()),
                )
                .await?;

                if enclosed.remaining() > 1 {
                    log::info!(
                        "removing ambiguous ski area polygon {}: {} registry ski areas inside",
                        area.core.key,
                        enclosed.remaining()
                    );
                    store.remove(&area.core.key).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            if outcome? {
                removed += 1;
            }
        }
    }

    Ok(removed)
}
