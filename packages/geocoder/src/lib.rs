#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding for the augmentation phase.
//!
//! Converts a ski area's centroid coordinates into a coarse
//! [`Location`] (country / region / locality). The pipeline treats the
//! geocoder as a best-effort external service: failures are logged by
//! the caller and never affect clustering correctness.

pub mod nominatim;

use async_trait::async_trait;
use piste_map_models::Location;
use thiserror::Error;

pub use nominatim::NominatimReverse;

/// Errors from reverse-geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// A service that resolves WGS84 coordinates to a coarse location.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolves `(lng, lat)`; `Ok(None)` means the position is unknown
    /// to the service (open ocean, unmapped terrain).
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request or parsing fails.
    async fn reverse(&self, lng: f64, lat: f64) -> Result<Option<Location>, GeocodeError>;
}
