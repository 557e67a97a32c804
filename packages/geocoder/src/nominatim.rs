//! Nominatim / OpenStreetMap reverse-geocoder client.
//!
//! Nominatim has strict rate limits on the public instance: **1 request
//! per second** maximum. The augmentation phase issues one request per
//! ski area sequentially, which stays under that limit in practice; a
//! self-hosted instance can be pointed at via the base URL.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use async_trait::async_trait;
use piste_map_models::Location;

use crate::{GeocodeError, ReverseGeocoder};

/// Default public Nominatim endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Zoom level that resolves to town/village granularity.
const REVERSE_ZOOM: &str = "10";

/// Reverse geocoder backed by a Nominatim instance.
pub struct NominatimReverse {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimReverse {
    /// Creates a client against the given `/reverse` endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for NominatimReverse {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimReverse {
    async fn reverse(&self, lng: f64, lat: f64) -> Result<Option<Location>, GeocodeError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", lat.to_string().as_str()),
                ("lon", lng.to_string().as_str()),
                ("zoom", REVERSE_ZOOM),
                ("format", "jsonv2"),
            ])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a Nominatim reverse JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<Location>, GeocodeError> {
    // Nominatim reports unresolvable positions as {"error": "..."}.
    if body.get("error").is_some() {
        return Ok(None);
    }

    let address = body.get("address").ok_or_else(|| GeocodeError::Parse {
        message: "Missing address in Nominatim response".to_string(),
    })?;

    let field = |name: &str| address.get(name).and_then(|v| v.as_str()).map(String::from);

    Ok(Some(Location {
        country_code: field("country_code").map(|code| code.to_uppercase()),
        region: field("state").or_else(|| field("county")),
        locality: field("city")
            .or_else(|| field("town"))
            .or_else(|| field("village")),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reverse_result() {
        let body = serde_json::json!({
            "display_name": "Sölden, Imst, Tirol, Österreich",
            "address": {
                "village": "Sölden",
                "county": "Imst",
                "state": "Tirol",
                "country": "Österreich",
                "country_code": "at"
            }
        });
        let location = parse_response(&body).unwrap().unwrap();
        assert_eq!(location.country_code.as_deref(), Some("AT"));
        assert_eq!(location.region.as_deref(), Some("Tirol"));
        assert_eq!(location.locality.as_deref(), Some("Sölden"));
    }

    #[test]
    fn unresolvable_position_is_none() {
        let body = serde_json::json!({
            "error": "Unable to geocode"
        });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn missing_address_is_parse_error() {
        let body = serde_json::json!({ "display_name": "nowhere" });
        assert!(parse_response(&body).is_err());
    }
}
