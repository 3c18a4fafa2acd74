//! Place-name resolution.
//!
//! Turns free-text location details ("village, district, state") into
//! coordinates. A miss is `Ok(None)`, not an error.

use crate::config::GeocoderConfig;
use crate::error::{JaltolError, Result};
use crate::models::Coordinates;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Resolves a place name to coordinates.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Option<Coordinates>>;
}

/// One hit of the Nominatim search API. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Geocoder backed by an OpenStreetMap Nominatim instance.
pub struct NominatimGeocoder {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout_seconds: u64,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| JaltolError::Geocoder(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn resolve(&self, name: &str) -> Result<Option<Coordinates>> {
        let url = format!("{}/search", self.base_url);
        debug!("Geocoding '{}'", name);

        let response = self
            .client
            .get(&url)
            .query(&[("q", name), ("format", "json"), ("limit", "1")])
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    JaltolError::Geocoder(format!(
                        "request timed out after {}s",
                        self.timeout_seconds
                    ))
                } else {
                    JaltolError::Geocoder(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(JaltolError::Geocoder(format!(
                "Nominatim API error {}: {}",
                status, body
            )));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .map_err(|e| JaltolError::Geocoder(format!("failed to parse response: {}", e)))?;

        first_coordinates(&places)
    }
}

fn first_coordinates(places: &[NominatimPlace]) -> Result<Option<Coordinates>> {
    let Some(place) = places.first() else {
        return Ok(None);
    };

    let latitude = place
        .lat
        .parse::<f64>()
        .map_err(|e| JaltolError::Geocoder(format!("invalid latitude '{}': {}", place.lat, e)))?;
    let longitude = place
        .lon
        .parse::<f64>()
        .map_err(|e| JaltolError::Geocoder(format!("invalid longitude '{}': {}", place.lon, e)))?;

    Ok(Some(Coordinates::new(latitude, longitude)))
}
