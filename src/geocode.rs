//! Geocoding client: address ↔ coordinates.
//!
//! The pipeline only needs the interface; failures here degrade the request
//! (no enrichment, address-hash cache key) instead of aborting it.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeocoderConfig;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Schema(String),
}

/// A forward-geocoding hit.
#[derive(Debug, Clone)]
pub struct GeocodedLocation {
    pub lat: f64,
    pub lng: f64,
    pub display_name: String,
}

/// Forward, reverse, and autocomplete geocoding.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Address → best matching location, or None when nothing matches.
    async fn forward(&self, address: &str) -> Result<Option<GeocodedLocation>, GeocodeError>;

    /// Coordinates → display name, or None when nothing is known there.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError>;

    /// Autocomplete suggestions for a partial query.
    async fn suggest(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodedLocation>, GeocodeError>;
}

// =============================================================================
// NOMINATIM-STYLE HTTP CLIENT
// =============================================================================

#[derive(Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Deserialize)]
struct ReverseHit {
    display_name: Option<String>,
}

/// Nominatim-compatible geocoder client.
#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("concierge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, GeocodeError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

fn hit_to_location(hit: SearchHit) -> Result<GeocodedLocation, GeocodeError> {
    let lat = hit
        .lat
        .parse()
        .map_err(|_| GeocodeError::Schema(format!("bad latitude: {}", hit.lat)))?;
    let lng = hit
        .lon
        .parse()
        .map_err(|_| GeocodeError::Schema(format!("bad longitude: {}", hit.lon)))?;
    Ok(GeocodedLocation {
        lat,
        lng,
        display_name: hit.display_name,
    })
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn forward(&self, address: &str) -> Result<Option<GeocodedLocation>, GeocodeError> {
        let hits = self.search(address, 1).await?;
        hits.into_iter().next().map(hit_to_location).transpose()
    }

    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("format", "jsonv2".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let hit: ReverseHit = response.json().await?;
        Ok(hit.display_name.filter(|n| !n.trim().is_empty()))
    }

    async fn suggest(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodedLocation>, GeocodeError> {
        let hits = self.search(query, limit.max(1)).await?;
        hits.into_iter().map(hit_to_location).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
