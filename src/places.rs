//! Places provider client: nearby real-world places by category.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PlacesConfig;
use crate::types::{Category, Place};

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("places API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

/// Nearby-search interface consumed by the enrichment stage.
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn nearby(
        &self,
        lat: f64,
        lng: f64,
        category: Category,
        radius_meters: u32,
        max_results: u32,
    ) -> Result<Vec<Place>, PlacesError>;
}

/// Place types searched for each category. `All` unions a representative
/// cross-category set.
fn included_types(category: Category) -> Vec<&'static str> {
    match category {
        Category::Restaurant => vec!["restaurant"],
        Category::Cafe => vec!["cafe", "coffee_shop"],
        Category::TouristAttraction => vec!["tourist_attraction"],
        Category::Museum => vec!["museum", "art_gallery"],
        Category::Park => vec!["park"],
        Category::Bar => vec!["bar", "pub"],
        Category::Hotel => vec!["hotel", "lodging"],
        Category::Shopping => vec!["shopping_mall", "store"],
        Category::Entertainment => vec!["movie_theater", "night_club", "amusement_park"],
        Category::All => vec![
            "restaurant",
            "cafe",
            "tourist_attraction",
            "museum",
            "park",
            "bar",
        ],
    }
}

/// Great-circle distance in meters.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

// =============================================================================
// GOOGLE PLACES (NEW) HTTP CLIENT
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NearbyRequest {
    included_types: Vec<&'static str>,
    max_result_count: u32,
    location_restriction: LocationRestriction,
}

#[derive(Serialize)]
struct LocationRestriction {
    circle: Circle,
}

#[derive(Serialize)]
struct Circle {
    center: LatLng,
    radius: f64,
}

#[derive(Serialize, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct NearbyResponse {
    #[serde(default)]
    places: Vec<ApiPlace>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlace {
    id: Option<String>,
    display_name: Option<DisplayName>,
    formatted_address: Option<String>,
    location: Option<LatLng>,
    rating: Option<f64>,
    user_rating_count: Option<u32>,
    international_phone_number: Option<String>,
    website_uri: Option<String>,
}

#[derive(Deserialize)]
struct DisplayName {
    text: Option<String>,
}

const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.location,\
                          places.rating,places.userRatingCount,places.internationalPhoneNumber,\
                          places.websiteUri";

/// Google Places API (new) nearby-search client.
#[derive(Debug, Clone)]
pub struct HttpPlacesProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpPlacesProvider {
    /// Returns None when no API key is configured; the enrichment stage then
    /// skips itself.
    pub fn from_config(config: &PlacesConfig) -> Result<Option<Self>, PlacesError> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Some(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }))
    }
}

#[async_trait]
impl PlacesProvider for HttpPlacesProvider {
    async fn nearby(
        &self,
        lat: f64,
        lng: f64,
        category: Category,
        radius_meters: u32,
        max_results: u32,
    ) -> Result<Vec<Place>, PlacesError> {
        let body = NearbyRequest {
            included_types: included_types(category),
            max_result_count: max_results,
            location_restriction: LocationRestriction {
                circle: Circle {
                    center: LatLng {
                        latitude: lat,
                        longitude: lng,
                    },
                    radius: radius_meters as f64,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/places:searchNearby", self.base_url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: NearbyResponse = response.json().await?;
        let places = parsed
            .places
            .into_iter()
            .filter_map(|p| {
                let name = p.display_name.and_then(|d| d.text)?;
                let location = p.location?;
                Some(Place {
                    name,
                    address: p.formatted_address,
                    lat: location.latitude,
                    lng: location.longitude,
                    category,
                    rating: p.rating,
                    user_ratings_total: p.user_rating_count,
                    external_id: p.id,
                    phone: p.international_phone_number,
                    website: p.website_uri,
                    distance_meters: haversine_meters(
                        lat,
                        lng,
                        location.latitude,
                        location.longitude,
                    ),
                    is_verified_real_place: true,
                })
            })
            .collect();
        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_sanity() {
        // One degree of latitude is ~111 km.
        let d = haversine_meters(43.0, -79.0, 44.0, -79.0);
        assert!((d - 111_000.0).abs() < 500.0);
        assert_eq!(haversine_meters(43.0, -79.0, 43.0, -79.0), 0.0);
    }

    #[test]
    fn all_category_unions_types() {
        assert!(included_types(Category::All).len() > 1);
        assert_eq!(included_types(Category::Park), vec!["park"]);
    }
}
