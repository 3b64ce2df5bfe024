//! Core types for the recommendation consensus pipeline.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CATEGORIES
// =============================================================================

/// Place category. `All` is the cross-category sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    All,
    Restaurant,
    Cafe,
    TouristAttraction,
    Museum,
    Park,
    Bar,
    Hotel,
    Shopping,
    Entertainment,
}

impl Category {
    pub const ALL_CATEGORIES: &'static [Category] = &[
        Category::All,
        Category::Restaurant,
        Category::Cafe,
        Category::TouristAttraction,
        Category::Museum,
        Category::Park,
        Category::Bar,
        Category::Hotel,
        Category::Shopping,
        Category::Entertainment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::All => "All",
            Category::Restaurant => "Restaurant",
            Category::Cafe => "Cafe",
            Category::TouristAttraction => "TouristAttraction",
            Category::Museum => "Museum",
            Category::Park => "Park",
            Category::Bar => "Bar",
            Category::Hotel => "Hotel",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
        }
    }

    /// Human phrasing used inside LLM prompts ("the best restaurants", ...).
    pub fn prompt_phrase(&self) -> &'static str {
        match self {
            Category::All => "places of any kind worth visiting",
            Category::Restaurant => "restaurants",
            Category::Cafe => "cafes and coffee shops",
            Category::TouristAttraction => "tourist attractions",
            Category::Museum => "museums and galleries",
            Category::Park => "parks and green spaces",
            Category::Bar => "bars and pubs",
            Category::Hotel => "hotels",
            Category::Shopping => "shops and shopping areas",
            Category::Entertainment => "entertainment venues",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL_CATEGORIES
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

// =============================================================================
// CONFIDENCE
// =============================================================================

/// Confidence band derived from a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Band mapping: ≥0.9 VeryHigh; ≥0.7 High; ≥0.4 Medium; else Low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            ConfidenceLevel::VeryHigh
        } else if score >= 0.7 {
            ConfidenceLevel::High
        } else if score >= 0.4 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Clamp a confidence-style score into [0,1]; non-finite input collapses to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// =============================================================================
// PLACES
// =============================================================================

/// A real-world place returned by the places provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ratings_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub distance_meters: f64,
    pub is_verified_real_place: bool,
}

// =============================================================================
// RECOMMENDATIONS
// =============================================================================

/// A single candidate place produced by a provider (or by consensus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Provider-asserted confidence, clamped to [0,1].
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    pub source_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_place: Option<Place>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why_recommended: Option<String>,
    /// Number of distinct providers that produced this (normalized) name.
    pub agreement_count: usize,
}

impl Recommendation {
    pub const MAX_HIGHLIGHTS: usize = 5;

    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: Category,
        confidence_score: f64,
        source_provider: impl Into<String>,
    ) -> Self {
        let score = clamp_score(confidence_score);
        Self {
            name: name.into(),
            description: description.into(),
            category,
            confidence_score: score,
            confidence_level: ConfidenceLevel::from_score(score),
            address: None,
            lat: None,
            lng: None,
            source_provider: source_provider.into(),
            enriched_place: None,
            highlights: Vec::new(),
            why_recommended: None,
            agreement_count: 1,
        }
    }

    /// Set the score and recompute the band in one step.
    pub fn set_score(&mut self, score: f64) {
        self.confidence_score = clamp_score(score);
        self.confidence_level = ConfidenceLevel::from_score(self.confidence_score);
    }
}

// =============================================================================
// PROVIDER OUTPUT
// =============================================================================

/// Outcome of one provider's generation call. Failures are data, not errors.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub provider_name: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub recommendations: Vec<Recommendation>,
    pub raw_response: Option<String>,
    pub elapsed: Duration,
}

impl ProviderResult {
    pub fn succeeded(
        provider_name: impl Into<String>,
        recommendations: Vec<Recommendation>,
        raw_response: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            success: true,
            error_message: None,
            recommendations,
            raw_response: Some(raw_response),
            elapsed,
        }
    }

    pub fn failed(
        provider_name: impl Into<String>,
        error_message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            success: false,
            error_message: Some(error_message.into()),
            recommendations: Vec::new(),
            raw_response: None,
            elapsed,
        }
    }
}

// =============================================================================
// CROSS-VALIDATION
// =============================================================================

/// One validator's verdict on one recommendation from another provider.
#[derive(Debug, Clone)]
pub struct ValidationEntry {
    /// Name of the recommendation being judged, as the source provider gave it.
    pub original_name: String,
    pub validation_score: f64,
    pub flagged_inaccurate: bool,
    pub flagged_out_of_range: bool,
    pub comment: Option<String>,
}

/// All of one validator's verdicts on one source provider's list.
#[derive(Debug, Clone)]
pub struct CrossValidationResult {
    pub validated_by: String,
    pub original_source: String,
    pub entries: Vec<ValidationEntry>,
}

impl CrossValidationResult {
    pub fn empty(validated_by: impl Into<String>, original_source: impl Into<String>) -> Self {
        Self {
            validated_by: validated_by.into(),
            original_source: original_source.into(),
            entries: Vec::new(),
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const DEFAULT_RADIUS_METERS: u32 = 1000;
pub const MIN_RADIUS_METERS: u32 = 100;
pub const MAX_RADIUS_METERS: u32 = 50_000;
pub const MAX_MAX_RESULTS: u32 = 20;

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

fn default_radius_meters() -> u32 {
    DEFAULT_RADIUS_METERS
}

/// Inbound request: coordinates or address, plus categories and tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Single-category shorthand; merged into `categories` during validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_radius_meters")]
    pub radius_meters: u32,
    #[serde(default)]
    pub force_refresh: bool,
    /// Per-request credential overrides: `{tag}`, `{tag}Model`, `{tag}Endpoint`.
    #[serde(default)]
    pub user_api_keys: HashMap<String, String>,
}

impl Default for RecommendationRequest {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            address: None,
            category: None,
            categories: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            radius_meters: DEFAULT_RADIUS_METERS,
            force_refresh: false,
            user_api_keys: HashMap::new(),
        }
    }
}

impl RecommendationRequest {
    /// Validate and normalize in place. Returns every violation, not just the
    /// first, so the caller can surface them all at once.
    pub fn validate(&mut self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let has_coords = self.latitude.is_some() && self.longitude.is_some();
        let has_address = self
            .address
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false);
        if !has_coords && !has_address {
            errors.push("either latitude+longitude or address is required".to_string());
        }

        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(format!("latitude out of range [-90,90]: {lat}"));
            }
        }
        if let Some(lng) = self.longitude {
            if !(-180.0..=180.0).contains(&lng) {
                errors.push(format!("longitude out of range [-180,180]: {lng}"));
            }
        }

        if self.max_results < 1 || self.max_results > MAX_MAX_RESULTS {
            errors.push(format!(
                "maxResults out of range [1,{MAX_MAX_RESULTS}]: {}",
                self.max_results
            ));
        }
        if self.radius_meters < MIN_RADIUS_METERS || self.radius_meters > MAX_RADIUS_METERS {
            errors.push(format!(
                "radiusMeters out of range [{MIN_RADIUS_METERS},{MAX_RADIUS_METERS}]: {}",
                self.radius_meters
            ));
        }

        if let Some(cat) = self.category.take() {
            if !self.categories.contains(&cat) {
                self.categories.insert(0, cat);
            }
        }
        if self.categories.is_empty() {
            self.categories.push(Category::All);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// First requested category (valid after `validate`).
    pub fn primary_category(&self) -> Category {
        self.categories.first().copied().unwrap_or(Category::All)
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Pipeline bookkeeping surfaced to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub providers_used: Vec<String>,
    pub providers_failed: Vec<String>,
    pub google_places_enriched: bool,
    /// Candidate count across all providers before consensus grouping.
    pub total_candidates_evaluated: usize,
    pub total_elapsed_ms: u64,
    pub synthesized_by: String,
}

/// Final consolidated answer, also the cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<String>,
    pub category: Category,
    pub categories: Vec<Category>,
    pub recommendations: Vec<Recommendation>,
    pub metadata: ResponseMetadata,
    pub from_cache: bool,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================
