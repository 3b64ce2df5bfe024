//! Process configuration, loaded from environment variables.

use std::time::Duration;

/// Default per-call timeout for chat-completions providers.
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 30;
/// Default per-call timeout for streaming aggregator providers.
pub const DEFAULT_STREAMING_TIMEOUT_SECS: u64 = 120;

const DEFAULT_MAX_TOKENS: u32 = 4_096;

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// PROVIDER CONFIG
// =============================================================================

/// Wire protocol the adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Plain chat-completions POST, one response body.
    Chat,
    /// SSE stream of `data:` frames terminated by `[DONE]`.
    Streaming,
}

/// Static configuration for one provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Lowercase tag used in config, logs, and per-request key overrides.
    pub tag: String,
    pub kind: ProviderKind,
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ProviderConfig {
    fn from_env(tag: &str, kind: ProviderKind, default_model: &str, default_endpoint: &str) -> Self {
        let upper = tag.to_uppercase();
        let default_timeout = match kind {
            ProviderKind::Chat => DEFAULT_CHAT_TIMEOUT_SECS,
            ProviderKind::Streaming => DEFAULT_STREAMING_TIMEOUT_SECS,
        };
        Self {
            tag: tag.to_string(),
            kind,
            enabled: env_bool(&format!("CONCIERGE_{upper}_ENABLED"), true),
            api_key: env_string(&format!("CONCIERGE_{upper}_API_KEY")),
            model: env_string(&format!("CONCIERGE_{upper}_MODEL"))
                .unwrap_or_else(|| default_model.to_string()),
            endpoint: env_string(&format!("CONCIERGE_{upper}_ENDPOINT"))
                .unwrap_or_else(|| default_endpoint.to_string()),
            max_tokens: env_parse(&format!("CONCIERGE_{upper}_MAX_TOKENS"), DEFAULT_MAX_TOKENS),
            timeout: Duration::from_secs(env_parse(
                &format!("CONCIERGE_{upper}_TIMEOUT_SECONDS"),
                default_timeout,
            )),
        }
    }
}

// =============================================================================
// CACHE / PLACES / GEOCODER CONFIG
// =============================================================================

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub path: String,
    pub default_ttl_hours: u32,
    pub grid_precision_decimal_places: u32,
    pub purge_on_startup: bool,
}

impl CacheConfig {
    fn from_env() -> Self {
        Self {
            path: env_string("CONCIERGE_CACHE_PATH")
                .unwrap_or_else(|| ".concierge_cache.sqlite".to_string()),
            default_ttl_hours: env_parse("CONCIERGE_CACHE_TTL_HOURS", 24),
            grid_precision_decimal_places: env_parse("CONCIERGE_GRID_PRECISION", 3),
            purge_on_startup: env_bool("CONCIERGE_CACHE_PURGE_ON_STARTUP", true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlacesConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_radius_meters: u32,
    pub max_results: u32,
    pub timeout: Duration,
}

impl PlacesConfig {
    fn from_env() -> Self {
        Self {
            api_key: env_string("CONCIERGE_PLACES_API_KEY"),
            base_url: env_string("CONCIERGE_PLACES_BASE_URL")
                .unwrap_or_else(|| "https://places.googleapis.com/v1".to_string()),
            default_radius_meters: env_parse("CONCIERGE_PLACES_RADIUS_METERS", 1000),
            max_results: env_parse("CONCIERGE_PLACES_MAX_RESULTS", 20),
            timeout: Duration::from_secs(env_parse("CONCIERGE_PLACES_TIMEOUT_SECONDS", 10)),
        }
    }

    /// The enrichment stage treats a keyless places provider as absent.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl GeocoderConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_string("CONCIERGE_GEOCODER_BASE_URL")
                .unwrap_or_else(|| "https://nominatim.openstreetmap.org".to_string()),
            timeout: Duration::from_secs(env_parse("CONCIERGE_GEOCODER_TIMEOUT_SECONDS", 10)),
        }
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub providers: Vec<ProviderConfig>,
    pub places: PlacesConfig,
    pub geocoder: GeocoderConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig::from_env(),
            providers: vec![
                ProviderConfig::from_env(
                    "openai",
                    ProviderKind::Chat,
                    "gpt-4o-mini",
                    "https://api.openai.com/v1",
                ),
                ProviderConfig::from_env(
                    "gemini",
                    ProviderKind::Chat,
                    "gemini-2.0-flash",
                    "https://generativelanguage.googleapis.com/v1beta/openai",
                ),
                ProviderConfig::from_env(
                    "groq",
                    ProviderKind::Chat,
                    "llama-3.3-70b-versatile",
                    "https://api.groq.com/openai/v1",
                ),
                ProviderConfig::from_env(
                    "openrouter",
                    ProviderKind::Streaming,
                    "deepseek/deepseek-r1",
                    "https://openrouter.ai/api/v1",
                ),
            ],
            places: PlacesConfig::from_env(),
            geocoder: GeocoderConfig::from_env(),
        }
    }

    pub fn provider(&self, tag: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.tag == tag)
    }
}
