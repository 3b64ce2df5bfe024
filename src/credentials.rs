//! Per-request credential scope.
//!
//! User-supplied keys live for one request and are visible to every adapter
//! working on its behalf. There is no ambient storage: the orchestrator
//! builds one scope per request and passes it down the call tree, so
//! concurrent requests can never observe each other's overrides.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProviderConfig;

/// Request-scoped credential overrides, keyed by provider tag.
///
/// Recognized keys per tag: `{tag}` (API key), `{tag}Model`, `{tag}Endpoint`.
/// Cheap to clone; child tasks capture it by value at spawn time.
#[derive(Debug, Clone, Default)]
pub struct CredentialScope {
    overrides: Arc<HashMap<String, String>>,
}

impl CredentialScope {
    pub fn new(user_api_keys: HashMap<String, String>) -> Self {
        Self {
            overrides: Arc::new(user_api_keys),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// True when the request carries its own API key for this tag. A user key
    /// activates a provider that process configuration leaves disabled.
    pub fn has_user_key(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// API key for `tag`: the request override, else process configuration.
    pub fn key_for<'a>(&'a self, config: &'a ProviderConfig) -> Option<&'a str> {
        self.get(&config.tag).or(config.api_key.as_deref())
    }

    /// Model for `tag`, honoring a `{tag}Model` override.
    pub fn model_for<'a>(&'a self, config: &'a ProviderConfig) -> &'a str {
        self.get(&format!("{}Model", config.tag))
            .unwrap_or(&config.model)
    }

    /// Endpoint base URL for `tag`, honoring a `{tag}Endpoint` override.
    pub fn endpoint_for<'a>(&'a self, config: &'a ProviderConfig) -> &'a str {
        self.get(&format!("{}Endpoint", config.tag))
            .unwrap_or(&config.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use std::time::Duration;

    fn config(tag: &str, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            tag: tag.to_string(),
            kind: ProviderKind::Chat,
            enabled: true,
            api_key: api_key.map(String::from),
            model: "base-model".to_string(),
            endpoint: "https://base.example".to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn override_beats_config() {
        let scope = CredentialScope::new(HashMap::from([
            ("openai".to_string(), "user-key".to_string()),
            ("openaiModel".to_string(), "user-model".to_string()),
            ("openaiEndpoint".to_string(), "https://user.example".to_string()),
        ]));
        let cfg = config("openai", Some("config-key"));
        assert_eq!(scope.key_for(&cfg), Some("user-key"));
        assert_eq!(scope.model_for(&cfg), "user-model");
        assert_eq!(scope.endpoint_for(&cfg), "https://user.example");
        assert!(scope.has_user_key("openai"));
    }

    #[test]
    fn falls_back_to_config() {
        let scope = CredentialScope::empty();
        let cfg = config("openai", Some("config-key"));
        assert_eq!(scope.key_for(&cfg), Some("config-key"));
        assert_eq!(scope.model_for(&cfg), "base-model");
        assert!(!scope.has_user_key("openai"));
    }

    #[test]
    fn blank_override_is_ignored() {
        let scope = CredentialScope::new(HashMap::from([(
            "openai".to_string(),
            "   ".to_string(),
        )]));
        let cfg = config("openai", None);
        assert_eq!(scope.key_for(&cfg), None);
        assert!(!scope.has_user_key("openai"));
    }

    #[test]
    fn scopes_are_isolated() {
        let a = CredentialScope::new(HashMap::from([("openai".to_string(), "a".to_string())]));
        let b = CredentialScope::new(HashMap::from([("openai".to_string(), "b".to_string())]));
        let cfg = config("openai", None);
        assert_eq!(a.key_for(&cfg), Some("a"));
        assert_eq!(b.key_for(&cfg), Some("b"));
    }
}
