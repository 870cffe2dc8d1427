//! Gemini client configuration

use crate::FlightError;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variables, checked in order, that may hold the API key.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads `GEMINI_API_KEY` (or `API_KEY`), `GEMINI_MODEL`, `GEMINI_BASE_URL`
    /// and `GEMINI_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, FlightError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] but reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlightError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|key| get(*key))
            .ok_or_else(|| {
                FlightError::ConfigError(format!(
                    "no API key found; set one of {}",
                    API_KEY_VARS.join(", ")
                ))
            })?;

        let mut config = Self::new(api_key);

        if let Some(model) = get("GEMINI_MODEL") {
            config = config.with_model(model);
        }
        if let Some(base_url) = get("GEMINI_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Some(timeout) = get("GEMINI_TIMEOUT_SECS") {
            let secs = timeout.parse::<u64>().map_err(|e| {
                FlightError::ConfigError(format!("Invalid GEMINI_TIMEOUT_SECS {}: {}", timeout, e))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `generateContent` endpoint for the configured model.
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[("API_KEY", "abc")])).unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_gemini_key_preferred() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("API_KEY", "generic"),
            ("GEMINI_API_KEY", "gemini"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "gemini");
    }

    #[test]
    fn test_missing_key() {
        let err = ClientConfig::from_lookup(lookup_from(&[("API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, FlightError::ConfigError(_)));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
            ("GEMINI_BASE_URL", "http://localhost:8080/v1beta/"),
            ("GEMINI_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.generate_content_url(),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );

        let err = ClientConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_TIMEOUT_SECS", "soon"),
        ]));
        assert!(err.is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ClientConfig::new("super-secret");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
