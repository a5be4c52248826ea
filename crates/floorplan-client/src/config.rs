//! Client configuration.
//!
//! Defaults come from environment variables:
//! - `FLOORPLAN_API_URL`: explicit base API URL
//! - `FLOORPLAN_ENV`: `production` or `development` (default)
//! - `FLOORPLAN_ORIGIN`: site origin used to build the production API URL
//! - `FLOORPLAN_POLL_INTERVAL`: seconds between result polls (float)
//! - `FLOORPLAN_MAX_POLL_ITERATIONS`: pending polls tolerated per slot

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Base API URL used outside production.
pub const DEVELOPMENT_API_URL: &str = "http://localhost:8000/api/";

/// Origin assumed for production when `FLOORPLAN_ORIGIN` is not set.
pub const DEFAULT_PRODUCTION_ORIGIN: &str = "http://localhost";

/// Back-end paths, relative to the base API URL.
pub mod endpoints {
    pub const UPLOAD_URL: &str = "images/upload-url";
    pub const REQUEST_PREDICTION: &str = "request-prediction";
    pub const RETRIEVE_RESULTS: &str = "retrieve-results";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "development" | "dev" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Resolve the base API URL for an environment.
///
/// Production serves the API under `/api/` of the site origin; every other
/// environment talks to a local back end.
pub fn base_url_for(environment: Environment, origin: &str) -> String {
    match environment {
        Environment::Production => format!("{}/api/", origin.trim_end_matches('/')),
        Environment::Development => DEVELOPMENT_API_URL.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_iterations: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        // 30 polls, 10 seconds apart: give up after roughly five minutes.
        Self {
            interval: Duration::from_secs(10),
            max_iterations: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub accepted_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 9_048_576,
            accepted_extensions: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub poll: PollConfig,
    pub upload: UploadLimits,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl ClientConfig {
    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup("FLOORPLAN_API_URL").unwrap_or_else(|| {
            let environment = lookup("FLOORPLAN_ENV")
                .and_then(|v| Environment::parse(&v))
                .unwrap_or_default();
            let origin =
                lookup("FLOORPLAN_ORIGIN").unwrap_or_else(|| DEFAULT_PRODUCTION_ORIGIN.to_string());
            base_url_for(environment, &origin)
        });

        let mut poll = PollConfig::default();
        if let Some(secs) = lookup("FLOORPLAN_POLL_INTERVAL").and_then(|s| s.parse::<f64>().ok())
            && secs > 0.0
        {
            poll.interval = Duration::from_millis((secs * 1000.0) as u64);
        }
        if let Some(max) =
            lookup("FLOORPLAN_MAX_POLL_ITERATIONS").and_then(|s| s.parse::<u32>().ok())
        {
            poll.max_iterations = max.max(1);
        }

        Self {
            base_url,
            poll,
            upload: UploadLimits::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Parse the base URL, forcing a trailing slash so relative joins keep the `/api/` prefix.
    pub fn parsed_base_url(&self) -> Result<reqwest::Url> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        reqwest::Url::parse(&raw).map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config.base_url, DEVELOPMENT_API_URL);
        assert_eq!(config.poll.interval, Duration::from_secs(10));
        assert_eq!(config.poll.max_iterations, 30);
        assert_eq!(config.upload.max_bytes, 9_048_576);
        assert_eq!(config.upload.accepted_extensions, vec![".jpg", ".jpeg", ".png"]);
    }

    #[test]
    fn production_uses_origin_api_prefix() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("FLOORPLAN_ENV", "production"),
            ("FLOORPLAN_ORIGIN", "https://plans.example.org/"),
        ]));
        assert_eq!(config.base_url, "https://plans.example.org/api/");
    }

    #[test]
    fn explicit_api_url_wins() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("FLOORPLAN_ENV", "production"),
            ("FLOORPLAN_API_URL", "http://10.0.0.2:9000/api/"),
        ]));
        assert_eq!(config.base_url, "http://10.0.0.2:9000/api/");
    }

    #[test]
    fn poll_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("FLOORPLAN_POLL_INTERVAL", "0.5"),
            ("FLOORPLAN_MAX_POLL_ITERATIONS", "4"),
        ]));
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.max_iterations, 4);
    }

    #[test]
    fn invalid_poll_values_are_ignored() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("FLOORPLAN_POLL_INTERVAL", "-3"),
            ("FLOORPLAN_MAX_POLL_ITERATIONS", "lots"),
        ]));
        assert_eq!(config.poll, PollConfig::default());
    }

    #[test]
    fn environment_parse() {
        assert_eq!(Environment::parse("PROD"), Some(Environment::Production));
        assert_eq!(Environment::parse("development"), Some(Environment::Development));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn parsed_base_url_adds_trailing_slash() {
        let config = ClientConfig::from_lookup(|_| None).with_base_url("http://host:1/api");
        let url = config.parsed_base_url().unwrap();
        assert_eq!(url.join("request-prediction").unwrap().path(), "/api/request-prediction");
    }

    #[test]
    fn parsed_base_url_rejects_relative() {
        let config = ClientConfig::from_lookup(|_| None).with_base_url("/api/");
        assert!(matches!(
            config.parsed_base_url(),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
