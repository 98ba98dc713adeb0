// src/config.rs
// =============================================================================
// Crawler configuration, loaded once from a TOML file and passed explicitly
// to the fetcher, the store and the crawler.
//
// Layout:
// - top level: file paths (database, seeds, region, export)
// - [fetcher]: endpoint and credentials for the parcel lookup service
// - [crawl]: round count, buffer escalation list, sampling density, delay
//
// Nothing here is global. The auth token can be left out of the file and
// supplied through the PARCEL_FRONTIER_TOKEN environment variable instead.
// =============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when `fetcher.auth_token` is absent
pub const TOKEN_ENV_VAR: &str = "PARCEL_FRONTIER_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    pub database_path: PathBuf,
    pub seeds_path: PathBuf,
    pub region_path: PathBuf,
    pub output_path: PathBuf,
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub crawl: CrawlSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    pub endpoint: String,
    #[serde(default)]
    pub auth_email: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token from the file, or from the environment when the file has none
    pub fn resolved_token(&self) -> Option<String> {
        self.auth_token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Number of bounded breadth-first rounds before the drain phase
    pub rounds: usize,
    /// Buffer distances in map units, tried fine to coarse
    pub buffer_distances: Vec<f64>,
    /// Probe points sampled along each buffer ring
    pub num_points: usize,
    /// Pause after every call to the lookup service
    pub request_delay_ms: u64,
    /// Optional cap on drain passes; None drains until the queue is empty
    pub drain_pass_limit: Option<usize>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            rounds: 3,
            buffer_distances: vec![0.0001, 0.0002, 0.01],
            num_points: 4,
            request_delay_ms: 100,
            drain_pass_limit: None,
        }
    }
}

impl CrawlSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn buffer_spec(&self) -> Result<BufferSpec, ConfigError> {
        BufferSpec::new(self.buffer_distances.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rounds == 0 {
            return Err(ConfigError::Invalid("crawl.rounds must be at least 1".into()));
        }
        if self.num_points == 0 {
            return Err(ConfigError::Invalid(
                "crawl.num_points must be at least 1".into(),
            ));
        }
        self.buffer_spec().map(|_| ())
    }
}

/// Ordered, validated list of buffer distances (finest first)
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSpec {
    distances: Vec<f64>,
}

impl BufferSpec {
    pub fn new(distances: Vec<f64>) -> Result<Self, ConfigError> {
        if distances.is_empty() {
            return Err(ConfigError::Invalid(
                "buffer_distances must not be empty".into(),
            ));
        }
        if let Some(bad) = distances.iter().find(|d| !d.is_finite() || **d <= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "buffer distance {bad} must be finite and positive"
            )));
        }
        if distances.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(ConfigError::Invalid(
                "buffer_distances must escalate from fine to coarse".into(),
            ));
        }
        Ok(Self { distances })
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }
}

impl CrawlerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: CrawlerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.fetcher.endpoint).map_err(|e| {
            ConfigError::Invalid(format!(
                "fetcher.endpoint '{}' is not a URL: {e}",
                self.fetcher.endpoint
            ))
        })?;
        self.crawl.validate()
    }
}

fn default_user_agent() -> String {
    concat!("parcel-frontier/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
database_path = "data/parcels.db"
seeds_path = "input/seeds.csv"
region_path = "input/region.wkt"
output_path = "output/parcels.csv"

[fetcher]
endpoint = "https://parcels.example/parcels/by_location.json"
auth_email = "ops@example.com"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = CrawlerConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.crawl.rounds, 3);
        assert_eq!(config.crawl.buffer_distances, vec![0.0001, 0.0002, 0.01]);
        assert_eq!(config.crawl.num_points, 4);
        assert_eq!(config.crawl.request_delay(), Duration::from_millis(100));
        assert_eq!(config.fetcher.timeout(), Duration::from_secs(10));
        assert!(config.crawl.drain_pass_limit.is_none());
    }

    #[test]
    fn test_crawl_section_overrides() {
        let text = format!(
            "{MINIMAL}\n[crawl]\nrounds = 5\nbuffer_distances = [0.001, 0.05]\nnum_points = 8\ndrain_pass_limit = 2\n"
        );
        let config = CrawlerConfig::from_toml(&text).unwrap();
        assert_eq!(config.crawl.rounds, 5);
        assert_eq!(config.crawl.num_points, 8);
        assert_eq!(config.crawl.drain_pass_limit, Some(2));
        assert_eq!(config.crawl.buffer_spec().unwrap().distances(), &[0.001, 0.05]);
    }

    #[test]
    fn test_rejects_descending_distances() {
        let err = BufferSpec::new(vec![0.01, 0.0002]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_repeated_distance_is_allowed() {
        assert!(BufferSpec::new(vec![0.0001, 0.0001, 0.01]).is_ok());
    }

    #[test]
    fn test_rejects_non_positive_distance() {
        assert!(BufferSpec::new(vec![0.0, 0.1]).is_err());
        assert!(BufferSpec::new(vec![f64::NAN]).is_err());
        assert!(BufferSpec::new(Vec::new()).is_err());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let text = MINIMAL.replace("https://parcels.example/parcels/by_location.json", "not a url");
        assert!(matches!(
            CrawlerConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_zero_points() {
        let text = format!("{MINIMAL}\n[crawl]\nnum_points = 0\n");
        assert!(CrawlerConfig::from_toml(&text).is_err());
    }
}
