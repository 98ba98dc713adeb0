// src/error.rs
// =============================================================================
// Error types shared by the library modules.
//
// Each layer gets its own enum so callers can decide what is fatal:
// - GeometryError: a bad or empty shape. Fatal for one shape operation only.
// - StoreError: the SQLite queue/results store failed. Aborts the crawl.
// - FetchError: the parcel lookup failed. Treated as "no parcel" by the crawler.
// - ConfigError: the configuration file is missing, unreadable or invalid.
// - CrawlError: what a whole crawl run can fail with.
//
// The binary (main.rs) wraps these in anyhow for reporting.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeometryError {
    /// The WKT text could not be parsed at all
    #[error("invalid WKT: {0}")]
    Parse(String),

    /// Parsed, but not a polygon or multipolygon
    #[error("unsupported geometry type: {0}")]
    UnsupportedType(&'static str),

    /// Empty, degenerate or non-finite geometry
    #[error("malformed geometry: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A status update found the job in an unexpected state
    #[error("job {job_id} is not in {expected} state")]
    InvalidTransition { job_id: i64, expected: &'static str },

    #[error("stored payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("lookup service answered HTTP {0}")]
    Status(u16),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("parcel geometry rejected: {0}")]
    Geometry(#[from] GeometryError),
}

impl FetchError {
    /// Short label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(e) if e.is_timeout() => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::Status(_) => "status",
            FetchError::Decode(_) => "decode",
            FetchError::Geometry(_) => "geometry",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
