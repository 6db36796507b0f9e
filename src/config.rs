//! Configuration types for mangadex-cbz

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Outbound request settings for the bounded fetcher
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Catalog API base URL (default: "https://api.mangadex.org")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Cover image base URL (default: "https://mangadex.org/covers")
    #[serde(default = "default_cover_base_url")]
    pub cover_base_url: String,

    /// Maximum simultaneous network requests across all jobs (default: 6)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-request timeout (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            cover_base_url: default_cover_base_url(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Archive job settings (pool size, retention, storage directories)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobConfig {
    /// Maximum archive builds running at once (default: 1)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Age after which cached artifacts are evicted (default: 12 hours)
    #[serde(default = "default_retention", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub retention: Duration,

    /// Directory holding finished archives (default: "cbz_cache")
    #[serde(default = "default_artifact_dir")]
    #[schema(value_type = String)]
    pub artifact_dir: PathBuf,

    /// Directory reserved for cover thumbnails (default: "thumbnail_cache")
    ///
    /// Created at startup so the layout matches the cache directory, but
    /// nothing is written to it: covers are served as remote 256px URLs and
    /// thumbnails are not resized locally.
    #[serde(default = "default_thumbnail_dir")]
    #[schema(value_type = String)]
    pub thumbnail_dir: PathBuf,

    /// How long a request thread waits on a bridge task (default: 60 seconds)
    #[serde(default = "default_wait_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub wait_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            retention: default_retention(),
            artifact_dir: default_artifact_dir(),
            thumbnail_dir: default_thumbnail_dir(),
            wait_timeout: default_wait_timeout(),
        }
    }
}

/// Catalog presentation settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CatalogConfig {
    /// Languages offered on the manga page (default: en, es, es-la, ro)
    #[serde(default = "default_language_whitelist")]
    pub language_whitelist: Vec<String>,

    /// Maximum chapters per archive suggested to the page (default: 20)
    #[serde(default = "default_max_volume_size")]
    pub max_volume_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            language_whitelist: default_language_whitelist(),
            max_volume_size: default_max_volume_size(),
        }
    }
}

/// Control-plane HTTP configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:50051)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable permissive CORS for the embedded browser view (default: false)
    #[serde(default)]
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
        }
    }
}

/// Main configuration for the CBZ engine
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Bounded fetcher settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Job pool and artifact storage settings
    #[serde(default)]
    pub jobs: JobConfig,

    /// Catalog presentation settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Control-plane settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "fetch pool capacity must be at least 1".into(),
                key: Some("fetch.max_concurrent_fetches".into()),
            });
        }
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(Error::Config {
                message: "job pool capacity must be at least 1".into(),
                key: Some("jobs.max_concurrent_jobs".into()),
            });
        }
        if self.jobs.retention.is_zero() {
            return Err(Error::Config {
                message: "retention window must be non-zero".into(),
                key: Some("jobs.retention".into()),
            });
        }
        if url::Url::parse(&self.fetch.api_base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid API base URL: {}", self.fetch.api_base_url),
                key: Some("fetch.api_base_url".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_api_base_url() -> String {
    "https://api.mangadex.org".into()
}

fn default_cover_base_url() -> String {
    "https://mangadex.org/covers".into()
}

fn default_max_concurrent_fetches() -> usize {
    6
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_user_agent() -> String {
    concat!("mangadex-cbz/", env!("CARGO_PKG_VERSION")).into()
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_retention() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("cbz_cache")
}

fn default_thumbnail_dir() -> PathBuf {
    PathBuf::from("thumbnail_cache")
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_language_whitelist() -> Vec<String> {
    vec!["en".into(), "es".into(), "es-la".into(), "ro".into()]
}

fn default_max_volume_size() -> usize {
    20
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50051))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
