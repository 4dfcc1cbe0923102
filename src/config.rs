use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::{MatchingConfig, DEFAULT_MATCH_THRESHOLD, DEFAULT_STORE_TIMEOUT_MS, DEFAULT_WINDOW_SECS};
use crate::models::Resolution;
use crate::services::CleanupPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub embedder: EmbedderSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub cleanup: CleanupSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default)]
    pub expected_dimensions: Option<usize>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            match_threshold: default_match_threshold(),
            expected_dimensions: None,
            resolution: Resolution::default(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl MatchingSettings {
    pub fn to_config(&self) -> MatchingConfig {
        MatchingConfig {
            window: chrono::Duration::seconds(self.window_secs as i64),
            threshold: self.match_threshold,
            resolution: self.resolution,
            store_timeout: std::time::Duration::from_millis(self.store_timeout_ms),
            expected_dimensions: self.expected_dimensions,
        }
    }
}

fn default_window_secs() -> u64 { DEFAULT_WINDOW_SECS }
fn default_match_threshold() -> f64 { DEFAULT_MATCH_THRESHOLD }
fn default_store_timeout_ms() -> u64 { DEFAULT_STORE_TIMEOUT_MS }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Stateless mode: every submission is answered with no match
    None,
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Thumbnail,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedderSettings {
    #[serde(default)]
    pub kind: EmbedderKind,
    pub endpoint: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    pub dimensions: Option<usize>,
    #[serde(default = "default_thumbnail_side")]
    pub thumbnail_side: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Caps concurrent embedder calls when set
    pub max_concurrency: Option<usize>,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::default(),
            endpoint: None,
            model: default_model(),
            dimensions: None,
            thumbnail_side: default_thumbnail_side(),
            timeout_secs: default_embed_timeout_secs(),
            max_concurrency: None,
        }
    }
}

fn default_model() -> String { "openai/clip-vit-base-patch32".to_string() }
fn default_thumbnail_side() -> u32 { crate::services::embedder::DEFAULT_THUMBNAIL_SIDE }
fn default_embed_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_cache_ttl_secs(),
            l1_cache_size: default_l1_cache_size(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 { 600 }
fn default_l1_cache_size() -> u64 { 10_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    pub retention_secs: Option<u64>,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_cleanup_interval_secs(),
            retention_secs: None,
        }
    }
}

impl CleanupSettings {
    pub fn to_policy(&self, matching: &MatchingSettings) -> CleanupPolicy {
        CleanupPolicy {
            interval: std::time::Duration::from_secs(self.interval_secs.max(1)),
            window: chrono::Duration::seconds(matching.window_secs as i64),
            retention: self.retention_secs.map(|s| chrono::Duration::seconds(s as i64)),
        }
    }
}

fn default_true() -> bool { true }
fn default_cleanup_interval_secs() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with VIBE__)
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., VIBE__MATCHING__WINDOW_SECS -> matching.window_secs
            .add_source(
                Environment::with_prefix("VIBE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_database_url(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("VIBE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_database_url(settings)?.try_deserialize()
    }

    /// Parse settings from TOML text, with no environment overlay
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// `DATABASE_URL` wins over `store.url` when present
fn apply_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("store.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.matching.window_secs, 300);
        assert_eq!(settings.matching.match_threshold, 0.90);
        assert_eq!(settings.matching.resolution, Resolution::BothSides);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.embedder.kind, EmbedderKind::Thumbnail);
        assert!(settings.cleanup.enabled);
    }

    #[test]
    fn test_parse_full_file() {
        let settings = Settings::from_toml_str(
            r#"
            [matching]
            window_secs = 120
            match_threshold = 0.85
            resolution = "target_only"
            store_timeout_ms = 500

            [store]
            backend = "postgres"
            url = "postgres://vibe@localhost/vibe"

            [embedder]
            kind = "remote"
            endpoint = "http://localhost:8000"
            dimensions = 512
            max_concurrency = 4

            [cleanup]
            retention_secs = 86400
            "#,
        )
        .unwrap();

        let config = settings.matching.to_config();
        assert_eq!(config.window, chrono::Duration::seconds(120));
        assert_eq!(config.threshold, 0.85);
        assert_eq!(config.resolution, Resolution::TargetOnly);
        assert_eq!(config.store_timeout, std::time::Duration::from_millis(500));
        assert_eq!(settings.store.backend, StoreBackend::Postgres);
        assert_eq!(settings.embedder.dimensions, Some(512));

        let policy = settings.cleanup.to_policy(&settings.matching);
        assert_eq!(policy.window, chrono::Duration::seconds(120));
        assert_eq!(policy.retention, Some(chrono::Duration::hours(24)));
    }

    #[test]
    fn test_load_from_honors_database_url() {
        let path = std::env::temp_dir().join(format!("vibe-match-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[store]\nbackend = \"postgres\"\nurl = \"postgres://file@localhost/vibe\"\n",
        )
        .unwrap();

        std::env::set_var("DATABASE_URL", "postgres://env@localhost/vibe");
        let settings = Settings::load_from(&path);
        std::env::remove_var("DATABASE_URL");
        std::fs::remove_file(&path).ok();

        let settings = settings.unwrap();
        assert_eq!(settings.store.backend, StoreBackend::Postgres);
        assert_eq!(settings.store.url.as_deref(), Some("postgres://env@localhost/vibe"));
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }
}
