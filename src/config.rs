use crate::domain::{ContentType, SourceKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DATABASE_ENV: &str = "CATALOG_SYNC_DATABASE";
pub const API_KEY_ENV: &str = "CATALOG_SYNC_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub sync: SyncConfig,

    pub retry: RetryConfig,

    pub anilist: AnilistConfig,

    pub jikan: JikanConfig,

    pub server: ServerConfig,

    pub scheduler: SchedulerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    #[serde(default)]
    pub suppress_connection_errors: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/catalog.db".to_string(),
            log_level: "info".to_string(),
            suppress_connection_errors: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

/// Page loop policy shared by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Source used when a request does not name one.
    pub default_source: SourceKind,

    /// Minimum delay between successive page fetches. AniList allows about
    /// 90 requests per minute; Jikan about 60.
    pub page_delay_ms: u64,

    /// Wall-clock budget for one run. Reaching it ends the run with partial
    /// counts.
    pub run_timeout_seconds: u64,

    /// Upper bound for `maxPages` in a single request.
    pub max_pages_limit: u32,

    /// Records requested per page, clamped to what the source allows.
    pub per_page: u32,

    /// Error messages kept in a run report before summarizing the rest.
    pub max_reported_errors: usize,

    /// Timeout of each outbound HTTP call, distinct from the run deadline.
    pub request_timeout_seconds: u64,

    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_source: SourceKind::Anilist,
            page_delay_ms: 700,
            run_timeout_seconds: 300,
            max_pages_limit: 100,
            per_page: 50,
            max_reported_errors: 50,
            request_timeout_seconds: 30,
            user_agent: concat!("catalog-sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per page, including the first.
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnilistConfig {
    pub endpoint: String,
}

impl Default for AnilistConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::clients::anilist::ANILIST_API.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JikanConfig {
    pub base_url: String,
}

impl Default for JikanConfig {
    fn default() -> Self {
        Self {
            base_url: crate::clients::jikan::JIKAN_API.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// When set, every route except liveness requires this key via
    /// `X-Api-Key` or `Authorization: Bearer`.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            api_key: None,
        }
    }
}

/// A sync run triggered by cron while serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSync {
    pub name: String,

    /// Six-field cron expression (seconds first).
    pub cron: String,

    pub content_type: ContentType,

    #[serde(default)]
    pub source: Option<SourceKind>,

    pub max_pages: u32,

    #[serde(default)]
    pub start_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub jobs: Vec<ScheduledSync>,

    /// Run the repair pass for every source on this cron, if set.
    pub repair_cron: Option<String>,

    pub repair_limit: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jobs: vec![
                ScheduledSync {
                    name: "anime-nightly".to_string(),
                    cron: "0 0 3 * * *".to_string(),
                    content_type: ContentType::Anime,
                    source: None,
                    max_pages: 10,
                    start_page: None,
                },
                ScheduledSync {
                    name: "manga-nightly".to_string(),
                    cron: "0 30 3 * * *".to_string(),
                    content_type: ContentType::Manga,
                    source: None,
                    max_pages: 10,
                    start_page: None,
                },
            ],
            repair_cron: None,
            repair_limit: crate::constants::limits::DEFAULT_REPAIR_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "catalog-sync".to_string());

        Self {
            metrics_enabled: true,
            json_logs: false,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies environment overrides. Takes a lookup function so tests do not
    /// have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(DATABASE_ENV).filter(|v| !v.trim().is_empty()) {
            self.general.database_path = db;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.api_key = Some(key);
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("catalog-sync").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".catalog-sync").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.database_path.trim().is_empty() {
            anyhow::bail!("general.database_path cannot be empty");
        }

        if self.sync.max_pages_limit == 0 {
            anyhow::bail!("sync.max_pages_limit must be > 0");
        }

        if self.sync.per_page == 0 {
            anyhow::bail!("sync.per_page must be > 0");
        }

        if self.sync.run_timeout_seconds == 0 {
            anyhow::bail!("sync.run_timeout_seconds must be > 0");
        }

        if self.sync.request_timeout_seconds == 0 {
            anyhow::bail!("sync.request_timeout_seconds must be > 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be >= 1");
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            anyhow::bail!("retry.max_delay_ms must be >= retry.base_delay_ms");
        }

        url::Url::parse(&self.anilist.endpoint).context("Invalid anilist.endpoint")?;
        url::Url::parse(&self.jikan.base_url).context("Invalid jikan.base_url")?;

        if self.scheduler.enabled {
            for job in &self.scheduler.jobs {
                if job.max_pages == 0 {
                    anyhow::bail!("Scheduled job '{}' must fetch at least one page", job.name);
                }
                if job.max_pages > self.sync.max_pages_limit {
                    anyhow::bail!(
                        "Scheduled job '{}' asks for {} pages, above sync.max_pages_limit ({})",
                        job.name,
                        job.max_pages,
                        self.sync.max_pages_limit
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.page_delay_ms, 700);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.sync.default_source, SourceKind::Anilist);
        assert!(config.server.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[retry]"));
        assert!(toml_str.contains("[[scheduler.jobs]]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [sync]
            page_delay_ms = 1000
            default_source = "jikan"

            [[scheduler.jobs]]
            name = "manga"
            cron = "0 0 * * * *"
            content_type = "manga"
            max_pages = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.sync.page_delay_ms, 1000);
        assert_eq!(config.sync.default_source, SourceKind::Jikan);
        assert_eq!(config.scheduler.jobs.len(), 1);
        assert_eq!(config.scheduler.jobs[0].content_type, ContentType::Manga);
        assert!(config.scheduler.jobs[0].source.is_none());

        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn env_overrides_replace_database_and_api_key() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            DATABASE_ENV => Some("sqlite::memory:".to_string()),
            API_KEY_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.general.database_path, "sqlite::memory:");
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.general.database_path, "sqlite:data/catalog.db");
        assert!(config.server.api_key.is_none());
    }

    #[test]
    fn validate_rejects_nonsense() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.base_delay_ms = 5000;
        config.retry.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.enabled = true;
        config.scheduler.jobs[0].max_pages = 1000;
        assert!(config.validate().is_err());
    }
}
