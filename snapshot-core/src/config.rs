use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

const APP_DIR: &str = "leading-snapshot";

/// Shortest auto-refresh period accepted from `AUTO_REFRESH_SEC`.
const MIN_AUTO_REFRESH_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub owner: String,
    pub app_token: Option<String>,
    pub refresh: RefreshConfig,
    pub hub: HubConfig,
    pub server: ServerConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub detail_timeout_secs: u64,
    pub backoff_floor_secs: u64,
    pub backoff_ceiling_secs: u64,
    pub detail_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub send_timeout_ms: u64,
    pub connection_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            owner: "owner".to_string(),
            app_token: None,
            refresh: RefreshConfig::default(),
            hub: HubConfig::default(),
            server: ServerConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            fetch_timeout_secs: 15,
            detail_timeout_secs: 15,
            backoff_floor_secs: 1,
            backoff_ceiling_secs: 300,
            detail_concurrency: 4,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
            connection_buffer: 32,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            static_dir: PathBuf::from("mobile"),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            user_agent: concat!("leading-snapshot/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }

    pub fn backoff_floor(&self) -> Duration {
        Duration::from_secs(self.backoff_floor_secs)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.backoff_ceiling_secs)
    }
}

impl HubConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl ServiceConfig {
    /// `<config_dir>/leading-snapshot/config.json`
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// Loads the config file if there is one, falls back to defaults otherwise,
    /// then applies environment overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_file_path().and_then(|path| Self::from_file(&path)) {
            Ok(config) => config,
            Err(err) => {
                info!(error = %err, "no usable config file, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.sanitize();
        Ok(config)
    }

    /// Clamps refresh timings that would make the worker spin: zero interval,
    /// zero backoff floor, or a ceiling below the floor.
    pub fn sanitize(&mut self) {
        let refresh = &mut self.refresh;
        if refresh.interval_secs == 0 {
            warn!("refresh interval of 0s raised to 1s");
            refresh.interval_secs = 1;
        }
        if refresh.backoff_floor_secs == 0 {
            warn!("backoff floor of 0s raised to 1s");
            refresh.backoff_floor_secs = 1;
        }
        if refresh.backoff_ceiling_secs < refresh.backoff_floor_secs {
            warn!(
                ceiling = refresh.backoff_ceiling_secs,
                floor = refresh.backoff_floor_secs,
                "backoff ceiling below floor, using the floor"
            );
            refresh.backoff_ceiling_secs = refresh.backoff_floor_secs;
        }
        if refresh.detail_concurrency == 0 {
            refresh.detail_concurrency = 1;
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Environment wins over the file. `lookup` is injectable so tests need not touch
    /// the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(raw) = read("CACHE_INTERVAL") {
            match raw.parse::<u64>() {
                Ok(secs) => self.refresh.interval_secs = secs,
                Err(_) => warn!(value = %raw, "ignoring invalid CACHE_INTERVAL"),
            }
        }
        if let Some(raw) = read("AUTO_REFRESH_SEC") {
            match raw.parse::<f64>() {
                Ok(secs) if secs.is_finite() => {
                    self.refresh.interval_secs = (secs.max(0.0) as u64).max(MIN_AUTO_REFRESH_SECS);
                }
                _ => warn!(value = %raw, "ignoring invalid AUTO_REFRESH_SEC"),
            }
        }
        if let Some(owner) = read("OWNER_NAME") {
            self.owner = owner;
        }
        if let Some(token) = read("APP_TOKEN") {
            self.app_token = Some(token);
        }
        if let Some(url) = read("SOURCE_BASE_URL") {
            self.source.base_url = url;
        }
        if let Some(bind) = read("BIND_ADDR") {
            self.server.bind = bind;
        }
        if let Some(dir) = read("STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        self.sanitize();
    }

    /// Empty tokens count as "no token configured".
    pub fn token(&self) -> Option<&str> {
        self.app_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}
