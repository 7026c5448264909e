use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::browser::{BrowserOptions, PoolOptions};
use crate::summary::CaptureOptions;
use crate::{Result, SnapError, Viewport};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub pool: PoolConfig,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(with = "humantime_serde")]
    pub inactivity_timeout: Duration,
    pub headless: bool,
    pub viewport: Viewport,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(60),
            headless: true,
            viewport: Viewport::default(),
            chrome_executable: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub max_pool_size: usize,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub eviction_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 4,
            idle_timeout: Duration::from_secs(300),
            eviction_interval: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub network_idle: Duration,
    #[serde(with = "humantime_serde")]
    pub acquire: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            network_idle: Duration::from_secs(10),
            acquire: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load config from an explicit path, the central config file, or defaults.
    /// Priority: explicit path > ~/.config/pagesnap/config.toml > defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::central_config_path().filter(|p| p.is_file()),
        };

        let Some(file) = candidate else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(&file).map_err(|e| {
            SnapError::Config(format!("Failed to read config {}: {}", file.display(), e))
        })?;
        let cfg = Self::from_toml(&text)
            .map_err(|e| SnapError::Config(format!("Invalid config ({}): {}", file.display(), e)))?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text).map_err(|e| SnapError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn central_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("pagesnap")
                .join("config.toml")
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.max_pool_size == 0 {
            return Err(SnapError::Config(
                "pool.max_pool_size must be at least 1".to_string(),
            ));
        }
        let durations = [
            ("engine.inactivity_timeout", self.engine.inactivity_timeout),
            ("pool.idle_timeout", self.pool.idle_timeout),
            ("timeouts.navigation", self.timeouts.navigation),
            ("timeouts.network_idle", self.timeouts.network_idle),
            ("timeouts.acquire", self.timeouts.acquire),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(SnapError::Config(format!("{name} must be greater than zero")));
            }
        }
        if matches!(self.pool.eviction_interval, Some(d) if d.is_zero()) {
            return Err(SnapError::Config(
                "pool.eviction_interval must be greater than zero".to_string(),
            ));
        }
        if self.engine.viewport.width == 0 || self.engine.viewport.height == 0 {
            return Err(SnapError::Config(
                "engine.viewport dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            chrome_executable: self.engine.chrome_executable.clone(),
            viewport: self.engine.viewport,
            headless: self.engine.headless,
            request_timeout: self.timeouts.navigation,
            ..BrowserOptions::default()
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_pool_size: self.pool.max_pool_size,
            idle_timeout: self.pool.idle_timeout,
            eviction_interval: self.pool.eviction_interval,
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            navigation_timeout: self.timeouts.navigation,
            network_idle_timeout: self.timeouts.network_idle,
            acquire_timeout: self.timeouts.acquire,
            ..CaptureOptions::default()
        }
    }
}
