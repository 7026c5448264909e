use std::path::Path;
use std::time::Duration;

use pagesnap_lib::{Config, SnapError};
use tracing::debug;

use crate::cli::CaptureArgs;

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/pagesnap/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, SnapError> {
    let cfg = Config::load(path).map_err(|e| match e {
        SnapError::Config(msg) => SnapError::Config(msg),
        other => {
            let loc = path
                .map(|p| p.display().to_string())
                .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "defaults".to_string());
            SnapError::Config(format!("Failed to read config {}: {}", loc, other))
        }
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        SnapError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Apply per-invocation flags on top of the loaded config. Flags win.
pub fn apply_overrides(mut config: Config, args: &CaptureArgs) -> Result<Config, SnapError> {
    if let Some(viewport) = args.viewport {
        config.engine.viewport = viewport;
    }
    if let Some(secs) = args.nav_timeout {
        if secs == 0 {
            return Err(SnapError::Config(
                "--nav-timeout must be greater than zero".to_string(),
            ));
        }
        config.timeouts.navigation = Duration::from_secs(secs);
    }
    config.validate()?;
    Ok(config)
}

/// Log effective config (visible with --verbose).
pub fn log_effective_config(config: &Config, config_path: Option<&Path>) {
    debug!("{}", format_effective_config(config, config_path));
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: viewport={}x{}, headless={}, pool: max={}, idle={}s, engine-idle={}s, timeouts: nav={}s, network-idle={}s, acquire={}s",
        config.engine.viewport.width,
        config.engine.viewport.height,
        config.engine.headless,
        config.pool.max_pool_size,
        config.pool.idle_timeout.as_secs(),
        config.engine.inactivity_timeout.as_secs(),
        config.timeouts.navigation.as_secs(),
        config.timeouts.network_idle.as_secs(),
        config.timeouts.acquire.as_secs(),
    )
}
