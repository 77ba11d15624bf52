use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use hopbus_metrics::{config as config_metrics, counter, labels};

use crate::{env_subst::substitute_env, schema::HopbusConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["hopbus.toml", "hopbus.yaml", "hopbus.yml", "hopbus.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HopbusConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./hopbus.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/hopbus/hopbus.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HopbusConfig::default()` if no config file is found.
pub fn discover_and_load() -> HopbusConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    HopbusConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/hopbus/
    if let Some(config_dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/hopbus/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hopbus").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hopbus.toml")
}

/// Serialize `config` to TOML and write it to `path`.
///
/// Creates parent directories if needed.
pub fn save_config(config: &HopbusConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Apply `HOPBUS_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut HopbusConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut HopbusConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(level) = lookup("HOPBUS_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
        config.logging.level = level;
    }
    if let Some(policy) = lookup("HOPBUS_REBIND_POLICY") {
        match policy.parse() {
            Ok(policy) => config.router.rebind_policy = policy,
            Err(e) => warn!(error = %e, "ignoring HOPBUS_REBIND_POLICY"),
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HopbusConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let parsed = match ext {
        "toml" => toml::from_str(raw).map_err(anyhow::Error::from),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(anyhow::Error::from),
        "json" => serde_json::from_str(raw).map_err(anyhow::Error::from),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    };

    #[cfg(feature = "metrics")]
    if parsed.is_err() {
        counter!(config_metrics::PARSE_ERRORS_TOTAL, labels::FORMAT => ext.to_string())
            .increment(1);
    }

    parsed
}
