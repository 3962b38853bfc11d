use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::LernioConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["lernio.toml", "lernio.yaml", "lernio.yml", "lernio.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<LernioConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `<config_dir>/lernio.{toml,yaml,yml,json}` when an override is given
/// 2. `./lernio.{toml,yaml,yml,json}` (project-local)
/// 3. `~/.config/lernio/lernio.{toml,yaml,yml,json}` (user-global)
///
/// Returns `LernioConfig::default()` if no config file is found.
pub fn discover_and_load(config_dir_override: Option<&Path>) -> LernioConfig {
    if let Some(path) = find_config_file(config_dir_override) {
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
    LernioConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file(config_dir_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = config_dir_override {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
        return None;
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/lernio/
    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/lernio/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lernio").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory used for the SQLite database.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lernio").map(|d| d.data_dir().to_path_buf())
}

/// Resolve the database path: explicit config value, then `<data_dir>/lernio.db`.
pub fn database_path(cfg: &LernioConfig, data_dir_override: Option<&Path>) -> PathBuf {
    if let Some(ref p) = cfg.database.path {
        return p.clone();
    }
    let base = data_dir_override
        .map(Path::to_path_buf)
        .or_else(data_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("lernio.db")
}

/// A non-secret summary of the loaded config, for `lernio config show`.
pub fn redacted_summary(cfg: &LernioConfig) -> serde_json::Value {
    serde_json::json!({
        "server": { "bind": cfg.server.bind, "port": cfg.server.port },
        "provider": {
            "phone_number_id": cfg.provider.phone_number_id,
            "api_base": cfg.provider.api_base,
            "send_timeout_secs": cfg.provider.send_timeout_secs,
            "signature_check": cfg.provider.app_secret.is_some(),
        },
        "queue": {
            "rate_per_sec": cfg.queue.rate_per_sec,
            "max_attempts": cfg.queue.max_attempts,
            "backoff_base_secs": cfg.queue.backoff_base_secs,
            "keep_per_outcome": cfg.queue.keep_per_outcome,
            "worker_concurrency": cfg.queue.worker_concurrency,
        },
        "scheduler": {
            "default_tick": cfg.scheduler.default_tick,
            "timezone": cfg.scheduler.timezone,
        },
        "retention": {
            "days": cfg.retention.days,
            "sweep_cron": cfg.retention.sweep_cron,
        },
    })
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<LernioConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
