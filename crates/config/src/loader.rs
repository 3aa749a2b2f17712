use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    serde::de::DeserializeOwned,
    tracing::{debug, info, warn},
};

use crate::{
    env_subst::substitute_env,
    schema::{RelayConfig, RoleTables},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["relay.toml", "relay.yaml", "relay.yml", "relay.json"];

/// Load config from the given path (any supported format) and resolve the
/// permissions file it points to.
///
/// Any read or parse failure is returned; callers treat it as fatal.
pub fn load_config(path: &Path) -> anyhow::Result<RelayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config: RelayConfig =
        parse(&raw, path).with_context(|| format!("invalid config {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_permissions(&mut config, base)?;
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./relay.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/relay/relay.{toml,yaml,yml,json}` (user-global)
///
/// Returns `RelayConfig::default()` when no file exists. A file that exists
/// but cannot be loaded is an error.
pub fn discover_and_load() -> anyhow::Result<RelayConfig> {
    match find_config_file() {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            load_config(&path)
        },
        None => {
            warn!("no config file found, using defaults (every task will be denied)");
            Ok(RelayConfig::default())
        },
    }
}

/// Load role tables from a standalone permissions file.
pub fn load_permissions(path: &Path) -> anyhow::Result<RoleTables> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("permissions file not readable: {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse(&raw, path).with_context(|| format!("malformed permissions file {}", path.display()))
}

/// Replace the inline role tables with the contents of `permissions.file`.
pub fn resolve_permissions(config: &mut RelayConfig, base: &Path) -> anyhow::Result<()> {
    let Some(file) = config.permissions.file.clone() else {
        return Ok(());
    };
    let path = if file.is_absolute() {
        file
    } else {
        base.join(file)
    };
    debug!(path = %path.display(), "loading permissions");
    config.permissions.roles = load_permissions(&path)?;
    config.permissions.file = Some(path);
    Ok(())
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user config directory: `~/.config/relay/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("relay"))
}

fn parse<T: DeserializeOwned>(raw: &str, path: &Path) -> anyhow::Result<T> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
