use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::RelayConfig,
};

/// Config file names inside the data directory, checked in order.
const CONFIG_FILENAMES: &[&str] = &["config.yaml", "config.yml", "config.toml", "config.json"];

/// `~/.opsrelay`, or `./.opsrelay` when no home directory can be determined.
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".opsrelay"))
        .unwrap_or_else(|| PathBuf::from(".opsrelay"))
}

/// Find the first config file in `data_dir`.
pub fn find_config_file(data_dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| data_dir.join(name))
        .find(|p| p.exists())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Load the config from `data_dir`, writing a default `config.yaml` when none
/// exists. Returns the config and the file it came from. A config file that
/// does not parse is an error.
pub fn load_or_init(data_dir: &Path) -> Result<(RelayConfig, PathBuf)> {
    if let Some(path) = find_config_file(data_dir) {
        debug!(path = %path.display(), "loading config");
        let config = load_config(&path)?;
        return Ok((config, path));
    }

    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(CONFIG_FILENAMES[0]);
    let config = RelayConfig::default();
    std::fs::write(&path, serde_yaml::to_string(&config)?)?;
    info!(path = %path.display(), "wrote default config");
    Ok((config, path))
}

/// Load `<data_dir>/.env` into the process environment, if present.
///
/// Variables already set in the environment win.
pub fn load_dotenv(data_dir: &Path) -> Result<bool> {
    let path = data_dir.join(".env");
    if !path.exists() {
        return Ok(false);
    }
    dotenvy::from_path(&path)?;
    debug!(path = %path.display(), "loaded .env");
    Ok(true)
}

fn parse_config(raw: &str, path: &Path) -> Result<RelayConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");

    match ext {
        "yaml" | "yml" => {
            // An empty YAML file deserializes to unit, not a mapping.
            if raw.trim().is_empty() {
                return Ok(RelayConfig::default());
            }
            Ok(serde_yaml::from_str(raw)?)
        },
        "toml" => Ok(toml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::unsupported_format(path)),
    }
}
