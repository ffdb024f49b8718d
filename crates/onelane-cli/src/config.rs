//! Configuration – reads/writes `~/.onelane/config.toml`.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use onelane_types::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or saving the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persisted server configuration stored in `~/.onelane/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port for HTTP and WebSocket traffic.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path on which WebSocket upgrades are accepted.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// What to do with a car whose id is already on the bridge.
    #[serde(default)]
    pub duplicate_ids: DuplicatePolicy,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_port() -> u16 {
    onelane_server::DEFAULT_PORT
}
fn default_ws_path() -> String {
    onelane_server::DEFAULT_WS_PATH.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            ws_path: default_ws_path(),
            duplicate_ids: DuplicatePolicy::default(),
        }
    }
}

/// Return the path to `~/.onelane/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".onelane").join("config.toml")
}

/// Load the config from disk and apply `ONELANE_*` overrides on top.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_layered(&config_path(), |key| std::env::var(key).ok())
}

fn load_layered(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<Config>, ConfigError> {
    let mut cfg = load_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_overrides(cfg, lookup);
    }
    Ok(cfg)
}

/// Read the config file at `path` exactly as written; the environment is
/// not consulted.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: Config = toml::from_str(&raw)?;
    Ok(Some(cfg))
}

/// Apply `ONELANE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ONELANE_BIND_ADDRESS` | `bind_address` |
/// | `ONELANE_PORT` | `port` |
/// | `ONELANE_WS_PATH` | `ws_path` |
/// | `ONELANE_DUPLICATE_IDS` | `duplicate_ids` (`allow` / `reject`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from any key lookup.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ONELANE_BIND_ADDRESS")
        && let Ok(addr) = v.parse::<IpAddr>() {
            cfg.bind_address = addr;
        }
    if let Some(v) = lookup("ONELANE_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.port = port;
        }
    if let Some(v) = lookup("ONELANE_WS_PATH")
        && v.starts_with('/') {
            cfg.ws_path = v;
        }
    if let Some(v) = lookup("ONELANE_DUPLICATE_IDS")
        && let Ok(policy) = v.parse::<DuplicatePolicy>() {
            cfg.duplicate_ids = policy;
        }
}

/// Save the config to disk, creating `~/.onelane/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
