use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::mods::error::Error;

// =============================================================================
// Portal constants
// =============================================================================

/// Default mod portal location
pub const DEFAULT_PORTAL_URL: &str = "https://mods.factorio.com";

/// Page size requested from the catalog API; the portal accepts "max"
pub const DEFAULT_PAGE_SIZE: &str = "max";

/// Timeout for a single request in milliseconds (1 minute)
pub const FETCH_TIMEOUT_MS: u64 = 60_000;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("mod-portal-cache/", env!("CARGO_PKG_VERSION"));

/// Oldest game version whose mods show up in search results
pub const MIN_FACTORIO_VERSION: &str = "1.1";

/// Name of the application's directories and files
const APP_NAME: &str = "mod-portal-cache";

/// Application configuration, read from `config.json`
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub portal: PortalConfig,
    pub cache: CacheConfig,
    pub install: InstallConfig,
}

/// Mod portal connection settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PortalConfig {
    pub base_url: String,
    pub page_size: String,
    /// Request timeout in milliseconds
    pub timeout: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PORTAL_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE.to_string(),
            timeout: FETCH_TIMEOUT_MS,
        }
    }
}

/// Local cache settings
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache directory; defaults to [`cache_dir`]
    pub directory: Option<PathBuf>,
    /// Compare downloaded archives against the portal's SHA-1
    pub verify_checksums: bool,
}

/// Defaults for `install`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InstallConfig {
    /// Game installation directory
    pub directory: PathBuf,
    pub install_optional: bool,
    pub enable: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/opt/factorio"),
            install_optional: false,
            enable: false,
        }
    }
}

impl Config {
    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(Error::io(format!("read {}", path.display())))?;
        serde_json::from_str(&content).map_err(|source| Error::Decode {
            context: path.display().to_string(),
            source,
        })
    }

    /// Directory holding the cache database, staged pulls, and downloads.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.directory.clone().unwrap_or_else(cache_dir)
    }
}

/// Returns the path to the cache directory.
/// Uses $XDG_CACHE_HOME/mod-portal-cache if XDG_CACHE_HOME is set,
/// otherwise falls back to ~/.cache/mod-portal-cache,
/// or ./mod-portal-cache if neither is available.
pub fn cache_dir() -> PathBuf {
    dir_with_env(
        std::env::var("XDG_CACHE_HOME").ok(),
        dirs::home_dir(),
        ".cache",
    )
}

/// Returns the path to the configuration file.
pub fn config_path() -> PathBuf {
    dir_with_env(
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::home_dir(),
        ".config",
    )
    .join("config.json")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    dir_with_env(
        std::env::var("XDG_STATE_HOME").ok(),
        dirs::home_dir(),
        ".local/state",
    )
    .join("mod-portal-cache.log")
}

fn dir_with_env(xdg_dir: Option<String>, home_dir: Option<PathBuf>, home_relative: &str) -> PathBuf {
    let base = xdg_dir
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(home_relative)))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_NAME)
}
