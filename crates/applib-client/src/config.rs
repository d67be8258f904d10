//! Client configuration, read from TOML.

use crate::posrep::{POSREP_CALLBACK, POSREP_QUERY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:7010/";
pub const DEFAULT_CACHE_VERSION: &str = "v0.0.4";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Public deployments on which the offline cache is enabled out of the box.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["loci.devil-tech.com", "jeffrey-p-mcateer.github.io"];

/// Assets captured by every offline install, relative to the server URL.
pub const DEFAULT_STATIC_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./style.css",
    "./app_gui.js",
    "./app_lib.js",
    "./app_pwa.js",
    "./app_util.js",
    "./app_test.js",
    "./gen/icon-192.png",
    "./gen/icon-512.png",
    "./lib/split.min.js",
    "./lib/worldwind.min.js",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid server url {url:?}: {reason}")]
    ServerUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base http(s) URL of the dashboard.
    pub server_url: String,
    /// Client props file. In-memory props when unset.
    pub props_path: Option<PathBuf>,
    pub offline: OfflineConfig,
    pub poll: Option<PollConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            props_path: None,
            offline: OfflineConfig::default(),
            poll: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Cache generations are named `app-pwa-<version>`.
    pub version: String,
    /// Hosts on which the offline cache is active. Empty disables it.
    ///
    /// Local development servers are left off the default list.
    pub allowed_hosts: Vec<String>,
    pub static_assets: Vec<String>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CACHE_VERSION.to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect(),
            static_assets: DEFAULT_STATIC_ASSETS.iter().map(|s| s.to_string()).collect(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub query: String,
    pub callback: String,
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            query: POSREP_QUERY.to_string(),
            callback: POSREP_CALLBACK.to_string(),
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ClientConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// The server URL, always ending in `/` so relative paths resolve under it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::ServerUrl {
            url: self.server_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.server_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// `ws(s)://host[:port]/ws` for the configured server.
    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| ConfigError::ServerUrl {
            url: self.server_url.clone(),
            reason: format!("cannot use {scheme} scheme"),
        })?;
        url.set_path("/ws");
        Ok(url)
    }
}
