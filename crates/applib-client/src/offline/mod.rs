//! Versioned offline asset cache.
//!
//! `install` captures the static asset list plus whatever the server's
//! manifest names into one cache generation. Nothing is visible until every
//! asset has been fetched and the generation committed.

mod source;
mod store;

pub use source::{AssetSource, CachedResponse, FetchError, HttpSource};
pub use store::{CacheStore, DirStore, MemoryStore};

use crate::config::OfflineConfig;
use futures_util::future::try_join_all;
use std::time::Duration;
use url::Url;

pub const MANIFEST_PATH: &str = "./api/additional_offline_files";

/// How long `install` waits for the manifest before caching static assets only.
pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `install` waits for any single asset before giving up.
pub const ASSET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    Idle,
    Installing,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed {
        cache: String,
        assets: usize,
        /// Whether the server manifest contributed to the asset list.
        manifest: bool,
    },
    /// The page host is not allowed to cache; requests always hit the network.
    Bypassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub origin: Origin,
    pub response: CachedResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache index: {0}")]
    Index(#[from] serde_json::Error),
    #[error("invalid cache name {0:?}")]
    InvalidName(String),
    #[error("invalid asset url: {0}")]
    Url(#[from] url::ParseError),
    #[error("fetching {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("fetching {url}: status {status}")]
    Status { url: String, status: u16 },
}

pub struct OfflineCacheManager<Src, St> {
    base: Url,
    version: String,
    static_assets: Vec<String>,
    allowed_hosts: Vec<String>,
    source: Src,
    store: St,
    state: CacheState,
}

impl<Src: AssetSource, St: CacheStore> OfflineCacheManager<Src, St> {
    /// `base` is the page URL that relative asset paths resolve against.
    pub fn new(base: Url, config: &OfflineConfig, source: Src, store: St) -> Self {
        Self {
            base,
            version: config.version.clone(),
            static_assets: config.static_assets.clone(),
            allowed_hosts: config.allowed_hosts.clone(),
            source,
            store,
            state: CacheState::Idle,
        }
    }

    pub fn cache_name(&self) -> String {
        format!("app-pwa-{}", self.version)
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.base
            .host_str()
            .is_some_and(|host| self.allowed_hosts.iter().any(|h| h == host))
    }

    pub fn manifest_url(&self) -> Result<Url, CacheError> {
        Ok(self.base.join(MANIFEST_PATH)?)
    }

    /// Reuse a generation committed by an earlier run. Returns whether the
    /// cache is now active.
    pub async fn resume(&mut self) -> Result<bool, CacheError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let cache = self.cache_name();
        if self.store.generations().await?.contains(&cache) {
            tracing::debug!("Resuming offline cache {}", cache);
            self.state = CacheState::Active;
        }
        Ok(self.state == CacheState::Active)
    }

    /// Capture a new generation. On any asset or commit failure nothing is
    /// committed and the previous state is restored.
    pub async fn install(&mut self) -> Result<InstallOutcome, CacheError> {
        if !self.is_enabled() {
            tracing::info!("Offline cache disabled for host {:?}", self.base.host_str());
            return Ok(InstallOutcome::Bypassed);
        }

        let previous = self.state;
        self.state = CacheState::Installing;
        let result = self.capture().await;
        self.state = match result {
            Ok(_) => CacheState::Active,
            Err(_) => previous,
        };
        result
    }

    async fn capture(&mut self) -> Result<InstallOutcome, CacheError> {
        let cache = self.cache_name();
        let manifest = self.fetch_manifest().await;
        let from_manifest = manifest.is_some();

        let mut urls: Vec<Url> = Vec::new();
        for path in self.static_assets.iter().chain(manifest.iter().flatten()) {
            let url = self.base.join(path)?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        tracing::info!("Installing {} ({} assets)", cache, urls.len());
        let source = &self.source;
        let entries = try_join_all(urls.iter().map(|url| async move {
            let response = tokio::time::timeout(ASSET_TIMEOUT, source.fetch(url))
                .await
                .unwrap_or(Err(FetchError::TimedOut(ASSET_TIMEOUT)))
                .map_err(|source| CacheError::Fetch {
                    url: url.to_string(),
                    source,
                })?;
            if !response.is_success() {
                return Err(CacheError::Status {
                    url: url.to_string(),
                    status: response.status,
                });
            }
            Ok((url.to_string(), response))
        }))
        .await?;

        let assets = entries.len();
        self.store.commit(&cache, entries).await?;
        tracing::info!("Offline cache {} active", cache);
        Ok(InstallOutcome::Installed {
            cache,
            assets,
            manifest: from_manifest,
        })
    }

    /// Manifest entries, or `None` when the manifest is unavailable.
    async fn fetch_manifest(&self) -> Option<Vec<String>> {
        let url = self.manifest_url().ok()?;
        let fetched = match tokio::time::timeout(MANIFEST_TIMEOUT, self.source.fetch(&url)).await {
            Ok(fetched) => fetched,
            Err(_) => {
                tracing::warn!(
                    "Manifest {} did not answer within {}ms, caching static assets only",
                    url,
                    MANIFEST_TIMEOUT.as_millis()
                );
                return None;
            }
        };
        match fetched {
            Ok(response) if response.is_success() => {
                match serde_json::from_slice::<Vec<String>>(&response.body) {
                    Ok(paths) => Some(paths),
                    Err(e) => {
                        tracing::warn!("Manifest {} is not a list of paths: {}", url, e);
                        None
                    }
                }
            }
            Ok(response) => {
                tracing::warn!("Manifest {} returned {}, caching static assets only", url, response.status);
                None
            }
            Err(e) => {
                tracing::warn!("Manifest {} unavailable, caching static assets only: {}", url, e);
                None
            }
        }
    }

    /// Serve `url` from the active generation when possible.
    pub async fn fetch(&self, url: &Url) -> Result<Served, CacheError> {
        if self.is_enabled() && self.state == CacheState::Active {
            match self.store.lookup(&self.cache_name(), url.as_str()).await {
                Ok(Some(response)) => {
                    return Ok(Served {
                        origin: Origin::Cache,
                        response,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache lookup for {} failed: {}", url, e),
            }
        }

        let response = self.source.fetch(url).await.map_err(|source| CacheError::Fetch {
            url: url.to_string(),
            source,
        })?;
        Ok(Served {
            origin: Origin::Network,
            response,
        })
    }
}
