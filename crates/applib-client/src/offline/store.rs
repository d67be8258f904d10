//! Cache generations.
//!
//! A generation is written in one commit and never modified afterwards;
//! readers either see the whole set of entries or none of it.

use super::source::CachedResponse;
use super::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Storage for named cache generations.
pub trait CacheStore: Send + Sync {
    /// Atomically replace generation `name` with `entries`.
    fn commit(
        &mut self,
        name: &str,
        entries: Vec<(String, CachedResponse)>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Entry for `url` in generation `name`.
    fn lookup(
        &self,
        name: &str,
        url: &str,
    ) -> impl Future<Output = Result<Option<CachedResponse>, CacheError>> + Send;

    /// Names of every committed generation.
    fn generations(&self) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    caches: HashMap<String, HashMap<String, CachedResponse>>,
}

impl CacheStore for MemoryStore {
    async fn commit(&mut self, name: &str, entries: Vec<(String, CachedResponse)>) -> Result<(), CacheError> {
        self.caches.insert(name.to_string(), entries.into_iter().collect());
        Ok(())
    }

    async fn lookup(&self, name: &str, url: &str) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self.caches.get(name).and_then(|c| c.get(url)).cloned())
    }

    async fn generations(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    #[serde(flatten)]
    meta: CachedResponse,
}

/// One directory per generation under `root`, each holding `index.json` and
/// numbered body files. Commits build a sibling temp directory and rename it
/// into place.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    async fn read_index(dir: &Path) -> Result<Option<BTreeMap<String, IndexEntry>>, CacheError> {
        let raw = match tokio::fs::read(dir.join(INDEX_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

impl CacheStore for DirStore {
    async fn commit(&mut self, name: &str, entries: Vec<(String, CachedResponse)>) -> Result<(), CacheError> {
        let target = self.generation_dir(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let staging = self.root.join(format!(".{name}.tmp.{}", std::process::id()));
        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir(&staging).await?;

        let mut index = BTreeMap::new();
        for (n, (url, response)) in entries.into_iter().enumerate() {
            let file = format!("{n:05}.bin");
            tokio::fs::write(staging.join(&file), &response.body).await?;
            index.insert(url, IndexEntry { file, meta: response });
        }
        tokio::fs::write(staging.join(INDEX_FILE), serde_json::to_vec_pretty(&index)?).await?;

        let retired = self.root.join(format!(".{name}.old.{}", std::process::id()));
        swap_in(&staging, &target, &retired).await
    }

    async fn lookup(&self, name: &str, url: &str) -> Result<Option<CachedResponse>, CacheError> {
        let dir = self.generation_dir(name)?;
        let Some(mut index) = Self::read_index(&dir).await? else {
            return Ok(None);
        };
        let Some(entry) = index.remove(url) else {
            return Ok(None);
        };
        let mut response = entry.meta;
        response.body = tokio::fs::read(dir.join(&entry.file)).await?;
        Ok(Some(response))
    }

    async fn generations(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.file_type().await?.is_dir() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Move `staging` into place at `target`, parking any previous generation at
/// `retired` until the new one is visible. Either the previous generation or
/// the new one is visible, never a mix.
async fn swap_in(staging: &Path, target: &Path, retired: &Path) -> Result<(), CacheError> {
    let replacing = tokio::fs::try_exists(target).await?;
    if replacing {
        tokio::fs::rename(target, retired).await?;
    }
    if let Err(e) = tokio::fs::rename(staging, target).await {
        if replacing {
            if let Err(restore) = tokio::fs::rename(retired, target).await {
                tracing::warn!("Could not restore {}: {}", target.display(), restore);
            }
        }
        return Err(e.into());
    }
    if replacing {
        tokio::fs::remove_dir_all(retired).await?;
    }
    Ok(())
}
