use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::remote::{RemoteError, RemoteObject, RemoteStore};
use crate::retry::RetryPolicy;

const CACHE_MIME_TYPE: &str = "application/json";

/// filename -> content hash
pub type DirectoryChecksums = BTreeMap<String, String>;
/// directory key -> checksums of the content objects it holds
pub type CacheMap = BTreeMap<String, DirectoryChecksums>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize checksum cache: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("checksum cache not confirmed after {attempts} persist attempts")]
    PersistFailed { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Unloaded,
    Loaded,
    /// Fetch failed or came back empty; a rebuild is pending.
    Stale,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Title of the cache object stored under the root anchor.
    pub title: String,
    pub scratch_dir: PathBuf,
    pub content_mime_prefixes: Vec<String>,
    pub rebuild_concurrency: usize,
    pub persist_retry: RetryPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            title: "checksum_cache.json".to_string(),
            scratch_dir: std::env::temp_dir(),
            content_mime_prefixes: vec![
                "image/".to_string(),
                "video/".to_string(),
                "application/octet-stream".to_string(),
            ],
            rebuild_concurrency: 4,
            persist_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub folders_visited: usize,
    pub empty_folders: usize,
    pub directories: usize,
    pub files: usize,
}

/// A change made while a rebuild scan is running, replayed onto its result.
enum PendingChange {
    Recorded { dir_key: String, file_name: String, hash: String },
    Evicted { dir_key: String, file_name: String },
}

struct Inner {
    state: CacheState,
    map: CacheMap,
    /// `Some` while a rebuild scan is in flight.
    pending: Option<Vec<PendingChange>>,
}

impl Inner {
    fn record(&mut self, dir_key: &str, file_name: &str, hash: &str) {
        self.map
            .entry(dir_key.to_string())
            .or_default()
            .insert(file_name.to_string(), hash.to_string());
    }

    fn evict(&mut self, dir_key: &str, file_name: &str) -> bool {
        let Some(files) = self.map.get_mut(dir_key) else {
            return false;
        };
        let removed = files.remove(file_name).is_some();
        if files.is_empty() {
            self.map.remove(dir_key);
        }
        removed
    }
}

/// Per-directory content hashes, persisted as a JSON object inside the
/// remote store under the root anchor.
///
/// The cache is advisory: a miss or a stale entry is settled by a live
/// listing, never trusted over the store.
pub struct ChecksumCache {
    store: Arc<dyn RemoteStore>,
    root: RemoteObject,
    settings: CacheSettings,
    inner: RwLock<Inner>,
    load_lock: Mutex<()>,
    rebuild_lock: Mutex<()>,
    persist_lock: Mutex<()>,
}

impl ChecksumCache {
    pub fn new(store: Arc<dyn RemoteStore>, root: RemoteObject, settings: CacheSettings) -> Self {
        Self {
            store,
            root,
            settings,
            inner: RwLock::new(Inner {
                state: CacheState::Unloaded,
                map: CacheMap::new(),
                pending: None,
            }),
            load_lock: Mutex::new(()),
            rebuild_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> CacheState {
        self.inner.read().await.state
    }

    /// The whole cache, loading it from the store (or rebuilding it) first.
    pub async fn get(&self) -> Result<CacheMap, CacheError> {
        self.ensure_loaded().await?;
        Ok(self.inner.read().await.map.clone())
    }

    pub async fn lookup(&self, dir_key: &str, file_name: &str) -> Result<Option<String>, CacheError> {
        self.ensure_loaded().await?;
        Ok(self
            .inner
            .read()
            .await
            .map
            .get(dir_key)
            .and_then(|files| files.get(file_name))
            .cloned())
    }

    /// Records a hash in memory. Call [`ChecksumCache::update`] to persist.
    pub async fn record(&self, dir_key: &str, file_name: &str, hash: &str) -> Result<(), CacheError> {
        self.ensure_loaded().await?;
        let mut inner = self.inner.write().await;
        inner.record(dir_key, file_name, hash);
        if let Some(pending) = inner.pending.as_mut() {
            pending.push(PendingChange::Recorded {
                dir_key: dir_key.to_string(),
                file_name: file_name.to_string(),
                hash: hash.to_string(),
            });
        }
        Ok(())
    }

    /// Drops an entry from memory only; the next persist carries the removal.
    ///
    /// Loads the cache first, so an entry that was only persisted is dropped too.
    pub async fn evict(&self, dir_key: &str, file_name: &str) -> Result<bool, CacheError> {
        self.ensure_loaded().await?;
        let mut inner = self.inner.write().await;
        let removed = inner.evict(dir_key, file_name);
        if let Some(pending) = inner.pending.as_mut() {
            pending.push(PendingChange::Evicted {
                dir_key: dir_key.to_string(),
                file_name: file_name.to_string(),
            });
        }
        Ok(removed)
    }

    /// Forgets the in-memory copy; the next access fetches again.
    pub async fn unload(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CacheState::Unloaded;
        inner.map.clear();
    }

    /// Downloads and decodes the persisted cache. Every failure reads as `None`.
    pub async fn fetch(&self) -> Option<CacheMap> {
        let candidates = match self
            .store
            .list_by_title_and_parent(&self.settings.title, Some(&self.root.id), false)
            .await
        {
            Ok(objects) => objects,
            Err(err) => {
                error!(error = %err, "failed to look up checksum cache object");
                return None;
            }
        };
        let object = candidates
            .into_iter()
            .find(|object| object.title == self.settings.title && !object.is_folder())?;
        let bytes = match self.store.download_content(&object.id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(id = %object.id, "checksum cache object has no content");
                return None;
            }
            Err(err) => {
                error!(id = %object.id, error = %err, "failed to download checksum cache");
                return None;
            }
        };
        match serde_json::from_slice::<CacheMap>(&bytes) {
            Ok(map) => Some(map),
            Err(err) => {
                warn!(id = %object.id, error = %err, "checksum cache is unreadable");
                None
            }
        }
    }

    /// Rebuilds the cache from a breadth-first scan of every folder under the
    /// root anchor, then persists it.
    ///
    /// Records and evictions made while the scan runs are replayed onto its
    /// result, in order.
    pub async fn rebuild(&self) -> Result<RebuildStats, CacheError> {
        let _guard = self.rebuild_lock.lock().await;
        self.inner.write().await.pending = Some(Vec::new());
        let mut stats = RebuildStats::default();
        let mut map = CacheMap::new();
        let mut visited: HashSet<String> = HashSet::from([self.root.id.clone()]);
        let mut frontier = vec![(self.root.id.clone(), String::new())];
        let concurrency = self.settings.rebuild_concurrency.max(1);

        while !frontier.is_empty() {
            // Ordered buffering keeps merges deterministic when sibling folders share a title.
            let listings: Vec<_> = stream::iter(frontier.drain(..))
                .map(|(id, key)| async move {
                    let children = self.list_children(&id).await;
                    (key, children)
                })
                .buffered(concurrency)
                .collect()
                .await;

            for (key, children) in listings {
                stats.folders_visited += 1;
                if children.is_empty() {
                    stats.empty_folders += 1;
                    continue;
                }
                for child in children {
                    if child.is_folder() {
                        if visited.insert(child.id.clone()) {
                            frontier.push((child.id, join_key(&key, &child.title)));
                        }
                    } else if let Some(hash) = self.content_hash(&key, &child) {
                        map.entry(key.clone())
                            .or_default()
                            .insert(child.title, hash);
                    }
                }
            }
        }

        stats.directories = map.len();
        stats.files = map.values().map(BTreeMap::len).sum();
        info!(
            folders = stats.folders_visited,
            empty = stats.empty_folders,
            directories = stats.directories,
            files = stats.files,
            "checksum cache rebuilt"
        );
        {
            let mut inner = self.inner.write().await;
            inner.map = map;
            inner.state = CacheState::Loaded;
            for change in inner.pending.take().unwrap_or_default() {
                match change {
                    PendingChange::Recorded {
                        dir_key,
                        file_name,
                        hash,
                    } => inner.record(&dir_key, &file_name, &hash),
                    PendingChange::Evicted { dir_key, file_name } => {
                        inner.evict(&dir_key, &file_name);
                    }
                }
            }
        }
        self.persist().await?;
        Ok(stats)
    }

    /// Persists the in-memory cache, replacing it with `new_map` first when given.
    pub async fn update(&self, new_map: Option<CacheMap>) -> Result<(), CacheError> {
        if let Some(map) = new_map {
            let mut inner = self.inner.write().await;
            inner.map = map;
            inner.state = CacheState::Loaded;
        }
        self.persist().await
    }

    /// Replaces the remote cache object and confirms it reads back, retrying
    /// the whole sequence under the configured bound.
    async fn persist(&self) -> Result<(), CacheError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.read().await.map.clone();
        let retry = self.settings.persist_retry;

        for attempt in 0..retry.max_attempts() {
            self.write_remote(&snapshot).await?;
            match self.fetch().await {
                Some(stored) if stored == snapshot => {
                    debug!(attempt, "checksum cache persisted");
                    return Ok(());
                }
                _ => {
                    warn!(attempt, "checksum cache not visible after upload, retrying");
                    if retry.should_retry(attempt) {
                        retry.wait(attempt).await;
                    }
                }
            }
        }
        error!(attempts = retry.max_attempts(), "giving up on checksum cache persist");
        Err(CacheError::PersistFailed {
            attempts: retry.max_attempts(),
        })
    }

    async fn write_remote(&self, map: &CacheMap) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.settings.scratch_dir).await?;
        // Removed on drop, whichever way this function exits.
        let scratch = tempfile::Builder::new()
            .prefix(".checksum-cache-")
            .suffix(".json")
            .tempfile_in(&self.settings.scratch_dir)?;
        tokio::fs::write(scratch.path(), serde_json::to_vec(map)?).await?;

        let existing = self
            .store
            .list_by_title_and_parent(&self.settings.title, Some(&self.root.id), false)
            .await?;
        for object in existing
            .iter()
            .filter(|object| object.title == self.settings.title && !object.is_folder())
        {
            if let Err(err) = self.store.delete_object(&object.id).await {
                warn!(id = %object.id, error = %err, "failed to delete previous checksum cache");
            }
        }

        let bytes = tokio::fs::read(scratch.path()).await?;
        let object = self
            .store
            .create_object(
                &self.settings.title,
                CACHE_MIME_TYPE,
                Some(&self.root.id),
                Some(&bytes),
            )
            .await?;
        debug!(id = %object.id, bytes = bytes.len(), "uploaded checksum cache");
        scratch.close()?;
        Ok(())
    }

    async fn ensure_loaded(&self) -> Result<(), CacheError> {
        if self.inner.read().await.state == CacheState::Loaded {
            return Ok(());
        }
        let _guard = self.load_lock.lock().await;
        if self.inner.read().await.state == CacheState::Loaded {
            return Ok(());
        }
        match self.fetch().await {
            Some(map) if !map.is_empty() => {
                debug!(directories = map.len(), "checksum cache loaded");
                let mut inner = self.inner.write().await;
                inner.map = map;
                inner.state = CacheState::Loaded;
            }
            _ => {
                self.inner.write().await.state = CacheState::Stale;
                info!("checksum cache missing or empty, rebuilding");
                self.rebuild().await?;
            }
        }
        Ok(())
    }

    async fn list_children(&self, folder_id: &str) -> Vec<RemoteObject> {
        match self
            .store
            .list_by_title_and_parent(gdrive_core::WILDCARD, Some(folder_id), false)
            .await
        {
            Ok(children) => children,
            Err(err) => {
                error!(folder_id, error = %err, "listing failed during rebuild");
                Vec::new()
            }
        }
    }

    fn content_hash(&self, dir_key: &str, object: &RemoteObject) -> Option<String> {
        if dir_key.is_empty() && object.title == self.settings.title {
            return None;
        }
        let indexed = self
            .settings
            .content_mime_prefixes
            .iter()
            .any(|prefix| object.mime_type.starts_with(prefix.as_str()));
        if indexed { object.content_hash.clone() } else { None }
    }
}

fn join_key(parent: &str, title: &str) -> String {
    if parent.is_empty() {
        title.to_string()
    } else {
        format!("{parent}/{title}")
    }
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod tests;
