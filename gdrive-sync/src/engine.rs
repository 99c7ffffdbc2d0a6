use std::path::{Path, PathBuf};
use std::sync::Arc;

use gdrive_core::WILDCARD;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::checksum::{CacheError, ChecksumCache};
use crate::path::{PathError, VirtualPath};
use crate::remote::{RemoteError, RemoteObject};
use crate::resolver::{PathResolver, ResolveError};

pub const IMAGE_MIME_TYPE: &str = "image/jpeg";
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("local file has no usable name: {0}")]
    InvalidFileName(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("checksum cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The store already holds this content; nothing was transferred.
    Skipped(RemoteObject),
    Uploaded(RemoteObject),
}

impl UploadOutcome {
    pub fn object(&self) -> &RemoteObject {
        match self {
            UploadOutcome::Skipped(object) | UploadOutcome::Uploaded(object) => object,
        }
    }

    pub fn into_object(self) -> RemoteObject {
        match self {
            UploadOutcome::Skipped(object) | UploadOutcome::Uploaded(object) => object,
        }
    }

    pub fn was_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(RemoteObject),
    NotFound,
    /// Several objects matched; none were deleted.
    Refused { ids: Vec<String> },
}

pub struct SyncEngine {
    resolver: Arc<PathResolver>,
    cache: Arc<ChecksumCache>,
}

impl SyncEngine {
    pub fn new(resolver: Arc<PathResolver>, cache: Arc<ChecksumCache>) -> Self {
        Self { resolver, cache }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &ChecksumCache {
        &self.cache
    }

    /// Uploads `local` into `dir` (created if missing) unless the store
    /// already holds the same content under that name.
    pub async fn upload_if_changed(
        &self,
        local: &Path,
        dir: &VirtualPath,
        mime_type: &str,
    ) -> Result<UploadOutcome, EngineError> {
        let file_name = local_file_name(local)?;
        let target = dir.join(file_name)?;
        let folder = self.resolver.makedirs(dir, None).await?;
        // One read: the recorded hash always describes the uploaded bytes.
        let content = tokio::fs::read(local).await?;
        let local_hash = format!("{:x}", md5::compute(&content));
        let dir_key = dir.cache_key();

        match self.cache.lookup(&dir_key, file_name).await? {
            Some(cached) if cached == local_hash => {
                if let Some(existing) = self.existing_copy(&folder, file_name, &local_hash).await? {
                    info!(path = %target, "unchanged, upload skipped");
                    return Ok(UploadOutcome::Skipped(existing));
                }
                warn!(path = %target, "cached checksum has no remote object, uploading");
            }
            Some(_) => debug!(path = %target, "content changed"),
            None => {
                if let Some(existing) = self.existing_copy(&folder, file_name, &local_hash).await? {
                    info!(path = %target, "already uploaded, recording checksum");
                    self.cache.record(&dir_key, file_name, &local_hash).await?;
                    self.cache.update(None).await?;
                    return Ok(UploadOutcome::Skipped(existing));
                }
            }
        }

        let object = self
            .resolver
            .store()
            .create_object(file_name, mime_type, Some(&folder.id), Some(&content))
            .await?;
        debug!(path = %target, id = %object.id, "uploaded");
        self.cache.record(&dir_key, file_name, &local_hash).await?;
        self.cache.update(None).await?;
        Ok(UploadOutcome::Uploaded(object))
    }

    pub async fn upload_image(
        &self,
        local: &Path,
        dir: &VirtualPath,
    ) -> Result<UploadOutcome, EngineError> {
        self.upload_if_changed(local, dir, IMAGE_MIME_TYPE).await
    }

    pub async fn upload_video(
        &self,
        local: &Path,
        dir: &VirtualPath,
    ) -> Result<UploadOutcome, EngineError> {
        self.upload_if_changed(local, dir, VIDEO_MIME_TYPE).await
    }

    /// Deletes the single object at `path`. Never deletes more than one: an
    /// ambiguous path is refused.
    ///
    /// The cache entry is evicted in memory only and persisted with the next
    /// update.
    pub async fn remove(&self, path: &VirtualPath) -> Result<RemoveOutcome, EngineError> {
        let (dir, file_name) = path.split_file()?;
        let mut matches = self.resolver.resolve(path, None).await?;
        match matches.len() {
            0 => {
                info!(%path, "nothing to remove");
                Ok(RemoveOutcome::NotFound)
            }
            1 => {
                let object = matches.remove(0);
                self.resolver.store().delete_object(&object.id).await?;
                self.cache.evict(&dir.cache_key(), file_name).await?;
                debug!(%path, id = %object.id, "removed");
                Ok(RemoveOutcome::Removed(object))
            }
            _ => {
                let ids: Vec<String> = matches.into_iter().map(|object| object.id).collect();
                error!(%path, ?ids, "refusing to delete ambiguous path");
                Ok(RemoveOutcome::Refused { ids })
            }
        }
    }

    /// Deletes an object by id. The cache is left alone.
    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        self.resolver.store().delete_object(id).await?;
        debug!(id, "deleted");
        Ok(())
    }

    /// Uploads `source` to `target`. Unlike [`SyncEngine::upload_if_changed`],
    /// the target directory must already exist.
    pub async fn copy(
        &self,
        source: &Path,
        target: &VirtualPath,
        mime_type: &str,
    ) -> Result<RemoteObject, EngineError> {
        let (dir, file_name) = target.split_file()?;
        if file_name == WILDCARD {
            return Err(PathError::UnsupportedSegment(file_name.to_string()).into());
        }
        let folder = self
            .resolver
            .resolve_folder(&dir, None)
            .await?
            .ok_or_else(|| EngineError::DirectoryNotFound(dir.to_string()))?;
        let content = tokio::fs::read(source).await?;
        let object = self
            .resolver
            .store()
            .create_object(file_name, mime_type, Some(&folder.id), Some(&content))
            .await?;
        debug!(path = %target, id = %object.id, "copied");
        let hash = format!("{:x}", md5::compute(&content));
        self.cache.record(&dir.cache_key(), file_name, &hash).await?;
        self.cache.update(None).await?;
        Ok(object)
    }

    async fn existing_copy(
        &self,
        folder: &RemoteObject,
        file_name: &str,
        hash: &str,
    ) -> Result<Option<RemoteObject>, EngineError> {
        let path = VirtualPath::relative(file_name)?;
        let candidates = self.resolver.resolve(&path, Some(&folder.id)).await?;
        Ok(candidates
            .into_iter()
            .find(|object| object.content_hash.as_deref() == Some(hash)))
    }
}

fn local_file_name(local: &Path) -> Result<&str, EngineError> {
    local
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != WILDCARD)
        .ok_or_else(|| EngineError::InvalidFileName(local.to_path_buf()))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
