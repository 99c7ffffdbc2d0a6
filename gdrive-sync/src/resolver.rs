use std::sync::Arc;

use gdrive_core::{FOLDER_MIME_TYPE, WILDCARD};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::path::{PathError, VirtualPath};
use crate::remote::{RemoteError, RemoteObject, RemoteStore};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("{} objects titled {title:?} under {parent_id}: {ids:?}", .ids.len())]
    Ambiguous {
        title: String,
        parent_id: String,
        ids: Vec<String>,
    },
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// What to do when several objects share a title under one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Log a warning and continue with the first object the store listed.
    #[default]
    FirstMatch,
    /// Fail with [`ResolveError::Ambiguous`].
    Reject,
}

/// Finds the sync root: a folder titled `title` sitting directly in the
/// store's root. Created when absent.
pub async fn discover_root_anchor(
    store: &dyn RemoteStore,
    title: &str,
) -> Result<RemoteObject, ResolveError> {
    let candidates = store.list_by_title_and_parent(title, None, false).await?;
    if let Some(anchor) = candidates
        .into_iter()
        .find(|object| object.is_root && object.is_folder() && object.title == title)
    {
        debug!(id = %anchor.id, title, "found root anchor");
        return Ok(anchor);
    }
    let anchor = store
        .create_object(title, FOLDER_MIME_TYPE, None, None)
        .await?;
    info!(id = %anchor.id, title, "created root anchor");
    Ok(anchor)
}

/// Walks virtual paths one segment at a time through title listings.
pub struct PathResolver {
    store: Arc<dyn RemoteStore>,
    root: RemoteObject,
    namespace: String,
    policy: AmbiguityPolicy,
}

impl PathResolver {
    pub fn new(store: Arc<dyn RemoteStore>, root: RemoteObject, namespace: impl Into<String>) -> Self {
        Self {
            store,
            root,
            namespace: namespace.into(),
            policy: AmbiguityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn root(&self) -> &RemoteObject {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Parses a caller path. The namespace prefix is mandatory unless the
    /// caller anchors the path at an explicit parent id.
    pub fn parse_path(&self, raw: &str, parent_id: Option<&str>) -> Result<VirtualPath, PathError> {
        match parent_id {
            Some(_) => VirtualPath::relative(raw),
            None => VirtualPath::parse(&self.namespace, raw),
        }
    }

    /// Every object matching the final segment of `path`.
    ///
    /// Missing intermediate folders and listing failures yield an empty
    /// result rather than an error.
    pub async fn resolve(
        &self,
        path: &VirtualPath,
        parent_id: Option<&str>,
    ) -> Result<Vec<RemoteObject>, ResolveError> {
        let Some((last, head)) = path.segments().split_last() else {
            return Ok(match parent_id {
                None => vec![self.root.clone()],
                Some(parent) if parent == self.root.id => vec![self.root.clone()],
                Some(parent) => {
                    warn!(parent, "empty path under an explicit parent has no metadata");
                    Vec::new()
                }
            });
        };

        let mut current = parent_id.unwrap_or(&self.root.id).to_string();
        for segment in head {
            let folders = self.folders_titled(segment, &current).await;
            if folders.is_empty() {
                info!(%path, segment = %segment, "path not found");
                return Ok(Vec::new());
            }
            current = self.pick_first(segment, &current, folders)?.id;
        }
        Ok(self.children_titled(last, &current).await)
    }

    /// Resolves every segment of `path` to a folder.
    pub async fn resolve_folder(
        &self,
        path: &VirtualPath,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteObject>, ResolveError> {
        let mut current = match parent_id {
            Some(parent) if parent != self.root.id => None,
            _ => Some(self.root.clone()),
        };
        let mut current_id = parent_id.unwrap_or(&self.root.id).to_string();
        for segment in path.segments() {
            let folders = self.folders_titled(segment, &current_id).await;
            if folders.is_empty() {
                info!(%path, segment = %segment, "directory not found");
                return Ok(None);
            }
            let folder = self.pick_first(segment, &current_id, folders)?;
            current_id = folder.id.clone();
            current = Some(folder);
        }
        Ok(current)
    }

    /// The object at `path`, or `None`. Several matches log an ambiguity and
    /// hand back the first one, so callers also get its metadata.
    pub async fn exists(
        &self,
        path: &VirtualPath,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteObject>, ResolveError> {
        let matches = self.resolve(path, parent_id).await?;
        if matches.len() <= 1 {
            return Ok(matches.into_iter().next());
        }
        let parent = matches[0].parent_ids.first().cloned().unwrap_or_default();
        let title = path.file_name().unwrap_or_default();
        self.pick_first(title, &parent, matches).map(Some)
    }

    /// Titles of every entry in the directory at `path`.
    pub async fn listdir(
        &self,
        path: &VirtualPath,
        parent_id: Option<&str>,
    ) -> Result<Vec<String>, ResolveError> {
        let dir_id = if path.is_root() {
            parent_id.unwrap_or(&self.root.id).to_string()
        } else {
            match self.resolve_folder(path, parent_id).await? {
                Some(dir) => dir.id,
                None => {
                    warn!(%path, "cannot list missing directory");
                    return Ok(Vec::new());
                }
            }
        };
        Ok(self
            .children_titled(WILDCARD, &dir_id)
            .await
            .into_iter()
            .map(|object| object.title)
            .collect())
    }

    /// Creates a single folder under `parent_id`, or under the root anchor.
    pub async fn mkdir(
        &self,
        title: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObject, ResolveError> {
        let parent = parent_id.unwrap_or(&self.root.id);
        let folder = self
            .store
            .create_object(title, FOLDER_MIME_TYPE, Some(parent), None)
            .await?;
        debug!(id = %folder.id, title, parent, "created folder");
        Ok(folder)
    }

    /// Creates every missing folder along `path` and returns the leaf.
    ///
    /// Existing folders are reused, so repeating the call only performs
    /// lookups. Not atomic: if a later segment fails, the folders created
    /// before it stay in place.
    pub async fn makedirs(
        &self,
        path: &VirtualPath,
        parent_id: Option<&str>,
    ) -> Result<RemoteObject, ResolveError> {
        let mut folder = match parent_id {
            Some(parent) if parent != self.root.id && path.is_root() => {
                return Err(PathError::Empty.into());
            }
            _ => self.root.clone(),
        };
        let mut current = parent_id.unwrap_or(&self.root.id).to_string();
        for segment in path.segments() {
            if segment == WILDCARD {
                return Err(PathError::UnsupportedSegment(segment.clone()).into());
            }
            let existing: Vec<_> = self
                .lookup(segment, &current)
                .await?
                .into_iter()
                .filter(RemoteObject::is_folder)
                .collect();
            folder = if existing.is_empty() {
                self.mkdir(segment, Some(&current)).await?
            } else {
                let found = self.pick_first(segment, &current, existing)?;
                info!(segment = %segment, id = %found.id, "directory exists, skipped");
                found
            };
            current = folder.id.clone();
        }
        Ok(folder)
    }

    /// Exact-title children of `parent_id`; the store's filter is a substring match.
    async fn lookup(&self, title: &str, parent_id: &str) -> Result<Vec<RemoteObject>, RemoteError> {
        let mut objects = self
            .store
            .list_by_title_and_parent(title, Some(parent_id), false)
            .await?;
        if title != WILDCARD {
            objects.retain(|object| object.title == title);
        }
        Ok(objects)
    }

    async fn children_titled(&self, title: &str, parent_id: &str) -> Vec<RemoteObject> {
        match self.lookup(title, parent_id).await {
            Ok(objects) => objects,
            Err(err) => {
                error!(title, parent_id, error = %err, "listing failed");
                Vec::new()
            }
        }
    }

    async fn folders_titled(&self, title: &str, parent_id: &str) -> Vec<RemoteObject> {
        let mut objects = self.children_titled(title, parent_id).await;
        objects.retain(RemoteObject::is_folder);
        objects
    }

    fn pick_first(
        &self,
        title: &str,
        parent_id: &str,
        mut matches: Vec<RemoteObject>,
    ) -> Result<RemoteObject, ResolveError> {
        if matches.len() > 1 {
            let ids: Vec<String> = matches.iter().map(|object| object.id.clone()).collect();
            if self.policy == AmbiguityPolicy::Reject {
                return Err(ResolveError::Ambiguous {
                    title: title.to_string(),
                    parent_id: parent_id.to_string(),
                    ids,
                });
            }
            warn!(title, parent_id, ?ids, "ambiguous match, using first");
        }
        if matches.is_empty() {
            return Err(RemoteError::NotFound(title.to_string()).into());
        }
        Ok(matches.swap_remove(0))
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
