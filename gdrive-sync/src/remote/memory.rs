//! In-process [`RemoteStore`] with Drive-like semantics: insertion-ordered
//! listings, duplicate titles, "contains" title matching and a trash flag.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use gdrive_core::WILDCARD;

use super::{RemoteError, RemoteObject, RemoteStore};

/// Id of the implicit store root that parentless objects live under.
pub const MEMORY_ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
struct StoredObject {
    meta: RemoteObject,
    content: Option<Vec<u8>>,
    trashed: bool,
}

#[derive(Debug, Default)]
struct State {
    objects: Vec<StoredObject>,
    next_id: u64,
    creates: usize,
    deletes: usize,
    lists: usize,
    lists_before_failure: u32,
    failing_lists: u32,
    hidden_downloads: u32,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_count(&self) -> usize {
        self.lock().creates
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    pub fn list_count(&self) -> usize {
        self.lock().lists
    }

    /// Makes the next `count` listings fail with [`RemoteError::Unavailable`].
    pub fn fail_next_lists(&self, count: u32) {
        self.fail_lists_after(0, count);
    }

    /// Lets `skip` listings through, then fails the following `count`.
    pub fn fail_lists_after(&self, skip: u32, count: u32) {
        let mut state = self.lock();
        state.lists_before_failure = skip;
        state.failing_lists = count;
    }

    /// Makes the next `count` downloads report no content, the way a lagging
    /// replica does right after an upload.
    pub fn hide_next_downloads(&self, count: u32) {
        self.lock().hidden_downloads = count;
    }

    pub fn trash(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.objects.iter_mut().find(|stored| stored.meta.id == id) {
            Some(stored) => {
                stored.trashed = true;
                true
            }
            None => false,
        }
    }

    /// Live objects, in creation order.
    pub fn objects(&self) -> Vec<RemoteObject> {
        self.lock()
            .objects
            .iter()
            .filter(|stored| !stored.trashed)
            .map(|stored| stored.meta.clone())
            .collect()
    }

    pub fn children_titled(&self, parent_id: &str, title: &str) -> Vec<RemoteObject> {
        self.objects()
            .into_iter()
            .filter(|object| object.title == title && object.parent_ids.iter().any(|p| p == parent_id))
            .collect()
    }

    pub fn content_of(&self, id: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .iter()
            .find(|stored| stored.meta.id == id)
            .and_then(|stored| stored.content.clone())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list_by_title_and_parent(
        &self,
        title: &str,
        parent_id: Option<&str>,
        include_trashed: bool,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        let mut state = self.lock();
        state.lists += 1;
        if state.lists_before_failure > 0 {
            state.lists_before_failure -= 1;
        } else if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(RemoteError::Unavailable("injected listing failure".into()));
        }
        Ok(state
            .objects
            .iter()
            .filter(|stored| include_trashed || !stored.trashed)
            .filter(|stored| title == WILDCARD || stored.meta.title.contains(title))
            .filter(|stored| {
                parent_id.is_none_or(|parent| stored.meta.parent_ids.iter().any(|p| p == parent))
            })
            .map(|stored| stored.meta.clone())
            .collect())
    }

    async fn create_object(
        &self,
        title: &str,
        mime_type: &str,
        parent_id: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<RemoteObject, RemoteError> {
        let mut state = self.lock();
        state.next_id += 1;
        state.creates += 1;
        let parent = parent_id.unwrap_or(MEMORY_ROOT_ID);
        let meta = RemoteObject {
            id: format!("obj-{}", state.next_id),
            title: title.to_string(),
            mime_type: mime_type.to_string(),
            parent_ids: vec![parent.to_string()],
            content_hash: content.map(|bytes| format!("{:x}", md5::compute(bytes))),
            is_root: parent == MEMORY_ROOT_ID,
        };
        state.objects.push(StoredObject {
            meta: meta.clone(),
            content: content.map(<[u8]>::to_vec),
            trashed: false,
        });
        Ok(meta)
    }

    async fn delete_object(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        let before = state.objects.len();
        state.objects.retain(|stored| stored.meta.id != id);
        if state.objects.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        state.deletes += 1;
        Ok(())
    }

    async fn download_content(&self, id: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut state = self.lock();
        if state.hidden_downloads > 0 {
            state.hidden_downloads -= 1;
            return Ok(None);
        }
        Ok(state
            .objects
            .iter()
            .find(|stored| stored.meta.id == id)
            .and_then(|stored| stored.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdrive_core::FOLDER_MIME_TYPE;

    #[tokio::test]
    async fn listing_uses_contains_match_in_creation_order() {
        let remote = MemoryRemote::new();
        let dir = remote
            .create_object("album", FOLDER_MIME_TYPE, None, None)
            .await
            .unwrap();
        for title in ["IMG_10.jpg", "IMG_1.jpg", "IMG_1.jpg", "other.png"] {
            remote
                .create_object(title, "image/jpeg", Some(&dir.id), Some(b"x"))
                .await
                .unwrap();
        }

        let hits = remote
            .list_by_title_and_parent("IMG_1", Some(&dir.id), false)
            .await
            .unwrap();
        let titles: Vec<_> = hits.iter().map(|o| o.title.as_str()).collect();
        assert_eq!(titles, vec!["IMG_10.jpg", "IMG_1.jpg", "IMG_1.jpg"]);

        let all = remote
            .list_by_title_and_parent(WILDCARD, Some(&dir.id), false)
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert!(dir.is_root);
    }

    #[tokio::test]
    async fn trashed_objects_are_hidden_unless_requested() {
        let remote = MemoryRemote::new();
        let file = remote
            .create_object("a.jpg", "image/jpeg", None, Some(b"a"))
            .await
            .unwrap();
        assert!(remote.trash(&file.id));

        assert!(
            remote
                .list_by_title_and_parent("a.jpg", None, false)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            remote
                .list_by_title_and_parent("a.jpg", None, true)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let remote = MemoryRemote::new();
        remote.fail_next_lists(1);
        assert!(
            remote
                .list_by_title_and_parent("*", None, false)
                .await
                .is_err()
        );
        assert!(
            remote
                .list_by_title_and_parent("*", None, false)
                .await
                .is_ok()
        );
        assert_eq!(remote.list_count(), 2);
    }
}
