mod drive;
pub mod memory;

use async_trait::async_trait;
use gdrive_core::{DriveError, DriveFile, FOLDER_MIME_TYPE};
use thiserror::Error;

pub use drive::DriveRemote;
pub use memory::MemoryRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("drive api error: {0}")]
    Drive(#[from] DriveError),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

/// Metadata for one object in the remote store.
///
/// Identity is `id`; titles are not unique under a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    pub parent_ids: Vec<String>,
    pub content_hash: Option<String>,
    /// True when one of the parents is the store's own root.
    pub is_root: bool,
}

impl RemoteObject {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

impl From<DriveFile> for RemoteObject {
    fn from(file: DriveFile) -> Self {
        Self {
            is_root: file.parents.iter().any(|parent| parent.is_root),
            parent_ids: file.parents.into_iter().map(|parent| parent.id).collect(),
            id: file.id,
            title: file.title,
            mime_type: file.mime_type,
            content_hash: file.md5_checksum,
        }
    }
}

/// The four primitives the sync layer needs from an id-addressed store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every object whose title contains `title` (or every object for `*`),
    /// restricted to children of `parent_id` when given. Pages are drained.
    async fn list_by_title_and_parent(
        &self,
        title: &str,
        parent_id: Option<&str>,
        include_trashed: bool,
    ) -> Result<Vec<RemoteObject>, RemoteError>;

    /// Creates a folder (`content == None`) or a file. Without a parent the
    /// object lands in the store's root.
    async fn create_object(
        &self,
        title: &str,
        mime_type: &str,
        parent_id: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<RemoteObject, RemoteError>;

    async fn delete_object(&self, id: &str) -> Result<(), RemoteError>;

    async fn download_content(&self, id: &str) -> Result<Option<Vec<u8>>, RemoteError>;
}
