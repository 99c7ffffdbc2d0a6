use async_trait::async_trait;
use gdrive_core::{DriveClient, DriveError, FileList, SearchQuery};
use tracing::{debug, warn};

use super::{RemoteError, RemoteObject, RemoteStore};
use crate::retry::RetryPolicy;

/// [`RemoteStore`] backed by the Drive v2 REST API.
#[derive(Clone)]
pub struct DriveRemote {
    client: DriveClient,
    retry: RetryPolicy,
}

impl DriveRemote {
    pub fn new(client: DriveClient) -> Self {
        Self::with_retry(client, RetryPolicy::default())
    }

    pub fn with_retry(client: DriveClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    async fn fetch_page(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut attempt = 0u32;
        loop {
            match self.client.list_files(query, page_token).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    warn!(%query, attempt, error = %err, "transient listing failure, retrying");
                    self.retry.wait(attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl RemoteStore for DriveRemote {
    async fn list_by_title_and_parent(
        &self,
        title: &str,
        parent_id: Option<&str>,
        include_trashed: bool,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        let mut query = SearchQuery::new()
            .title_contains(title)
            .include_trashed(include_trashed);
        if let Some(parent_id) = parent_id {
            query = query.in_parent(parent_id);
        }

        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.fetch_page(&query, page_token.as_deref()).await?;
            objects.extend(page.items.into_iter().map(RemoteObject::from));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(objects)
    }

    async fn create_object(
        &self,
        title: &str,
        mime_type: &str,
        parent_id: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<RemoteObject, RemoteError> {
        let file = match content {
            None => self.client.insert_folder(title, parent_id).await?,
            Some(bytes) => {
                self.client
                    .insert_file(title, mime_type, parent_id, bytes)
                    .await?
            }
        };
        debug!(id = %file.id, title = %file.title, "created remote object");
        Ok(file.into())
    }

    async fn delete_object(&self, id: &str) -> Result<(), RemoteError> {
        self.client.delete_file(id).await?;
        Ok(())
    }

    async fn download_content(&self, id: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        Ok(self.client.download_content(id).await?)
    }
}
