use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::query::SearchQuery;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FILES_PATH: &str = "/drive/v2/files";
const UPLOAD_PATH: &str = "/upload/drive/v2/files";
const BOUNDARY: &str = "gdrive-core-related-boundary";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to encode metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base url cannot carry path segments")]
    InvalidBase,
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    /// Fetches a single page of `files.list`.
    pub async fn list_files(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &query.render());
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                pairs.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Drains every page of `files.list` for `query`.
    pub async fn list_files_all(&self, query: &SearchQuery) -> Result<Vec<DriveFile>, DriveError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_files(query, page_token.as_deref()).await?;
            items.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Creates a folder. Without a parent the folder lands in the drive root.
    pub async fn insert_folder(
        &self,
        title: &str,
        parent_id: Option<&str>,
    ) -> Result<DriveFile, DriveError> {
        let url = self.endpoint(FILES_PATH)?;
        let body = InsertMetadata::new(title, FOLDER_MIME_TYPE, parent_id);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Uploads `content` as a new file through a `multipart/related` request.
    pub async fn insert_file(
        &self,
        title: &str,
        mime_type: &str,
        parent_id: Option<&str>,
        content: &[u8],
    ) -> Result<DriveFile, DriveError> {
        let mut url = self.endpoint(UPLOAD_PATH)?;
        url.query_pairs_mut().append_pair("uploadType", "multipart");
        let metadata = serde_json::to_vec(&InsertMetadata::new(title, mime_type, parent_id))?;
        let (boundary, body) = multipart_related(&metadata, mime_type, content);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), DriveError> {
        let url = self.file_url(file_id)?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }

    /// Downloads file content; `None` when the file has no content to serve.
    pub async fn download_content(&self, file_id: &str) -> Result<Option<Vec<u8>>, DriveError> {
        let mut url = self.file_url(file_id)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    fn file_url(&self, file_id: &str) -> Result<Url, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        url.path_segments_mut()
            .map_err(|_| DriveError::InvalidBase)?
            .push(file_id);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> DriveError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        DriveError::Api { status, body }
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, .. } => Some(classify_api_status(*status)),
            DriveError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ApiErrorClass::Transient)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if status == StatusCode::UNAUTHORIZED {
        ApiErrorClass::Auth
    } else if matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN
    ) {
        // Drive reports userRateLimitExceeded as 403.
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn multipart_related(metadata: &[u8], mime_type: &str, content: &[u8]) -> (String, Vec<u8>) {
    let mut boundary = BOUNDARY.to_string();
    let mut salt = 0u32;
    while contains(content, boundary.as_bytes()) {
        salt += 1;
        boundary = format!("{BOUNDARY}-{salt}");
    }

    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (boundary, body)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertMetadata<'a> {
    title: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<ParentId<'a>>,
}

impl<'a> InsertMetadata<'a> {
    fn new(title: &'a str, mime_type: &'a str, parent_id: Option<&'a str>) -> Self {
        Self {
            title,
            mime_type,
            parents: parent_id.map(|id| ParentId { id }).into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ParentId<'a> {
    id: &'a str,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<ParentReference>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub file_size: Option<String>,
    #[serde(default)]
    pub modified_date: Option<String>,
    #[serde(default)]
    pub labels: Option<FileLabels>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    pub id: String,
    #[serde(default)]
    pub is_root: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileLabels {
    #[serde(default)]
    pub trashed: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub items: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
