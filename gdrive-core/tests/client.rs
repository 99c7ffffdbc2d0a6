use gdrive_core::{DriveClient, DriveError, FOLDER_MIME_TYPE, SearchQuery};
use serde_json::json;
use wiremock::matchers::{
    body_json, body_string_contains, header, header_regex, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn list_files_sends_query_and_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param(
            "q",
            "title contains 'album1' and trashed=false and 'root-1' in parents",
        ))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "f1",
                    "title": "album1",
                    "mimeType": FOLDER_MIME_TYPE,
                    "parents": [{ "id": "root-1", "isRoot": false }]
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let query = SearchQuery::new()
        .title_contains("album1")
        .in_parent("root-1");
    let page = client.list_files(&query, None).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert!(page.items[0].is_folder());
    assert_eq!(page.items[0].parents[0].id, "root-1");
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn list_files_all_follows_page_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "b", "title": "B.jpg", "mimeType": "image/jpeg", "md5Checksum": "bb" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "page-2",
            "items": [
                { "id": "a", "title": "A.jpg", "mimeType": "image/jpeg", "md5Checksum": "aa" }
            ]
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client
        .list_files_all(&SearchQuery::new().title_contains("*").in_parent("p"))
        .await
        .unwrap();

    let ids: Vec<_> = items.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(items[1].md5_checksum.as_deref(), Some("bb"));
}

#[tokio::test]
async fn insert_folder_posts_folder_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/drive/v2/files"))
        .and(body_json(json!({
            "title": "event1",
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [{ "id": "album-1" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "event-1",
            "title": "event1",
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [{ "id": "album-1" }]
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let folder = client
        .insert_folder("event1", Some("album-1"))
        .await
        .unwrap();

    assert_eq!(folder.id, "event-1");
    assert!(folder.is_folder());
}

#[tokio::test]
async fn insert_file_uses_multipart_upload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v2/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header_regex("content-type", "^multipart/related; boundary=.+"))
        .and(body_string_contains("\"title\":\"IMG_1.jpg\""))
        .and(body_string_contains("jpeg-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "img-1",
            "title": "IMG_1.jpg",
            "mimeType": "image/jpeg",
            "md5Checksum": "abc"
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let file = client
        .insert_file("IMG_1.jpg", "image/jpeg", Some("event-1"), b"jpeg-bytes")
        .await
        .unwrap();

    assert_eq!(file.id, "img-1");
    assert_eq!(file.md5_checksum.as_deref(), Some("abc"));
}

#[tokio::test]
async fn delete_file_accepts_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/drive/v2/files/img-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    client.delete_file("img-1").await.unwrap();
}

#[tokio::test]
async fn download_content_returns_bytes_or_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files/cache-1"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{}"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    assert_eq!(
        client.download_content("cache-1").await.unwrap(),
        Some(b"{}".to_vec())
    );
    assert_eq!(client.download_content("missing").await.unwrap(), None);
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client
        .list_files(&SearchQuery::new(), None)
        .await
        .expect_err("expected api error");

    assert!(matches!(err, DriveError::Api { .. }));
    assert!(err.is_retryable());
}
