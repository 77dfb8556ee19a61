// Resumable upload protocol against a mock YouTube endpoint.

use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tube_relay::config::UploadDefaults;
use tube_relay::pipeline::sanitize;
use tube_relay::youtube::{
    InsertRequest, ResumableTransport, TransferMode, UploadError, UploadMetadata, VideoTransport,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHUNK: usize = 256 * 1024;
const TOTAL: usize = 300 * 1024;

fn video_file(dir: &TempDir, bytes: usize) -> PathBuf {
    let path = dir.path().join("My Trip Day 1.mp4");
    std::fs::write(&path, vec![42u8; bytes]).unwrap();
    path
}

fn request(path: PathBuf) -> InsertRequest {
    InsertRequest {
        access_token: "ya29.test".to_string(),
        path,
        metadata: UploadMetadata::new(&sanitize(Some("My Trip: Day 1")), &UploadDefaults::default()),
        content_type: "video/mp4".to_string(),
        mode: TransferMode::Resumable { chunk_size: CHUNK },
    }
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(query_param("uploadType", "resumable"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(header("x-upload-content-length", TOTAL.to_string().as_str()))
        .and(body_partial_json(json!({
            "snippet": {
                "title": "My Trip Day 1",
                "description": "Uploaded from Telegram",
                "categoryId": "22"
            },
            "status": { "privacyStatus": "public" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/session/abc", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn first_range() -> String {
    format!("bytes 0-{}/{}", CHUNK - 1, TOTAL)
}

fn second_range() -> String {
    format!("bytes {}-{}/{}", CHUNK, TOTAL - 1, TOTAL)
}

#[tokio::test]
async fn test_two_chunk_upload() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", first_range().as_str()))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("Range", format!("bytes=0-{}", CHUNK - 1).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", second_range().as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "vid123" })))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let transport = ResumableTransport::new(server.uri(), 3);
    let id = transport
        .insert(request(video_file(&tmp, TOTAL)))
        .await
        .unwrap();

    assert_eq!(id.0, "vid123");
    assert_eq!(id.watch_url(), "https://www.youtube.com/watch?v=vid123");
}

#[tokio::test]
async fn test_interrupted_chunk_is_resumed() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", first_range().as_str()))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("Range", format!("bytes=0-{}", CHUNK - 1).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    // Second chunk fails once, then lands
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", second_range().as_str()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", second_range().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "resumed1" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", format!("bytes */{}", TOTAL).as_str()))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("Range", format!("bytes=0-{}", CHUNK - 1).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let transport =
        ResumableTransport::new(server.uri(), 3).with_resume_backoff(Duration::from_millis(1));
    let id = transport
        .insert(request(video_file(&tmp, TOTAL)))
        .await
        .unwrap();

    assert_eq!(id.0, "resumed1");
}

#[tokio::test]
async fn test_resume_attempts_are_bounded() {
    let server = MockServer::start().await;
    let small = 100 * 1024;

    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/session/dead", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/dead"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let transport =
        ResumableTransport::new(server.uri(), 2).with_resume_backoff(Duration::from_millis(1));
    let err = transport
        .insert(request(video_file(&tmp, small)))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::ResumeExhausted(2)), "{:?}", err);
}

#[tokio::test]
async fn test_rejected_session_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let transport = ResumableTransport::new(server.uri(), 3);
    let err = transport
        .insert(request(video_file(&tmp, 1024)))
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert!(err.to_string().contains("Invalid Credentials"));
}

#[tokio::test]
async fn test_empty_file_never_opens_a_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let transport = ResumableTransport::new(server.uri(), 3);
    let err = transport
        .insert(request(video_file(&tmp, 0)))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::EmptyFile(_)));
}
