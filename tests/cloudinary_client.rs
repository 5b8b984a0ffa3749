//! Cloudinary client against a mock HTTP server

use bytes::Bytes;
use serde_json::json;
use std::time::Duration;
use streamhub::config::MediaConfig;
use streamhub::error::Error;
use streamhub::media::{CloudinaryStorage, MediaKind, MediaStorage, MediaUpload};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: String) -> MediaConfig {
    MediaConfig {
        cloud_name: "demo".into(),
        api_key: "key-123".into(),
        api_secret: "shh".into(),
        base_url,
        folder: "video-uploads".into(),
        timeout: Duration::from_secs(5),
    }
}

fn clip() -> MediaUpload {
    MediaUpload {
        kind: MediaKind::Video,
        file_name: "clip.mp4".into(),
        content_type: Some("video/mp4".into()),
        data: Bytes::from_static(b"not really a video"),
    }
}

#[tokio::test]
async fn upload_posts_signed_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/video/upload"))
        .and(body_string_contains("signature_algorithm"))
        .and(body_string_contains("key-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "secure_url": "https://res.cloudinary.test/demo/video/upload/v1/video-uploads/abc.mp4",
            "public_id": "video-uploads/abc",
            "format": "mp4",
            "duration": 12.5,
            "bytes": 18
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = CloudinaryStorage::new(config(server.uri())).unwrap();
    let asset = storage.upload(clip()).await.unwrap();

    assert_eq!(asset.public_id, "video-uploads/abc");
    assert!(asset.url.starts_with("https://"));
    assert_eq!(asset.format.as_deref(), Some("mp4"));
    assert_eq!(asset.duration_secs, Some(12.5));
    assert_eq!(asset.bytes, Some(18));
}

#[tokio::test]
async fn upload_error_surfaces_as_storage_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/video/upload"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "Invalid Signature" } })),
        )
        .mount(&server)
        .await;

    let storage = CloudinaryStorage::new(config(server.uri())).unwrap();
    let err = storage.upload(clip()).await.unwrap_err();

    assert!(matches!(err, Error::Storage { .. }));
    assert!(err.to_string().contains("Invalid Signature"));
}

#[tokio::test]
async fn delete_accepts_ok_and_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/image/destroy"))
        .and(body_string_contains("public_id=thumb1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "ok" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/image/destroy"))
        .and(body_string_contains("public_id=gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "not found" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/video/destroy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "error" })))
        .mount(&server)
        .await;

    let storage = CloudinaryStorage::new(config(server.uri())).unwrap();
    storage.delete("thumb1", MediaKind::Image).await.unwrap();
    storage.delete("gone", MediaKind::Image).await.unwrap();

    let err = storage.delete("clip1", MediaKind::Video).await.unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
}
