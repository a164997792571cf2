//! Integration tests for the image upload adapter

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use warranty_watch::memory::{InMemoryImageSource, InMemoryObjectStorage};
use warranty_watch::storage::{
    extension_of, object_path, sniff_content_type, FileImageSource, ImageSource, ImageUploader,
};
use warranty_watch::{OwnerId, WarrantyError};

fn owner() -> OwnerId {
    Uuid::parse_str("0b7a4a38-9a2e-4bb0-8b76-3a5f3d2c1e00").expect("uuid")
}

#[tokio::test]
async fn test_file_source_reads_path_and_file_uri() {
    let mut file = tempfile::Builder::new()
        .suffix(".jpg")
        .tempfile()
        .expect("temp file");
    file.write_all(&[0xff, 0xd8, 0xff, 0xe0]).expect("write image");
    let path = file.path().to_string_lossy().to_string();

    let by_path = FileImageSource.fetch(&path).await.expect("read by path");
    let by_uri = FileImageSource
        .fetch(&format!("file://{path}"))
        .await
        .expect("read by uri");

    assert_eq!(by_path, vec![0xff, 0xd8, 0xff, 0xe0]);
    assert_eq!(by_uri, by_path);
}

#[tokio::test]
async fn test_file_source_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("nope.jpg");
    let err = FileImageSource
        .fetch(&missing.to_string_lossy())
        .await
        .expect_err("missing");
    assert!(matches!(err, WarrantyError::Upload(_)));
}

#[tokio::test]
async fn test_upload_from_disk_to_bucket() {
    let dir = tempfile::tempdir().expect("temp dir");
    let photo = dir.path().join("Relogio.PNG");
    std::fs::write(&photo, b"\x89PNG\r\n\x1a\nrest").expect("write image");

    let storage = Arc::new(InMemoryObjectStorage::new("https://cdn.test/bucket/"));
    let uploader = ImageUploader::new(storage.clone(), Arc::new(FileImageSource));

    let url = uploader
        .upload(&photo.to_string_lossy(), owner())
        .await
        .expect("uploaded");

    assert!(url.starts_with(&format!("https://cdn.test/bucket/{}/", owner())));
    assert!(url.ends_with(".png"));
    let objects = storage.objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].1, "image/png");
    assert!(url.ends_with(&objects[0].0));
}

#[tokio::test]
async fn test_repeated_uploads_never_collide() {
    let images = Arc::new(InMemoryImageSource::new());
    images.insert("file:///a.jpg", vec![0xff, 0xd8, 0xff]);
    let storage = Arc::new(InMemoryObjectStorage::new("https://cdn.test"));
    let uploader = ImageUploader::new(storage.clone(), images);

    let first = uploader.upload("file:///a.jpg", owner()).await.expect("first");
    let second = uploader.upload("file:///a.jpg", owner()).await.expect("second");

    assert_ne!(first, second);
    assert_eq!(storage.objects().len(), 2);
}

#[tokio::test]
async fn test_upload_timeout() {
    let images = Arc::new(InMemoryImageSource::new().with_delay(Duration::from_millis(300)));
    images.insert("file:///slow.jpg", vec![0xff, 0xd8, 0xff]);
    let storage = Arc::new(InMemoryObjectStorage::new("https://cdn.test"));
    let uploader =
        ImageUploader::new(storage.clone(), images).with_timeout(Duration::from_millis(10));

    let err = uploader
        .upload("file:///slow.jpg", owner())
        .await
        .expect_err("times out");

    assert!(matches!(err, WarrantyError::UploadTimeout(_)));
    assert!(storage.objects().is_empty());
}

#[test]
fn test_object_path_layout() {
    let path = object_path(owner(), "content://media/external/images/42");
    let (folder, name) = path.split_once('/').expect("owner folder");
    assert_eq!(folder, owner().to_string());
    let (stem, ext) = name.rsplit_once('.').expect("extension");
    assert!(Uuid::parse_str(stem).is_ok());
    assert_eq!(ext, "jpg");
}

#[test]
fn test_extension_and_sniffing() {
    assert_eq!(extension_of("/tmp/x.webp"), "webp");
    assert_eq!(extension_of("/tmp/x.tar.GZ"), "gz");
    assert_eq!(sniff_content_type(b"GIF89a...."), "image/gif");
    assert_eq!(sniff_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
    assert_eq!(sniff_content_type(b"unknown"), "image/jpeg");
}
