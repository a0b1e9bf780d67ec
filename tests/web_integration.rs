use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use festive_slideshow::config::Configuration;
use festive_slideshow::web;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

fn config_for(dir: &Path) -> Configuration {
    Configuration {
        slideshow_dir: dir.to_path_buf(),
        ..Configuration::default()
    }
}

async fn get(cfg: Configuration, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let resp = web::router(cfg)
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn endpoint_returns_sorted_image_urls() {
    let tmp = tempdir().unwrap();
    for name in ["z.png", "A.jpg", "note.txt"] {
        fs::write(tmp.path().join(name), b"x").unwrap();
    }

    let (status, content_type, body) = get(config_for(tmp.path()), "/api/slideshow").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body,
        json!({ "images": ["/slideshow/A.jpg", "/slideshow/z.png"] })
    );
}

#[tokio::test]
async fn endpoint_creates_missing_directory() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("public").join("slideshow");

    let (status, _, body) = get(config_for(&dir), "/api/slideshow").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({ "images": [] }));
    assert!(dir.is_dir());
}

#[tokio::test]
async fn listed_images_are_served_with_their_content_type() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("tree.svg"), b"<svg/>").unwrap();

    let (status, content_type, body) = get(config_for(tmp.path()), "/slideshow/tree.svg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/svg+xml"));
    assert_eq!(body, b"<svg/>");
}

#[tokio::test]
async fn non_images_and_missing_files_are_not_found() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("note.txt"), b"secret").unwrap();

    let (status, _, _) = get(config_for(tmp.path()), "/slideshow/note.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(config_for(tmp.path()), "/slideshow/gone.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(config_for(tmp.path()), "/slideshow/..%2Fnote.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_url_prefix_is_used_for_listing_and_serving() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("a.png"), b"png").unwrap();
    let cfg = Configuration {
        url_prefix: "/photos".into(),
        ..config_for(tmp.path())
    };

    let (_, _, body) = get(cfg.clone(), "/api/slideshow").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({ "images": ["/photos/a.png"] }));

    let (status, content_type, _) = get(cfg, "/photos/a.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn landing_page_links_the_slideshow() {
    let tmp = tempdir().unwrap();
    let (status, content_type, body) = get(config_for(tmp.path()), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("/api/slideshow"));
    assert!(html.contains("open.spotify.com/embed/playlist/37i9dQZF1DX0Yxoavh5qJV"));
}

#[tokio::test]
async fn every_listed_url_is_served() {
    let tmp = tempdir().unwrap();
    for name in [".snow.png", "A.jpg", "b.webp", "c d.gif", "note.txt"] {
        fs::write(tmp.path().join(name), b"img").unwrap();
    }

    let (_, _, body) = get(config_for(tmp.path()), "/api/slideshow").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 3);
    for url in images {
        let url = url.as_str().unwrap().replace(' ', "%20");
        let (status, _, bytes) = get(config_for(tmp.path()), &url).await;
        assert_eq!(status, StatusCode::OK, "{url}");
        assert_eq!(bytes, b"img");
    }
}

#[tokio::test]
async fn percent_encoded_names_are_decoded_before_lookup() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("snow#1.png"), b"png").unwrap();

    let (status, _, body) = get(config_for(tmp.path()), "/slideshow/snow%231.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"png");
}
