// HTTP 路由行为：状态码、响应头、JSON 结构
mod common;

use base64::{Engine as _, engine::general_purpose};
use image_compress::server::{self, ServerState};
use image_compress::settings::ServerSettings;
use serde_json::Value;
use tempfile::TempDir;
use warp::http::StatusCode;

use common::{FormPart, jpeg_bytes, multipart_body, multipart_content_type, png_bytes};

async fn state_with(configure: impl FnOnce(&mut ServerSettings)) -> (ServerState, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut settings = ServerSettings {
        artifact_dir: dir.path().join("artifacts"),
        ..ServerSettings::default()
    };
    configure(&mut settings);
    let state = ServerState::new(settings).await.expect("server state");
    (state, dir)
}

async fn state() -> (ServerState, TempDir) {
    state_with(|_| {}).await
}

async fn post_compress(state: &ServerState, parts: &[FormPart<'_>]) -> warp::http::Response<bytes::Bytes> {
    warp::test::request()
        .method("POST")
        .path("/api/compress")
        .header("content-type", multipart_content_type())
        .body(multipart_body(parts))
        .reply(&server::routes(state.clone()))
        .await
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn health_reports_ok() {
    let (state, _dir) = state().await;
    let res = warp::test::request()
        .path("/api/health")
        .reply(&server::routes(state))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res.body())["status"], "OK");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (state, _dir) = state().await;
    let res = warp::test::request()
        .path("/api/nothing")
        .reply(&server::routes(state))
        .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(res.body())["success"], false);
}

#[tokio::test]
async fn single_png_returns_binary_image() {
    let (state, _dir) = state().await;
    let source = png_bytes(64, 64);
    let res = post_compress(&state, &[FormPart::file("file", "icon.png", "image/png", &source)]).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/png");
    assert_eq!(res.headers()["content-disposition"], "inline; filename=\"icon.png\"");
    assert!(res.body().starts_with(b"\x89PNG\r\n\x1a\n"));
}

#[tokio::test]
async fn single_jpeg_honours_quality_field() {
    let (state, _dir) = state().await;
    let source = jpeg_bytes(200, 150);

    let high = post_compress(
        &state,
        &[
            FormPart::text("quality", "95"),
            FormPart::file("file", "a.jpg", "image/jpeg", &source),
        ],
    )
    .await;
    let low = post_compress(
        &state,
        &[
            FormPart::text("quality", "10"),
            FormPart::file("file", "a.jpg", "image/jpeg", &source),
        ],
    )
    .await;

    assert_eq!(high.status(), StatusCode::OK);
    assert_eq!(low.status(), StatusCode::OK);
    assert_eq!(low.headers()["content-type"], "image/jpeg");
    assert!(low.body().len() < high.body().len());
}

#[tokio::test]
async fn batch_reports_per_file_results() {
    let (state, _dir) = state().await;
    let source = png_bytes(48, 48);
    let res = post_compress(
        &state,
        &[
            FormPart::file("images", "ok.png", "image/png", &source),
            FormPart::file("images", "notes.txt", "text/plain", b"hello"),
        ],
    )
    .await;

    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res.body());
    assert_eq!(body["success"], true);

    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 2);

    let ok = &results[0];
    assert_eq!(ok["success"], true);
    assert_eq!(ok["originalName"], "ok.png");
    assert_eq!(ok["originalSize"], source.len() as u64);
    assert_eq!(ok["mimeType"], "image/png");
    let data = general_purpose::STANDARD
        .decode(ok["compressedData"].as_str().expect("compressedData"))
        .expect("base64");
    assert_eq!(Some(data.len() as u64), ok["compressedSize"].as_u64());

    let failed = &results[1];
    assert_eq!(failed["success"], false);
    assert_eq!(failed["originalName"], "notes.txt");
    assert!(failed["error"].is_string());
    assert!(failed.get("compressedData").is_none());

    // 批量结果附带下载地址，可下载并查询信息
    let url = ok["downloadUrl"].as_str().expect("downloadUrl").to_string();
    let download = warp::test::request()
        .path(&url)
        .reply(&server::routes(state.clone()))
        .await;
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(download.body().as_ref(), data.as_slice());
    assert!(
        download.headers()["content-disposition"]
            .to_str()
            .expect("ascii header")
            .starts_with("attachment;")
    );

    let filename = url.trim_start_matches("/api/download/");
    let info = warp::test::request()
        .path(&format!("/api/info/{}", filename))
        .reply(&server::routes(state))
        .await;
    assert_eq!(info.status(), StatusCode::OK);
    let info = json(info.body());
    assert_eq!(info["filename"], filename);
    assert_eq!(info["size"].as_u64(), Some(data.len() as u64));
}

#[tokio::test]
async fn download_url_works_for_names_with_inner_dots() {
    let (state, _dir) = state().await;
    let source = png_bytes(16, 16);
    let res = post_compress(&state, &[FormPart::file("images", "my..photo.png", "image/png", &source)]).await;

    let body = json(res.body());
    let url = body["results"][0]["downloadUrl"]
        .as_str()
        .expect("downloadUrl")
        .to_string();
    assert!(url.ends_with("my..photo.png"));

    let download = warp::test::request()
        .path(&url)
        .reply(&server::routes(state.clone()))
        .await;
    assert_eq!(download.status(), StatusCode::OK);

    let info = warp::test::request()
        .path(&url.replace("/api/download/", "/api/info/"))
        .reply(&server::routes(state))
        .await;
    assert_eq!(info.status(), StatusCode::OK);
}

#[tokio::test]
async fn request_without_files_is_rejected() {
    let (state, _dir) = state().await;
    let res = post_compress(&state, &[FormPart::text("quality", "80")]).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(res.body())["success"], false);
}

#[tokio::test]
async fn too_many_files_is_rejected() {
    let (state, _dir) = state_with(|s| s.max_files = 2).await;
    let source = png_bytes(8, 8);
    let parts: Vec<_> = (0..3)
        .map(|_| FormPart::file("images", "a.png", "image/png", &source))
        .collect();

    let res = post_compress(&state, &parts).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_payload_is_413() {
    let (state, _dir) = state_with(|s| s.max_upload_bytes = 1024).await;
    let source = vec![0u8; 4096];

    let res = post_compress(&state, &[FormPart::file("file", "big.png", "image/png", &source)]).await;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn non_numeric_quality_is_400() {
    let (state, _dir) = state().await;
    let source = png_bytes(8, 8);
    let res = post_compress(
        &state,
        &[
            FormPart::text("quality", "abc"),
            FormPart::file("file", "a.png", "image/png", &source),
        ],
    )
    .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(res.body())["code"], "E_INVALID_QUALITY");
}

#[tokio::test]
async fn unsupported_type_in_single_mode_is_415() {
    let (state, _dir) = state().await;
    let res = post_compress(&state, &[FormPart::file("file", "a.gif", "image/gif", b"GIF89a")]).await;

    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json(res.body())["success"], false);
}

#[tokio::test]
async fn corrupt_jpeg_in_single_mode_is_422() {
    let (state, _dir) = state().await;
    let res = post_compress(
        &state,
        &[FormPart::file("file", "broken.jpg", "image/jpeg", b"\xFF\xD8\xFFnot really")],
    )
    .await;

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn download_of_missing_or_unsafe_name_is_404() {
    let (state, _dir) = state().await;

    for path in ["/api/download/missing.png", "/api/download/..", "/api/info/.."] {
        let res = warp::test::request()
            .path(path)
            .reply(&server::routes(state.clone()))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "path {}", path);
    }
}
