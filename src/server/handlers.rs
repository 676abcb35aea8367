//! 路由处理函数。
//!
//! 错误统一以 `AppError` 自定义拒绝抛出，由 `handle_rejection` 转为 JSON 响应。

use std::convert::Infallible;
use std::time::Instant;

use base64::{Engine as _, engine::general_purpose};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderValue};
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::reply::Response;
use warp::{Rejection, Reply};

use super::ServerState;
use super::multipart::{self, UploadedFile};
use crate::client::export::{compression_ratio, safe_file_name};
use crate::codec::{CompressedImage, SupportedMime};
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody {
    success: bool,
    message: String,
    results: Vec<BatchEntry>,
}

/// 批量结果中的一项；失败项只有 `originalName / originalSize / mimeType / success / error`。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    original_name: String,
    original_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressed_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compression_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressed_data: Option<String>,
    mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_url: Option<String>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_bytes(value.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("响应头无效：{}", e)))
}

fn binary_response(
    bytes: Vec<u8>,
    content_type: &str,
    disposition: &str,
    file_name: &str,
) -> Result<Response, AppError> {
    let mut response = Response::new(bytes.into());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, header_value(content_type)?);
    headers.insert(
        CONTENT_DISPOSITION,
        header_value(&format!("{}; filename=\"{}\"", disposition, safe_file_name(file_name)))?,
    );
    Ok(response)
}

pub async fn health() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&HealthBody {
        status: "OK",
        message: "图片压缩服务运行中",
    }))
}

pub async fn compress(form: FormData, state: ServerState) -> Result<Response, Rejection> {
    compress_upload(form, state).await.map_err(warp::reject::custom)
}

async fn compress_upload(form: FormData, state: ServerState) -> Result<Response, AppError> {
    let start = Instant::now();
    let upload = multipart::collect(form, state.settings.max_files).await?;

    if upload.files.is_empty() {
        return Err(AppError::BadRequest("没有上传文件".to_string()));
    }

    log::info!(
        "📤 收到压缩请求 - {} 个文件 quality={}",
        upload.files.len(),
        upload
            .quality
            .map(|q| q.to_string())
            .unwrap_or_else(|| "default".to_string())
    );

    if upload.is_single() {
        let quality = upload.quality;
        let Some(file) = upload.files.into_iter().next() else {
            return Err(AppError::BadRequest("没有上传文件".to_string()));
        };

        let image = state
            .codec
            .compress_blocking(file.bytes.clone(), file.declared_mime.clone(), quality)
            .await?;

        log::info!(
            "✅ 单文件压缩完成 - {} {} -> {} bytes total={}ms",
            file.file_name,
            file.bytes.len(),
            image.bytes.len(),
            start.elapsed().as_millis()
        );

        let mime = image.mime;
        return binary_response(image.bytes, mime.as_str(), "inline", &file.file_name);
    }

    let quality = upload.quality;
    let concurrency = state.settings.batch_concurrency.max(1);
    let results: Vec<BatchEntry> = stream::iter(upload.files)
        .map(|file| {
            let state = state.clone();
            async move {
                let result = state
                    .codec
                    .compress_blocking(file.bytes.clone(), file.declared_mime.clone(), quality)
                    .await;
                batch_entry(&state, file, result).await
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    let succeeded = results.iter().filter(|entry| entry.success).count();
    let failed = results.len() - succeeded;

    log::info!(
        "✅ 批量压缩完成 - 成功 {} 个，失败 {} 个 total={}ms",
        succeeded,
        failed,
        start.elapsed().as_millis()
    );

    let body = BatchBody {
        success: true,
        message: format!("处理完成：成功 {} 个，失败 {} 个", succeeded, failed),
        results,
    };
    Ok(warp::reply::json(&body).into_response())
}

async fn batch_entry(
    state: &ServerState,
    file: UploadedFile,
    result: Result<CompressedImage, crate::codec::CodecError>,
) -> BatchEntry {
    let original_size = file.bytes.len() as u64;

    let image = match result {
        Ok(image) => image,
        Err(err) => {
            log::warn!("⚠️ 压缩失败：{} - {}", file.file_name, err);
            return BatchEntry {
                id: None,
                original_name: file.file_name,
                original_size,
                compressed_size: None,
                compression_ratio: None,
                compressed_data: None,
                mime_type: file.declared_mime,
                download_url: None,
                success: false,
                error: Some(err.to_string()),
            };
        }
    };

    let download_url = match state.store.save(&file.file_name, &image.bytes).await {
        Ok(stored) => Some(format!("/api/download/{}", stored.filename)),
        Err(e) => {
            log::warn!("⚠️ 保存压缩产物失败：{} - {}", file.file_name, e);
            None
        }
    };

    let compressed_size = image.bytes.len() as u64;
    let ratio = compression_ratio(original_size, compressed_size);

    BatchEntry {
        id: Some(Uuid::new_v4().to_string()),
        original_name: file.file_name,
        original_size,
        compressed_size: Some(compressed_size),
        compression_ratio: Some((ratio * 10.0).round() / 10.0),
        compressed_data: Some(general_purpose::STANDARD.encode(&image.bytes)),
        mime_type: image.mime.as_str().to_string(),
        download_url,
        success: true,
        error: None,
    }
}

pub async fn download(filename: String, state: ServerState) -> Result<Response, Rejection> {
    let bytes = state.store.read(&filename).await.map_err(warp::reject::custom)?;
    let content_type = SupportedMime::from_extension(std::path::Path::new(&filename))
        .map(SupportedMime::as_str)
        .unwrap_or("application/octet-stream");

    log::info!("📥 下载产物：{} ({} bytes)", filename, bytes.len());
    binary_response(bytes, content_type, "attachment", &filename).map_err(warp::reject::custom)
}

pub async fn info(filename: String, state: ServerState) -> Result<impl Reply, Rejection> {
    let info = state.store.info(&filename).await.map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&info))
}

/// 将拒绝统一转为 JSON 错误响应。
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(app_error) = err.find::<AppError>() {
        let status = app_error.status();
        if status.is_server_error() {
            log::error!("❌ 请求处理失败: {}", app_error);
        } else {
            log::warn!("⚠️ 请求被拒绝: {}", app_error);
        }
        return Ok(
            warp::reply::with_status(warp::reply::json(&app_error.body()), status).into_response(),
        );
    }

    let error = if err.is_not_found() {
        AppError::NotFound("路由不存在".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        AppError::PayloadTooLarge("超过上传大小限制".to_string())
    } else if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        return Ok(json_status(e.to_string(), "E_METHOD_NOT_ALLOWED", StatusCode::METHOD_NOT_ALLOWED));
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        return Ok(json_status(e.to_string(), "E_UNSUPPORTED_MEDIA", StatusCode::UNSUPPORTED_MEDIA_TYPE));
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        return Ok(json_status(e.to_string(), "E_LENGTH_REQUIRED", StatusCode::LENGTH_REQUIRED));
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        AppError::BadRequest(e.to_string())
    } else if let Some(e) = err.find::<warp::reject::MissingHeader>() {
        AppError::BadRequest(e.to_string())
    } else {
        log::error!("❌ 未处理的拒绝: {:?}", err);
        return Ok(json_status(
            "服务器内部错误".to_string(),
            "E_INTERNAL",
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    };

    Ok(error.into_response())
}

fn json_status(message: String, code: &'static str, status: StatusCode) -> Response {
    let body = crate::error::ErrorBody {
        success: false,
        error: message,
        code,
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}
