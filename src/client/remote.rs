//! # 远端压缩后端
//!
//! ## 设计思路
//!
//! 通过 HTTP 调用压缩服务的 `POST /api/compress`，每次调用只上传一个文件。
//! 服务端支持两种响应形态，对应两种模式：
//! - `Single`：字段名 `file`，响应体即压缩后的二进制内容
//! - `Batch`：字段名 `images`，响应为 JSON，压缩数据以 base64 内嵌
//!
//! ## 实现思路
//!
//! - 外部 JSON 先反序列化为全 `Option` 字段的 DTO，再逐项校验，缺字段视为格式错误。
//! - 非 2xx 响应优先读取服务端 JSON 中的错误文案，读不到时使用本地化状态码文案。
//! - 超时与连接失败分别映射，便于上层提示。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;

use super::backend::{BackendError, CompressionBackend, CompressionRequest};
use crate::codec::{CompressedImage, SupportedMime};

/// 服务端响应形态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteMode {
    /// 单文件，二进制响应。
    #[default]
    Single,
    /// 批量接口，JSON + base64 响应。
    Batch,
}

impl RemoteMode {
    fn field_name(self) -> &'static str {
        match self {
            Self::Single => "file",
            Self::Batch => "images",
        }
    }
}

/// 远端后端配置。
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// 服务根地址，例如 `http://localhost:3000`。
    pub base_url: String,
    pub mode: RemoteMode,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            mode: RemoteMode::default(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_mode(mut self, mode: RemoteMode) -> Self {
        self.mode = mode;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/compress", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponseDto {
    results: Option<Vec<BatchResultDto>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResultDto {
    success: Option<bool>,
    error: Option<String>,
    compressed_size: Option<u64>,
    compressed_data: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBodyDto {
    error: Option<String>,
    message: Option<String>,
}

/// HTTP 压缩后端。
#[derive(Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("创建 HTTP 客户端失败：{}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.config.timeout)
        } else if e.is_connect() {
            BackendError::Transport(format!("无法连接：{}", e))
        } else {
            BackendError::Transport(format!("请求失败：{}", e))
        }
    }

    /// 常见 HTTP 状态码本地化文案。
    fn status_message(code: u16) -> &'static str {
        match code {
            400 => "请求无效",
            404 => "未找到",
            413 => "文件过大",
            415 => "文件类型不支持",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    async fn error_from_response(response: reqwest::Response) -> BackendError {
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();

        let message = serde_json::from_slice::<ErrorBodyDto>(&body)
            .ok()
            .and_then(|dto| dto.error.or(dto.message))
            .unwrap_or_else(|| Self::status_message(status).to_string());

        BackendError::Status { status, message }
    }

    fn parse_single(
        content_type: Option<&str>,
        body: bytes::Bytes,
    ) -> Result<CompressedImage, BackendError> {
        let content_type =
            content_type.ok_or_else(|| BackendError::Malformed("缺少 Content-Type".to_string()))?;
        let mime = SupportedMime::parse(content_type)
            .map_err(|_| BackendError::Malformed(format!("响应类型不是图片：{}", content_type)))?;

        if body.is_empty() {
            return Err(BackendError::Malformed("响应内容为空".to_string()));
        }

        Ok(CompressedImage {
            bytes: body.to_vec(),
            mime,
        })
    }

    fn parse_batch(body: &[u8]) -> Result<CompressedImage, BackendError> {
        let dto: BatchResponseDto = serde_json::from_slice(body)
            .map_err(|e| BackendError::Malformed(format!("JSON 解析失败：{}", e)))?;

        let result = dto
            .results
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| BackendError::Malformed("缺少 results".to_string()))?;

        if result.success == Some(false) {
            return Err(BackendError::Codec(
                result.error.unwrap_or_else(|| "压缩失败".to_string()),
            ));
        }

        let data = result
            .compressed_data
            .ok_or_else(|| BackendError::Malformed("缺少 compressedData".to_string()))?;
        let mime_type = result
            .mime_type
            .ok_or_else(|| BackendError::Malformed("缺少 mimeType".to_string()))?;

        let mime = SupportedMime::parse(&mime_type)
            .map_err(|_| BackendError::Malformed(format!("mimeType 无效：{}", mime_type)))?;
        let bytes = general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| BackendError::Malformed(format!("base64 解码失败：{}", e)))?;

        if bytes.is_empty() {
            return Err(BackendError::Malformed("compressedData 为空".to_string()));
        }
        if let Some(size) = result.compressed_size {
            if size != bytes.len() as u64 {
                return Err(BackendError::Malformed(format!(
                    "compressedSize 不一致：声明 {}，实际 {}",
                    size,
                    bytes.len()
                )));
            }
        }

        Ok(CompressedImage { bytes, mime })
    }
}

#[async_trait]
impl CompressionBackend for RemoteBackend {
    async fn compress(&self, request: CompressionRequest) -> Result<CompressedImage, BackendError> {
        let start = Instant::now();
        let part = reqwest::multipart::Part::bytes(request.bytes.to_vec())
            .file_name(request.name.clone())
            .mime_str(request.mime.as_str())
            .map_err(|e| BackendError::Transport(format!("构造上传内容失败：{}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("quality", request.quality.to_string())
            .part(self.config.mode.field_name(), part);

        let response = self
            .client
            .post(self.config.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            log::warn!("⚠️ 远端压缩失败 - {}: {}", request.name, err);
            return Err(err);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| self.map_reqwest_error(e))?;

        let image = match self.config.mode {
            RemoteMode::Single => Self::parse_single(content_type.as_deref(), body)?,
            RemoteMode::Batch => Self::parse_batch(&body)?,
        };

        log::info!(
            "🌐 远端压缩完成 - {} {} -> {} bytes total={}ms",
            request.name,
            request.bytes.len(),
            image.bytes.len(),
            start.elapsed().as_millis()
        );

        Ok(image)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
