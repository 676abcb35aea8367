//! # 压缩后端抽象
//!
//! ## 设计思路
//!
//! 编排器只依赖 `CompressionBackend` trait，不关心压缩发生在本进程还是远端服务：
//! - `LocalBackend`：直接调用 `codec::Codec`（阻塞线程池）
//! - `RemoteBackend`：通过 HTTP 调用 `/api/compress`（见 `remote` 模块）
//!
//! 任何失败都以 `BackendError` 返回，由编排器转为条目的 `error` 状态。

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{Codec, CodecError, CompressedImage, Quality, SupportedMime};

/// 一次压缩调用的输入。
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub name: String,
    pub bytes: Bytes,
    pub mime: SupportedMime,
    pub quality: Quality,
}

/// 后端调用错误。
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// 网络层失败（连接、发送、读取）
    #[error("网络请求失败: {0}")]
    Transport(String),

    /// 非 2xx 响应
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// 请求超时
    #[error("请求超时（{}秒）", .0.as_secs())]
    Timeout(Duration),

    /// 响应结构不符合预期
    #[error("响应格式无效: {0}")]
    Malformed(String),

    /// 压缩失败（本地 codec 或服务端报告）
    #[error("{0}")]
    Codec(String),
}

impl From<CodecError> for BackendError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// 压缩能力：`compress(bytes, mime, quality) -> bytes`。
#[async_trait]
pub trait CompressionBackend: Send + Sync {
    async fn compress(&self, request: CompressionRequest) -> Result<CompressedImage, BackendError>;

    /// 日志中使用的后端名称。
    fn name(&self) -> &'static str;
}

/// 进程内压缩后端。
#[derive(Clone, Default)]
pub struct LocalBackend {
    codec: Codec,
}

impl LocalBackend {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl CompressionBackend for LocalBackend {
    async fn compress(&self, request: CompressionRequest) -> Result<CompressedImage, BackendError> {
        let image = self
            .codec
            .compress_blocking(request.bytes, request.mime.as_str().to_string(), Some(request.quality))
            .await?;
        Ok(image)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pipeline::fixtures::png_bytes;

    #[tokio::test]
    async fn local_backend_compresses_png() {
        let backend = LocalBackend::default();
        let out = backend
            .compress(CompressionRequest {
                name: "a.png".into(),
                bytes: Bytes::from(png_bytes(32, 32)),
                mime: SupportedMime::Png,
                quality: Quality::default(),
            })
            .await
            .expect("local compress");

        assert_eq!(out.mime, SupportedMime::Png);
        assert!(!out.bytes.is_empty());
    }

    #[tokio::test]
    async fn local_backend_reports_codec_failure() {
        let backend = LocalBackend::default();
        let result = backend
            .compress(CompressionRequest {
                name: "broken.jpg".into(),
                bytes: Bytes::from_static(b"definitely not a jpeg"),
                mime: SupportedMime::Jpeg,
                quality: Quality::default(),
            })
            .await;

        assert!(matches!(result, Err(BackendError::Codec(_))));
    }

    #[test]
    fn status_error_message_includes_code() {
        let err = BackendError::Status {
            status: 413,
            message: "文件过大".into(),
        };
        assert_eq!(err.to_string(), "文件过大 (HTTP 413)");
    }
}
