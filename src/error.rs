//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 服务端所有处理函数统一返回 `Result<T, AppError>`，在 warp 的 `recover` 阶段
//! 映射为 `{ success: false, error, code }` 结构的 JSON 响应。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `CodecError` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - `status()` 集中维护错误到 HTTP 状态码的映射。
//! - 实现 `warp::reject::Reject`，可直接作为自定义拒绝在过滤器链中传递。

use serde::Serialize;
use warp::http::StatusCode;

use crate::codec::CodecError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 压缩能力返回的错误（类型 / 体积 / 解码 / 编码）
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// 请求参数或表单内容无效
    #[error("请求无效: {0}")]
    BadRequest(String),

    /// 请求的文件不存在
    #[error("文件不存在: {0}")]
    NotFound(String),

    /// 请求体超过上限
    #[error("请求体过大: {0}")]
    PayloadTooLarge(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 产物目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 配置文件或环境变量无效
    #[error("配置无效: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Codec(err) => match err {
                CodecError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                CodecError::TooLarge { .. } | CodecError::ResourceLimit(_) => {
                    StatusCode::PAYLOAD_TOO_LARGE
                }
                CodecError::InvalidQuality(_) => StatusCode::BAD_REQUEST,
                CodecError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CodecError::Encode(_) | CodecError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io(_) | Self::Storage(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Codec(err) => err.code(),
            Self::BadRequest(_) => "E_BAD_REQUEST",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::PayloadTooLarge(_) => "E_PAYLOAD_TOO_LARGE",
            Self::Io(_) => "E_IO",
            Self::Storage(_) => "E_STORAGE",
            Self::Config(_) => "E_CONFIG",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.to_string(),
            code: self.code(),
        }
    }

    /// 转为 JSON 错误响应。
    pub fn into_response(self) -> warp::reply::Response {
        use warp::Reply;

        let status = self.status();
        warp::reply::with_status(warp::reply::json(&self.body()), status).into_response()
    }
}

impl warp::reject::Reject for AppError {}

/// 错误响应体。
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Quality;

    #[test]
    fn codec_errors_map_to_distinct_statuses() {
        let unsupported = AppError::from(CodecError::UnsupportedType("image/gif".into()));
        assert_eq!(unsupported.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(unsupported.code(), "E_UNSUPPORTED_TYPE");

        let too_large = AppError::from(CodecError::TooLarge { size: 2, limit: 1 });
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let decode = AppError::from(CodecError::Decode("bad".into()));
        assert_eq!(decode.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let quality = AppError::from(Quality::parse("abc").expect_err("non-numeric quality"));
        assert_eq!(quality.status(), StatusCode::BAD_REQUEST);
        assert_eq!(quality.code(), "E_INVALID_QUALITY");
    }

    #[test]
    fn body_carries_message_and_code() {
        let body = AppError::NotFound("a.jpg".into()).body();
        assert!(!body.success);
        assert_eq!(body.code, "E_NOT_FOUND");
        assert!(body.error.contains("a.jpg"));
    }
}
