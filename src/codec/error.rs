//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载压缩链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时提供稳定的 `code()` / `stage()`，
//! 供 HTTP 层与客户端按分支匹配。

/// 压缩能力统一错误类型。
///
/// 服务端会将其映射为 HTTP 状态码，客户端本地后端会将其转为单项错误。
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("不支持的图片类型：{0}（仅支持 image/jpeg 与 image/png）")]
    UnsupportedType(String),

    #[error("文件过大：{size} 字节（限制：{limit} 字节）")]
    TooLarge { size: u64, limit: u64 },

    #[error("无效的质量参数：{0}（应为 1~100 的数字）")]
    InvalidQuality(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("压缩任务执行失败：{0}")]
    Worker(String),
}

impl CodecError {
    /// 稳定错误码，供 JSON 响应与日志检索使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "E_UNSUPPORTED_TYPE",
            Self::TooLarge { .. } => "E_TOO_LARGE",
            Self::InvalidQuality(_) => "E_INVALID_QUALITY",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Worker(_) => "E_WORKER",
        }
    }

    /// 出错阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) | Self::TooLarge { .. } | Self::InvalidQuality(_) => "validate",
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Worker(_) => "worker",
        }
    }

}

impl From<CodecError> for String {
    fn from(error: CodecError) -> Self {
        error.to_string()
    }
}
