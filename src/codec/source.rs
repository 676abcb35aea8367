//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部声明的类型”和“流水线中间结果”解耦：
//! - `SupportedMime` 表示封闭的可处理类型集合
//! - `CompressedImage` 表示压缩能力的输出（字节 + 内容类型）

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::CodecError;

/// 可处理的图片类型（封闭集合）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedMime {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
}

impl SupportedMime {
    /// 解析声明的 MIME 类型。
    ///
    /// 忽略大小写与 `;` 之后的参数，`image/jpg` / `image/pjpeg` 视为 JPEG 别名。
    ///
    /// # 示例
    /// ```rust
    /// use image_compress::codec::SupportedMime;
    ///
    /// assert_eq!(SupportedMime::parse("IMAGE/PNG; q=1").ok(), Some(SupportedMime::Png));
    /// assert!(SupportedMime::parse("text/plain").is_err());
    /// ```
    pub fn parse(declared: &str) -> Result<Self, CodecError> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            _ => Err(CodecError::UnsupportedType(declared.trim().to_string())),
        }
    }

    /// 通过文件签名（magic bytes）识别类型。
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let kind = infer::get(bytes)?;
        Self::parse(kind.mime_type()).ok()
    }

    /// 通过扩展名猜测类型（签名无法识别时的兜底）。
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "jpe" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// 徽标文案（列表展示用）。
    pub fn label(self) -> &'static str {
        match self {
            Self::Jpeg => "JPG",
            Self::Png => "PNG",
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

impl fmt::Display for SupportedMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 压缩输出：重新编码后的字节与其内容类型。
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub mime: SupportedMime,
}
