//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `CodecConfig`，保证运行时行为可观测、可调整、可测试。
//! PNG 压缩档位（fast / default / best）作为高层语义，映射到底层编码参数。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置。
//! - `Quality` 负责 1~100 的钳制（超出范围一律钳制，不拒绝）。
//! - `PngCompression` 负责档位字符串解析与反向输出。

use std::fmt;

use image::codecs::png::{CompressionType, FilterType};
use serde::{Deserialize, Serialize};

use super::CodecError;

/// JPEG 质量参数（1~100）。
///
/// 构造时即完成钳制，因此持有 `Quality` 的代码无需再次校验范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;
    pub const DEFAULT: u8 = 75;

    /// 将任意整数钳制到合法范围。
    ///
    /// # 示例
    /// ```rust
    /// use image_compress::codec::Quality;
    ///
    /// assert_eq!(Quality::clamped(150).get(), 100);
    /// assert_eq!(Quality::clamped(-5).get(), 1);
    /// assert_eq!(Quality::clamped(80).get(), 80);
    /// ```
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    /// 解析外部传入的质量字符串（表单字段 / 命令行）。
    ///
    /// 小数按四舍五入处理；非数字输入返回错误，数值越界则钳制。
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Ok(Self::clamped(value));
        }

        let value = trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| CodecError::InvalidQuality(trimmed.to_string()))?;

        Ok(Self::clamped(value.round() as i64))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl From<i64> for Quality {
    fn from(value: i64) -> Self {
        Self::clamped(value)
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PNG 无损压缩档位。
///
/// - `Fast`：编码最快，体积最大
/// - `Default`：平衡
/// - `Best`：体积最小（默认，对应 `compressionLevel: 9`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    #[default]
    Best,
}

impl PngCompression {
    /// 从外部字符串解析档位。
    pub fn from_str(level: &str) -> Result<Self, CodecError> {
        match level.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "default" => Ok(Self::Default),
            "best" => Ok(Self::Best),
            other => Err(CodecError::Encode(format!(
                "未知 PNG 压缩档位：{}（可选：fast / default / best）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Default => "default",
            Self::Best => "best",
        }
    }

    pub(crate) fn encoder_params(self) -> (CompressionType, FilterType) {
        match self {
            Self::Fast => (CompressionType::Fast, FilterType::NoFilter),
            Self::Default => (CompressionType::Default, FilterType::Adaptive),
            Self::Best => (CompressionType::Best, FilterType::Adaptive),
        }
    }
}

/// 压缩能力配置。
///
/// 字段覆盖了输入校验、解码资源限制与编码三个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// 允许处理的最大输入体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 请求未携带质量参数时使用的 JPEG 质量。
    pub default_quality: Quality,
    /// PNG 压缩档位。
    pub png_compression: PngCompression,
    /// 重新编码前是否按 EXIF 方向旋转。
    pub auto_orient: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 100_000_000,
            max_decoded_bytes: 400 * 1024 * 1024,
            default_quality: Quality::default(),
            png_compression: PngCompression::default(),
            auto_orient: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_out_of_range_values() {
        assert_eq!(Quality::clamped(150), Quality::clamped(100));
        assert_eq!(Quality::clamped(-5), Quality::clamped(1));
        assert_eq!(Quality::clamped(0).get(), 1);
        assert_eq!(Quality::default().get(), 75);
    }

    #[test]
    fn quality_parse_rounds_and_clamps() {
        assert_eq!(Quality::parse("80").ok(), Some(Quality::clamped(80)));
        assert_eq!(Quality::parse(" 80.6 ").ok(), Some(Quality::clamped(81)));
        assert_eq!(Quality::parse("1000").ok(), Some(Quality::clamped(100)));
        assert!(matches!(Quality::parse("high"), Err(CodecError::InvalidQuality(_))));
        assert!(matches!(Quality::parse("NaN"), Err(CodecError::InvalidQuality(_))));
    }

    #[test]
    fn quality_deserialize_clamps() {
        let q: Quality = serde_json::from_str("250").expect("deserialize quality");
        assert_eq!(q.get(), 100);
        let json = serde_json::to_string(&Quality::clamped(42)).expect("serialize quality");
        assert_eq!(json, "42");
    }

    #[test]
    fn png_compression_roundtrip() {
        for level in [PngCompression::Fast, PngCompression::Default, PngCompression::Best] {
            assert_eq!(PngCompression::from_str(level.as_str()).ok(), Some(level));
        }
        assert!(PngCompression::from_str("ultra").is_err());
    }
}
