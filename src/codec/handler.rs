//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `Codec` 只负责流程编排与配置管理，不直接与 HTTP 绑定。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 校验类型与体积
//! 3. 读取尺寸并检查资源上限
//! 4. 解码
//! 5. 按类型重新编码
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<CodecConfig>>` 支持运行时动态调整。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `decode/encode/total` 阶段耗时，便于性能诊断。
//! - CPU 密集的编码通过 `spawn_blocking` 执行，不阻塞异步运行时。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::pipeline;
use super::{CodecConfig, CodecError, CompressedImage, PngCompression, Quality, SupportedMime};

/// 压缩能力：`compress(bytes, mime, quality) -> bytes`。
///
/// 可廉价克隆，克隆体共享同一份配置。
#[derive(Clone)]
pub struct Codec {
    config: Arc<RwLock<CodecConfig>>,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<CodecConfig, CodecError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| CodecError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 切换 PNG 压缩档位。
    pub fn set_png_compression(&self, level: PngCompression) -> Result<(), CodecError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| CodecError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.png_compression = level;

        log::info!("⚙️ 已切换 PNG 压缩档位：{}", level.as_str());
        Ok(())
    }

    /// 同步压缩入口。
    ///
    /// `declared_mime` 为调用方声明的类型；`quality` 缺省时使用配置中的默认质量。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_compress::codec::{Codec, CodecConfig, Quality};
    ///
    /// let codec = Codec::new(CodecConfig::default());
    /// let bytes = std::fs::read("photo.jpg")?;
    /// let out = codec.compress(&bytes, "image/jpeg", Some(Quality::clamped(75)))?;
    /// println!("{} -> {}", bytes.len(), out.bytes.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn compress(
        &self,
        bytes: &[u8],
        declared_mime: &str,
        quality: Option<Quality>,
    ) -> Result<CompressedImage, CodecError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let mime = SupportedMime::parse(declared_mime)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(CodecError::TooLarge {
                size: bytes.len() as u64,
                limit: config.max_file_size,
            });
        }
        if bytes.is_empty() {
            return Err(CodecError::Decode("图片内容为空".to_string()));
        }

        let (header_width, header_height) = pipeline::inspect_dimensions(bytes)?;
        pipeline::validate_decode_limits(&config, header_width, header_height)?;

        let decode_start = Instant::now();
        let image = pipeline::decode(bytes, mime, config.auto_orient)?;
        let decode_elapsed = decode_start.elapsed();

        let encode_start = Instant::now();
        let quality = quality.unwrap_or(config.default_quality);
        let encoded = match mime {
            SupportedMime::Jpeg => pipeline::encode_jpeg(&image, quality)?,
            SupportedMime::Png => pipeline::encode_png(&image, &config)?,
        };
        let encode_elapsed = encode_start.elapsed();

        log::info!(
            "✅ 图片压缩完成 - {} {}x{} {} -> {} bytes quality={} decode={}ms encode={}ms total={}ms",
            mime,
            header_width,
            header_height,
            bytes.len(),
            encoded.len(),
            quality,
            decode_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(CompressedImage {
            bytes: encoded,
            mime,
        })
    }

    /// 异步压缩入口：在阻塞线程池中执行 `compress`。
    pub async fn compress_blocking(
        &self,
        bytes: bytes::Bytes,
        declared_mime: String,
        quality: Option<Quality>,
    ) -> Result<CompressedImage, CodecError> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.compress(&bytes, &declared_mime, quality))
            .await
            .map_err(|e| CodecError::Worker(format!("线程执行失败：{}", e)))?
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}
