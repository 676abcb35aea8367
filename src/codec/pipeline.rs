//! # 解码与编码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 重新编码”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 读取 header 尺寸
//! 2. 按像素 / 内存上限快速拒绝
//! 3. 完整解码（可选按 EXIF 方向旋转）
//! 4. 按类型重新编码：JPEG 使用质量参数，PNG 使用无损压缩档位
//!
//! 预览缩略图同样在此生成，供客户端接入阶段复用。

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{
    DynamicImage, ExtendedColorType, GenericImageView, ImageBuffer, ImageDecoder, ImageEncoder,
    ImageFormat, ImageReader, Rgba,
};
use std::io::Cursor;

use super::{CodecConfig, CodecError, Quality, SupportedMime};

/// 仅通过内存中的图片头信息读取宽高。
///
/// 用于在完整解码前做像素限制检查，也用于客户端接入阶段读取尺寸。
pub fn inspect_dimensions(bytes: &[u8]) -> Result<(u32, u32), CodecError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CodecError::Decode(format!("无法识别图片格式：{}", e)))?;

    if reader.format().is_none() {
        return Err(CodecError::Decode("无法识别图片格式".to_string()));
    }

    reader
        .into_dimensions()
        .map_err(|e| CodecError::Decode(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量与解码内存是否超过配置上限。
pub(crate) fn validate_decode_limits(
    config: &CodecConfig,
    width: u32,
    height: u32,
) -> Result<(), CodecError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| CodecError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(CodecError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    let estimated = pixels
        .checked_mul(4)
        .ok_or_else(|| CodecError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(CodecError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 按声明类型完整解码，必要时应用 EXIF 方向。
pub(crate) fn decode(
    bytes: &[u8],
    mime: SupportedMime,
    auto_orient: bool,
) -> Result<DynamicImage, CodecError> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(mime.image_format());

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| CodecError::Decode(format!("图片解码失败：{}", e)))?;

    let orientation = if auto_orient {
        decoder.orientation().ok()
    } else {
        None
    };

    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| CodecError::Decode(format!("图片解码失败：{}", e)))?;

    if let Some(orientation) = orientation {
        image.apply_orientation(orientation);
    }

    Ok(image)
}

/// JPEG 重新编码。
///
/// JPEG 不支持透明通道，统一转换为 RGB8 后编码。
pub(crate) fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut out = Vec::with_capacity(rgb.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.get())
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| CodecError::Encode(format!("JPEG 编码失败：{}", e)))?;

    Ok(out)
}

/// PNG 无损重新编码。
pub(crate) fn encode_png(image: &DynamicImage, config: &CodecConfig) -> Result<Vec<u8>, CodecError> {
    let (width, height) = image.dimensions();
    let (compression, filter) = config.png_compression.encoder_params();

    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, compression, filter)
        .write_image(image.as_bytes(), width, height, image.color().into())
        .map_err(|e| CodecError::Encode(format!("PNG 编码失败：{}", e)))?;

    Ok(out)
}

/// 生成预览缩略图（PNG 字节）。
///
/// 单边不超过 `max_dimension`，小图保持原尺寸。
pub fn render_thumbnail(bytes: &[u8], max_dimension: u32) -> Result<(Vec<u8>, u32, u32), CodecError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| CodecError::Decode(format!("图片解码失败：{}", e)))?;
    let (width, height) = image.dimensions();

    let scale = (max_dimension as f64 / width.max(1) as f64)
        .min(max_dimension as f64 / height.max(1) as f64)
        .min(1.0);

    let thumb = if scale < 1.0 {
        let target_width = ((width as f64 * scale).floor() as u32).max(1);
        let target_height = ((height as f64 * scale).floor() as u32).max(1);

        match resize_with_fast_image_resize(&image, target_width, target_height) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩略图失败，回退 image::thumbnail：{}", err);
                image.thumbnail(target_width, target_height)
            }
        }
    } else {
        image
    };

    let (thumb_width, thumb_height) = thumb.dimensions();
    let mut cursor = Cursor::new(Vec::new());
    thumb
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| CodecError::Encode(format!("缩略图编码失败：{}", e)))?;

    Ok((cursor.into_inner(), thumb_width, thumb_height))
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<DynamicImage, CodecError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| CodecError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| CodecError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| CodecError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
    use std::io::Cursor;

    /// 生成带渐变的 PNG 测试图。
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test png");
        cursor.into_inner()
    }

    /// 生成高质量 JPEG 测试图（便于验证重新压缩后体积下降）。
    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 255) as u8, (y % 255) as u8, ((x * y) % 255) as u8])
        });

        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 100)
            .encode_image(&img)
            .expect("failed to encode test jpeg");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{jpeg_bytes, png_bytes};
    use super::*;

    #[test]
    fn inspect_dimensions_reads_header() {
        let png = png_bytes(120, 80);
        assert_eq!(inspect_dimensions(&png).ok(), Some((120, 80)));

        let jpeg = jpeg_bytes(64, 48);
        assert_eq!(inspect_dimensions(&jpeg).ok(), Some((64, 48)));
    }

    #[test]
    fn inspect_dimensions_rejects_garbage() {
        assert!(matches!(
            inspect_dimensions(b"definitely not an image"),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn decode_limits_reject_too_many_pixels() {
        let mut config = CodecConfig::default();
        config.max_decoded_pixels = 1_000_000;

        assert!(validate_decode_limits(&config, 999, 1000).is_ok());
        assert!(matches!(
            validate_decode_limits(&config, 2000, 2000),
            Err(CodecError::ResourceLimit(_))
        ));
    }

    #[test]
    fn jpeg_quality_affects_output_size() {
        let image = decode(&jpeg_bytes(256, 256), SupportedMime::Jpeg, true).expect("decode jpeg");

        let low = encode_jpeg(&image, Quality::clamped(10)).expect("encode low");
        let high = encode_jpeg(&image, Quality::clamped(95)).expect("encode high");

        assert!(low.len() < high.len());
    }

    #[test]
    fn png_reencode_is_lossless() {
        let source = png_bytes(64, 64);
        let image = decode(&source, SupportedMime::Png, false).expect("decode png");
        let encoded = encode_png(&image, &CodecConfig::default()).expect("encode png");

        let roundtrip = image::load_from_memory(&encoded).expect("reload png");
        assert_eq!(roundtrip.to_rgba8().as_raw(), image.to_rgba8().as_raw());
    }

    #[test]
    fn thumbnail_is_bounded() {
        let (thumb, width, height) = render_thumbnail(&png_bytes(800, 400), 200).expect("thumbnail");

        assert_eq!((width, height), (200, 100));
        assert_eq!(inspect_dimensions(&thumb).ok(), Some((200, 100)));
    }

    #[test]
    fn thumbnail_keeps_small_images() {
        let (_, width, height) = render_thumbnail(&png_bytes(40, 30), 200).expect("thumbnail");
        assert_eq!((width, height), (40, 30));
    }
}
