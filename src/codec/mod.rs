//! # 图片压缩能力模块（codec）
//!
//! ## 设计思路
//!
//! 压缩算法本身完全委托 `image` crate，本模块只负责把它包装成一个稳定的能力：
//! `compress(bytes, mime, quality) -> bytes`，并补齐输入校验与资源上限。
//!
//! - `config`：配置、质量钳制、PNG 档位
//! - `error`：统一错误类型（含稳定错误码）
//! - `source`：类型识别与输出模型
//! - `pipeline`：尺寸读取、解码、编码、缩略图
//! - `handler`：编排整条处理链路
//!
//! ## 调用链
//!
//! ```text
//! server / LocalBackend
//!    ↓
//! handler.rs（类型 + 体积校验、阶段耗时日志）
//!    ├─ pipeline.rs（header 尺寸 + 资源上限）
//!    ├─ pipeline.rs（解码 + EXIF 方向）
//!    └─ pipeline.rs（JPEG 质量编码 / PNG 无损编码）
//!    ↓
//! CompressedImage 或 CodecError
//! ```

mod config;
mod error;
mod handler;
pub mod pipeline;
mod source;

pub use config::{CodecConfig, PngCompression, Quality};
pub use error::CodecError;
pub use handler::Codec;
pub use source::{CompressedImage, SupportedMime};
