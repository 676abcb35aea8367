//! multipart 表单收集。
//!
//! 文件字段名为 `file` 或 `images`，可选文本字段 `quality`，其余字段忽略。
//! 上传内容全部在内存中处理，不落临时文件。

use bytes::{BufMut, Bytes};
use futures::{TryStreamExt, StreamExt as _};
use warp::multipart::{FormData, Part};

use crate::codec::{Quality, SupportedMime};
use crate::error::AppError;

/// 单文件（二进制响应）模式使用的字段名。
pub const SINGLE_FIELD: &str = "file";
/// 批量（JSON 响应）模式使用的字段名。
pub const BATCH_FIELD: &str = "images";

/// 一个上传的文件。
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub declared_mime: String,
    pub bytes: Bytes,
}

/// 解析后的表单。
#[derive(Debug, Default)]
pub struct Upload {
    pub files: Vec<UploadedFile>,
    pub quality: Option<Quality>,
}

impl Upload {
    /// 恰好一个 `file` 字段时使用二进制响应。
    pub fn is_single(&self) -> bool {
        self.files.len() == 1 && self.files[0].field == SINGLE_FIELD
    }
}

async fn read_part(part: Part) -> Result<Vec<u8>, AppError> {
    part.stream()
        .try_fold(Vec::new(), |mut acc, buf| async move {
            acc.put(buf);
            Ok(acc)
        })
        .await
        .map_err(|e| AppError::BadRequest(format!("读取上传内容失败：{}", e)))
}

/// 声明类型缺失或为通用二进制时，按文件签名、扩展名依次识别。
fn resolve_mime(declared: Option<&str>, bytes: &[u8], file_name: &str) -> String {
    match declared.map(str::trim) {
        Some(declared) if !declared.is_empty() && declared != "application/octet-stream" => {
            declared.to_string()
        }
        _ => SupportedMime::sniff(bytes)
            .or_else(|| SupportedMime::from_extension(std::path::Path::new(file_name)))
            .map(|mime| mime.as_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}

/// 读取整个表单；文件数超过 `max_files` 时立即返回 400。
pub async fn collect(mut form: FormData, max_files: usize) -> Result<Upload, AppError> {
    let mut upload = Upload::default();

    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| AppError::BadRequest(format!("解析表单失败：{}", e)))?
    {
        let field = part.name().to_string();

        match field.as_str() {
            "quality" => {
                let raw = read_part(part).await?;
                let quality = Quality::parse(&String::from_utf8_lossy(&raw))?;
                upload.quality = Some(quality);
            }
            SINGLE_FIELD | BATCH_FIELD => {
                if upload.files.len() >= max_files {
                    return Err(AppError::BadRequest(format!("最多上传 {} 个文件", max_files)));
                }

                let file_name = part
                    .filename()
                    .map(str::to_string)
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "image".to_string());
                let declared = part.content_type().map(str::to_string);
                let bytes = read_part(part).await?;
                let declared_mime = resolve_mime(declared.as_deref(), &bytes, &file_name);

                upload.files.push(UploadedFile {
                    field,
                    file_name,
                    declared_mime,
                    bytes: Bytes::from(bytes),
                });
            }
            other => {
                log::debug!("忽略未知表单字段：{}", other);
                // 丢弃内容，继续读取下一个字段
                part.stream().for_each(|_| async {}).await;
            }
        }
    }

    Ok(upload)
}
