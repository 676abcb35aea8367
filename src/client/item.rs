//! # 条目模型
//!
//! ## 设计思路
//!
//! 条目（Item）是一次压缩工作的单位。状态使用枚举表达：
//! 只有 `Done` 变体携带压缩结果，只有 `Error` 变体携带错误信息，
//! 因此“有压缩数据 ⇔ 已完成”由类型系统保证，而不是靠运行时约定。
//!
//! 条目创建后只允许编排器修改（字段均为 crate 内可见）。

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::export::{compression_ratio, format_bytes};
use super::handle::ObjectHandle;
use crate::codec::SupportedMime;

/// 条目唯一标识（UUID v4），接入时分配，生命周期内不变，移除后不复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 对外展示用的简单状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原始内容：文件名 + 字节。
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Bytes,
}

/// 压缩结果：内容句柄 + 字节。
#[derive(Debug)]
pub struct CompressedContent {
    pub(crate) handle: ObjectHandle,
    pub(crate) bytes: Bytes,
    pub(crate) mime: SupportedMime,
}

impl CompressedContent {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> SupportedMime {
        self.mime
    }

    pub fn url(&self) -> String {
        self.handle.url()
    }
}

/// 内部状态（带数据）。
#[derive(Debug)]
pub(crate) enum ItemState {
    Pending,
    /// `ticket` 标识本次派发，迟到的旧结果据此丢弃。
    Processing { ticket: u64 },
    Done(CompressedContent),
    Error(String),
}

/// 一张用户提交的图片。
#[derive(Debug)]
pub struct Item {
    pub(crate) id: ItemId,
    pub(crate) source: SourceFile,
    pub(crate) preview: ObjectHandle,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) mime: SupportedMime,
    pub(crate) state: ItemState,
}

impl Item {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn preview_url(&self) -> String {
        self.preview.url()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mime(&self) -> SupportedMime {
        self.mime
    }

    pub fn original_bytes(&self) -> u64 {
        self.source.bytes.len() as u64
    }

    pub fn status(&self) -> ItemStatus {
        match self.state {
            ItemState::Pending => ItemStatus::Pending,
            ItemState::Processing { .. } => ItemStatus::Processing,
            ItemState::Done(_) => ItemStatus::Done,
            ItemState::Error(_) => ItemStatus::Error,
        }
    }

    pub fn compressed(&self) -> Option<&CompressedContent> {
        match &self.state {
            ItemState::Done(content) => Some(content),
            _ => None,
        }
    }

    pub fn compressed_bytes(&self) -> Option<u64> {
        self.compressed().map(|c| c.bytes.len() as u64)
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            ItemState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        let compressed_bytes = self.compressed_bytes();
        ItemSnapshot {
            id: self.id,
            name: self.source.name.clone(),
            mime: self.mime,
            width: self.width,
            height: self.height,
            status: self.status(),
            original_bytes: self.original_bytes(),
            compressed_bytes,
            compression_ratio: compressed_bytes
                .map(|compressed| compression_ratio(self.original_bytes(), compressed)),
            error_message: self.error_message().map(str::to_string),
            preview_url: self.preview.url(),
        }
    }
}

/// 条目的只读快照，供列表展示与序列化。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub name: String,
    pub mime: SupportedMime,
    pub width: u32,
    pub height: u32,
    pub status: ItemStatus,
    pub original_bytes: u64,
    pub compressed_bytes: Option<u64>,
    pub compression_ratio: Option<f64>,
    pub error_message: Option<String>,
    pub preview_url: String,
}

impl ItemSnapshot {
    /// 单行展示：`photo.jpg [JPG] 3.00 MB → 1.20 MB（节省 60.0%） done`。
    ///
    /// 压缩率与汇总行同一口径：`(原始 - 压缩后) / 原始`，变大时为负数。
    pub fn display_line(&self) -> String {
        let compressed = match self.compressed_bytes {
            Some(bytes) => format_bytes(bytes),
            None => "-".to_string(),
        };
        let ratio = match self.compression_ratio {
            Some(ratio) => format!("（节省 {:.1}%）", ratio),
            None => String::new(),
        };
        let mut line = format!(
            "{} [{}] {} → {}{} {}",
            self.name,
            self.mime.label(),
            format_bytes(self.original_bytes),
            compressed,
            ratio,
            self.status
        );
        if let Some(message) = &self.error_message {
            line.push_str(": ");
            line.push_str(message);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ids_are_unique() {
        let a = ItemId::new();
        let b = ItemId::new();
        assert_ne!(a, b);
        assert_eq!(ItemId::parse(&a.to_string()).ok(), Some(a));
    }

    #[test]
    fn status_strings_are_stable() {
        assert_eq!(ItemStatus::Pending.as_str(), "pending");
        assert_eq!(ItemStatus::Processing.as_str(), "processing");
        assert_eq!(ItemStatus::Done.as_str(), "done");
        assert_eq!(ItemStatus::Error.as_str(), "error");
        assert_eq!(
            serde_json::to_string(&ItemStatus::Processing).expect("serialize status"),
            "\"processing\""
        );
    }

    fn snapshot(original: u64, compressed: Option<u64>, status: ItemStatus) -> ItemSnapshot {
        ItemSnapshot {
            id: ItemId::new(),
            name: "a.jpg".to_string(),
            mime: SupportedMime::Jpeg,
            width: 10,
            height: 10,
            status,
            original_bytes: original,
            compressed_bytes: compressed,
            compression_ratio: compressed.map(|c| compression_ratio(original, c)),
            error_message: None,
            preview_url: String::new(),
        }
    }

    #[test]
    fn display_line_reports_savings_like_the_summary() {
        let done = snapshot(1000, Some(400), ItemStatus::Done);
        assert_eq!(done.display_line(), "a.jpg [JPG] 1000 B → 400 B（节省 60.0%） done");

        let grown = snapshot(1000, Some(1100), ItemStatus::Done);
        assert!(grown.display_line().contains("（节省 -10.0%）"));

        let pending = snapshot(1000, None, ItemStatus::Pending);
        assert_eq!(pending.display_line(), "a.jpg [JPG] 1000 B → - pending");
    }
}
