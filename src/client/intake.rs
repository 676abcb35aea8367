//! # 接入与校验模块
//!
//! ## 设计思路
//!
//! 在“尽可能早”的阶段执行输入校验，只有通过校验的候选文件才会进入条目集合。
//! 目标是尽快失败：类型不符、体积超限、数量超限直接拒绝，不做任何解码。
//!
//! ## 实现思路
//!
//! - 类型：声明的 MIME 必须属于 {image/jpeg, image/png}。
//! - 体积：可选上限（默认 50MB）。
//! - 数量：可选上限（默认 10 个，按当前集合已有条目计算剩余名额）。
//! - 通过后读取 header 尺寸并生成缩略图句柄；任一步失败则拒绝，已分配句柄随 `Drop` 释放。
//! - 每个被拒绝的候选都带有原因，供调用方提示用户。

use std::fmt;
use std::path::Path;

use bytes::Bytes;

use super::handle::{HandleKind, HandleRegistry};
use super::item::{Item, ItemId, ItemState, SourceFile};
use crate::codec::{SupportedMime, pipeline};

/// 接入配置。
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// 单个文件体积上限（字节），`None` 表示不限制。
    pub max_file_size: Option<u64>,
    /// 集合内条目数量上限，`None` 表示不限制。
    pub max_items: Option<usize>,
    /// 缩略图单边最大像素。
    pub preview_max_dimension: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size: Some(50 * 1024 * 1024),
            max_items: Some(10),
            preview_max_dimension: 256,
        }
    }
}

/// 候选文件：名称 + 声明类型 + 内容。
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub declared_mime: String,
    pub bytes: Bytes,
}

impl Candidate {
    pub fn new(name: impl Into<String>, declared_mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            declared_mime: declared_mime.into(),
            bytes: bytes.into(),
        }
    }

    /// 从本地文件读取候选。
    ///
    /// 声明类型优先按文件签名识别，无法识别时按扩展名兜底，
    /// 两者都不匹配时声明为 `application/octet-stream`（随后会被接入拒绝）。
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let declared = SupportedMime::sniff(&bytes)
            .or_else(|| SupportedMime::from_extension(path))
            .map(|mime| mime.as_str().to_string())
            .unwrap_or_else(|| {
                infer::get(&bytes)
                    .map(|kind| kind.mime_type().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string())
            });

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Ok(Self::new(name, declared, bytes))
    }
}

/// 拒绝原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnsupportedType(String),
    TooLarge { size: u64, limit: u64 },
    Decode(String),
    LimitReached { limit: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType(mime) => {
                write!(f, "文件类型不支持（{}），仅支持 JPG 和 PNG", mime)
            }
            Self::TooLarge { size, limit } => write!(
                f,
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                *size as f64 / 1024.0 / 1024.0,
                *limit as f64 / 1024.0 / 1024.0
            ),
            Self::Decode(message) => write!(f, "无法读取图片：{}", message),
            Self::LimitReached { limit } => write!(f, "最多只能添加 {} 个文件", limit),
        }
    }
}

/// 单个被拒绝的候选。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub name: String,
    pub reason: RejectReason,
}

/// 接入结果：通过的条目 + 被拒绝的候选。
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub accepted: Vec<Item>,
    pub rejected: Vec<Rejection>,
}

impl IntakeReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// 接入器。
#[derive(Clone)]
pub struct Intake {
    config: IntakeConfig,
    handles: HandleRegistry,
}

impl Intake {
    pub fn new(config: IntakeConfig, handles: HandleRegistry) -> Self {
        Self { config, handles }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// 校验一批候选文件。
    ///
    /// `existing` 为集合中已有条目数量，用于计算数量上限的剩余名额。
    pub fn accept(&self, candidates: Vec<Candidate>, existing: usize) -> IntakeReport {
        let mut report = IntakeReport::default();

        for candidate in candidates {
            if let Some(limit) = self.config.max_items {
                if existing + report.accepted.len() >= limit {
                    log::warn!("🚫 数量已达上限（{}），拒绝：{}", limit, candidate.name);
                    report.rejected.push(Rejection {
                        name: candidate.name,
                        reason: RejectReason::LimitReached { limit },
                    });
                    continue;
                }
            }

            let name = candidate.name.clone();
            match self.accept_one(candidate) {
                Ok(item) => report.accepted.push(item),
                Err(reason) => {
                    log::warn!("🚫 接入拒绝：{} - {}", name, reason);
                    report.rejected.push(Rejection { name, reason });
                }
            }
        }

        log::info!(
            "📥 接入完成 - 通过 {} 个，拒绝 {} 个",
            report.accepted.len(),
            report.rejected.len()
        );

        report
    }

    fn accept_one(&self, candidate: Candidate) -> Result<Item, RejectReason> {
        let mime = SupportedMime::parse(&candidate.declared_mime)
            .map_err(|_| RejectReason::UnsupportedType(candidate.declared_mime.clone()))?;

        let size = candidate.bytes.len() as u64;
        if let Some(limit) = self.config.max_file_size {
            if size > limit {
                return Err(RejectReason::TooLarge { size, limit });
            }
        }

        let (width, height) = pipeline::inspect_dimensions(&candidate.bytes)
            .map_err(|e| RejectReason::Decode(e.to_string()))?;

        let (thumbnail, _, _) =
            pipeline::render_thumbnail(&candidate.bytes, self.config.preview_max_dimension)
                .map_err(|e| RejectReason::Decode(e.to_string()))?;

        let preview = self
            .handles
            .create(HandleKind::Preview, "image/png", Bytes::from(thumbnail));

        Ok(Item {
            id: ItemId::new(),
            source: SourceFile {
                name: candidate.name,
                bytes: candidate.bytes,
            },
            preview,
            width,
            height,
            mime,
            state: ItemState::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::item::ItemStatus;
    use crate::codec::pipeline::fixtures::{jpeg_bytes, png_bytes};

    fn intake(config: IntakeConfig) -> (Intake, HandleRegistry) {
        let handles = HandleRegistry::new();
        (Intake::new(config, handles.clone()), handles)
    }

    #[test]
    fn accepts_jpeg_and_png_as_pending_items() {
        let (intake, handles) = intake(IntakeConfig::default());
        let report = intake.accept(
            vec![
                Candidate::new("a.jpg", "image/jpeg", jpeg_bytes(200, 150)),
                Candidate::new("b.png", "image/png", png_bytes(64, 32)),
            ],
            0,
        );

        assert_eq!(report.accepted.len(), 2);
        assert!(report.rejected.is_empty());
        assert_eq!(report.accepted[0].dimensions(), (200, 150));
        assert_eq!(report.accepted[1].dimensions(), (64, 32));
        assert!(report.accepted.iter().all(|item| item.status() == ItemStatus::Pending));
        assert_ne!(report.accepted[0].id(), report.accepted[1].id());
        assert_eq!(handles.live_count(HandleKind::Preview), 2);
    }

    #[test]
    fn rejects_non_image_without_touching_model() {
        let (intake, handles) = intake(IntakeConfig::default());
        let report = intake.accept(vec![Candidate::new("notes.txt", "text/plain", "hello")], 0);

        assert!(report.accepted.is_empty());
        assert_eq!(report.rejected_count(), 1);
        assert!(matches!(report.rejected[0].reason, RejectReason::UnsupportedType(_)));
        assert_eq!(handles.stats().created, 0);
    }

    #[test]
    fn rejects_oversize_candidate() {
        let (intake, _) = intake(IntakeConfig {
            max_file_size: Some(100),
            ..IntakeConfig::default()
        });
        let report = intake.accept(vec![Candidate::new("big.png", "image/png", png_bytes(64, 64))], 0);

        assert!(matches!(
            report.rejected[0].reason,
            RejectReason::TooLarge { limit: 100, .. }
        ));
    }

    #[test]
    fn rejects_undecodable_candidate_and_leaks_no_handle() {
        let (intake, handles) = intake(IntakeConfig::default());
        let report = intake.accept(
            vec![Candidate::new("broken.png", "image/png", &b"\x89PNG not really"[..])],
            0,
        );

        assert!(matches!(report.rejected[0].reason, RejectReason::Decode(_)));
        assert_eq!(handles.stats().live, 0);
    }

    #[test]
    fn enforces_item_limit_with_existing_items() {
        let (intake, _) = intake(IntakeConfig {
            max_items: Some(3),
            ..IntakeConfig::default()
        });
        let candidates = (0..3)
            .map(|i| Candidate::new(format!("{}.png", i), "image/png", png_bytes(8, 8)))
            .collect();

        let report = intake.accept(candidates, 2);

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(report
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::LimitReached { limit: 3 }));
    }

    #[test]
    fn candidate_from_path_sniffs_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("photo.bin");
        std::fs::write(&path, png_bytes(4, 4)).expect("write fixture");

        let candidate = Candidate::from_path(&path).expect("read candidate");
        assert_eq!(candidate.name, "photo.bin");
        assert_eq!(candidate.declared_mime, "image/png");

        let text = dir.path().join("readme.txt");
        std::fs::write(&text, "plain text").expect("write text");
        let candidate = Candidate::from_path(&text).expect("read text candidate");
        assert_eq!(candidate.declared_mime, "application/octet-stream");
    }
}
