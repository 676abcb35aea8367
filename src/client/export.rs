//! # 结果汇总与导出模块
//!
//! ## 设计思路
//!
//! 压缩完成后的结果有两种出口：
//! - 单个保存：以原文件名（可插入后缀）写入目标目录
//! - 批量打包：所有 `done` 条目打成一个 zip，默认名 `optimized.zip`
//!
//! 另外提供展示用的字节格式化与压缩率计算。
//!
//! ## 实现思路
//!
//! - 文件名先经过 `safe_file_name` 清洗，去掉换行、引号、路径分隔符等字符。
//! - 包内重名条目按 `name (1).ext`、`name (2).ext` 依次去重。
//! - 零个已完成条目时打包为空操作（返回 `Ok(None)`），不是错误。
//! - JPG/PNG 本身已是压缩格式，包内条目使用 `Stored` 直接存储。

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use zip::write::SimpleFileOptions;

use super::item::ItemSnapshot;

/// 默认压缩包名称。
pub const DEFAULT_ARCHIVE_NAME: &str = "optimized.zip";

/// 会破坏 `Content-Disposition` 头或文件路径的字符。
static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\r\n"\\<>/:|?*\x00-\x1f\x7f]"#).unwrap());

/// 导出错误。
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("条目尚未压缩完成：{0}")]
    NotDone(String),

    #[error("文件写入失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("压缩包生成失败: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("导出线程执行失败: {0}")]
    Worker(String),
}

/// 待打包条目。
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Bytes,
}

/// 生成完成的压缩包。
#[derive(Debug, Clone)]
pub struct Archive {
    pub name: String,
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

/// 字节数格式化（1024 进制）。
///
/// - `0` → `"0 B"`
/// - 小于 1024 → 整数 `B`
/// - `KB` 保留 1 位小数，`MB` / `GB` 保留 2 位小数
///
/// # 示例
/// ```rust
/// use image_compress::client::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(1_048_576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else if value < GB {
        format!("{:.2} MB", value / MB)
    } else {
        format!("{:.2} GB", value / GB)
    }
}

/// 压缩率（百分比，有符号）：`(original - compressed) / original * 100`。
///
/// 正数表示变小，负数表示变大；`original == 0` 时为 `0.0`。
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - compressed as f64) / original as f64 * 100.0
}

/// 清洗文件名：去掉控制字符、引号、路径分隔符等，空名回退为 `image`。
pub fn safe_file_name(name: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(name.trim(), "_").to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "image".to_string()
    } else {
        cleaned
    }
}

/// 在扩展名前插入后缀：`photo.jpg` + `-min` → `photo-min.jpg`。
pub fn with_suffix(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}{}", &name[..dot], suffix, &name[dot..]),
        _ => format!("{}{}", name, suffix),
    }
}

/// 返回在 `used` 中唯一的名称，并登记之。
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };

    let mut n = 1usize;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// 把压缩内容写入 `dir`，返回最终路径。
pub fn save_content(
    dir: &Path,
    original_name: &str,
    suffix: Option<&str>,
    bytes: &[u8],
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;

    let name = with_suffix(&safe_file_name(original_name), suffix.unwrap_or_default());
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;

    log::info!("💾 已保存：{} ({})", path.display(), format_bytes(bytes.len() as u64));
    Ok(path)
}

/// 生成 zip 压缩包；没有条目时返回 `Ok(None)`。
pub fn build_archive(
    entries: &[ArchiveEntry],
    archive_name: Option<&str>,
) -> Result<Option<Archive>, ExportError> {
    if entries.is_empty() {
        log::info!("📦 没有已完成的条目，跳过打包");
        return Ok(None);
    }

    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();
    let mut names = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = unique_name(&safe_file_name(&entry.name), &mut used);
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&entry.bytes)?;
        names.push(name);
    }

    let bytes = writer.finish()?.into_inner();
    let name = archive_name.unwrap_or(DEFAULT_ARCHIVE_NAME).to_string();

    log::info!(
        "📦 打包完成 - {} 个文件，{} ({})",
        names.len(),
        name,
        format_bytes(bytes.len() as u64)
    );

    Ok(Some(Archive {
        name,
        bytes,
        entries: names,
    }))
}

/// 汇总统计。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub total_items: usize,
    pub done_items: usize,
    pub failed_items: usize,
    /// 已完成条目的原始总字节数。
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    /// 节省的字节数，变大时为负。
    pub saved_bytes: i64,
    /// 整体压缩率（按总字节计算）。
    pub overall_ratio: f64,
}

impl ExportSummary {
    pub fn from_snapshots(snapshots: &[ItemSnapshot]) -> Self {
        let mut summary = Self {
            total_items: snapshots.len(),
            ..Self::default()
        };

        for snapshot in snapshots {
            if let Some(compressed) = snapshot.compressed_bytes {
                summary.done_items += 1;
                summary.original_bytes += snapshot.original_bytes;
                summary.compressed_bytes += compressed;
            } else if snapshot.error_message.is_some() {
                summary.failed_items += 1;
            }
        }

        summary.saved_bytes = summary.original_bytes as i64 - summary.compressed_bytes as i64;
        summary.overall_ratio = compression_ratio(summary.original_bytes, summary.compressed_bytes);
        summary
    }

    pub fn display_line(&self) -> String {
        format!(
            "完成 {}/{}，失败 {}，{} → {}（节省 {:.1}%）",
            self.done_items,
            self.total_items,
            self.failed_items,
            format_bytes(self.original_bytes),
            format_bytes(self.compressed_bytes),
            self.overall_ratio
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Read;

    #[test]
    fn format_bytes_matches_expected_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1), "1 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn ratio_is_signed_and_safe_for_zero() {
        assert_eq!(compression_ratio(0, 0), 0.0);
        assert_eq!(compression_ratio(0, 100), 0.0);
        assert!((compression_ratio(1000, 400) - 60.0).abs() < 1e-9);
        assert!((compression_ratio(1000, 1100) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn safe_file_name_strips_header_breaking_chars() {
        assert_eq!(safe_file_name("a\r\nb\".jpg"), "a__b_.jpg");
        assert_eq!(safe_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(safe_file_name(".."), "image");
        assert_eq!(safe_file_name("   "), "image");
        assert_eq!(safe_file_name("照片.png"), "照片.png");
        assert_eq!(safe_file_name("a\x7fb.png"), "a_b.png");
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(with_suffix("photo.jpg", "-min"), "photo-min.jpg");
        assert_eq!(with_suffix("archive.tar.png", "-min"), "archive.tar-min.png");
        assert_eq!(with_suffix("noext", "-min"), "noext-min");
        assert_eq!(with_suffix(".hidden", "-min"), ".hidden-min");
        assert_eq!(with_suffix("photo.jpg", ""), "photo.jpg");
    }

    #[test]
    fn empty_archive_is_noop() {
        let result = build_archive(&[], None).expect("empty archive");
        assert!(result.is_none());
    }

    #[test]
    fn archive_contains_every_entry_with_deduped_names() {
        let entries = vec![
            ArchiveEntry { name: "a.jpg".into(), bytes: Bytes::from_static(b"first") },
            ArchiveEntry { name: "a.jpg".into(), bytes: Bytes::from_static(b"second") },
            ArchiveEntry { name: "b.png".into(), bytes: Bytes::from_static(b"third") },
        ];

        let archive = build_archive(&entries, None)
            .expect("build archive")
            .expect("archive present");

        assert_eq!(archive.name, DEFAULT_ARCHIVE_NAME);
        assert_eq!(archive.entries, vec!["a.jpg", "a (1).jpg", "b.png"]);

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).expect("open archive");
        assert_eq!(zip.len(), 3);

        let mut content = String::new();
        zip.by_name("a (1).jpg")
            .expect("deduped entry")
            .read_to_string(&mut content)
            .expect("read entry");
        assert_eq!(content, "second");
    }

    #[test]
    fn save_content_writes_under_suffixed_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = save_content(dir.path(), "photo.jpg", Some("-min"), b"data").expect("save");

        assert_eq!(path, dir.path().join("photo-min.jpg"));
        assert_eq!(std::fs::read(&path).expect("read back"), b"data");
    }

    proptest! {
        #[test]
        fn format_bytes_always_has_a_unit(bytes in any::<u64>()) {
            let text = format_bytes(bytes);
            prop_assert!(
                text.ends_with(" B") || text.ends_with(" KB") || text.ends_with(" MB") || text.ends_with(" GB")
            );
        }

        #[test]
        fn ratio_never_exceeds_hundred_when_shrinking(original in 1u64..u32::MAX as u64, factor in 0.0f64..=1.0) {
            let compressed = (original as f64 * factor) as u64;
            let ratio = compression_ratio(original, compressed);
            prop_assert!((0.0..=100.0).contains(&ratio));
        }

        #[test]
        fn unique_names_never_collide(names in proptest::collection::vec("[a-c]{1,2}(\\.jpg)?", 0..20)) {
            let mut used = HashSet::new();
            let produced: Vec<String> = names.iter().map(|n| unique_name(n, &mut used)).collect();
            let distinct: HashSet<&String> = produced.iter().collect();
            prop_assert_eq!(distinct.len(), produced.len());
        }
    }
}
