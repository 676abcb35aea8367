//! 压缩产物存储模块
//!
//! # 设计思路
//!
//! 批量接口返回的 `downloadUrl` 需要服务端保留压缩结果，
//! 这里统一管理产物目录：写入、按名称读取、查询信息、按时长清理。
//!
//! # 实现思路
//!
//! - 产物文件名为 `compressed-{毫秒时间戳}-{短 uuid}-{清洗后的原文件名}`，互不覆盖。
//! - 对外暴露的文件名必须是单段普通名称，含路径分隔符或本身为 `.` / `..` 的一律视为不存在；
//!   `my..photo.jpg` 这类名称中间带点的文件名仍然合法。
//! - 每次写入后清理超过保留时长的文件，清理失败只记日志，不影响本次写入。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::client::export::safe_file_name;
use crate::error::AppError;

/// 产物目录信息（路径 + 占用大小 + 文件数）
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 单个产物的元信息，对应 `GET /api/info/:filename`。
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub filename: String,
    pub size: u64,
    /// RFC 3339 时间。
    pub created: String,
}

/// 写入成功的产物。
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    ttl: Duration,
}

impl ArtifactStore {
    /// 打开产物目录，不存在时自动创建。
    pub async fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Storage(format!("创建产物目录 '{}' 失败: {}", dir.display(), e))
        })?;
        Ok(Self { dir, ttl })
    }

    /// 保存一份压缩结果。
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredArtifact, AppError> {
        let id = Uuid::new_v4().simple().to_string();
        let filename = format!(
            "compressed-{}-{}-{}",
            Utc::now().timestamp_millis(),
            &id[..8],
            safe_file_name(original_name)
        );

        tokio::fs::write(self.dir.join(&filename), bytes).await?;

        match self.prune_expired().await {
            Ok(0) => {}
            Ok(removed) => log::info!("🧹 已清理 {} 个过期产物", removed),
            Err(e) => log::warn!("⚠️ 清理过期产物失败: {}", e),
        }

        Ok(StoredArtifact {
            filename,
            size: bytes.len() as u64,
        })
    }

    /// 把对外文件名解析为目录内的路径；非法名称或不存在时返回 `NotFound`。
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf, AppError> {
        if !Self::is_plain_name(filename) {
            log::warn!("🚫 拒绝非法文件名：{}", filename);
            return Err(AppError::NotFound(filename.to_string()));
        }

        let path = self.dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(AppError::NotFound(filename.to_string())),
        }
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(filename).await?;
        Ok(tokio::fs::read(path).await?)
    }

    pub async fn info(&self, filename: &str) -> Result<ArtifactInfo, AppError> {
        let path = self.resolve(filename).await?;
        let meta = tokio::fs::metadata(&path).await?;
        let created = meta.created().or_else(|_| meta.modified())?;

        Ok(ArtifactInfo {
            filename: filename.to_string(),
            size: meta.len(),
            created: DateTime::<Utc>::from(created).to_rfc3339(),
        })
    }

    /// 删除超过保留时长的产物，返回删除数量。
    pub async fn prune_expired(&self) -> Result<usize, AppError> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            let expired = now
                .duration_since(modified)
                .map(|age| age > self.ttl)
                .unwrap_or(false);

            if expired && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// 统计产物目录占用。
    pub async fn stats(&self) -> Result<StorageInfo, AppError> {
        let mut total_size: u64 = 0;
        let mut file_count: u64 = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Ok(metadata) = entry.metadata().await {
                if metadata.is_file() {
                    total_size += metadata.len();
                    file_count += 1;
                }
            }
        }

        Ok(StorageInfo {
            path: self.dir.to_string_lossy().to_string(),
            total_size,
            file_count,
        })
    }

    /// 只接受单段普通文件名；`.` / `..` 与任何分隔符都不是普通名称。
    fn is_plain_name(filename: &str) -> bool {
        if filename.is_empty() || filename.contains(['/', '\\', '\0']) {
            return false;
        }

        let mut components = Path::new(filename).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }
}
