//! 服务端配置
//!
//! 默认值即可直接启动；可选地从 `IMAGE_COMPRESS_CONFIG` 指向的 JSON 文件加载，
//! 之后再应用 `HOST` / `PORT` 环境变量覆盖。

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::CodecConfig;
use crate::error::AppError;

/// 配置文件路径的环境变量名。
pub const CONFIG_ENV: &str = "IMAGE_COMPRESS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// 单次请求最多文件数。
    pub max_files: usize,
    /// multipart 请求体上限（字节）。
    pub max_upload_bytes: u64,
    /// 批量请求内的并发压缩数。
    pub batch_concurrency: usize,
    /// 压缩产物目录（供 `/api/download` 使用）。
    pub artifact_dir: PathBuf,
    /// 产物保留时长（秒），每次写入时清理过期文件。
    pub artifact_ttl_secs: u64,
    /// 允许的跨域来源，未设置时允许任意来源。
    pub cors_origin: Option<String>,
    pub codec: CodecConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_files: 10,
            max_upload_bytes: 200 * 1024 * 1024,
            batch_concurrency: 3,
            artifact_dir: PathBuf::from("compressed"),
            artifact_ttl_secs: 60 * 60,
            cors_origin: None,
            codec: CodecConfig::default(),
        }
    }
}

impl ServerSettings {
    /// 按“默认值 → 配置文件 → 环境变量”的顺序加载。
    pub fn load() -> Result<Self, AppError> {
        let mut settings = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_path(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("读取配置文件 '{}' 失败: {}", path.display(), e))
        })?;
        let settings = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("解析配置文件失败: {}", e)))?;

        log::info!("⚙️ 已加载配置文件：{}", path.display());
        Ok(settings)
    }

    /// 应用环境变量覆盖，`lookup` 便于测试注入。
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("PORT 无效 '{}': {}", port, e)))?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| AppError::Config(format!("HOST 无效 '{}': {}", self.host, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
