//! 客户端偏好设置（JSON 文件）。
//!
//! 目前只保存 JPEG 质量。读取时文件缺失或损坏一律回退默认值。
//!
//! 越界数值在反序列化时被钳制到 1~100（例如 250 读成 100），而不是回退到默认的 75：
//! 与表单、命令行的质量参数保持同一规则。只有非数字内容才回退默认值。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::Quality;

/// 默认的偏好文件名。
pub const DEFAULT_PREFS_FILE: &str = "image-compress.prefs.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub jpeg_quality: Quality,
}

impl Preferences {
    pub fn load_from_path(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match serde_json::from_str(&content) {
                    Ok(prefs) => return prefs,
                    Err(e) => log::warn!("⚠️ 偏好文件解析失败，使用默认值: {}", e),
                }
            }
        }
        Self::default()
    }

    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
    }
}
