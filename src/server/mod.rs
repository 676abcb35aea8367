//! # HTTP 服务模块（server）
//!
//! ## 设计思路
//!
//! 服务端只是压缩能力的一层 HTTP 包装：
//!
//! | 路由 | 说明 |
//! |------|------|
//! | `POST /api/compress` | multipart 上传；单个 `file` 字段返回二进制，否则返回 JSON（base64） |
//! | `GET /api/health` | 健康检查 |
//! | `GET /api/download/:filename` | 下载批量接口保存的压缩产物 |
//! | `GET /api/info/:filename` | 查询产物大小与创建时间 |
//!
//! ## 实现思路
//!
//! - `ServerState` 显式注入 codec、产物存储与配置，没有全局单例。
//! - 处理函数抛出 `AppError` 自定义拒绝，`recover` 统一转为 JSON 错误。
//! - 请求体上限由 `multipart::form().max_length` 控制，超限返回 413。

pub mod handlers;
pub mod multipart;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use warp::{Filter, Reply};

use crate::codec::Codec;
use crate::error::AppError;
use crate::settings::ServerSettings;
use crate::storage::ArtifactStore;

/// warp 只接受 `scheme://host[:port]` 形式的来源。
static ORIGIN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^/\s]+$").unwrap());

/// 路由共享状态，克隆廉价。
#[derive(Clone)]
pub struct ServerState {
    pub codec: Codec,
    pub store: Arc<ArtifactStore>,
    pub settings: Arc<ServerSettings>,
}

impl ServerState {
    /// 打开产物目录并清理一次过期文件。
    pub async fn new(settings: ServerSettings) -> Result<Self, AppError> {
        let store = ArtifactStore::open(
            settings.artifact_dir.clone(),
            Duration::from_secs(settings.artifact_ttl_secs),
        )
        .await?;

        match store.prune_expired().await {
            Ok(removed) if removed > 0 => log::info!("🧹 启动时清理 {} 个过期产物", removed),
            Ok(_) => {}
            Err(e) => log::warn!("⚠️ 启动时清理产物失败: {}", e),
        }

        Ok(Self {
            codec: Codec::new(settings.codec.clone()),
            store: Arc::new(store),
            settings: Arc::new(settings),
        })
    }
}

fn with_state(state: ServerState) -> impl Filter<Extract = (ServerState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn cors(settings: &ServerSettings) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    match settings.cors_origin.as_deref().map(str::trim) {
        Some(origin) if ORIGIN_PATTERN.is_match(origin) => builder.allow_origin(origin),
        Some(origin) => {
            log::warn!("⚠️ CORS 来源格式无效，回退为允许任意来源：{}", origin);
            builder.allow_any_origin()
        }
        None => builder.allow_any_origin(),
    }
}

/// 组装全部路由。
pub fn routes(state: ServerState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("api" / "health")
        .and(warp::get())
        .and_then(handlers::health);

    let compress = warp::path!("api" / "compress")
        .and(warp::post())
        .and(warp::multipart::form().max_length(state.settings.max_upload_bytes))
        .and(with_state(state.clone()))
        .and_then(handlers::compress);

    let download = warp::path!("api" / "download" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::download);

    let info = warp::path!("api" / "info" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::info);

    health
        .or(compress)
        .or(download)
        .or(info)
        .with(cors(&state.settings))
        .with(warp::log("image_compress::server"))
        .recover(handlers::handle_rejection)
}
