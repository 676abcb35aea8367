//! # 图片压缩服务：应用入口
//!
//! 本文件仅负责日志初始化、配置加载与服务启动。
//! 路由与业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use image_compress::error::AppError;
use image_compress::server::{self, ServerState};
use image_compress::settings::ServerSettings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        log::error!("❌ 服务启动失败: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    log::info!("setup: begin");
    let settings = ServerSettings::load()?;
    let addr = settings.socket_addr()?;
    log::info!(
        "setup: settings loaded - max_files={} max_upload={}MB artifact_dir={}",
        settings.max_files,
        settings.max_upload_bytes / 1024 / 1024,
        settings.artifact_dir.display()
    );

    let state = ServerState::new(settings).await?;
    match state.store.stats().await {
        Ok(info) => log::info!(
            "setup: artifact store ready - {} ({} files, {} bytes)",
            info.path,
            info.file_count,
            info.total_size
        ),
        Err(err) => log::warn!("setup: 统计产物目录失败: {err}"),
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("监听退出信号失败: {err}");
            std::future::pending::<()>().await;
        }
        log::info!("🛑 收到退出信号，正在关闭服务");
    };

    let (bound, server) = warp::serve(server::routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| AppError::Config(format!("监听 {} 失败: {}", addr, e)))?;

    log::info!("🚀 图片压缩服务已启动：http://{}", bound);
    server.await;
    log::info!("setup: server stopped");
    Ok(())
}
