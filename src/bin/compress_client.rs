//! 命令行客户端：接入本地图片 → 调用压缩能力 → 保存结果或打包。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use image_compress::client::prefs::DEFAULT_PREFS_FILE;
use image_compress::client::{
    Candidate, CompressionBackend, IntakeConfig, ItemStatus, LocalBackend, Orchestrator,
    OrchestratorConfig, OrchestratorEvent, Preferences, RemoteBackend, RemoteConfig, RemoteMode,
};
use image_compress::codec::{Codec, CodecConfig, Quality};

fn cli() -> Command {
    Command::new("compress-client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Recompress JPG/PNG images locally or through an image-compress server")
        .arg(
            Arg::new("files")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf))
                .help("Images to compress"),
        )
        .arg(
            Arg::new("server")
                .long("server")
                .default_value("http://localhost:3000")
                .help("Compression server base URL"),
        )
        .arg(
            Arg::new("local")
                .long("local")
                .action(ArgAction::SetTrue)
                .conflicts_with("batch")
                .help("Compress in-process instead of calling the server"),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .action(ArgAction::SetTrue)
                .help("Use the JSON (base64) response format"),
        )
        .arg(
            Arg::new("quality")
                .long("quality")
                .short('q')
                .value_parser(value_parser!(i64))
                .help("JPEG quality 1-100 (out-of-range values are clamped); remembered for next runs"),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .short('o')
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Output directory"),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .default_value("")
                .help("Suffix inserted before the extension of each saved file"),
        )
        .arg(
            Arg::new("zip")
                .long("zip")
                .action(ArgAction::SetTrue)
                .help("Save all results as one optimized.zip archive"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .default_value("3")
                .value_parser(value_parser!(usize))
                .help("Maximum in-flight compression calls"),
        )
        .arg(
            Arg::new("max-files")
                .long("max-files")
                .default_value("10")
                .value_parser(value_parser!(usize))
                .help("Maximum number of images accepted (0 = unlimited)"),
        )
        .arg(
            Arg::new("prefs")
                .long("prefs")
                .default_value(DEFAULT_PREFS_FILE)
                .value_parser(value_parser!(PathBuf))
                .help("Preferences file remembering the JPEG quality"),
        )
}

fn build_backend(args: &ArgMatches) -> Result<Arc<dyn CompressionBackend>, String> {
    if args.get_flag("local") {
        return Ok(Arc::new(LocalBackend::new(Codec::new(CodecConfig::default()))));
    }

    let server = args
        .get_one::<String>("server")
        .cloned()
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let mode = if args.get_flag("batch") {
        RemoteMode::Batch
    } else {
        RemoteMode::Single
    };

    let backend = RemoteBackend::new(RemoteConfig::new(server).with_mode(mode))
        .map_err(|e| e.to_string())?;
    Ok(Arc::new(backend))
}

fn resolve_quality(args: &ArgMatches, prefs_path: &Path) -> Quality {
    let mut prefs = Preferences::load_from_path(prefs_path);

    if let Some(raw) = args.get_one::<i64>("quality") {
        prefs.jpeg_quality = Quality::clamped(*raw);
        if let Err(e) = prefs.save_to_path(prefs_path) {
            log::warn!("⚠️ 保存偏好设置失败: {e}");
        }
    }

    prefs.jpeg_quality
}

async fn run(args: ArgMatches) -> Result<bool, String> {
    let backend = build_backend(&args)?;
    let prefs_path = args
        .get_one::<PathBuf>("prefs")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFS_FILE));
    let quality = resolve_quality(&args, &prefs_path);
    let out = args.get_one::<PathBuf>("out").cloned().unwrap_or_else(|| PathBuf::from("."));
    let suffix = args.get_one::<String>("suffix").cloned().unwrap_or_default();
    let max_files = args.get_one::<usize>("max-files").copied().unwrap_or(10);

    let orchestrator = Orchestrator::new(
        backend,
        OrchestratorConfig {
            max_concurrency: args.get_one::<usize>("concurrency").copied().unwrap_or(3),
            initial_quality: quality,
            intake: IntakeConfig {
                max_items: (max_files > 0).then_some(max_files),
                ..IntakeConfig::default()
            },
            ..OrchestratorConfig::default()
        },
    );

    let mut candidates = Vec::new();
    for path in args.get_many::<PathBuf>("files").into_iter().flatten() {
        match Candidate::from_path(path) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => eprintln!("✗ {}: {}", path.display(), e),
        }
    }

    let added = orchestrator.add_files(candidates).await;
    for rejection in &added.rejected {
        eprintln!("✗ {}: {}", rejection.name, rejection.reason);
    }
    if added.added.is_empty() {
        return Err("没有可处理的图片".to_string());
    }

    let mut events = orchestrator.subscribe();
    let names: Vec<_> = orchestrator
        .snapshot()
        .into_iter()
        .map(|item| (item.id, item.name))
        .collect();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let OrchestratorEvent::StatusChanged { id, status } = event {
                if let Some((_, name)) = names.iter().find(|(item_id, _)| *item_id == id) {
                    println!("  {} … {}", name, status);
                }
            }
        }
    });

    println!("压缩 {} 个文件（JPEG 质量 {}）", added.added.len(), quality);
    let report = orchestrator.dispatch(&added.added).await;

    println!();
    for item in orchestrator.snapshot() {
        println!("{}", item.display_line());
    }
    println!("{}", orchestrator.summary().display_line());

    if args.get_flag("zip") {
        match orchestrator.download_all(&out).await.map_err(|e| e.to_string())? {
            Some(path) => println!("已保存压缩包：{}", path.display()),
            None => println!("没有已完成的文件，未生成压缩包"),
        }
    } else {
        let suffix = (!suffix.is_empty()).then_some(suffix.as_str());
        for item in orchestrator.snapshot() {
            if item.status != ItemStatus::Done {
                continue;
            }
            let path = orchestrator
                .download(item.id, &out, suffix)
                .await
                .map_err(|e| e.to_string())?;
            println!("已保存：{}", path.display());
        }
    }

    orchestrator.clear();
    progress.abort();

    Ok(report.failed == 0)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = cli().get_matches();
    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(message) => {
            eprintln!("错误：{}", message);
            std::process::exit(2);
        }
    }
}
