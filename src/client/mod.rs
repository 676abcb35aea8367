//! # 上传压缩客户端（client）
//!
//! ## 设计思路
//!
//! 用户提交图片后，客户端负责：校验接入、跟踪每张图片的状态、以有限并发调用压缩能力、
//! 在 JPEG 质量变化时防抖后重新压缩，最后支持单个保存或打包下载。
//!
//! - `intake`：类型 / 体积 / 数量校验，读取尺寸，生成缩略图句柄
//! - `item`：条目模型与只读快照
//! - `handle`：可撤销内容句柄（RAII）
//! - `backend` / `remote`：压缩能力的本地与 HTTP 两种实现
//! - `orchestrator`：状态机、并发、防抖、事件
//! - `export`：字节格式化、压缩率、单个保存、zip 打包
//! - `prefs`：持久化的 JPEG 质量
//!
//! ## 调用链
//!
//! ```text
//! Candidate ──► Intake ──► Orchestrator ──► CompressionBackend
//!                              │              ├─ LocalBackend  → codec
//!                              │              └─ RemoteBackend → POST /api/compress
//!                              ▼
//!                  snapshot / subscribe / download / archive
//! ```

pub mod backend;
pub mod export;
pub mod handle;
pub mod intake;
pub mod item;
pub mod orchestrator;
pub mod prefs;
pub mod remote;

pub use backend::{BackendError, CompressionBackend, CompressionRequest, LocalBackend};
pub use export::{Archive, ExportError, ExportSummary, compression_ratio, format_bytes};
pub use handle::{HandleKind, HandleRegistry, HandleStats, ObjectHandle};
pub use intake::{Candidate, IntakeConfig, RejectReason, Rejection};
pub use item::{ItemId, ItemSnapshot, ItemStatus};
pub use orchestrator::{
    AddReport, DispatchReport, Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorEvent,
};
pub use prefs::Preferences;
pub use remote::{RemoteBackend, RemoteConfig, RemoteMode};
