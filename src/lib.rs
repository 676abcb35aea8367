//! # 图片压缩工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                client（上传压缩编排）                      │
//! │                                                          │
//! │  Candidate ─► intake ─► orchestrator ─► export           │
//! │                 │            │  (并发上限 + 防抖 + 事件)   │
//! │           handle (RAII)      ↓                           │
//! │                     CompressionBackend                   │
//! │                      ├─ LocalBackend ──► codec           │
//! │                      └─ RemoteBackend                    │
//! └──────────────────────────────┼───────────────────────────┘
//!                                ↓ POST /api/compress
//! ┌──────────────────────────────┼───────────────────────────┐
//! │                server（warp）                             │
//! │                                                          │
//! │  ├─ handlers ── multipart 收集 → codec                    │
//! │  ├─ storage ─── 压缩产物目录 + 过期清理                    │
//! │  └─ settings ── JSON 配置 + 环境变量                       │
//! │                                                          │
//! │  codec ─── 类型/体积校验 · 解码 · EXIF 方向 · 重新编码      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`codec`] | 压缩能力 `compress(bytes, mime, quality)`，基于 `image` crate |
//! | [`client`] | 接入校验、条目状态机、有限并发调用、防抖重压缩、导出打包 |
//! | [`server`] | `POST /api/compress` 等 HTTP 路由 |
//! | [`storage`] | 压缩产物的保存、读取、信息查询与过期清理 |
//! | [`settings`] | 服务端配置加载 |
//! | [`error`] | 统一错误类型 `AppError`，映射为 HTTP 响应 |

pub mod client;
pub mod codec;
pub mod error;
pub mod server;
pub mod settings;
pub mod storage;
