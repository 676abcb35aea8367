//! # 压缩编排器
//!
//! ## 设计思路
//!
//! 编排器持有条目集合，是条目状态的唯一修改者：
//!
//! ```text
//! pending ──dispatch──► processing ──成功──► done
//!                           │
//!                           └──失败──► error ──retry──► processing
//! done ──重新派发（如 JPEG 质量变化）──► processing
//! ```
//!
//! ## 实现思路
//!
//! - 条目集合放在 `Mutex` 中，每次修改只持有一个很短的同步临界区，不跨 `.await`。
//! - 每次派发为条目分配一个 ticket；结果回来时只有“条目仍存在且仍是同一 ticket 的
//!   processing”才会写入，按 id 定位而不是按位置，已移除条目的迟到结果静默丢弃。
//! - 后端调用受编排器级别的 `Semaphore` 限制（默认 3），多次派发同时进行时（例如防抖后的
//!   重新派发与重试重叠）共享同一份额度；单个失败只影响自身条目。
//! - JPEG 质量变化做防抖：窗口期内的多次调整只触发一次重新派发，使用最后一次的值。
//!   旧的防抖任务不会被中止，醒来后发现代次已过期即退出。
//! - 状态变化通过 `broadcast` 通道推送，订阅方可实时刷新展示。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;

use super::backend::{BackendError, CompressionBackend, CompressionRequest};
use super::export::{self, Archive, ArchiveEntry, ExportError, ExportSummary};
use super::handle::{HandleKind, HandleRegistry};
use super::intake::{Candidate, Intake, IntakeConfig, RejectReason, Rejection};
use super::item::{CompressedContent, Item, ItemId, ItemSnapshot, ItemState, ItemStatus};
use crate::codec::{CompressedImage, Quality, SupportedMime};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 编排器配置。
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 同时进行中的后端调用上限。
    pub max_concurrency: usize,
    /// JPEG 质量调整的防抖窗口。
    pub debounce: Duration,
    pub initial_quality: Quality,
    pub intake: IntakeConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            debounce: Duration::from_millis(500),
            initial_quality: Quality::default(),
            intake: IntakeConfig::default(),
        }
    }
}

/// 编排器对外推送的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Added { id: ItemId },
    StatusChanged { id: ItemId, status: ItemStatus },
    Removed { id: ItemId },
    Cleared,
    QualityChanged { quality: Quality },
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("条目不存在：{0}")]
    NotFound(ItemId),

    #[error("{0}")]
    Export(#[from] ExportError),

    #[error("当前线程没有可用的异步运行时: {0}")]
    Runtime(String),
}

/// 添加文件的结果。
#[derive(Debug, Clone, Default)]
pub struct AddReport {
    pub added: Vec<ItemId>,
    pub rejected: Vec<Rejection>,
}

/// 一轮派发的结果统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    /// 不存在或正在处理中而被跳过的条目。
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 条目已移除或已被新一轮派发取代，结果被丢弃。
    pub discarded: usize,
}

struct ItemSet {
    items: Vec<Item>,
    next_ticket: u64,
    quality: Quality,
}

#[derive(Default)]
struct Requality {
    generation: u64,
    pending: Option<JoinHandle<Option<DispatchReport>>>,
}

struct Job {
    id: ItemId,
    ticket: u64,
    request: CompressionRequest,
}

enum Applied {
    Done,
    Failed,
    Discarded,
}

struct Inner {
    set: Mutex<ItemSet>,
    requality: Mutex<Requality>,
    backend: Arc<dyn CompressionBackend>,
    /// 所有派发共享的在途调用额度。
    permits: Arc<Semaphore>,
    handles: HandleRegistry,
    intake: Intake,
    config: OrchestratorConfig,
    events: broadcast::Sender<OrchestratorEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 上传压缩流程的编排器。
///
/// 可廉价克隆，克隆体共享同一份条目集合。
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn CompressionBackend>, config: OrchestratorConfig) -> Self {
        let handles = HandleRegistry::new();
        let intake = Intake::new(config.intake.clone(), handles.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        log::info!(
            "🚀 编排器已创建 - backend={} concurrency={} debounce={}ms quality={}",
            backend.name(),
            config.max_concurrency,
            config.debounce.as_millis(),
            config.initial_quality
        );

        Self {
            inner: Arc::new(Inner {
                set: Mutex::new(ItemSet {
                    items: Vec::new(),
                    next_ticket: 0,
                    quality: config.initial_quality,
                }),
                requality: Mutex::new(Requality::default()),
                backend,
                permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
                handles,
                intake,
                config,
                events,
            }),
        }
    }

    /// 订阅状态事件。
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.inner.handles
    }

    pub fn quality(&self) -> Quality {
        lock(&self.inner.set).quality
    }

    fn emit(&self, event: OrchestratorEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.inner.events.send(event);
    }

    /// 校验并加入候选文件，新条目为 `pending`，不会自动派发。
    pub async fn add_files(&self, candidates: Vec<Candidate>) -> AddReport {
        let intake = self.inner.intake.clone();
        let existing = lock(&self.inner.set).items.len();

        let report = match tokio::task::spawn_blocking(move || intake.accept(candidates, existing)).await {
            Ok(report) => report,
            Err(e) => {
                log::error!("❌ 接入线程执行失败: {}", e);
                return AddReport::default();
            }
        };

        let mut result = AddReport {
            added: Vec::with_capacity(report.accepted.len()),
            rejected: report.rejected,
        };

        {
            let mut set = lock(&self.inner.set);
            let limit = self.inner.config.intake.max_items;
            for item in report.accepted {
                // 并发添加时以入集合时刻的数量为准
                if let Some(limit) = limit {
                    if set.items.len() >= limit {
                        result.rejected.push(Rejection {
                            name: item.name().to_string(),
                            reason: RejectReason::LimitReached { limit },
                        });
                        continue;
                    }
                }
                result.added.push(item.id);
                set.items.push(item);
            }
        }

        for id in &result.added {
            self.emit(OrchestratorEvent::Added { id: *id });
        }

        result
    }

    /// 派发指定条目。处理中或不存在的条目会被跳过。
    pub async fn dispatch(&self, ids: &[ItemId]) -> DispatchReport {
        let (jobs, skipped) = self.prepare(ids);
        self.run(jobs, skipped).await
    }

    /// 派发所有 `pending` 条目。
    pub async fn dispatch_pending(&self) -> DispatchReport {
        let ids = self.ids_where(|item| matches!(item.state, ItemState::Pending));
        self.dispatch(&ids).await
    }

    /// 重试单个失败条目；条目不是 `error` 时返回空报告。
    pub async fn retry(&self, id: ItemId) -> Result<DispatchReport, OrchestratorError> {
        let is_error = {
            let set = lock(&self.inner.set);
            let item = set
                .items
                .iter()
                .find(|item| item.id == id)
                .ok_or(OrchestratorError::NotFound(id))?;
            matches!(item.state, ItemState::Error(_))
        };

        if !is_error {
            return Ok(DispatchReport::default());
        }
        Ok(self.dispatch(&[id]).await)
    }

    /// 重试全部失败条目。
    pub async fn retry_failed(&self) -> DispatchReport {
        let ids = self.ids_where(|item| matches!(item.state, ItemState::Error(_)));
        self.dispatch(&ids).await
    }

    /// 移除条目并释放其句柄。进行中的调用结果回来后会被丢弃。
    pub fn remove(&self, id: ItemId) -> bool {
        let removed = {
            let mut set = lock(&self.inner.set);
            set.items
                .iter()
                .position(|item| item.id == id)
                .map(|index| set.items.remove(index))
        };

        match removed {
            Some(item) => {
                log::info!("🗑️ 已移除：{}", item.name());
                drop(item);
                self.emit(OrchestratorEvent::Removed { id });
                true
            }
            None => false,
        }
    }

    /// 清空所有条目并释放全部句柄。
    pub fn clear(&self) {
        let items = std::mem::take(&mut lock(&self.inner.set).items);
        let count = items.len();
        drop(items);

        log::info!("🧹 已清空 {} 个条目", count);
        self.emit(OrchestratorEvent::Cleared);
    }

    /// 关闭错误提示：`error` 条目回到 `pending`。
    pub fn clear_error(&self, id: ItemId) -> Result<bool, OrchestratorError> {
        {
            let mut set = lock(&self.inner.set);
            let item = set
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or(OrchestratorError::NotFound(id))?;

            if !matches!(item.state, ItemState::Error(_)) {
                return Ok(false);
            }
            item.state = ItemState::Pending;
        }

        self.emit(OrchestratorEvent::StatusChanged {
            id,
            status: ItemStatus::Pending,
        });
        Ok(true)
    }

    /// 调整 JPEG 质量。
    ///
    /// 新值立即生效于之后的派发；防抖窗口结束后，对所有非处理中的 JPEG 条目重新派发一次。
    /// 需要在 tokio 运行时内调用。
    pub fn set_jpeg_quality(&self, quality: Quality) -> Result<(), OrchestratorError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OrchestratorError::Runtime(e.to_string()))?;

        {
            let mut set = lock(&self.inner.set);
            if set.quality == quality {
                return Ok(());
            }
            set.quality = quality;
        }
        self.emit(OrchestratorEvent::QualityChanged { quality });

        let mut requality = lock(&self.inner.requality);
        requality.generation += 1;
        let generation = requality.generation;
        let delay = self.inner.config.debounce;
        let this = self.clone();

        requality.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let latest = lock(&this.inner.requality).generation;
            if latest != generation {
                return None;
            }
            Some(this.requality_wave().await)
        }));

        log::debug!("⏳ JPEG 质量调整为 {}，等待防抖 generation={}", quality, generation);
        Ok(())
    }

    /// 等待最近一次质量调整触发的重新派发完成。没有待执行的调整时立即返回 `None`。
    pub async fn wait_for_requality(&self) -> Option<DispatchReport> {
        let handle = lock(&self.inner.requality).pending.take()?;
        match handle.await {
            Ok(report) => report,
            Err(e) => {
                log::error!("❌ 重新派发任务执行失败: {}", e);
                None
            }
        }
    }

    async fn requality_wave(&self) -> DispatchReport {
        let ids = self.ids_where(|item| {
            item.mime == SupportedMime::Jpeg && !matches!(item.state, ItemState::Processing { .. })
        });
        log::info!("🔁 JPEG 质量变化，重新派发 {} 个条目", ids.len());
        self.dispatch(&ids).await
    }

    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        lock(&self.inner.set).items.iter().map(Item::snapshot).collect()
    }

    pub fn get(&self, id: ItemId) -> Option<ItemSnapshot> {
        lock(&self.inner.set)
            .items
            .iter()
            .find(|item| item.id == id)
            .map(Item::snapshot)
    }

    pub fn summary(&self) -> ExportSummary {
        ExportSummary::from_snapshots(&self.snapshot())
    }

    /// 保存单个已完成条目到 `dir`，可在扩展名前插入后缀。
    pub async fn download(
        &self,
        id: ItemId,
        dir: &Path,
        suffix: Option<&str>,
    ) -> Result<PathBuf, OrchestratorError> {
        let (name, bytes) = {
            let set = lock(&self.inner.set);
            let item = set
                .items
                .iter()
                .find(|item| item.id == id)
                .ok_or(OrchestratorError::NotFound(id))?;
            let content = item
                .compressed()
                .ok_or_else(|| ExportError::NotDone(item.name().to_string()))?;
            (item.name().to_string(), content.bytes().clone())
        };

        let dir = dir.to_path_buf();
        let suffix = suffix.map(str::to_string);
        let path = tokio::task::spawn_blocking(move || {
            export::save_content(&dir, &name, suffix.as_deref(), &bytes)
        })
        .await
        .map_err(|e| ExportError::Worker(e.to_string()))??;

        Ok(path)
    }

    /// 把所有 `done` 条目打包；没有已完成条目时返回 `Ok(None)`。
    pub async fn archive(&self, name: Option<&str>) -> Result<Option<Archive>, OrchestratorError> {
        let entries: Vec<ArchiveEntry> = lock(&self.inner.set)
            .items
            .iter()
            .filter_map(|item| {
                item.compressed().map(|content| ArchiveEntry {
                    name: item.name().to_string(),
                    bytes: content.bytes().clone(),
                })
            })
            .collect();

        let name = name.map(str::to_string);
        let archive = tokio::task::spawn_blocking(move || export::build_archive(&entries, name.as_deref()))
            .await
            .map_err(|e| ExportError::Worker(e.to_string()))??;

        Ok(archive)
    }

    /// 打包并写入 `dir`，返回压缩包路径。
    pub async fn download_all(&self, dir: &Path) -> Result<Option<PathBuf>, OrchestratorError> {
        let Some(archive) = self.archive(None).await? else {
            return Ok(None);
        };

        let dir = dir.to_path_buf();
        let path = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(&archive.name);
            std::fs::write(&path, &archive.bytes)?;
            Ok::<_, ExportError>(path)
        })
        .await
        .map_err(|e| ExportError::Worker(e.to_string()))??;

        log::info!("💾 压缩包已保存：{}", path.display());
        Ok(Some(path))
    }

    fn ids_where(&self, predicate: impl Fn(&Item) -> bool) -> Vec<ItemId> {
        lock(&self.inner.set)
            .items
            .iter()
            .filter(|item| predicate(item))
            .map(|item| item.id)
            .collect()
    }

    /// 在锁内把可派发条目切换为 `processing` 并生成调用任务。
    fn prepare(&self, ids: &[ItemId]) -> (Vec<Job>, usize) {
        let mut jobs = Vec::with_capacity(ids.len());
        let mut skipped = 0;

        {
            let mut guard = lock(&self.inner.set);
            let ItemSet {
                items,
                next_ticket,
                quality,
            } = &mut *guard;

            for id in ids {
                let Some(item) = items.iter_mut().find(|item| item.id == *id) else {
                    skipped += 1;
                    continue;
                };
                if matches!(item.state, ItemState::Processing { .. }) {
                    skipped += 1;
                    continue;
                }

                *next_ticket += 1;
                // 旧的压缩结果在这里被替换，其句柄随之释放
                item.state = ItemState::Processing {
                    ticket: *next_ticket,
                };
                jobs.push(Job {
                    id: item.id,
                    ticket: *next_ticket,
                    request: CompressionRequest {
                        name: item.source.name.clone(),
                        bytes: item.source.bytes.clone(),
                        mime: item.mime,
                        quality: *quality,
                    },
                });
            }
        }

        for job in &jobs {
            self.emit(OrchestratorEvent::StatusChanged {
                id: job.id,
                status: ItemStatus::Processing,
            });
        }

        (jobs, skipped)
    }

    async fn run(&self, jobs: Vec<Job>, skipped: usize) -> DispatchReport {
        let mut report = DispatchReport {
            dispatched: jobs.len(),
            skipped,
            ..DispatchReport::default()
        };
        if jobs.is_empty() {
            return report;
        }

        let start = Instant::now();
        let backend = Arc::clone(&self.inner.backend);
        let permits = Arc::clone(&self.inner.permits);
        let mut completions = stream::iter(jobs)
            .map(|job| {
                let backend = Arc::clone(&backend);
                let permits = Arc::clone(&permits);
                async move {
                    let Job { id, ticket, request } = job;
                    let result = match permits.acquire().await {
                        Ok(_permit) => backend.compress(request).await,
                        Err(e) => Err(BackendError::Transport(format!("并发额度不可用：{}", e))),
                    };
                    (id, ticket, result)
                }
            })
            .buffer_unordered(self.inner.config.max_concurrency.max(1));

        while let Some((id, ticket, result)) = completions.next().await {
            match self.apply(id, ticket, result) {
                Applied::Done => report.succeeded += 1,
                Applied::Failed => report.failed += 1,
                Applied::Discarded => report.discarded += 1,
            }
        }

        log::info!(
            "✅ 派发完成 - dispatched={} succeeded={} failed={} discarded={} skipped={} total={}ms",
            report.dispatched,
            report.succeeded,
            report.failed,
            report.discarded,
            report.skipped,
            start.elapsed().as_millis()
        );

        report
    }

    /// 按 id + ticket 写回结果。
    fn apply(
        &self,
        id: ItemId,
        ticket: u64,
        result: Result<CompressedImage, BackendError>,
    ) -> Applied {
        let status = {
            let mut set = lock(&self.inner.set);
            let Some(item) = set.items.iter_mut().find(|item| item.id == id) else {
                log::debug!("条目已移除，丢弃结果：{}", id);
                return Applied::Discarded;
            };
            if !matches!(item.state, ItemState::Processing { ticket: current } if current == ticket) {
                log::debug!("结果已过期，丢弃：{} ticket={}", id, ticket);
                return Applied::Discarded;
            }

            match result {
                Ok(image) => {
                    let bytes = Bytes::from(image.bytes);
                    let handle = self.inner.handles.create(
                        HandleKind::Compressed,
                        image.mime.as_str(),
                        bytes.clone(),
                    );
                    item.state = ItemState::Done(CompressedContent {
                        handle,
                        bytes,
                        mime: image.mime,
                    });
                    ItemStatus::Done
                }
                Err(err) => {
                    log::warn!("⚠️ 压缩失败：{} - {}", item.name(), err);
                    item.state = ItemState::Error(err.to_string());
                    ItemStatus::Error
                }
            }
        };

        self.emit(OrchestratorEvent::StatusChanged { id, status });
        match status {
            ItemStatus::Done => Applied::Done,
            _ => Applied::Failed,
        }
    }
}
