//! # 句柄登记表
//!
//! ## 设计思路
//!
//! 预览图与压缩结果都以“可撤销句柄”的形式对外暴露（相当于浏览器中的 object URL）。
//! 句柄采用 RAII：由登记表创建，`Drop` 时自动撤销，因此每个句柄恰好释放一次，
//! 不会重复释放，也不会因遗漏而泄漏。
//!
//! ## 实现思路
//!
//! - 登记表内部为 `Arc<Mutex<..>>`，句柄持有其 `Weak` 引用，登记表先销毁也不会 panic。
//! - 统计 `created / released / live`，便于测试验证无泄漏。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;

/// 句柄用途。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// 列表中展示的缩略图。
    Preview,
    /// 压缩完成后的结果内容。
    Compressed,
}

/// 登记表统计信息。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub created: u64,
    pub released: u64,
    pub live: usize,
}

struct HandleEntry {
    kind: HandleKind,
    mime: &'static str,
    bytes: Bytes,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    live: HashMap<u64, HandleEntry>,
    created: u64,
    released: u64,
}

fn lock_inner(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 可撤销内容句柄的登记表。
#[derive(Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一段内容并返回其句柄。
    pub fn create(&self, kind: HandleKind, mime: &'static str, bytes: Bytes) -> ObjectHandle {
        let mut inner = lock_inner(&self.inner);
        inner.next_id += 1;
        inner.created += 1;

        let id = inner.next_id;
        let len = bytes.len();
        inner.live.insert(id, HandleEntry { kind, mime, bytes });

        log::debug!("🔗 创建句柄 #{} kind={:?} len={}", id, kind, len);

        ObjectHandle {
            id,
            kind,
            len,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// 按 URL 解析句柄内容；已撤销的句柄返回 `None`。
    pub fn resolve(&self, url: &str) -> Option<(Bytes, &'static str)> {
        let id = url.strip_prefix(ObjectHandle::URL_PREFIX)?.parse::<u64>().ok()?;
        let inner = lock_inner(&self.inner);
        inner.live.get(&id).map(|entry| (entry.bytes.clone(), entry.mime))
    }

    pub fn stats(&self) -> HandleStats {
        let inner = lock_inner(&self.inner);
        HandleStats {
            created: inner.created,
            released: inner.released,
            live: inner.live.len(),
        }
    }

    /// 当前存活的某类句柄数量。
    pub fn live_count(&self, kind: HandleKind) -> usize {
        let inner = lock_inner(&self.inner);
        inner.live.values().filter(|entry| entry.kind == kind).count()
    }
}

/// 可撤销内容句柄。
///
/// 不可克隆：所有权即释放责任，`Drop` 时从登记表撤销。
pub struct ObjectHandle {
    id: u64,
    kind: HandleKind,
    len: usize,
    registry: Weak<Mutex<RegistryInner>>,
}

impl ObjectHandle {
    const URL_PREFIX: &'static str = "blob:image-compress/";

    pub fn url(&self) -> String {
        format!("{}{}", Self::URL_PREFIX, self.id)
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// 句柄所指内容的字节数。
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };

        let mut inner = lock_inner(&inner);
        if inner.live.remove(&self.id).is_some() {
            inner.released += 1;
            log::debug!("🧹 释放句柄 #{} kind={:?}", self.id, self.kind);
        }
    }
}
