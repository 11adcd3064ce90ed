//! 快速路径：预编译分发表的一次性闩锁探测与类型擦除调用协议。
//!
//! # 设计背景（Why）
//! - 外部工具可以为已知请求类型预先生成“完整组合好的调用链”，以跳过运行时的解析与组合；
//! - 分发表可能晚于首次分发才安装，因此探测失败不能被永久记住，而探测成功必须永久记住；
//! - 多个调用可能同时触发首次探测，探测与结果缓存必须在并发首次使用下安全。
//!
//! # 逻辑解析（How）
//! - [`FastPathLookup`] 以 `AtomicBool` 作为“已找到”闩锁，`parking_lot::Mutex` 保证同一时刻只有
//!   一个线程执行探测，`OnceLock` 存放找到的分发表（双重检查锁）；
//! - 每个响应类型对应一个类型化适配器，负责把 [`ErasedValue`] 还原为具体响应类型，
//!   按响应类型的 `TypeId` 缓存在 `DashMap` 中；
//! - 进程级的“众所周知入口”是 [`install_dispatch_table`] 写入的全局槽位。
//!
//! # 契约说明（What）
//! - 只有 `send` 走快速路径；`publish` 与 `stream` 总是运行时组合；
//! - 命中时不做任何处理器/行为解析，分发表的结果原样返回（仅做类型还原）。

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::cancellation::Cancellation;
use crate::error::DispatchResult;
use crate::future::BoxFuture;
use crate::message::{ErasedValue, MessageView, Request};
use crate::resolve::ResolutionContext;

/// 预编译分发表契约。
///
/// # 契约说明（What）
/// - `try_invoke` 对认识的请求类型返回 `Some(调用)`，其它类型返回 `None`；
/// - 调用的结果必须装有该请求的响应类型，否则分发器返回
///   [`crate::DispatchError::ResponseTypeMismatch`]；
/// - 分发表自行负责其内部的行为组合，可以通过 `context` 解析实例。
pub trait DispatchTable: Send + Sync + 'static {
    fn try_invoke<'a>(
        &'a self,
        request: MessageView<'a>,
        context: &'a dyn ResolutionContext,
        cancellation: &'a Cancellation,
    ) -> Option<BoxFuture<'a, DispatchResult<ErasedValue>>>;
}

/// 分发表的发现来源。
pub trait TableSource: Send + Sync + 'static {
    /// 扫描一次；找到时返回分发表。
    fn discover(&self) -> Option<Arc<dyn DispatchTable>>;
}

impl<F> TableSource for F
where
    F: Fn() -> Option<Arc<dyn DispatchTable>> + Send + Sync + 'static,
{
    fn discover(&self) -> Option<Arc<dyn DispatchTable>> {
        self()
    }
}

static INSTALLED_TABLE: OnceLock<Arc<dyn DispatchTable>> = OnceLock::new();

/// 把分发表安装到进程级入口；只能安装一次，重复安装时原样退回参数。
pub fn install_dispatch_table(table: Arc<dyn DispatchTable>) -> Result<(), Arc<dyn DispatchTable>> {
    INSTALLED_TABLE.set(table)
}

/// 读取进程级入口的发现来源。
#[derive(Clone, Copy, Debug, Default)]
pub struct InstalledTable;

impl TableSource for InstalledTable {
    fn discover(&self) -> Option<Arc<dyn DispatchTable>> {
        INSTALLED_TABLE.get().cloned()
    }
}

/// 按响应类型缓存的类型化适配器。
struct ResponseAdapter<T> {
    complete: fn(ErasedValue) -> DispatchResult<T>,
}

/// 一次性闩锁的分发表探测器。
pub struct FastPathLookup {
    source: Box<dyn TableSource>,
    found: AtomicBool,
    table: OnceLock<Arc<dyn DispatchTable>>,
    scan_lock: Mutex<()>,
    scans: AtomicUsize,
    adapters: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl FastPathLookup {
    /// 以自定义发现来源构造探测器。
    pub fn new(source: impl TableSource) -> Self {
        Self {
            source: Box::new(source),
            found: AtomicBool::new(false),
            table: OnceLock::new(),
            scan_lock: Mutex::new(()),
            scans: AtomicUsize::new(0),
            adapters: DashMap::new(),
        }
    }

    /// 读取 [`install_dispatch_table`] 入口的进程级探测器。
    pub fn global() -> Arc<FastPathLookup> {
        static GLOBAL: OnceLock<Arc<FastPathLookup>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(FastPathLookup::new(InstalledTable)))
            .clone()
    }

    /// 是否已经找到分发表并闩锁。
    pub fn is_latched(&self) -> bool {
        self.found.load(Ordering::Acquire)
    }

    /// 迄今执行过的探测次数；闩锁后不再增长。
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Acquire)
    }

    /// 返回已闩锁的分发表；未闩锁时执行一次探测。
    pub fn table(&self) -> Option<&Arc<dyn DispatchTable>> {
        if self.found.load(Ordering::Acquire) {
            return self.table.get();
        }
        let _guard = self.scan_lock.lock();
        if self.found.load(Ordering::Acquire) {
            return self.table.get();
        }
        self.scans.fetch_add(1, Ordering::AcqRel);
        match self.source.discover() {
            Some(table) => {
                let table = self.table.get_or_init(|| table);
                self.found.store(true, Ordering::Release);
                tracing::debug!("precompiled dispatch table discovered");
                Some(table)
            }
            None => {
                tracing::debug!("precompiled dispatch table not available yet");
                None
            }
        }
    }

    /// 尝试经快速路径调用请求；分发表缺失或不认识该类型时返回 `None`。
    pub fn try_invoke<'a, R: Request>(
        &'a self,
        request: &'a R,
        context: &'a dyn ResolutionContext,
        cancellation: &'a Cancellation,
    ) -> Option<BoxFuture<'a, DispatchResult<R::Response>>> {
        let table = self.table()?;
        let pending = table.try_invoke(MessageView::request(request), context, cancellation)?;
        let adapter = self.adapter::<R::Response>();
        Some(pending.map(move |outcome| outcome.and_then(adapter.complete)).boxed())
    }

    fn adapter<T: Send + 'static>(&self) -> Arc<ResponseAdapter<T>> {
        let entry = self
            .adapters
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                Arc::new(ResponseAdapter::<T> {
                    complete: ErasedValue::downcast::<T>,
                }) as Arc<dyn Any + Send + Sync>
            })
            .value()
            .clone();
        entry.downcast::<ResponseAdapter<T>>().unwrap_or_else(|_| {
            Arc::new(ResponseAdapter {
                complete: ErasedValue::downcast::<T>,
            })
        })
    }
}

impl fmt::Debug for FastPathLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastPathLookup")
            .field("latched", &self.is_latched())
            .field("scans", &self.scan_count())
            .finish()
    }
}
