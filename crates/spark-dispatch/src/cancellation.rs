//! 取消原语，统一表达一次顶层调用的可中断性契约。

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::{DispatchError, DispatchResult};

/// 取消令牌：一次 `send`/`publish`/`stream` 调用中沿调用链原样传递的共享信号。
///
/// # 设计背景（Why）
/// - 分发引擎不会自行终止正在执行的 Future，只负责把同一个信号传到每个调用桩与续延；
/// - 流式管道需要在取消后“及时停止生产”，因此除原子位外还维护等待者列表，
///   挂起中的流阶段可以被 [`Cancellation::cancel`] 唤醒。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享；
/// - `cancel` 在首次成功设置取消位时返回 `true`，之后的重复调用返回 `false`；
/// - 等待者表由 `parking_lot::Mutex` 保护，`cancel` 先置位再取走整张表，注册方在锁内复查标志位，
///   因而不会丢失唤醒；
/// - 每个等待方持有一个 [`WaiterKey`] 槽位，重复轮询只覆盖自己的槽位，
///   等待方析构或结束时注销槽位，长期共享的令牌不会累积失效的唤醒器。
///
/// # 契约说明（What）
/// - **前置条件**：构造时默认处于“未取消”状态；
/// - **后置条件**：一旦 `cancel` 成功，所有克隆体的 `is_cancelled` 立即可见；
/// - 处理器与行为应在自身的挂起点检查 [`Cancellation::check`]，把取消以
///   [`DispatchError::Cancelled`] 的形式向上传播。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
    waiters: Mutex<Waiters>,
}

#[derive(Debug, Default)]
struct Waiters {
    next_key: u64,
    slots: HashMap<u64, Waker>,
}

/// 等待者在令牌上占用的槽位；`None` 表示尚未登记或已被取走。
pub(crate) type WaiterKey = Option<u64>;

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消，并唤醒所有等待者。
    ///
    /// 返回值为 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            let waiters = std::mem::take(&mut self.inner.waiters.lock().slots);
            for waker in waiters.into_values() {
                waker.wake();
            }
        }
        first
    }

    /// 派生共享同一原子位的子令牌，用于跨模块传播取消语义。
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// 已取消时返回 [`DispatchError::Cancelled`]，否则返回 `Ok(())`。
    ///
    /// 便于处理器在循环体或挂起点前以 `?` 传播取消。
    pub fn check(&self) -> DispatchResult<()> {
        if self.is_cancelled() {
            Err(DispatchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 返回一个在令牌被取消时完成的 Future。
    pub fn cancelled(&self) -> WaitCancelled<'_> {
        WaitCancelled {
            token: self,
            key: None,
        }
    }

    /// 在 `key` 对应的槽位登记唤醒器；若已取消则立即唤醒。
    ///
    /// 同一等待方重复登记只会覆盖自己的槽位。
    pub(crate) fn register(&self, key: &mut WaiterKey, waker: &Waker) {
        let mut guard = self.inner.waiters.lock();
        if self.is_cancelled() {
            drop(guard);
            *key = None;
            waker.wake_by_ref();
            return;
        }
        let waiters = &mut *guard;
        if let Some(existing) = key.as_ref().and_then(|slot| waiters.slots.get_mut(slot)) {
            if !existing.will_wake(waker) {
                *existing = waker.clone();
            }
            return;
        }
        let slot = waiters.next_key;
        waiters.next_key += 1;
        waiters.slots.insert(slot, waker.clone());
        *key = Some(slot);
    }

    /// 注销 `key` 对应的槽位。
    pub(crate) fn deregister(&self, key: &mut WaiterKey) {
        if let Some(slot) = key.take() {
            self.inner.waiters.lock().slots.remove(&slot);
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.inner.waiters.lock().slots.len()
    }
}

/// [`Cancellation::cancelled`] 返回的等待 Future。
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WaitCancelled<'a> {
    token: &'a Cancellation,
    key: WaiterKey,
}

impl Future for WaitCancelled<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.token.is_cancelled() {
            this.token.deregister(&mut this.key);
            return Poll::Ready(());
        }
        this.token.register(&mut this.key, cx.waker());
        if this.token.is_cancelled() {
            this.token.deregister(&mut this.key);
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for WaitCancelled<'_> {
    fn drop(&mut self) {
        self.token.deregister(&mut self.key);
    }
}
