use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::cancellation::{Cancellation, WaiterKey};
use crate::error::{DispatchError, DispatchResult};
use crate::future::ItemStream;
use crate::message::StreamRequest;
use crate::resolve::Instance;
use crate::thunk::{StreamBehaviorThunk, StreamHandlerThunk, ThunkCache};

/// 一次 `stream` 调用的组合结果；以 `Arc` 在惰性阶段之间共享。
pub(crate) struct StreamChain<S: StreamRequest> {
    handler: Instance,
    handler_thunk: Arc<StreamHandlerThunk<S>>,
    behaviors: Vec<Instance>,
    behavior_thunk: Option<Arc<StreamBehaviorThunk<S>>>,
    request: Arc<S>,
    cancellation: Cancellation,
}

impl<S: StreamRequest> StreamChain<S> {
    pub(crate) fn new(
        thunks: &ThunkCache,
        handler: Instance,
        behaviors: Vec<Instance>,
        request: S,
        cancellation: Cancellation,
    ) -> Arc<Self> {
        let behavior_thunk = (!behaviors.is_empty()).then(|| thunks.stream_behavior::<S>());
        Arc::new(Self {
            handler,
            handler_thunk: thunks.stream_handler::<S>(),
            behaviors,
            behavior_thunk,
            request: Arc::new(request),
            cancellation,
        })
    }

    /// 从最外层开始构造整条惰性序列。
    pub(crate) fn execute(self: Arc<Self>) -> ItemStream<S::Item> {
        StreamNext {
            chain: self,
            index: 0,
        }
        .run()
    }
}

/// 流链路上的续延：`run` 返回内层惰性序列。
///
/// 终端处理器的序列外包一层取消守卫：取消后下一次拉取得到 [`DispatchError::Cancelled`]，
/// 随后内层序列被释放，不再生产条目。
pub struct StreamNext<S: StreamRequest> {
    chain: Arc<StreamChain<S>>,
    index: usize,
}

impl<S: StreamRequest> StreamNext<S> {
    /// 取得调用链剩余部分的惰性序列。
    pub fn run(self) -> ItemStream<S::Item> {
        let chain = &self.chain;
        match (chain.behaviors.get(self.index), chain.behavior_thunk.as_deref()) {
            (Some(behavior), Some(thunk)) => {
                let next = StreamNext {
                    chain: Arc::clone(chain),
                    index: self.index + 1,
                };
                thunk.call(
                    behavior,
                    Arc::clone(&chain.request),
                    next,
                    chain.cancellation.clone(),
                )
            }
            _ => {
                let items = chain.handler_thunk.call(
                    &chain.handler,
                    Arc::clone(&chain.request),
                    chain.cancellation.clone(),
                );
                CancellableStream::new(items, chain.cancellation.clone()).boxed()
            }
        }
    }
}

impl<S: StreamRequest> Clone for StreamNext<S> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            index: self.index,
        }
    }
}

impl<S: StreamRequest> fmt::Debug for StreamNext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamNext")
            .field("index", &self.index)
            .field("behaviors", &self.chain.behaviors.len())
            .finish()
    }
}

/// 取消守卫：包在终端序列与最外层序列上。
///
/// # 逻辑解析（How）
/// - 每次拉取前检查取消位；已取消则产出一次 `Err(Cancelled)`，释放内层序列并结束；
/// - 内层返回 `Pending` 时把当前唤醒器登记到取消令牌，取消发生时任务会被唤醒并走上一步；
/// - 序列结束或守卫析构时注销登记的槽位。
pub(crate) struct CancellableStream<T> {
    inner: Option<ItemStream<T>>,
    cancellation: Cancellation,
    waiter: WaiterKey,
}

impl<T> CancellableStream<T> {
    pub(crate) fn new(inner: ItemStream<T>, cancellation: Cancellation) -> Self {
        Self {
            inner: Some(inner),
            cancellation,
            waiter: None,
        }
    }
}

impl<T> Stream for CancellableStream<T> {
    type Item = DispatchResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.inner.is_none() {
            return Poll::Ready(None);
        }
        if this.cancellation.is_cancelled() {
            this.inner = None;
            this.cancellation.deregister(&mut this.waiter);
            return Poll::Ready(Some(Err(DispatchError::Cancelled)));
        }
        let polled = match this.inner.as_mut() {
            Some(inner) => inner.poll_next_unpin(cx),
            None => return Poll::Ready(None),
        };
        match polled {
            Poll::Ready(None) => {
                this.inner = None;
                this.cancellation.deregister(&mut this.waiter);
            }
            Poll::Pending => this.cancellation.register(&mut this.waiter, cx.waker()),
            Poll::Ready(Some(_)) => {}
        }
        polled
    }
}

impl<T> Drop for CancellableStream<T> {
    fn drop(&mut self) {
        self.cancellation.deregister(&mut self.waiter);
    }
}
