use std::fmt;
use std::sync::Arc;

use futures::FutureExt;

use crate::cancellation::Cancellation;
use crate::error::DispatchResult;
use crate::future::BoxFuture;
use crate::message::Notification;
use crate::resolve::Instance;
use crate::thunk::{NotificationBehaviorThunk, NotificationHandlerThunk, ThunkCache};

/// 一次 `publish` 调用的组合结果。
pub(crate) struct PublishChain<N: Notification> {
    handlers: Vec<Instance>,
    handler_thunk: Arc<NotificationHandlerThunk<N>>,
    behaviors: Vec<Instance>,
    behavior_thunk: Option<Arc<NotificationBehaviorThunk<N>>>,
}

impl<N: Notification> PublishChain<N> {
    pub(crate) fn new(thunks: &ThunkCache, handlers: Vec<Instance>, behaviors: Vec<Instance>) -> Self {
        let behavior_thunk = (!behaviors.is_empty()).then(|| thunks.notification_behavior::<N>());
        Self {
            handlers,
            handler_thunk: thunks.notification_handler::<N>(),
            behaviors,
            behavior_thunk,
        }
    }

    pub(crate) fn execute<'a>(
        &'a self,
        notification: &'a N,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<()>> {
        PublishNext {
            chain: self,
            index: 0,
            notification,
            cancellation,
        }
        .run()
    }
}

/// 通知链路上的续延；终端是“按解析顺序依次执行全部处理器”。
///
/// # 契约说明（What）
/// - 处理器串行执行，前一个完成后才开始下一个；
/// - 任一处理器失败即停止并返回该错误，已执行处理器的副作用不会回滚；
/// - 没有处理器时终端立即成功。
pub struct PublishNext<'a, N: Notification> {
    chain: &'a PublishChain<N>,
    index: usize,
    notification: &'a N,
    cancellation: &'a Cancellation,
}

impl<'a, N: Notification> PublishNext<'a, N> {
    /// 执行调用链的剩余部分。
    pub fn run(self) -> BoxFuture<'a, DispatchResult<()>> {
        let chain = self.chain;
        match (chain.behaviors.get(self.index), chain.behavior_thunk.as_deref()) {
            (Some(behavior), Some(thunk)) => {
                let next = PublishNext {
                    chain,
                    index: self.index + 1,
                    notification: self.notification,
                    cancellation: self.cancellation,
                };
                thunk.call(behavior, self.notification, next, self.cancellation)
            }
            _ => {
                let notification = self.notification;
                let cancellation = self.cancellation;
                async move {
                    for handler in &chain.handlers {
                        chain
                            .handler_thunk
                            .call(handler, notification, cancellation)
                            .await?;
                    }
                    Ok(())
                }
                .boxed()
            }
        }
    }

    /// 本次发布解析到的处理器数量。
    pub fn handler_count(&self) -> usize {
        self.chain.handlers.len()
    }
}

impl<N: Notification> Clone for PublishNext<'_, N> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            index: self.index,
            notification: self.notification,
            cancellation: self.cancellation,
        }
    }
}

impl<N: Notification> fmt::Debug for PublishNext<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishNext")
            .field("index", &self.index)
            .field("handlers", &self.chain.handlers.len())
            .finish()
    }
}
