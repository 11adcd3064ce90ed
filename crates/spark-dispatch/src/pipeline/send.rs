use std::fmt;
use std::sync::Arc;

use futures::FutureExt;

use crate::cancellation::Cancellation;
use crate::diagnostics::{StepPhase, StepRecorder};
use crate::error::DispatchResult;
use crate::future::BoxFuture;
use crate::message::Request;
use crate::resolve::Instance;
use crate::thunk::{RequestBehaviorThunk, RequestHandlerThunk, ThunkCache};

/// 一次 `send` 调用的组合结果：终端处理器、已选行为及其调用桩。
pub(crate) struct SendChain<R: Request> {
    handler: Instance,
    handler_thunk: Arc<RequestHandlerThunk<R>>,
    behaviors: Vec<Instance>,
    behavior_thunk: Option<Arc<RequestBehaviorThunk<R>>>,
    steps: Option<StepRecorder>,
}

impl<R: Request> SendChain<R> {
    pub(crate) fn new(
        thunks: &ThunkCache,
        handler: Instance,
        behaviors: Vec<Instance>,
        steps: Option<StepRecorder>,
    ) -> Self {
        let behavior_thunk = (!behaviors.is_empty()).then(|| thunks.request_behavior::<R>());
        Self {
            handler,
            handler_thunk: thunks.request_handler::<R>(),
            behaviors,
            behavior_thunk,
            steps,
        }
    }

    /// 从最外层开始执行整条链。
    ///
    /// 没有行为时以 `behavior = None` 的 `before`/`after` 包住处理器步骤，
    /// 与快速路径的步骤边界一致。
    pub(crate) fn execute<'a>(
        &'a self,
        request: &'a R,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<R::Response>> {
        let start = Next {
            chain: self,
            index: 0,
            request,
            cancellation,
        };
        match &self.steps {
            Some(steps) if self.behaviors.is_empty() => {
                steps.emit(None, StepPhase::Before);
                let invocation = start.run();
                async move {
                    let outcome = invocation.await;
                    steps.emit(None, StepPhase::After);
                    outcome
                }
                .boxed()
            }
            _ => start.run(),
        }
    }
}

/// 请求/响应链路上的续延：代表“调用链的剩余部分”。
///
/// # 契约说明（What）
/// - [`Next::run`] 调用下一个行为，若已到末尾则调用终端处理器；
/// - 期望至多调用一次；游标可克隆，因此重试类行为可以先克隆再多次运行，
///   但每次运行都会完整执行内层行为与处理器。
pub struct Next<'a, R: Request> {
    chain: &'a SendChain<R>,
    index: usize,
    request: &'a R,
    cancellation: &'a Cancellation,
}

impl<'a, R: Request> Next<'a, R> {
    /// 执行调用链的剩余部分。
    pub fn run(self) -> BoxFuture<'a, DispatchResult<R::Response>> {
        let chain = self.chain;
        let (Some(behavior), Some(thunk)) = (
            chain.behaviors.get(self.index),
            chain.behavior_thunk.as_deref(),
        ) else {
            if let Some(steps) = &chain.steps {
                steps.emit(None, StepPhase::Handler);
            }
            return chain
                .handler_thunk
                .call(&chain.handler, self.request, self.cancellation);
        };

        let next = Next {
            chain,
            index: self.index + 1,
            request: self.request,
            cancellation: self.cancellation,
        };
        let invocation = thunk.call(behavior, self.request, next, self.cancellation);
        match &chain.steps {
            None => invocation,
            Some(steps) => {
                let identity = behavior.implementation();
                steps.emit(Some(identity), StepPhase::Before);
                async move {
                    let outcome = invocation.await;
                    steps.emit(Some(identity), StepPhase::After);
                    outcome
                }
                .boxed()
            }
        }
    }

    /// 剩余待执行的行为数量（不含终端处理器）。
    pub fn remaining(&self) -> usize {
        self.chain.behaviors.len().saturating_sub(self.index)
    }
}

impl<R: Request> Clone for Next<'_, R> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            index: self.index,
            request: self.request,
            cancellation: self.cancellation,
        }
    }
}

impl<R: Request> fmt::Debug for Next<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("behaviors", &self.chain.behaviors.len())
            .finish()
    }
}
