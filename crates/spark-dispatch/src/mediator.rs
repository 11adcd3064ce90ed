//! 分发路由：`send` / `publish` / `stream` 的每次调用入口。
//!
//! # 设计背景（Why）
//! - 请求/响应形态有两条路径：优先尝试预编译分发表（快速路径），未命中时回退到
//!   “解析 → 行为选择 → 组合 → 执行”的运行时路径；
//! - 通知与流总是走运行时路径。
//!
//! # 逻辑解析（How）
//! 1. **探测**：`send` 先询问 [`FastPathLookup`]，命中则直接返回分发表的结果，不做任何解析；
//! 2. **解析**：运行时路径向 [`ResolutionContext`] 取终端处理器（Send/Stream 缺失即报错）
//!    与行为候选；
//! 3. **选择**：[`select_behaviors`] 做两阶段去重；
//! 4. **组合与执行**：[`crate::pipeline`] 以游标串起行为与终端，调用桩来自 [`ThunkCache`]。
//!
//! # 契约说明（What）
//! - 引擎不会引入额外的挂起点，也不会吞掉取消或处理器错误；
//! - `publish` 没有处理器时立即成功，且不会执行任何行为；
//! - `stream` 在调用时完成解析（找不到处理器即返回错误），条目在首次拉取时才开始生产，
//!   行为的 `handle` 也推迟到首次拉取时执行。

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;

use crate::cancellation::Cancellation;
use crate::config::{FastPathMode, MediatorOptions};
use crate::diagnostics::{DispatchPath, StepObserver, StepPhase, StepRecorder, TracingStepObserver};
use crate::error::{DispatchError, DispatchResult};
use crate::fast_path::FastPathLookup;
use crate::future::ItemStream;
use crate::message::{MessageInfo, Notification, Request, StreamRequest};
use crate::pipeline::{CancellableStream, PublishChain, SendChain, StreamChain};
use crate::resolve::{ResolutionContext, ServiceKey};
use crate::selection::select_behaviors;
use crate::thunk::ThunkCache;

/// 中介者：持有解析上下文、调用桩缓存与快速路径探测器，可廉价克隆并跨线程共享。
#[derive(Clone)]
pub struct Mediator {
    context: Arc<dyn ResolutionContext>,
    thunks: Arc<ThunkCache>,
    fast_path: Option<Arc<FastPathLookup>>,
    observer: Option<Arc<dyn StepObserver>>,
}

impl Mediator {
    /// 以默认选项、进程级调用桩缓存与进程级快速路径构造。
    pub fn new(context: Arc<dyn ResolutionContext>) -> Self {
        Self::builder(context).build()
    }

    pub fn builder(context: Arc<dyn ResolutionContext>) -> MediatorBuilder {
        MediatorBuilder {
            context,
            options: MediatorOptions::default(),
            thunks: None,
            fast_path: None,
            observer: None,
        }
    }

    /// 使用的解析上下文。
    pub fn context(&self) -> &Arc<dyn ResolutionContext> {
        &self.context
    }

    /// 发送请求，使用一个永不取消的令牌。
    pub async fn send<R: Request>(&self, request: R) -> DispatchResult<R::Response> {
        self.send_with(request, &Cancellation::new()).await
    }

    /// 发送请求并返回唯一响应。
    pub async fn send_with<R: Request>(
        &self,
        request: R,
        cancellation: &Cancellation,
    ) -> DispatchResult<R::Response> {
        let message = MessageInfo::request::<R>();

        if let Some(lookup) = &self.fast_path {
            if let Some(invocation) =
                lookup.try_invoke(&request, self.context.as_ref(), cancellation)
            {
                tracing::trace!(request = message.type_name(), path = "GEN", "dispatching request");
                let steps = self.recorder::<R>(DispatchPath::Generated, message);
                if let Some(steps) = &steps {
                    steps.emit(None, StepPhase::Before);
                }
                let outcome = invocation.await;
                if let Some(steps) = &steps {
                    steps.emit(None, StepPhase::After);
                }
                return outcome;
            }
        }

        tracing::trace!(request = message.type_name(), path = "RT", "dispatching request");
        let handler = self
            .context
            .resolve_one(&ServiceKey::request_handler::<R>())
            .ok_or_else(|| not_found(message))?;
        let behaviors =
            select_behaviors(self.context.resolve_all(&ServiceKey::request_behavior::<R>()));
        let chain = SendChain::<R>::new(
            &self.thunks,
            handler,
            behaviors,
            self.recorder::<R>(DispatchPath::Runtime, message),
        );
        chain.execute(&request, cancellation).await
    }

    /// 发布通知，使用一个永不取消的令牌。
    pub async fn publish<N: Notification>(&self, notification: N) -> DispatchResult<()> {
        self.publish_with(notification, &Cancellation::new()).await
    }

    /// 发布通知：按解析顺序串行执行全部处理器。
    pub async fn publish_with<N: Notification>(
        &self,
        notification: N,
        cancellation: &Cancellation,
    ) -> DispatchResult<()> {
        let message = MessageInfo::notification::<N>();
        let handlers = self
            .context
            .resolve_all(&ServiceKey::notification_handler::<N>());
        if handlers.is_empty() {
            tracing::trace!(
                notification = message.type_name(),
                "no notification handlers registered"
            );
            return Ok(());
        }

        let behaviors = select_behaviors(
            self.context
                .resolve_all(&ServiceKey::notification_behavior::<N>()),
        );
        tracing::trace!(
            notification = message.type_name(),
            handlers = handlers.len(),
            behaviors = behaviors.len(),
            "publishing notification"
        );
        let chain = PublishChain::<N>::new(&self.thunks, handlers, behaviors);
        chain.execute(&notification, cancellation).await
    }

    /// 打开流，使用一个永不取消的令牌。
    pub fn stream<S: StreamRequest>(&self, request: S) -> DispatchResult<ItemStream<S::Item>> {
        self.stream_with(request, Cancellation::new())
    }

    /// 打开流：解析立即完成，条目惰性生产。
    pub fn stream_with<S: StreamRequest>(
        &self,
        request: S,
        cancellation: Cancellation,
    ) -> DispatchResult<ItemStream<S::Item>> {
        let message = MessageInfo::stream::<S>();
        let handler = self
            .context
            .resolve_one(&ServiceKey::stream_handler::<S>())
            .ok_or_else(|| not_found(message))?;
        let behaviors =
            select_behaviors(self.context.resolve_all(&ServiceKey::stream_behavior::<S>()));
        tracing::trace!(
            request = message.type_name(),
            behaviors = behaviors.len(),
            "opening stream"
        );

        let chain = StreamChain::new(&self.thunks, handler, behaviors, request, cancellation.clone());
        let deferred = stream::once(async move { chain.execute() }).flatten().boxed();
        Ok(CancellableStream::new(deferred, cancellation).boxed())
    }

    fn recorder<R: Request>(&self, path: DispatchPath, message: MessageInfo) -> Option<StepRecorder> {
        self.observer.as_ref().map(|observer| {
            StepRecorder::new(
                Arc::clone(observer),
                path,
                message,
                std::any::type_name::<R::Response>(),
            )
        })
    }
}

fn not_found(message: MessageInfo) -> DispatchError {
    tracing::debug!(
        kind = message.kind().as_str(),
        type_name = message.type_name(),
        "no handler registered"
    );
    DispatchError::HandlerNotFound {
        kind: message.kind(),
        type_name: message.type_name(),
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("thunks", &self.thunks.len())
            .field("fast_path", &self.fast_path)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// [`Mediator`] 构建器。
pub struct MediatorBuilder {
    context: Arc<dyn ResolutionContext>,
    options: MediatorOptions,
    thunks: Option<Arc<ThunkCache>>,
    fast_path: Option<Arc<FastPathLookup>>,
    observer: Option<Arc<dyn StepObserver>>,
}

impl MediatorBuilder {
    pub fn options(mut self, options: MediatorOptions) -> Self {
        self.options = options;
        self
    }

    /// 使用独立的调用桩缓存代替进程级缓存。
    pub fn thunk_cache(mut self, thunks: Arc<ThunkCache>) -> Self {
        self.thunks = Some(thunks);
        self
    }

    /// 使用独立的快速路径探测器代替进程级探测器。
    pub fn fast_path(mut self, lookup: Arc<FastPathLookup>) -> Self {
        self.fast_path = Some(lookup);
        self
    }

    /// 设置管道步骤观察者。
    pub fn observer(mut self, observer: impl StepObserver) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Mediator {
        let fast_path = match self.options.fast_path {
            FastPathMode::Auto => Some(self.fast_path.unwrap_or_else(FastPathLookup::global)),
            FastPathMode::Disabled => None,
        };
        let observer = self.observer.or_else(|| {
            self.options
                .trace_steps
                .then(|| Arc::new(TracingStepObserver) as Arc<dyn StepObserver>)
        });
        Mediator {
            context: self.context,
            thunks: self.thunks.unwrap_or_else(ThunkCache::global),
            fast_path,
            observer,
        }
    }
}
