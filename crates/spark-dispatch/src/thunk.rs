//! 调用桩缓存：按 (契约, 具体消息类型) 缓存一次构造、无限复用的调用入口。
//!
//! # 设计背景（Why）
//! - 解析上下文返回的是类型擦除的 [`Instance`]，每次调用都要把它还原为
//!   `dyn RequestHandler<R>` 之类的契约对象再发起静态类型调用；
//! - 这一步由泛型函数按消息类型单态化得到，装进函数指针后即可跨调用、跨线程复用，
//!   缓存让每个 (契约, 类型) 只构造一次调用桩。
//!
//! # 逻辑解析（How）
//! - 键为 `(Contract, TypeId)`，值为 `Arc<dyn Any + Send + Sync>` 形式的具体调用桩结构体；
//! - 读路径先查 `DashMap`，未命中时通过 `entry().or_insert_with` 保证并发首次访问只保留一个值；
//! - 行为调用桩同时接受闭合与开放两种实例，开放实例在此处完成类型擦除与还原。
//!
//! # 契约说明（What）
//! - 缓存只增不减，进程生命周期内条目永不失效；
//! - 调用桩本身无状态，可在任意线程并发使用。

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::future::{self, FutureExt, TryFutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::behavior::{
    ErasedNext, ErasedStreamNext, NotificationBehavior, OpenNotificationBehavior,
    OpenRequestBehavior, OpenStreamBehavior, RequestBehavior, StreamBehavior,
};
use crate::cancellation::Cancellation;
use crate::error::{DispatchError, DispatchResult};
use crate::future::{BoxFuture, ItemStream};
use crate::handler::{NotificationHandler, RequestHandler, StreamHandler};
use crate::message::{
    ErasedValue, MessageInfo, MessageView, Notification, Request, StreamRequest, StreamView,
};
use crate::pipeline::{Next, PublishNext, StreamNext};
use crate::resolve::{Contract, Instance};

/// 请求处理器调用桩。
pub struct RequestHandlerThunk<R: Request> {
    invoke: for<'a> fn(
        &'a Instance,
        &'a R,
        &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<R::Response>>,
}

impl<R: Request> RequestHandlerThunk<R> {
    pub(crate) fn call<'a>(
        &self,
        instance: &'a Instance,
        request: &'a R,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<R::Response>> {
        (self.invoke)(instance, request, cancellation)
    }
}

/// 请求行为调用桩。
pub struct RequestBehaviorThunk<R: Request> {
    invoke: for<'a> fn(
        &'a Instance,
        &'a R,
        Next<'a, R>,
        &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<R::Response>>,
}

impl<R: Request> RequestBehaviorThunk<R> {
    pub(crate) fn call<'a>(
        &self,
        instance: &'a Instance,
        request: &'a R,
        next: Next<'a, R>,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<R::Response>> {
        (self.invoke)(instance, request, next, cancellation)
    }
}

/// 通知处理器调用桩。
pub struct NotificationHandlerThunk<N: Notification> {
    invoke: for<'a> fn(&'a Instance, &'a N, &'a Cancellation) -> BoxFuture<'a, DispatchResult<()>>,
}

impl<N: Notification> NotificationHandlerThunk<N> {
    pub(crate) fn call<'a>(
        &self,
        instance: &'a Instance,
        notification: &'a N,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<()>> {
        (self.invoke)(instance, notification, cancellation)
    }
}

/// 通知行为调用桩。
pub struct NotificationBehaviorThunk<N: Notification> {
    invoke: for<'a> fn(
        &'a Instance,
        &'a N,
        PublishNext<'a, N>,
        &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<()>>,
}

impl<N: Notification> NotificationBehaviorThunk<N> {
    pub(crate) fn call<'a>(
        &self,
        instance: &'a Instance,
        notification: &'a N,
        next: PublishNext<'a, N>,
        cancellation: &'a Cancellation,
    ) -> BoxFuture<'a, DispatchResult<()>> {
        (self.invoke)(instance, notification, next, cancellation)
    }
}

/// 流处理器调用桩。
pub struct StreamHandlerThunk<S: StreamRequest> {
    invoke: fn(&Instance, Arc<S>, Cancellation) -> ItemStream<S::Item>,
}

impl<S: StreamRequest> StreamHandlerThunk<S> {
    pub(crate) fn call(
        &self,
        instance: &Instance,
        request: Arc<S>,
        cancellation: Cancellation,
    ) -> ItemStream<S::Item> {
        (self.invoke)(instance, request, cancellation)
    }
}

/// 流行为调用桩。
pub struct StreamBehaviorThunk<S: StreamRequest> {
    invoke: fn(&Instance, Arc<S>, StreamNext<S>, Cancellation) -> ItemStream<S::Item>,
}

impl<S: StreamRequest> StreamBehaviorThunk<S> {
    pub(crate) fn call(
        &self,
        instance: &Instance,
        request: Arc<S>,
        next: StreamNext<S>,
        cancellation: Cancellation,
    ) -> ItemStream<S::Item> {
        (self.invoke)(instance, request, next, cancellation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ThunkKey {
    contract: Contract,
    message: TypeId,
}

/// 调用桩缓存。
///
/// # 契约说明（What）
/// - [`ThunkCache::global`] 返回进程级实例，[`crate::Mediator::new`] 默认使用它；
/// - 独立实例主要用于测试与嵌入场景，语义与全局实例一致；
/// - 六个类型化访问器各对应一种契约，多次调用返回同一个 `Arc`。
#[derive(Default)]
pub struct ThunkCache {
    entries: DashMap<ThunkKey, Arc<dyn Any + Send + Sync>>,
}

impl ThunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级共享缓存。
    pub fn global() -> Arc<ThunkCache> {
        static GLOBAL: OnceLock<Arc<ThunkCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ThunkCache::new())).clone()
    }

    /// 当前缓存的条目数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn request_handler<R: Request>(&self) -> Arc<RequestHandlerThunk<R>> {
        self.get_or_build(Contract::RequestHandler, MessageInfo::request::<R>(), || {
            RequestHandlerThunk {
                invoke: invoke_request_handler::<R>,
            }
        })
    }

    pub fn request_behavior<R: Request>(&self) -> Arc<RequestBehaviorThunk<R>> {
        self.get_or_build(Contract::RequestBehavior, MessageInfo::request::<R>(), || {
            RequestBehaviorThunk {
                invoke: invoke_request_behavior::<R>,
            }
        })
    }

    pub fn notification_handler<N: Notification>(&self) -> Arc<NotificationHandlerThunk<N>> {
        self.get_or_build(
            Contract::NotificationHandler,
            MessageInfo::notification::<N>(),
            || NotificationHandlerThunk {
                invoke: invoke_notification_handler::<N>,
            },
        )
    }

    pub fn notification_behavior<N: Notification>(&self) -> Arc<NotificationBehaviorThunk<N>> {
        self.get_or_build(
            Contract::NotificationBehavior,
            MessageInfo::notification::<N>(),
            || NotificationBehaviorThunk {
                invoke: invoke_notification_behavior::<N>,
            },
        )
    }

    pub fn stream_handler<S: StreamRequest>(&self) -> Arc<StreamHandlerThunk<S>> {
        self.get_or_build(Contract::StreamHandler, MessageInfo::stream::<S>(), || {
            StreamHandlerThunk {
                invoke: invoke_stream_handler::<S>,
            }
        })
    }

    pub fn stream_behavior<S: StreamRequest>(&self) -> Arc<StreamBehaviorThunk<S>> {
        self.get_or_build(Contract::StreamBehavior, MessageInfo::stream::<S>(), || {
            StreamBehaviorThunk {
                invoke: invoke_stream_behavior::<S>,
            }
        })
    }

    fn get_or_build<T, F>(&self, contract: Contract, message: MessageInfo, build: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T,
    {
        let key = ThunkKey {
            contract,
            message: message.type_id(),
        };
        if let Some(entry) = self.entries.get(&key) {
            if let Ok(thunk) = Arc::clone(entry.value()).downcast::<T>() {
                return thunk;
            }
        }
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(build()) as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        // 键同时包含契约与消息类型，值类型由二者唯一确定，这里的失败分支只在键冲突时出现。
        entry
            .downcast::<T>()
            .unwrap_or_else(|_| Arc::new(build()))
    }
}

fn contract_mismatch(contract: Contract, instance: &Instance) -> DispatchError {
    DispatchError::ContractMismatch {
        contract,
        implementation: instance.implementation().name(),
    }
}

fn invoke_request_handler<'a, R: Request>(
    instance: &'a Instance,
    request: &'a R,
    cancellation: &'a Cancellation,
) -> BoxFuture<'a, DispatchResult<R::Response>> {
    match instance.downcast_ref::<dyn RequestHandler<R>>() {
        Some(handler) => handler.handle(request, cancellation),
        None => future::ready(Err(contract_mismatch(Contract::RequestHandler, instance))).boxed(),
    }
}

fn invoke_request_behavior<'a, R: Request>(
    instance: &'a Instance,
    request: &'a R,
    next: Next<'a, R>,
    cancellation: &'a Cancellation,
) -> BoxFuture<'a, DispatchResult<R::Response>> {
    if let Some(behavior) = instance.downcast_ref::<dyn RequestBehavior<R>>() {
        return behavior.handle(request, next, cancellation);
    }
    if let Some(behavior) = instance.downcast_ref::<dyn OpenRequestBehavior>() {
        let erased = ErasedNext::new(move || next.run().map_ok(ErasedValue::new).boxed());
        return behavior
            .handle(MessageView::request(request), erased, cancellation)
            .and_then(|value| future::ready(value.downcast::<R::Response>()))
            .boxed();
    }
    future::ready(Err(contract_mismatch(Contract::RequestBehavior, instance))).boxed()
}

fn invoke_notification_handler<'a, N: Notification>(
    instance: &'a Instance,
    notification: &'a N,
    cancellation: &'a Cancellation,
) -> BoxFuture<'a, DispatchResult<()>> {
    match instance.downcast_ref::<dyn NotificationHandler<N>>() {
        Some(handler) => handler.handle(notification, cancellation),
        None => {
            future::ready(Err(contract_mismatch(Contract::NotificationHandler, instance))).boxed()
        }
    }
}

fn invoke_notification_behavior<'a, N: Notification>(
    instance: &'a Instance,
    notification: &'a N,
    next: PublishNext<'a, N>,
    cancellation: &'a Cancellation,
) -> BoxFuture<'a, DispatchResult<()>> {
    if let Some(behavior) = instance.downcast_ref::<dyn NotificationBehavior<N>>() {
        return behavior.handle(notification, next, cancellation);
    }
    if let Some(behavior) = instance.downcast_ref::<dyn OpenNotificationBehavior>() {
        let erased = ErasedNext::new(move || next.run());
        return behavior.handle(MessageView::notification(notification), erased, cancellation);
    }
    future::ready(Err(contract_mismatch(Contract::NotificationBehavior, instance))).boxed()
}

fn invoke_stream_handler<S: StreamRequest>(
    instance: &Instance,
    request: Arc<S>,
    cancellation: Cancellation,
) -> ItemStream<S::Item> {
    match instance.downcast::<dyn StreamHandler<S>>() {
        Some(handler) => handler.handle(request, cancellation),
        None => stream::once(future::ready(Err(contract_mismatch(
            Contract::StreamHandler,
            instance,
        ))))
        .boxed(),
    }
}

fn invoke_stream_behavior<S: StreamRequest>(
    instance: &Instance,
    request: Arc<S>,
    next: StreamNext<S>,
    cancellation: Cancellation,
) -> ItemStream<S::Item> {
    if let Some(behavior) = instance.downcast::<dyn StreamBehavior<S>>() {
        return behavior.handle(request, next, cancellation);
    }
    if let Some(behavior) = instance.downcast::<dyn OpenStreamBehavior>() {
        let erased = ErasedStreamNext::new(move || next.run().map_ok(ErasedValue::new).boxed());
        return behavior
            .handle(StreamView::new(request), erased, cancellation)
            .map(|item| item.and_then(ErasedValue::downcast::<S::Item>))
            .boxed();
    }
    stream::once(future::ready(Err(contract_mismatch(
        Contract::StreamBehavior,
        instance,
    ))))
    .boxed()
}
