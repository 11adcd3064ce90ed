//! 行为（中间件）契约：包裹“调用链剩余部分”的横切单元。
//!
//! # 设计背景（Why）
//! - 行为分为两层：
//!   - **闭合行为**（[`RequestBehavior<R>`] 等）针对一个具体消息类型，拿到强类型的请求与续延；
//!   - **开放行为**（[`OpenRequestBehavior`] 等）适用于同一形态的所有消息，
//!     通过 [`MessageView`] / [`ErasedValue`] 在类型擦除的边界上工作。
//! - 同一契约的调用桩同时接受两种实例，在边界处还原静态类型，因此对调用链而言二者没有区别。
//!
//! # 契约说明（What）
//! - 行为收到唯一的续延，自行决定是否、何时调用；不调用即短路，内层行为与终端处理器都不会执行；
//! - 续延期望至多调用一次。续延可克隆，因此多次调用不会被运行时拒绝，属于使用约定；
//! - 开放行为若自行构造响应（短路），其类型必须与消息的响应类型一致，
//!   否则分发器返回 [`crate::DispatchError::ResponseTypeMismatch`]。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::cancellation::Cancellation;
use crate::error::DispatchResult;
use crate::future::{BoxFuture, ItemStream};
use crate::message::{ErasedValue, MessageView, Notification, Request, StreamRequest, StreamView};
use crate::pipeline::{Next, PublishNext, StreamNext};

/// 针对具体请求类型 `R` 的行为。
#[async_trait]
pub trait RequestBehavior<R: Request>: Send + Sync + 'static {
    async fn handle(
        &self,
        request: &R,
        next: Next<'_, R>,
        cancellation: &Cancellation,
    ) -> DispatchResult<R::Response>;
}

/// 针对具体通知类型 `N` 的行为；续延代表“按顺序执行全部处理器”。
#[async_trait]
pub trait NotificationBehavior<N: Notification>: Send + Sync + 'static {
    async fn handle(
        &self,
        notification: &N,
        next: PublishNext<'_, N>,
        cancellation: &Cancellation,
    ) -> DispatchResult<()>;
}

/// 针对具体流请求类型 `S` 的行为。
///
/// 续延返回内层惰性序列，行为自身也必须返回惰性序列：可以透传、变换、提前截断或完全抑制。
pub trait StreamBehavior<S: StreamRequest>: Send + Sync + 'static {
    fn handle(
        self: Arc<Self>,
        request: Arc<S>,
        next: StreamNext<S>,
        cancellation: Cancellation,
    ) -> ItemStream<S::Item>;
}

/// 适用于所有请求的开放行为。
#[async_trait]
pub trait OpenRequestBehavior: Send + Sync + 'static {
    async fn handle(
        &self,
        request: MessageView<'_>,
        next: ErasedNext<'_, ErasedValue>,
        cancellation: &Cancellation,
    ) -> DispatchResult<ErasedValue>;
}

/// 适用于所有通知的开放行为。
#[async_trait]
pub trait OpenNotificationBehavior: Send + Sync + 'static {
    async fn handle(
        &self,
        notification: MessageView<'_>,
        next: ErasedNext<'_, ()>,
        cancellation: &Cancellation,
    ) -> DispatchResult<()>;
}

/// 适用于所有流请求的开放行为。
pub trait OpenStreamBehavior: Send + Sync + 'static {
    fn handle(
        self: Arc<Self>,
        request: StreamView,
        next: ErasedStreamNext,
        cancellation: Cancellation,
    ) -> BoxStream<'static, DispatchResult<ErasedValue>>;
}

/// 类型擦除的续延，供开放请求/通知行为调用。
pub struct ErasedNext<'a, T> {
    run: Box<dyn FnOnce() -> BoxFuture<'a, DispatchResult<T>> + Send + 'a>,
}

impl<'a, T> ErasedNext<'a, T> {
    pub(crate) fn new<F>(run: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, DispatchResult<T>> + Send + 'a,
    {
        Self { run: Box::new(run) }
    }

    /// 执行调用链的剩余部分。
    pub fn run(self) -> BoxFuture<'a, DispatchResult<T>> {
        (self.run)()
    }
}

impl<T> fmt::Debug for ErasedNext<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErasedNext")
    }
}

/// 类型擦除的流续延，供开放流行为调用。
pub struct ErasedStreamNext {
    run: Box<dyn FnOnce() -> BoxStream<'static, DispatchResult<ErasedValue>> + Send>,
}

impl ErasedStreamNext {
    pub(crate) fn new<F>(run: F) -> Self
    where
        F: FnOnce() -> BoxStream<'static, DispatchResult<ErasedValue>> + Send + 'static,
    {
        Self { run: Box::new(run) }
    }

    /// 取得内层惰性序列；在被拉取之前内层不会生产条目。
    pub fn run(self) -> BoxStream<'static, DispatchResult<ErasedValue>> {
        (self.run)()
    }
}

impl fmt::Debug for ErasedStreamNext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErasedStreamNext")
    }
}
