//! 请求与通知的耗时日志。
//!
//! # 契约说明（What）
//! - 进入时输出 `debug!("handling ...")`，成功时输出带 `elapsed_ms` 的 `debug!("handled ...")`，
//!   失败时输出带错误与 `elapsed_ms` 的 `error!`；
//! - 结果原样返回，日志本身不会改变调用结局；没有安装订阅者时这些事件直接被丢弃。

use std::time::Instant;

use async_trait::async_trait;
use spark_dispatch::{
    BoxFuture, Cancellation, DispatchResult, ErasedNext, ErasedValue, MessageView,
    OpenNotificationBehavior, OpenRequestBehavior,
};

/// 同时作为开放请求行为与开放通知行为注册的日志行为。
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingBehavior;

#[async_trait]
impl OpenRequestBehavior for LoggingBehavior {
    async fn handle(
        &self,
        request: MessageView<'_>,
        next: ErasedNext<'_, ErasedValue>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<ErasedValue> {
        observe(request, next.run()).await
    }
}

#[async_trait]
impl OpenNotificationBehavior for LoggingBehavior {
    async fn handle(
        &self,
        notification: MessageView<'_>,
        next: ErasedNext<'_, ()>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<()> {
        observe(notification, next.run()).await
    }
}

async fn observe<T>(message: MessageView<'_>, pending: BoxFuture<'_, DispatchResult<T>>) -> DispatchResult<T> {
    let info = message.info();
    let (kind, name) = (info.kind().as_str(), info.short_name());
    tracing::debug!(kind, message_type = name, "handling");

    let started = Instant::now();
    let outcome = pending.await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &outcome {
        Ok(_) => tracing::debug!(kind, message_type = name, elapsed_ms, "handled"),
        Err(error) => tracing::error!(kind, message_type = name, elapsed_ms, %error, "handling failed"),
    }
    outcome
}
