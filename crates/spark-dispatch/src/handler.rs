//! 终端处理器契约。
//!
//! # 设计背景（Why）
//! - 每个具体请求/流请求类型恰好对应一个处理器；通知可以有零到多个；
//! - 请求与通知处理器以 `async_trait` 声明，保持对象安全，以便装入 `Arc<dyn ...>`
//!   经由解析上下文传递；
//! - 流处理器返回 `'static` 的惰性序列，因此以 `self: Arc<Self>` 接收自身，
//!   并以 `Arc<S>` 共享请求，使序列可以在调用返回后继续被拉取。
//!
//! # 契约说明（What）
//! - 处理器失败时返回的错误原样透传到调用方；
//! - 取消信号由调用方提供，处理器应在挂起点使用 [`Cancellation::check`] 传播取消。

use std::sync::Arc;

use async_trait::async_trait;

use crate::cancellation::Cancellation;
use crate::error::DispatchResult;
use crate::future::ItemStream;
use crate::message::{Notification, Request, StreamRequest};

/// 请求处理器：把一个具体请求处理为一个响应。
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: &R, cancellation: &Cancellation) -> DispatchResult<R::Response>;
}

/// 通知处理器：处理一条通知，无返回值。
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    async fn handle(&self, notification: &N, cancellation: &Cancellation) -> DispatchResult<()>;
}

/// 流处理器：为一个流请求产出惰性条目序列。
///
/// 返回的序列必须是拉取式的：消费者请求下一项之前不应生产条目。
pub trait StreamHandler<S: StreamRequest>: Send + Sync + 'static {
    fn handle(self: Arc<Self>, request: Arc<S>, cancellation: Cancellation) -> ItemStream<S::Item>;
}
