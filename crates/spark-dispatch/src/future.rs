//! 异步抽象别名：统一引擎内部与对外契约使用的装箱 Future/Stream 形态。
//!
//! # 契约说明（What）
//! - [`BoxFuture`] / [`BoxStream`] 直接复用 `futures` 的定义，保证 `Send`，便于跨线程执行器调度；
//! - [`ItemStream`] 是流式处理链路上传递的标准形态：`'static` 生命周期的惰性序列，
//!   每一项都是 [`DispatchResult`]，错误（含取消）以流内元素的形式浮出。

use crate::error::DispatchResult;

pub use futures::future::BoxFuture;
pub use futures::stream::BoxStream;

/// 流式处理器与流式行为之间传递的惰性条目序列。
pub type ItemStream<T> = BoxStream<'static, DispatchResult<T>>;
