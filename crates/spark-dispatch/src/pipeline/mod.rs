//! 调用链组合器：Send、Publish、Stream 三种形态。
//!
//! # 设计背景（Why）
//! - 行为链以“游标”而非层层嵌套的闭包表达：[`Next`] 持有已选行为列表、当前位置与本次调用的
//!   请求/取消令牌，`run` 时调用当前位置的行为并把前进一格的游标交给它；
//! - 这样组合 N 个行为不需要预先构造 N 层闭包，也不会产生与行为数量成正比的递归装箱。
//!
//! # 契约说明（What）
//! - 列表第一个行为位于最外层，最后一个行为紧贴终端；
//! - 行为列表为空时，游标直接调用终端处理器（或通知扇出），不产生任何包装；
//! - 行为不调用续延即短路，内层行为与终端都不会执行。

mod publish;
mod send;
mod stream;

pub use publish::PublishNext;
pub use send::Next;
pub use stream::StreamNext;

pub(crate) use publish::PublishChain;
pub(crate) use send::SendChain;
pub(crate) use stream::{CancellableStream, StreamChain};
