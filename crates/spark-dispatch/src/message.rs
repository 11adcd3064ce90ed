//! 消息形态与类型元信息。
//!
//! # 设计背景（Why）
//! - 三种消息形态决定了三条不同的调用链：请求/响应、通知扇出、惰性流；
//! - 开放（泛型）行为无法在编译期得知具体消息类型，需要一组类型擦除的视图
//!   （[`MessageView`]、[`StreamView`]、[`ErasedValue`]）在边界处还原静态类型。
//!
//! # 契约说明（What）
//! - 所有消息类型都要求 `Send + Sync + 'static`：请求以共享引用沿调用链下传，
//!   流请求以 `Arc` 在惰性阶段之间共享；
//! - 对分发器而言消息是不可变的。

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{DispatchError, DispatchResult};

/// 请求/响应形态的消息：具体类型唯一确定一个终端处理器与响应类型。
pub trait Request: Send + Sync + 'static {
    /// 终端处理器产出的响应类型。
    type Response: Send + 'static;
}

/// 通知形态的消息：零到多个处理器，无返回值。
pub trait Notification: Send + Sync + 'static {}

/// 流请求形态的消息：唯一的终端处理器产出惰性条目序列。
pub trait StreamRequest: Send + Sync + 'static {
    /// 序列中的条目类型。
    type Item: Send + 'static;
}

/// 消息形态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Notification,
    Stream,
}

impl MessageKind {
    /// 小写形式的名称，用于日志与错误信息。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Notification => "notification",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个具体消息类型的元信息：形态、`TypeId` 与完整类型名。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageInfo {
    kind: MessageKind,
    type_id: TypeId,
    type_name: &'static str,
}

impl MessageInfo {
    /// 请求类型 `R` 的元信息。
    pub fn request<R: Request>() -> Self {
        Self::of::<R>(MessageKind::Request)
    }

    /// 通知类型 `N` 的元信息。
    pub fn notification<N: Notification>() -> Self {
        Self::of::<N>(MessageKind::Notification)
    }

    /// 流请求类型 `S` 的元信息。
    pub fn stream<S: StreamRequest>() -> Self {
        Self::of::<S>(MessageKind::Stream)
    }

    fn of<T: 'static>(kind: MessageKind) -> Self {
        Self {
            kind,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完整类型路径，例如 `my_app::orders::CreateOrder`。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 去掉模块路径与泛型实参后的短名，例如 `CreateOrder`。
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

/// 请求或通知的类型擦除只读视图，供开放行为与预编译分发表使用。
#[derive(Clone, Copy)]
pub struct MessageView<'a> {
    info: MessageInfo,
    value: &'a (dyn Any + Send + Sync),
}

impl<'a> MessageView<'a> {
    /// 以请求构造视图。
    pub fn request<R: Request>(request: &'a R) -> Self {
        Self {
            info: MessageInfo::request::<R>(),
            value: request,
        }
    }

    /// 以通知构造视图。
    pub fn notification<N: Notification>(notification: &'a N) -> Self {
        Self {
            info: MessageInfo::notification::<N>(),
            value: notification,
        }
    }

    pub fn info(&self) -> MessageInfo {
        self.info
    }

    /// 视作具体类型 `T`；类型不符时返回 `None`。
    pub fn downcast_ref<T: 'static>(&self) -> Option<&'a T> {
        self.value.downcast_ref::<T>()
    }

    /// 是否为具体类型 `T`。
    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }
}

impl fmt::Debug for MessageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageView")
            .field("type_name", &self.info.type_name)
            .finish()
    }
}

/// 流请求的类型擦除共享视图；与 [`MessageView`] 不同，它持有所有权以便存活于惰性阶段。
#[derive(Clone)]
pub struct StreamView {
    info: MessageInfo,
    value: Arc<dyn Any + Send + Sync>,
}

impl StreamView {
    pub(crate) fn new<S: StreamRequest>(request: Arc<S>) -> Self {
        Self {
            info: MessageInfo::stream::<S>(),
            value: request,
        }
    }

    pub fn info(&self) -> MessageInfo {
        self.info
    }

    /// 视作具体类型 `T`；类型不符时返回 `None`。
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for StreamView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamView")
            .field("type_name", &self.info.type_name)
            .finish()
    }
}

/// 类型擦除的响应或流条目。
///
/// 开放行为与预编译分发表都以它传递结果，分发器在边界处用 [`ErasedValue::downcast`]
/// 还原静态类型，类型不符时产生 [`DispatchError::ResponseTypeMismatch`]。
pub struct ErasedValue {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl ErasedValue {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// 装箱值的类型名。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    /// 还原为具体类型 `T`。
    pub fn downcast<T: 'static>(self) -> DispatchResult<T> {
        let actual = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| DispatchError::ResponseTypeMismatch {
                expected: type_name::<T>(),
                actual,
            })
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}
