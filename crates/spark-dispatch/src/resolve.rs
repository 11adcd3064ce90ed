//! 解析上下文契约：分发核心与外部依赖解析器之间唯一的接缝。
//!
//! # 设计背景（Why）
//! - 处理器与行为实例由外部解析器按“服务类型”提供，核心只消费两个操作：
//!   `resolve_one`（Send/Stream 的终端处理器）与 `resolve_all`（行为与通知处理器）；
//! - Rust 没有运行时反射，服务类型以 `dyn Trait` 的 [`TypeIdentity`] 表达，
//!   实例以类型擦除的 `Arc<S>` 承载，由调用桩在边界处还原。
//!
//! # 契约说明（What）
//! - `resolve_all` 返回的顺序即注册顺序，由注册/扫描协作方保证确定性；
//! - 实例每次调用都重新获取，核心不缓存、不共享实例。

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::behavior::{
    NotificationBehavior, OpenNotificationBehavior, OpenRequestBehavior, OpenStreamBehavior,
    RequestBehavior, StreamBehavior,
};
use crate::handler::{NotificationHandler, RequestHandler, StreamHandler};
use crate::message::{MessageInfo, Notification, Request, StreamRequest};

/// 类型身份：`TypeId` 加完整类型名。相等性只由 `TypeId` 决定。
#[derive(Clone, Copy, Debug)]
pub struct TypeIdentity {
    id: TypeId,
    name: &'static str,
}

impl TypeIdentity {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 完整类型路径，含泛型实参。
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 是否为泛型实例化类型。
    pub fn is_generic(&self) -> bool {
        self.name.contains('<')
    }

    /// 开放泛型定义：去掉泛型实参后的类型路径；非泛型类型返回自身路径。
    ///
    /// `Tagged<First>` 与 `Tagged<Second>` 共享同一个定义 `Tagged`。
    pub fn definition(&self) -> &'static str {
        match self.name.find('<') {
            Some(index) => &self.name[..index],
            None => self.name,
        }
    }
}

impl PartialEq for TypeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeIdentity {}

impl Hash for TypeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 分发核心认识的六种契约接口。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Contract {
    RequestHandler,
    RequestBehavior,
    NotificationHandler,
    NotificationBehavior,
    StreamHandler,
    StreamBehavior,
}

impl Contract {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestHandler => "request-handler",
            Self::RequestBehavior => "request-behavior",
            Self::NotificationHandler => "notification-handler",
            Self::NotificationBehavior => "notification-behavior",
            Self::StreamHandler => "stream-handler",
            Self::StreamBehavior => "stream-behavior",
        }
    }

    /// 行为契约接受开放（泛型）注册；处理器契约只接受闭合注册。
    pub const fn is_behavior(self) -> bool {
        matches!(
            self,
            Self::RequestBehavior | Self::NotificationBehavior | Self::StreamBehavior
        )
    }

    /// 该契约的服务是否要求唯一实现（Send/Stream 终端处理器）。
    pub const fn expects_single(self) -> bool {
        matches!(self, Self::RequestHandler | Self::StreamHandler)
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务键：要解析的服务类型，可选地附带它所闭合的契约与消息。
///
/// # 契约说明（What）
/// - `service` 通常是一个 `dyn Trait` 类型，例如 `dyn RequestHandler<Echo>`；
/// - 分发核心构造的键总是带有 `contract` 与 `message`，注册表据此把开放行为并入结果；
/// - 构造函数注入的普通服务（例如校验器）使用 [`ServiceKey::of`]，不带契约。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    service: TypeIdentity,
    contract: Option<Contract>,
    message: Option<MessageInfo>,
}

impl ServiceKey {
    /// 普通服务 `S` 的键。
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            service: TypeIdentity::of::<S>(),
            contract: None,
            message: None,
        }
    }

    fn closed<S: ?Sized + 'static>(contract: Contract, message: MessageInfo) -> Self {
        Self {
            service: TypeIdentity::of::<S>(),
            contract: Some(contract),
            message: Some(message),
        }
    }

    pub fn request_handler<R: Request>() -> Self {
        Self::closed::<dyn RequestHandler<R>>(Contract::RequestHandler, MessageInfo::request::<R>())
    }

    pub fn request_behavior<R: Request>() -> Self {
        Self::closed::<dyn RequestBehavior<R>>(
            Contract::RequestBehavior,
            MessageInfo::request::<R>(),
        )
    }

    pub fn notification_handler<N: Notification>() -> Self {
        Self::closed::<dyn NotificationHandler<N>>(
            Contract::NotificationHandler,
            MessageInfo::notification::<N>(),
        )
    }

    pub fn notification_behavior<N: Notification>() -> Self {
        Self::closed::<dyn NotificationBehavior<N>>(
            Contract::NotificationBehavior,
            MessageInfo::notification::<N>(),
        )
    }

    pub fn stream_handler<S: StreamRequest>() -> Self {
        Self::closed::<dyn StreamHandler<S>>(Contract::StreamHandler, MessageInfo::stream::<S>())
    }

    pub fn stream_behavior<S: StreamRequest>() -> Self {
        Self::closed::<dyn StreamBehavior<S>>(Contract::StreamBehavior, MessageInfo::stream::<S>())
    }

    pub fn service(&self) -> TypeIdentity {
        self.service
    }

    pub fn contract(&self) -> Option<Contract> {
        self.contract
    }

    pub fn message(&self) -> Option<MessageInfo> {
        self.message
    }
}

/// 类型擦除的服务实例：内部持有 `Arc<S>`，外加实现类型的身份。
///
/// # 逻辑解析（How）
/// - `Arc<S>` 本身是 `Sized + 'static`，因此可以整体装入 `Arc<dyn Any + Send + Sync>`；
/// - 还原时按 `Arc<S>` 向下转型，再克隆出一份强引用。
#[derive(Clone)]
pub struct Instance {
    implementation: TypeIdentity,
    object: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    /// 以服务类型 `S` 的共享引用构造实例。
    pub fn new<S>(implementation: TypeIdentity, service: Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Self {
            implementation,
            object: Arc::new(service),
        }
    }

    /// 开放请求行为实例。
    pub fn open_request_behavior<B: OpenRequestBehavior>(behavior: B) -> Self {
        Self::new::<dyn OpenRequestBehavior>(TypeIdentity::of::<B>(), Arc::new(behavior))
    }

    /// 开放通知行为实例。
    pub fn open_notification_behavior<B: OpenNotificationBehavior>(behavior: B) -> Self {
        Self::new::<dyn OpenNotificationBehavior>(TypeIdentity::of::<B>(), Arc::new(behavior))
    }

    /// 开放流行为实例。
    pub fn open_stream_behavior<B: OpenStreamBehavior>(behavior: B) -> Self {
        Self::new::<dyn OpenStreamBehavior>(TypeIdentity::of::<B>(), Arc::new(behavior))
    }

    /// 实现类型的身份，行为去重以此为键。
    pub fn implementation(&self) -> TypeIdentity {
        self.implementation
    }

    /// 以服务类型 `S` 借用实例。
    pub fn downcast_ref<S: ?Sized + 'static>(&self) -> Option<&Arc<S>> {
        self.object.downcast_ref::<Arc<S>>()
    }

    /// 以服务类型 `S` 克隆出共享引用。
    pub fn downcast<S: ?Sized + 'static>(&self) -> Option<Arc<S>> {
        self.downcast_ref::<S>().cloned()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("implementation", &self.implementation.name)
            .finish()
    }
}

/// 外部依赖解析上下文。
///
/// # 契约说明（What）
/// - `resolve_one`：返回该服务的单个实例，缺失时返回 `None`；
/// - `resolve_all`：按注册顺序返回该服务的全部实例，缺失时返回空序列；
/// - 实现必须是 `Send + Sync`，同一个上下文会被并发的多次分发共享。
pub trait ResolutionContext: Send + Sync {
    fn resolve_one(&self, key: &ServiceKey) -> Option<Instance>;

    fn resolve_all(&self, key: &ServiceKey) -> Vec<Instance>;
}

impl dyn ResolutionContext + '_ {
    /// 解析普通服务 `S` 的单个实例。
    pub fn get<S: ?Sized + 'static>(&self) -> Option<Arc<S>> {
        self.resolve_one(&ServiceKey::of::<S>())
            .and_then(|instance| instance.downcast::<S>())
    }

    /// 解析普通服务 `S` 的全部实例，保持注册顺序。
    pub fn get_all<S: ?Sized + 'static>(&self) -> Vec<Arc<S>> {
        self.resolve_all(&ServiceKey::of::<S>())
            .iter()
            .filter_map(Instance::downcast::<S>)
            .collect()
    }
}

impl<T> ResolutionContext for Arc<T>
where
    T: ResolutionContext + ?Sized,
{
    fn resolve_one(&self, key: &ServiceKey) -> Option<Instance> {
        (**self).resolve_one(key)
    }

    fn resolve_all(&self, key: &ServiceKey) -> Vec<Instance> {
        (**self).resolve_all(key)
    }
}
