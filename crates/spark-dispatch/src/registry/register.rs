use std::sync::Arc;

use crate::behavior::{
    NotificationBehavior, OpenNotificationBehavior, OpenRequestBehavior, OpenStreamBehavior,
    RequestBehavior, StreamBehavior,
};
use crate::handler::{NotificationHandler, RequestHandler, StreamHandler};
use crate::message::{MessageInfo, Notification, Request, StreamRequest};
use crate::resolve::{Contract, Instance, ResolutionContext, TypeIdentity};

/// 实例工厂：每次解析都调用一次，拿到解析上下文以便构造函数注入。
pub(crate) type Factory = Arc<dyn Fn(&dyn ResolutionContext) -> Instance + Send + Sync>;

/// 注册落点：闭合服务按服务类型索引，开放行为按契约索引。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Closed(TypeIdentity),
    Open(Contract),
}

/// 一条尚未编号的注册记录。
#[derive(Clone)]
pub struct PendingRegistration {
    pub(crate) slot: Slot,
    pub(crate) contract: Option<Contract>,
    pub(crate) message: Option<MessageInfo>,
    pub(crate) implementation: TypeIdentity,
    pub(crate) factory: Factory,
}

impl PendingRegistration {
    fn closed<S, I>(
        contract: Option<Contract>,
        message: Option<MessageInfo>,
        make: impl Fn(&dyn ResolutionContext) -> Arc<S> + Send + Sync + 'static,
    ) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: 'static,
    {
        let implementation = TypeIdentity::of::<I>();
        Self {
            slot: Slot::Closed(TypeIdentity::of::<S>()),
            contract,
            message,
            implementation,
            factory: Arc::new(move |context: &dyn ResolutionContext| {
                Instance::new::<S>(implementation, make(context))
            }),
        }
    }

    fn open<I: 'static>(
        contract: Contract,
        make: impl Fn(&dyn ResolutionContext) -> Instance + Send + Sync + 'static,
    ) -> Self {
        Self {
            slot: Slot::Open(contract),
            contract: Some(contract),
            message: None,
            implementation: TypeIdentity::of::<I>(),
            factory: Arc::new(make),
        }
    }

    /// 实现类型的身份。
    pub fn implementation(&self) -> TypeIdentity {
        self.implementation
    }

    /// 所属契约；普通服务返回 `None`。
    pub fn contract(&self) -> Option<Contract> {
        self.contract
    }
}

/// 类型化注册入口。
///
/// # 契约说明（What）
/// - 实现方只需提供 [`Register::push`]，其余方法都是在其之上的类型化包装；
/// - 每个方法接受一个工厂，工厂在每次解析时被调用，实例不会被缓存；
/// - 开放行为对同一形态的所有消息生效，解析时与闭合注册按全局注册顺序合并。
pub trait Register {
    fn push(&mut self, registration: PendingRegistration);

    fn request_handler<R, H, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        H: RequestHandler<R>,
        F: Fn(&dyn ResolutionContext) -> H + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<dyn RequestHandler<R>, H>(
            Some(Contract::RequestHandler),
            Some(MessageInfo::request::<R>()),
            move |context| Arc::new(factory(context)) as Arc<dyn RequestHandler<R>>,
        ));
        self
    }

    fn notification_handler<N, H, F>(&mut self, factory: F) -> &mut Self
    where
        N: Notification,
        H: NotificationHandler<N>,
        F: Fn(&dyn ResolutionContext) -> H + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<dyn NotificationHandler<N>, H>(
            Some(Contract::NotificationHandler),
            Some(MessageInfo::notification::<N>()),
            move |context| Arc::new(factory(context)) as Arc<dyn NotificationHandler<N>>,
        ));
        self
    }

    fn stream_handler<S, H, F>(&mut self, factory: F) -> &mut Self
    where
        S: StreamRequest,
        H: StreamHandler<S>,
        F: Fn(&dyn ResolutionContext) -> H + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<dyn StreamHandler<S>, H>(
            Some(Contract::StreamHandler),
            Some(MessageInfo::stream::<S>()),
            move |context| Arc::new(factory(context)) as Arc<dyn StreamHandler<S>>,
        ));
        self
    }

    fn request_behavior<R, B, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        B: RequestBehavior<R>,
        F: Fn(&dyn ResolutionContext) -> B + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<dyn RequestBehavior<R>, B>(
            Some(Contract::RequestBehavior),
            Some(MessageInfo::request::<R>()),
            move |context| Arc::new(factory(context)) as Arc<dyn RequestBehavior<R>>,
        ));
        self
    }

    fn notification_behavior<N, B, F>(&mut self, factory: F) -> &mut Self
    where
        N: Notification,
        B: NotificationBehavior<N>,
        F: Fn(&dyn ResolutionContext) -> B + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<dyn NotificationBehavior<N>, B>(
            Some(Contract::NotificationBehavior),
            Some(MessageInfo::notification::<N>()),
            move |context| Arc::new(factory(context)) as Arc<dyn NotificationBehavior<N>>,
        ));
        self
    }

    fn stream_behavior<S, B, F>(&mut self, factory: F) -> &mut Self
    where
        S: StreamRequest,
        B: StreamBehavior<S>,
        F: Fn(&dyn ResolutionContext) -> B + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<dyn StreamBehavior<S>, B>(
            Some(Contract::StreamBehavior),
            Some(MessageInfo::stream::<S>()),
            move |context| Arc::new(factory(context)) as Arc<dyn StreamBehavior<S>>,
        ));
        self
    }

    fn open_request_behavior<B, F>(&mut self, factory: F) -> &mut Self
    where
        B: OpenRequestBehavior,
        F: Fn(&dyn ResolutionContext) -> B + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::open::<B>(
            Contract::RequestBehavior,
            move |context| Instance::open_request_behavior(factory(context)),
        ));
        self
    }

    fn open_notification_behavior<B, F>(&mut self, factory: F) -> &mut Self
    where
        B: OpenNotificationBehavior,
        F: Fn(&dyn ResolutionContext) -> B + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::open::<B>(
            Contract::NotificationBehavior,
            move |context| Instance::open_notification_behavior(factory(context)),
        ));
        self
    }

    fn open_stream_behavior<B, F>(&mut self, factory: F) -> &mut Self
    where
        B: OpenStreamBehavior,
        F: Fn(&dyn ResolutionContext) -> B + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::open::<B>(
            Contract::StreamBehavior,
            move |context| Instance::open_stream_behavior(factory(context)),
        ));
        self
    }

    /// 注册普通服务 `S`（通常是 `dyn Trait`），实现类型为 `I`。
    ///
    /// 供行为或处理器的工厂通过 `context.get::<S>()` / `get_all::<S>()` 注入依赖。
    fn service<S, I, F>(&mut self, factory: F) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: 'static,
        F: Fn(&dyn ResolutionContext) -> Arc<S> + Send + Sync + 'static,
        Self: Sized,
    {
        self.push(PendingRegistration::closed::<S, I>(None, None, factory));
        self
    }
}
