//! 注册扩展：把本 crate 的行为挂到任意注册入口上。

use std::sync::Arc;

use spark_dispatch::{Register, Request, ResolutionContext};

use crate::logging::LoggingBehavior;
use crate::validation::{ValidationBehavior, Validator};

/// [`Register`] 的扩展方法。
///
/// # 契约说明（What）
/// - `with_logging`：把 [`LoggingBehavior`] 注册为开放请求行为与开放通知行为；
/// - `with_validator`：注册一个校验器，并为 `R` 注册 [`ValidationBehavior`]。
///   同一请求类型注册多个校验器时行为会被注册多次，分发核心的具体类型去重保证只包裹一次，
///   而每次解析行为时都会取回 `R` 的全部校验器。
pub trait BehaviorRegistration: Register {
    fn with_logging(&mut self) -> &mut Self
    where
        Self: Sized,
    {
        self.open_request_behavior::<LoggingBehavior, _>(|_| LoggingBehavior)
            .open_notification_behavior::<LoggingBehavior, _>(|_| LoggingBehavior)
    }

    fn with_validator<R, V, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        V: Validator<R>,
        F: Fn(&dyn ResolutionContext) -> V + Send + Sync + 'static,
        Self: Sized,
    {
        self.service::<dyn Validator<R>, V, _>(move |context| {
            Arc::new(factory(context)) as Arc<dyn Validator<R>>
        })
        .request_behavior::<R, ValidationBehavior<R>, _>(|context| {
            ValidationBehavior::new(context.get_all::<dyn Validator<R>>())
        })
    }
}

impl<T: Register> BehaviorRegistration for T {}
