#![deny(unsafe_code)]

//! # spark-dispatch-behaviors
//!
//! ## 教案级说明（Why）
//! - 分发核心只提供行为契约，不内置任何横切逻辑；本 crate 给出两个常用实现：
//!   请求/通知耗时日志，以及请求校验；
//! - 两者都以普通注册的方式接入，不需要核心做任何特殊处理。
//!
//! ## 模块地图（How）
//! 1. [`logging`]：[`LoggingBehavior`]，开放请求与通知行为；
//! 2. [`validation`]：[`Validator`] 契约、[`ValidationBehavior`] 与聚合错误 [`ValidationError`]；
//! 3. [`registration`]：[`BehaviorRegistration`]，给任意 [`spark_dispatch::Register`] 追加
//!    `with_logging` / `with_validator`。

pub mod logging;
pub mod registration;
pub mod validation;

pub use logging::LoggingBehavior;
pub use registration::BehaviorRegistration;
pub use validation::{ValidationBehavior, ValidationError, ValidationFailure, Validator};
