#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! # spark-dispatch
//!
//! ## 教案级说明（Why）
//! - **定位**：进程内的类型索引分发引擎。给定一个强类型的请求、通知或流请求，
//!   按其具体类型定位唯一（或零到多个）处理器，用零到多个横切中间件（behavior）
//!   以确定性顺序包裹，然后执行组合好的调用链。
//! - **边界**：引擎本身不做网络通信、不持久化状态、不自行跨线程调度，也不校验负载内容，
//!   只负责“解析 + 组合”。实例由外部 [`ResolutionContext`] 提供，预编译分发表由
//!   [`fast_path`] 的窄协议接入。
//!
//! ## 模块地图（How）
//! 1. [`message`]：`Request` / `Notification` / `StreamRequest` 三种消息形态与类型元信息；
//! 2. [`handler`] 与 [`behavior`]：处理器与中间件契约，包含闭合（按消息类型）与开放（类型擦除）两层；
//! 3. [`resolve`]：解析上下文契约、服务键、类型擦除实例；
//! 4. [`thunk`]：按 (契约, 具体类型) 缓存的调用桩；
//! 5. [`selection`]：两阶段去重与保序；
//! 6. [`pipeline`]：Send / Publish / Stream 三种调用链组合器；
//! 7. [`fast_path`]：一次性闩锁的预编译分发表探测；
//! 8. [`mediator`]：每次调用的入口路由；
//! 9. [`registry`]、[`config`]、[`diagnostics`]：进程内注册表、配置与管道步骤诊断。
//!
//! ## 契约（What）
//! - 行为列表第一个元素位于最外层，最后一个元素紧贴终端处理器；
//! - 处理器/行为抛出的错误原样透传，见 [`DispatchError::Failed`]；
//! - 进程级共享可变状态只有调用桩缓存与快速路径闩锁，二者都只增不减。

pub mod behavior;
pub mod cancellation;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fast_path;
pub mod future;
pub mod handler;
pub mod mediator;
pub mod message;
pub mod pipeline;
pub mod prelude;
pub mod registry;
pub mod resolve;
pub mod selection;
pub mod thunk;

pub use async_trait::async_trait;
pub use behavior::{
    ErasedNext, ErasedStreamNext, NotificationBehavior, OpenNotificationBehavior,
    OpenRequestBehavior, OpenStreamBehavior, RequestBehavior, StreamBehavior,
};
pub use cancellation::{Cancellation, WaitCancelled};
pub use config::{
    ConfigError, DispatchConfig, DuplicateHandlerPolicy, FastPathMode, MediatorOptions,
    RegistryOptions,
};
pub use diagnostics::{
    CorrelationId, DispatchPath, PipelineStep, StepObserver, StepPhase, TracingStepObserver,
};
pub use error::{BoxError, DispatchError, DispatchResult};
pub use fast_path::{DispatchTable, FastPathLookup, TableSource, install_dispatch_table};
pub use future::{BoxFuture, BoxStream, ItemStream};
pub use handler::{NotificationHandler, RequestHandler, StreamHandler};
pub use mediator::{Mediator, MediatorBuilder};
pub use message::{
    ErasedValue, MessageInfo, MessageKind, MessageView, Notification, Request, StreamRequest,
    StreamView,
};
pub use pipeline::{Next, PublishNext, StreamNext};
pub use registry::{
    DispatchModule, ModuleCatalog, Register, RegistryBuilder, RegistryError, ServiceRegistry,
};
pub use resolve::{Contract, Instance, ResolutionContext, ServiceKey, TypeIdentity};
pub use selection::select_behaviors;
pub use thunk::ThunkCache;
