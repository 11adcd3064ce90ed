//! # spark-dispatch Prelude
//!
//! ## 教案级说明（Why）
//! - 编写处理器与行为时最常用的契约集中在这里，业务代码只需 `use spark_dispatch::prelude::*;`；
//! - 注册表、快速路径与诊断属于装配期或边缘能力，仍建议按模块路径显式导入。
//!
//! ## 契约定义（What）
//! - 纯 re-export，不引入额外代码路径。

pub use crate::async_trait;
pub use crate::behavior::{
    ErasedNext, ErasedStreamNext, NotificationBehavior, OpenNotificationBehavior,
    OpenRequestBehavior, OpenStreamBehavior, RequestBehavior, StreamBehavior,
};
pub use crate::cancellation::Cancellation;
pub use crate::error::{DispatchError, DispatchResult};
pub use crate::future::ItemStream;
pub use crate::handler::{NotificationHandler, RequestHandler, StreamHandler};
pub use crate::mediator::Mediator;
pub use crate::message::{ErasedValue, MessageView, Notification, Request, StreamRequest, StreamView};
pub use crate::pipeline::{Next, PublishNext, StreamNext};
pub use crate::registry::{DispatchModule, ModuleCatalog, Register, ServiceRegistry};
pub use crate::resolve::ResolutionContext;
