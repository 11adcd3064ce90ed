use std::sync::Arc;

use futures::executor::block_on;
use spark_dispatch::error::codes;
use spark_dispatch::prelude::*;
use spark_dispatch::{Contract, Instance, MessageKind, ServiceKey, TypeIdentity};

use crate::support::{Echo, OrderPing, OrderPingHandler, runtime_mediator};

#[derive(Debug, thiserror::Error)]
#[error("order {0} is out of stock")]
struct OutOfStock(i64);

struct RejectingHandler;

#[async_trait]
impl RequestHandler<OrderPing> for RejectingHandler {
    async fn handle(&self, request: &OrderPing, _cancellation: &Cancellation) -> DispatchResult<i64> {
        Err(DispatchError::failed(OutOfStock(request.0)))
    }
}

struct PassThrough;

#[async_trait]
impl RequestBehavior<OrderPing> for PassThrough {
    async fn handle(
        &self,
        _request: &OrderPing,
        next: Next<'_, OrderPing>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<i64> {
        next.run().await
    }
}

#[test]
fn missing_request_handler_is_reported() {
    let mediator = runtime_mediator(|_| {});

    let err = block_on(mediator.send(Echo("nobody".into()))).expect_err("没有处理器时应失败");
    assert_eq!(err.code(), codes::HANDLER_NOT_FOUND);
    match err {
        DispatchError::HandlerNotFound { kind, type_name } => {
            assert_eq!(kind, MessageKind::Request);
            assert!(type_name.ends_with("Echo"), "错误应携带请求类型名");
        }
        other => panic!("意外的错误：{other}"),
    }
}

#[test]
fn missing_stream_handler_fails_before_any_item() {
    struct Feed;

    impl StreamRequest for Feed {
        type Item = u8;
    }

    let mediator = runtime_mediator(|_| {});
    let err = match mediator.stream(Feed) {
        Ok(_) => panic!("没有流处理器时打开流应立即失败"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        DispatchError::HandlerNotFound {
            kind: MessageKind::Stream,
            ..
        }
    ));
}

#[test]
fn handler_error_propagates_unchanged_through_behaviors() {
    let mediator = runtime_mediator(|builder| {
        builder
            .request_handler::<OrderPing, RejectingHandler, _>(|_| RejectingHandler)
            .request_behavior::<OrderPing, PassThrough, _>(|_| PassThrough);
    });

    let err = block_on(mediator.send(OrderPing(9))).expect_err("处理器失败应传回调用方");
    assert_eq!(err.code(), codes::FAILED);
    assert_eq!(err.to_string(), "order 9 is out of stock", "错误文本不应被包装");
    let original = err
        .into_inner()
        .expect("应为处理器原始错误")
        .downcast::<OutOfStock>()
        .expect("原始错误类型应被保留");
    assert_eq!(original.0, 9);
}

/// 对任何键都返回同一个“不实现任何契约”的实例。
struct MisconfiguredContext;

impl ResolutionContext for MisconfiguredContext {
    fn resolve_one(&self, _key: &ServiceKey) -> Option<Instance> {
        Some(Instance::new::<String>(
            TypeIdentity::of::<String>(),
            Arc::new(String::from("not a handler")),
        ))
    }

    fn resolve_all(&self, _key: &ServiceKey) -> Vec<Instance> {
        Vec::new()
    }
}

#[test]
fn instance_of_wrong_contract_is_rejected() {
    let mediator = Mediator::builder(Arc::new(MisconfiguredContext))
        .options(spark_dispatch::MediatorOptions {
            fast_path: spark_dispatch::FastPathMode::Disabled,
            trace_steps: false,
        })
        .build();

    let err = block_on(mediator.send(OrderPing(1))).expect_err("错误契约的实例应被拒绝");
    match err {
        DispatchError::ContractMismatch {
            contract,
            implementation,
        } => {
            assert_eq!(contract, Contract::RequestHandler);
            assert_eq!(implementation, std::any::type_name::<String>());
        }
        other => panic!("意外的错误：{other}"),
    }
}

#[test]
fn last_wins_registry_answers_with_latest_handler() {
    use spark_dispatch::{DuplicateHandlerPolicy, RegistryBuilder, RegistryOptions};

    let mut builder = RegistryBuilder::with_options(RegistryOptions {
        duplicate_handlers: DuplicateHandlerPolicy::LastWins,
    });
    builder
        .request_handler::<OrderPing, RejectingHandler, _>(|_| RejectingHandler)
        .request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler);
    let mediator = Mediator::new(Arc::new(builder.build().expect("LastWins 下应构建成功")));

    assert_eq!(block_on(mediator.send(OrderPing(4))).expect("应由最后注册的处理器响应"), 4);
}
