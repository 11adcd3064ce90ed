use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::executor::block_on;
use parking_lot::Mutex;
use spark_dispatch::prelude::*;
use spark_dispatch::{DispatchPath, FastPathMode, MediatorOptions, PipelineStep, StepPhase};

use crate::support::{Echo, EchoHandler, Journal, OrderPing, OrderPingHandler, runtime_mediator};

/// 开放日志行为：以消息短名记录进入与返回。
struct StepLog {
    journal: Journal,
}

#[async_trait]
impl OpenRequestBehavior for StepLog {
    async fn handle(
        &self,
        request: MessageView<'_>,
        next: ErasedNext<'_, ErasedValue>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<ErasedValue> {
        let name = request.info().short_name();
        self.journal.record(format!("before:{name}"));
        let response = next.run().await;
        self.journal.record(format!("after:{name}"));
        response
    }
}

/// 外层：对内层结果加一。
struct AlphaIncrement {
    journal: Journal,
}

#[async_trait]
impl RequestBehavior<OrderPing> for AlphaIncrement {
    async fn handle(
        &self,
        _request: &OrderPing,
        next: Next<'_, OrderPing>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<i64> {
        self.journal.record("enter:A");
        let value = next.run().await?;
        self.journal.record("exit:A");
        Ok(value + 1)
    }
}

/// 内层：对处理器结果乘二。
struct ZuluDouble {
    journal: Journal,
}

#[async_trait]
impl RequestBehavior<OrderPing> for ZuluDouble {
    async fn handle(
        &self,
        _request: &OrderPing,
        next: Next<'_, OrderPing>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<i64> {
        self.journal.record("enter:Z");
        let value = next.run().await?;
        self.journal.record("exit:Z");
        Ok(value * 2)
    }
}

/// 故意先注册 Z 再注册 A：模块扫描按完整类型名排序，A 成为最外层。
struct OrderingModule {
    journal: Journal,
}

impl DispatchModule for OrderingModule {
    fn register(&self, catalog: &mut ModuleCatalog) {
        let (z, a) = (self.journal.clone(), self.journal.clone());
        catalog
            .request_behavior::<OrderPing, ZuluDouble, _>(move |_| ZuluDouble { journal: z.clone() })
            .request_behavior::<OrderPing, AlphaIncrement, _>(move |_| AlphaIncrement {
                journal: a.clone(),
            })
            .request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler);
    }
}

#[test]
fn echo_is_wrapped_by_logging_behavior() {
    let journal = Journal::default();
    let log = journal.clone();
    let mediator = runtime_mediator(|builder| {
        builder
            .request_handler::<Echo, EchoHandler, _>(|_| EchoHandler)
            .open_request_behavior::<StepLog, _>(move |_| StepLog {
                journal: log.clone(),
            });
    });

    let response = block_on(mediator.send(Echo("hi".into()))).expect("Echo 应成功");
    assert_eq!(response, "[hi]");
    assert_eq!(
        journal.entries(),
        vec!["before:Echo", "after:Echo"],
        "日志行为应恰好记录一次进入与一次返回"
    );
}

#[test]
fn behaviors_compose_outer_to_inner() {
    let journal = Journal::default();
    let module = OrderingModule {
        journal: journal.clone(),
    };
    let mediator = runtime_mediator(|builder| {
        builder.scan(&[&module]);
    });

    let response = block_on(mediator.send(OrderPing(10))).expect("OrderPing 应成功");
    assert_eq!(response, 21, "A 在外、Z 在内时结果应为 (10*2)+1");
    assert_eq!(
        journal.entries(),
        vec!["enter:A", "enter:Z", "exit:Z", "exit:A"],
        "进入顺序由外到内，返回顺序由内到外"
    );
}

#[test]
fn no_behaviors_equals_direct_invocation() {
    let mediator = runtime_mediator(|builder| {
        builder.request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler);
    });

    let direct = block_on(OrderPingHandler.handle(&OrderPing(7), &Cancellation::new()))
        .expect("直接调用应成功");
    let dispatched = block_on(mediator.send(OrderPing(7))).expect("分发应成功");
    assert_eq!(direct, dispatched);
}

#[test]
fn behavior_may_short_circuit_without_reaching_handler() {
    struct Cached;

    #[async_trait]
    impl RequestBehavior<OrderPing> for Cached {
        async fn handle(
            &self,
            _request: &OrderPing,
            _next: Next<'_, OrderPing>,
            _cancellation: &Cancellation,
        ) -> DispatchResult<i64> {
            Ok(-1)
        }
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl RequestHandler<OrderPing> for CountingHandler {
        async fn handle(&self, request: &OrderPing, _cancellation: &Cancellation) -> DispatchResult<i64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(request.0)
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mediator = runtime_mediator(|builder| {
        builder
            .request_handler::<OrderPing, CountingHandler, _>(move |_| {
                CountingHandler(Arc::clone(&counter))
            })
            .request_behavior::<OrderPing, Cached, _>(|_| Cached);
    });

    assert_eq!(block_on(mediator.send(OrderPing(3))).expect("短路应成功"), -1);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "短路后处理器不应被调用");
}

#[test]
fn cancellation_token_reaches_handler() {
    struct Cooperative;

    #[async_trait]
    impl RequestHandler<OrderPing> for Cooperative {
        async fn handle(&self, request: &OrderPing, cancellation: &Cancellation) -> DispatchResult<i64> {
            cancellation.check()?;
            Ok(request.0)
        }
    }

    let mediator = runtime_mediator(|builder| {
        builder.request_handler::<OrderPing, Cooperative, _>(|_| Cooperative);
    });
    let token = Cancellation::new();
    token.cancel();

    let err = block_on(mediator.send_with(OrderPing(1), &token)).expect_err("已取消的令牌应导致失败");
    assert!(err.is_cancelled(), "取消应以取消类错误透传");
}

#[test]
fn pipeline_steps_are_observed_on_runtime_path() {
    let steps: Arc<Mutex<Vec<(DispatchPath, StepPhase, Option<&'static str>)>>> = Arc::default();
    let sink = Arc::clone(&steps);

    let mut builder = ServiceRegistry::builder();
    let journal = Journal::default();
    builder
        .request_handler::<Echo, EchoHandler, _>(|_| EchoHandler)
        .open_request_behavior::<StepLog, _>(move |_| StepLog {
            journal: journal.clone(),
        });
    let registry = builder.build().expect("注册表应构建成功");
    let mediator = Mediator::builder(Arc::new(registry))
        .options(MediatorOptions {
            fast_path: FastPathMode::Disabled,
            trace_steps: false,
        })
        .observer(move |step: &PipelineStep| {
            sink.lock().push((
                step.path,
                step.phase,
                step.behavior.map(|behavior| behavior.name()),
            ));
        })
        .build();

    block_on(mediator.send(Echo("steps".into()))).expect("Echo 应成功");
    let behavior = Some(std::any::type_name::<StepLog>());
    assert_eq!(
        *steps.lock(),
        vec![
            (DispatchPath::Runtime, StepPhase::Before, behavior),
            (DispatchPath::Runtime, StepPhase::Handler, None),
            (DispatchPath::Runtime, StepPhase::After, behavior),
        ]
    );
}

#[test]
fn runtime_path_without_behaviors_frames_handler_step() {
    let steps: Arc<Mutex<Vec<(DispatchPath, StepPhase, bool)>>> = Arc::default();
    let sink = Arc::clone(&steps);

    let mut builder = ServiceRegistry::builder();
    builder.request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler);
    let registry = builder.build().expect("注册表应构建成功");
    let mediator = Mediator::builder(Arc::new(registry))
        .options(MediatorOptions {
            fast_path: FastPathMode::Disabled,
            trace_steps: false,
        })
        .observer(move |step: &PipelineStep| {
            sink.lock().push((step.path, step.phase, step.behavior.is_some()));
        })
        .build();

    assert_eq!(block_on(mediator.send(OrderPing(4))).expect("OrderPing 应成功"), 4);
    assert_eq!(
        *steps.lock(),
        vec![
            (DispatchPath::Runtime, StepPhase::Before, false),
            (DispatchPath::Runtime, StepPhase::Handler, false),
            (DispatchPath::Runtime, StepPhase::After, false),
        ],
        "无行为时处理器步骤也应由不带行为的 before/after 包住"
    );
}
