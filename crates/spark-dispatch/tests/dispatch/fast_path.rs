use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::executor::block_on;
use parking_lot::Mutex;
use spark_dispatch::prelude::*;
use spark_dispatch::{
    BoxFuture, DispatchPath, DispatchTable, FastPathLookup, FastPathMode, MediatorOptions,
    PipelineStep, StepPhase,
};

use crate::support::{Echo, EchoHandler, OrderPing, OrderPingHandler};

/// 只认识 `OrderPing` 的预编译分发表：结果乘以一百，以区别于运行时处理器。
struct PingTable;

impl DispatchTable for PingTable {
    fn try_invoke<'a>(
        &'a self,
        request: MessageView<'a>,
        _context: &'a dyn ResolutionContext,
        _cancellation: &'a Cancellation,
    ) -> Option<BoxFuture<'a, DispatchResult<ErasedValue>>> {
        let ping = request.downcast_ref::<OrderPing>()?;
        Some(async move { Ok::<_, DispatchError>(ErasedValue::new(ping.0 * 100)) }.boxed())
    }
}

/// 对 `OrderPing` 返回错误类型响应的分发表。
struct WrongTypeTable;

impl DispatchTable for WrongTypeTable {
    fn try_invoke<'a>(
        &'a self,
        request: MessageView<'a>,
        _context: &'a dyn ResolutionContext,
        _cancellation: &'a Cancellation,
    ) -> Option<BoxFuture<'a, DispatchResult<ErasedValue>>> {
        request
            .is::<OrderPing>()
            .then(|| async { Ok::<_, DispatchError>(ErasedValue::new("not a number")) }.boxed())
    }
}

fn registry() -> Arc<ServiceRegistry> {
    let mut builder = ServiceRegistry::builder();
    builder
        .request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler)
        .request_handler::<Echo, EchoHandler, _>(|_| EchoHandler);
    Arc::new(builder.build().expect("注册表应构建成功"))
}

fn lookup(table: Arc<dyn DispatchTable>) -> Arc<FastPathLookup> {
    Arc::new(FastPathLookup::new(move || Some(Arc::clone(&table))))
}

#[test]
fn known_request_takes_generated_path() {
    let steps: Arc<Mutex<Vec<(DispatchPath, StepPhase)>>> = Arc::default();
    let sink = Arc::clone(&steps);
    let mediator = Mediator::builder(registry())
        .fast_path(lookup(Arc::new(PingTable)))
        .observer(move |step: &PipelineStep| sink.lock().push((step.path, step.phase)))
        .build();

    assert_eq!(block_on(mediator.send(OrderPing(3))).expect("快速路径应成功"), 300);
    assert_eq!(
        *steps.lock(),
        vec![
            (DispatchPath::Generated, StepPhase::Before),
            (DispatchPath::Generated, StepPhase::After),
        ]
    );
}

#[test]
fn unknown_request_falls_back_to_runtime_composition() {
    let mediator = Mediator::builder(registry())
        .fast_path(lookup(Arc::new(PingTable)))
        .build();

    assert_eq!(
        block_on(mediator.send(Echo("rt".into()))).expect("运行时路径应成功"),
        "[rt]"
    );
}

#[test]
fn disabled_mode_ignores_the_table() {
    let mediator = Mediator::builder(registry())
        .fast_path(lookup(Arc::new(PingTable)))
        .options(MediatorOptions {
            fast_path: FastPathMode::Disabled,
            trace_steps: false,
        })
        .build();

    assert_eq!(block_on(mediator.send(OrderPing(3))).expect("运行时路径应成功"), 3);
}

#[test]
fn table_returning_wrong_type_is_reported() {
    let mediator = Mediator::builder(registry())
        .fast_path(lookup(Arc::new(WrongTypeTable)))
        .build();

    let err = block_on(mediator.send(OrderPing(3))).expect_err("错误的响应类型应被拒绝");
    assert!(matches!(err, DispatchError::ResponseTypeMismatch { .. }));
}

#[test]
fn missing_table_is_retried_until_it_appears() {
    let ready = Arc::new(AtomicUsize::new(0));
    let gate = Arc::clone(&ready);
    let lookup = Arc::new(FastPathLookup::new(move || {
        (gate.load(Ordering::SeqCst) > 0).then(|| Arc::new(PingTable) as Arc<dyn DispatchTable>)
    }));
    let mediator = Mediator::builder(registry())
        .fast_path(Arc::clone(&lookup))
        .build();

    assert_eq!(block_on(mediator.send(OrderPing(2))).expect("未闩锁时走运行时路径"), 2);
    assert!(!lookup.is_latched());

    ready.store(1, Ordering::SeqCst);
    assert_eq!(block_on(mediator.send(OrderPing(2))).expect("闩锁后走快速路径"), 200);
    assert!(lookup.is_latched());

    let scans = lookup.scan_count();
    block_on(mediator.send(OrderPing(2))).expect("闩锁后不再探测");
    assert_eq!(lookup.scan_count(), scans, "闩锁后探测次数不再增长");
}
