use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::executor::block_on;
use spark_dispatch::prelude::*;
use spark_dispatch::{ServiceKey, TypeIdentity};

use crate::support::{Journal, OrderPing, OrderPingHandler, runtime_mediator};

/// 每次进入时加一的计数行为。
struct Counting {
    wraps: Arc<AtomicUsize>,
}

#[async_trait]
impl RequestBehavior<OrderPing> for Counting {
    async fn handle(
        &self,
        _request: &OrderPing,
        next: Next<'_, OrderPing>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<i64> {
        self.wraps.fetch_add(1, Ordering::SeqCst);
        next.run().await
    }
}

struct CountingModule {
    wraps: Arc<AtomicUsize>,
}

impl DispatchModule for CountingModule {
    fn register(&self, catalog: &mut ModuleCatalog) {
        let wraps = Arc::clone(&self.wraps);
        catalog
            .request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler)
            .request_behavior::<OrderPing, Counting, _>(move |_| Counting {
                wraps: Arc::clone(&wraps),
            });
    }
}

#[test]
fn scanning_a_module_twice_wraps_once() {
    let wraps = Arc::new(AtomicUsize::new(0));
    let module = CountingModule {
        wraps: Arc::clone(&wraps),
    };
    let mediator = runtime_mediator(|builder| {
        builder.scan(&[&module]).scan(&[&module]);
    });

    assert_eq!(block_on(mediator.send(OrderPing(2))).expect("分发应成功"), 2);
    assert_eq!(wraps.load(Ordering::SeqCst), 1, "同一具体行为只能包裹一次");
}

struct First;
struct Second;

/// 同一泛型定义的两个实例化，记录实际包裹的实参名。
struct Tagged<T> {
    journal: Journal,
    _tag: PhantomData<fn() -> T>,
}

impl<T> Tagged<T> {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            _tag: PhantomData,
        }
    }
}

#[async_trait]
impl<T: 'static> RequestBehavior<OrderPing> for Tagged<T> {
    async fn handle(
        &self,
        _request: &OrderPing,
        next: Next<'_, OrderPing>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<i64> {
        let tag = std::any::type_name::<T>().rsplit("::").next().unwrap_or_default();
        self.journal.record(tag);
        next.run().await
    }
}

#[test]
fn generic_definition_registered_twice_wraps_once() {
    let journal = Journal::default();
    let (first, second) = (journal.clone(), journal.clone());
    let mediator = runtime_mediator(|builder| {
        builder
            .request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler)
            .request_behavior::<OrderPing, Tagged<First>, _>(move |_| Tagged::new(first.clone()))
            .request_behavior::<OrderPing, Tagged<Second>, _>(move |_| {
                Tagged::new(second.clone())
            });
    });

    block_on(mediator.send(OrderPing(1))).expect("分发应成功");
    assert_eq!(journal.entries(), vec!["First"], "同一泛型定义只保留第一个实例化");
}

/// 开放行为：对所有请求生效。
struct Audit {
    wraps: Arc<AtomicUsize>,
}

#[async_trait]
impl OpenRequestBehavior for Audit {
    async fn handle(
        &self,
        _request: MessageView<'_>,
        next: ErasedNext<'_, ErasedValue>,
        _cancellation: &Cancellation,
    ) -> DispatchResult<ErasedValue> {
        self.wraps.fetch_add(1, Ordering::SeqCst);
        next.run().await
    }
}

struct AuditModule {
    wraps: Arc<AtomicUsize>,
}

impl DispatchModule for AuditModule {
    fn register(&self, catalog: &mut ModuleCatalog) {
        let wraps = Arc::clone(&self.wraps);
        catalog.open_request_behavior::<Audit, _>(move |_| Audit {
            wraps: Arc::clone(&wraps),
        });
    }
}

#[test]
fn open_behavior_from_two_scans_wraps_once() {
    let wraps = Arc::new(AtomicUsize::new(0));
    let module = AuditModule {
        wraps: Arc::clone(&wraps),
    };
    let mut builder = ServiceRegistry::builder();
    builder
        .request_handler::<OrderPing, OrderPingHandler, _>(|_| OrderPingHandler)
        .scan(&[&module])
        .scan(&[&module]);
    let registry = builder.build().expect("注册表应构建成功");
    assert_eq!(
        registry.implementations(&ServiceKey::request_behavior::<OrderPing>()),
        vec![TypeIdentity::of::<Audit>(), TypeIdentity::of::<Audit>()],
        "注册表保留重复，去重发生在分发阶段"
    );

    let mediator = Mediator::builder(Arc::new(registry))
        .options(spark_dispatch::MediatorOptions {
            fast_path: spark_dispatch::FastPathMode::Disabled,
            trace_steps: false,
        })
        .build();
    block_on(mediator.send(OrderPing(1))).expect("分发应成功");
    assert_eq!(wraps.load(Ordering::SeqCst), 1);
}
