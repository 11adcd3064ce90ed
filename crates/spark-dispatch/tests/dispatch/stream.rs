use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::executor::block_on;
use futures::stream::{self, StreamExt};
use spark_dispatch::prelude::*;

use crate::support::runtime_mediator;

/// 从 `start` 开始无限递增的计数流请求。
struct Ticks {
    start: u32,
}

impl StreamRequest for Ticks {
    type Item = u32;
}

/// 每拉取一次才生产一个条目，并记录生产数量。
struct TickHandler {
    produced: Arc<AtomicUsize>,
}

impl StreamHandler<Ticks> for TickHandler {
    fn handle(self: Arc<Self>, request: Arc<Ticks>, _cancellation: Cancellation) -> ItemStream<u32> {
        let produced = Arc::clone(&self.produced);
        stream::unfold(request.start, move |next| {
            produced.fetch_add(1, Ordering::SeqCst);
            async move { Some((Ok(next), next + 1)) }
        })
        .boxed()
    }
}

/// 只放行内层序列的第一个条目。
struct FirstOnly {
    invoked: Arc<AtomicUsize>,
}

impl StreamBehavior<Ticks> for FirstOnly {
    fn handle(
        self: Arc<Self>,
        _request: Arc<Ticks>,
        next: StreamNext<Ticks>,
        _cancellation: Cancellation,
    ) -> ItemStream<u32> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        next.run().take(1).boxed()
    }
}

/// 开放流行为：统计经过的条目数。
struct Tally {
    seen: Arc<AtomicUsize>,
}

impl OpenStreamBehavior for Tally {
    fn handle(
        self: Arc<Self>,
        request: StreamView,
        next: ErasedStreamNext,
        _cancellation: Cancellation,
    ) -> futures::stream::BoxStream<'static, DispatchResult<ErasedValue>> {
        assert!(request.downcast_ref::<Ticks>().is_some(), "开放流行为应能看到具体请求");
        let seen = Arc::clone(&self.seen);
        next.run()
            .inspect(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

#[test]
fn truncating_behavior_prevents_over_production() {
    let produced = Arc::new(AtomicUsize::new(0));
    let invoked = Arc::new(AtomicUsize::new(0));
    let (handler_count, behavior_count) = (Arc::clone(&produced), Arc::clone(&invoked));
    let mediator = runtime_mediator(|builder| {
        builder
            .stream_handler::<Ticks, TickHandler, _>(move |_| TickHandler {
                produced: Arc::clone(&handler_count),
            })
            .stream_behavior::<Ticks, FirstOnly, _>(move |_| FirstOnly {
                invoked: Arc::clone(&behavior_count),
            });
    });

    let items = mediator.stream(Ticks { start: 5 }).expect("流应成功打开");
    assert_eq!(invoked.load(Ordering::SeqCst), 0, "行为应推迟到首次拉取时执行");

    let collected: Vec<u32> = block_on(items.map(|item| item.expect("条目应成功")).collect());
    assert_eq!(collected, vec![5]);
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(produced.load(Ordering::SeqCst), 1, "截断后处理器不应多生产条目");
}

#[test]
fn open_stream_behavior_sees_every_item() {
    let seen = Arc::new(AtomicUsize::new(0));
    let tally = Arc::clone(&seen);
    let mediator = runtime_mediator(|builder| {
        builder
            .stream_handler::<Ticks, TickHandler, _>(|_| TickHandler {
                produced: Arc::default(),
            })
            .open_stream_behavior::<Tally, _>(move |_| Tally {
                seen: Arc::clone(&tally),
            });
    });

    let items = mediator.stream(Ticks { start: 0 }).expect("流应成功打开");
    let collected: Vec<u32> = block_on(items.take(3).map(|item| item.expect("条目应成功")).collect());
    assert_eq!(collected, vec![0, 1, 2]);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn cancellation_ends_stream_with_single_error() {
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);
    let mediator = runtime_mediator(|builder| {
        builder.stream_handler::<Ticks, TickHandler, _>(move |_| TickHandler {
            produced: Arc::clone(&counter),
        });
    });
    let token = Cancellation::new();
    let mut items = mediator
        .stream_with(Ticks { start: 1 }, token.clone())
        .expect("流应成功打开");

    block_on(async {
        assert_eq!(items.next().await.map(|item| item.ok()), Some(Some(1)));
        token.cancel();
        let cancelled = items.next().await.expect("取消后应产出一次错误");
        assert!(matches!(cancelled, Err(DispatchError::Cancelled)));
        assert!(items.next().await.is_none(), "取消错误之后序列应结束");
    });
    assert_eq!(produced.load(Ordering::SeqCst), 1, "取消后不应继续生产");
}

#[tokio::test]
async fn cancellation_wakes_a_pending_stream() {
    struct Silent;

    impl StreamRequest for Silent {
        type Item = ();
    }

    struct SilentHandler;

    impl StreamHandler<Silent> for SilentHandler {
        fn handle(self: Arc<Self>, _request: Arc<Silent>, _cancellation: Cancellation) -> ItemStream<()> {
            stream::pending().boxed()
        }
    }

    let mediator = runtime_mediator(|builder| {
        builder.stream_handler::<Silent, SilentHandler, _>(|_| SilentHandler);
    });
    let token = Cancellation::new();
    let mut items = mediator
        .stream_with(Silent, token.clone())
        .expect("流应成功打开");

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let first = tokio::time::timeout(Duration::from_secs(5), items.next())
        .await
        .expect("取消应唤醒挂起的拉取");
    assert!(matches!(first, Some(Err(DispatchError::Cancelled))));
    canceller.await.expect("取消任务应正常结束");
}
