use onio::{
    App, Connection, ConnectionId,
    middleware::{LoggingMiddleware, TimeoutError, TimeoutMiddleware},
    testing::{CountingListener, MemoryConnection},
};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

mod common;

fn connection() -> Arc<dyn Connection> {
    MemoryConnection::new(ConnectionId::new(1))
}

#[tokio::test]
async fn test_builder_middleware_runs_before_added_middleware() {
    common::init_tracing();
    let app = App::builder()
        .with(LoggingMiddleware::named("access"))
        .build();
    app.use_fn(|ctx, next| {
        Box::pin(async move {
            ctx.insert("tagged", true);
            next.run(ctx).await
        })
    });
    assert_eq!(app.middleware_count(), 2);

    let (tx, mut rx) = common::signal();
    app.on_sync("req", move |ctx| {
        tx.send(ctx.get::<bool>("tagged").copied()).ok();
        Ok(())
    });

    let report = app.handle_event(&connection(), "req", vec![]).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(common::next_signal(&mut rx).await, Some(true));
}

#[tokio::test]
async fn test_timeout_aborts_slow_chain() {
    let counter = CountingListener::new();
    let app = App::builder().with(TimeoutMiddleware::millis(20)).build();
    app.use_fn(|ctx, next| {
        Box::pin(async move {
            sleep(Duration::from_millis(200)).await;
            next.run(ctx).await
        })
    });
    app.on("req", counter.clone());

    let err = app
        .handle_event(&connection(), "req", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.position(), 0);

    let source = std::error::Error::source(&err).unwrap();
    let timeout = source.downcast_ref::<TimeoutError>().unwrap();
    assert_eq!(timeout.event(), "req");
    assert_eq!(timeout.duration(), Duration::from_millis(20));
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_timeout_passes_fast_chain() {
    let counter = CountingListener::new();
    let app = App::builder()
        .with(TimeoutMiddleware::secs(1))
        .with(LoggingMiddleware::new())
        .build();
    app.on("req", counter.clone());

    app.handle_event(&connection(), "req", vec![]).await.unwrap();
    assert_eq!(counter.count(), 1);
}
