//! Echo server over the in-memory transport.
//!
//! ```text
//! RUST_LOG=debug cargo run -p onio --example echo
//! ```

use onio::{
    Connection,
    middleware::{LoggingMiddleware, TimeoutMiddleware},
    prelude::*,
    testing::MemoryTransport,
};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let app = App::builder()
        .with(LoggingMiddleware::named("echo"))
        .with(TimeoutMiddleware::secs(5))
        .build();

    app.use_fn(|ctx, next| {
        Box::pin(async move {
            ctx.insert("received_at", Instant::now());
            next.run(ctx).await
        })
    });

    app.on_sync("echo", |ctx| {
        ctx.emit("echo", ctx.args().to_vec())?;
        Ok(())
    });

    app.on_sync("shout", |ctx| {
        let loud = ctx
            .args()
            .iter()
            .map(|arg| match arg.as_str() {
                Some(text) => Value::String(text.to_uppercase()),
                None => arg.clone(),
            })
            .collect();
        ctx.emit("shout", loud)?;
        Ok(())
    });

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    app.on_sync("end", move |ctx| {
        if let Some(started) = ctx.get::<Instant>("received_at") {
            info!(elapsed = ?started.elapsed(), "Session finished");
        }
        done_tx.send(()).ok();
        Ok(())
    });

    let transport = MemoryTransport::new();
    app.attach(&transport)?;

    let client = transport.connect();
    client.deliver("echo", vec![json!("hello"), json!(42)]);
    client.deliver("shout", vec![json!("quiet please")]);
    client.deliver("end", vec![]);

    tokio::time::timeout(Duration::from_secs(1), done_rx.recv()).await?;
    for frame in client.sent() {
        info!(event = %frame.event, args = ?frame.args, "Client received");
    }

    client.disconnect();
    Ok(())
}
