//! Logging Middleware - Observability for event dispatch.

use onio_core::{BoxError, Context, Middleware, Next};
use std::time::{Duration, Instant};
use tracing::{Level, debug, info, trace, warn};

/// A middleware that logs every event passing through the chain.
///
/// It logs on the way down, then logs the outcome together with the time
/// spent in the rest of the chain on the way up. Errors are passed through
/// unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use onio_std::middleware::LoggingMiddleware;
///
/// app.use_middleware(LoggingMiddleware::named("socket"));
/// ```
pub struct LoggingMiddleware {
    name: &'static str,
    level: Level,
}

impl LoggingMiddleware {
    /// Create a new `LoggingMiddleware` with a default name.
    pub fn new() -> Self {
        Self {
            name: "event",
            level: Level::DEBUG,
        }
    }

    /// Create a new `LoggingMiddleware` with a custom name.
    ///
    /// The name is used in log messages to identify the application.
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::new()
        }
    }

    /// Set the level used for the per-event log lines.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    fn log(&self, ctx: &Context, elapsed: Duration, message: &str) {
        let event = ctx.event();
        let connection = ctx.connection_id().map(|id| id.to_string());
        if self.level == Level::TRACE {
            trace!(name = %self.name, %event, ?connection, ?elapsed, "{message}");
        } else if self.level == Level::DEBUG {
            debug!(name = %self.name, %event, ?connection, ?elapsed, "{message}");
        } else if self.level == Level::INFO {
            info!(name = %self.name, %event, ?connection, ?elapsed, "{message}");
        } else {
            warn!(name = %self.name, %event, ?connection, ?elapsed, "{message}");
        }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for LoggingMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), BoxError> {
        self.log(ctx, Duration::ZERO, "Event received");
        let started = Instant::now();

        match next.run(ctx).await {
            Ok(()) => {
                self.log(ctx, started.elapsed(), "Event processed");
                Ok(())
            }
            Err(err) => {
                warn!(
                    name = %self.name,
                    event = %ctx.event(),
                    elapsed = ?started.elapsed(),
                    error = %err,
                    "Event rejected"
                );
                Err(err)
            }
        }
    }
}
