//! Timeout middleware for time-limited dispatch.
//!
//! **Note**: This module requires the `tokio` runtime (feature `timeout`).

use onio_core::{BoxError, Context, Middleware, Next};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

/// Error returned when the downstream chain did not finish in time.
#[derive(Debug, Clone, Error)]
#[error("event `{event}` timed out after {duration:?}")]
pub struct TimeoutError {
    event: String,
    duration: Duration,
}

impl TimeoutError {
    /// The event that timed out.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The duration that was exceeded.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// A middleware that bounds the time spent in the rest of the chain.
///
/// When the limit is exceeded the downstream chain is dropped and the
/// dispatch fails with a [`TimeoutError`], so no listener runs.
///
/// # Example
///
/// ```rust,ignore
/// app.use_middleware(TimeoutMiddleware::secs(5));
/// ```
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    /// Create a new `TimeoutMiddleware`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a `TimeoutMiddleware` with the limit specified in seconds.
    pub fn secs(seconds: u64) -> Self {
        Self::new(Duration::from_secs(seconds))
    }

    /// Create a `TimeoutMiddleware` with the limit specified in milliseconds.
    pub fn millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Get the configured limit.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Middleware for TimeoutMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), BoxError> {
        let outcome = timeout(self.duration, next.run(ctx)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(event = %ctx.event(), limit = ?self.duration, "Dispatch timed out");
                Err(Box::new(TimeoutError {
                    event: ctx.event().to_owned(),
                    duration: self.duration,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onio_core::{DynMiddleware, compose, middleware_fn};
    use std::sync::Arc;

    #[test]
    fn test_timeout_constructors() {
        assert_eq!(TimeoutMiddleware::secs(10).duration(), Duration::from_secs(10));
        assert_eq!(
            TimeoutMiddleware::millis(500).duration(),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_timeout_trigger() {
        let sleepy = middleware_fn(|_ctx, _next| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
        });
        let chain: Vec<Arc<dyn DynMiddleware>> =
            vec![Arc::new(TimeoutMiddleware::millis(10)), Arc::new(sleepy)];
        let composed = compose(chain);

        let mut ctx = Context::detached("slow", vec![]);
        let err = composed.call(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("position 0"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("10ms"));
    }

    #[tokio::test]
    async fn test_timeout_success() {
        let fast = middleware_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.insert("done", true);
                Ok(())
            })
        });
        let chain: Vec<Arc<dyn DynMiddleware>> =
            vec![Arc::new(TimeoutMiddleware::millis(100)), Arc::new(fast)];
        let composed = compose(chain);

        let mut ctx = Context::detached("fast", vec![]);
        composed.call(&mut ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>("done"), Some(&true));
    }
}
