//! # Middleware
//!
//! Cross-cutting steps that wrap every dispatch. A middleware receives the
//! [`Context`] and a [`Next`] continuation. Code before `next.run(ctx)` is the
//! downstream phase, code after it is the upstream phase:
//!
//! ```rust,ignore
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), BoxError> {
//!         let started = Instant::now();
//!         next.run(ctx).await?;
//!         ctx.insert("elapsed", started.elapsed());
//!         Ok(())
//!     }
//! }
//! ```
//!
//! A middleware that never calls `next` ends the chain early; listeners still
//! run afterwards. To suppress listeners, return an error.

use crate::{compose::Next, context::Context, error::BoxError};
use futures::future::BoxFuture;
use std::future::Future;

/// A step of the middleware chain.
///
/// # Static vs Dynamic Dispatch
///
/// This trait uses native `async fn` for zero-cost static dispatch.
/// The chain stores middleware as [`DynMiddleware`] trait objects.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Middleware`",
    label = "missing `Middleware` implementation",
    note = "Implement `Middleware`, or wrap a closure with `middleware_fn`."
)]
pub trait Middleware: Send + Sync + 'static {
    /// Run this step. Call `next.run(ctx)` to hand over to the rest of the chain.
    fn handle(
        &self,
        ctx: &mut Context,
        next: Next<'_>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Dynamic object-safe version of [`Middleware`].
pub trait DynMiddleware: Send + Sync + 'static {
    /// Run this step (dynamic dispatch version).
    fn handle_dyn<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

// Blanket implementation: Any type implementing Middleware implements DynMiddleware automatically.
impl<T: Middleware> DynMiddleware for T {
    fn handle_dyn<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.handle(ctx, next))
    }
}

/// A [`Middleware`] built from a closure. See [`middleware_fn`].
#[derive(Clone)]
pub struct MiddlewareFn<F> {
    func: F,
}

/// Wrap a closure returning a boxed future as a [`Middleware`].
///
/// ```rust,ignore
/// let count = middleware_fn(|ctx, next| {
///     Box::pin(async move {
///         ctx.insert("count", 0_u32);
///         next.run(ctx).await
///     })
/// });
/// ```
pub fn middleware_fn<F>(func: F) -> MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync
        + 'static,
{
    MiddlewareFn { func }
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        ctx: &mut Context,
        next: Next<'_>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        async move { (self.func)(ctx, next).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_closure_middleware_through_dyn() {
        let tagging = middleware_fn(|ctx, next| {
            Box::pin(async move {
                ctx.insert("tagged", true);
                next.run(ctx).await
            })
        });
        let erased: Arc<dyn DynMiddleware> = Arc::new(tagging);

        let composed = compose([erased]);
        let mut ctx = Context::detached("req", vec![]);
        composed.call(&mut ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>("tagged"), Some(&true));
    }

    #[tokio::test]
    async fn test_closure_middleware_upstream_phase() {
        let upstream = middleware_fn(|ctx, next| {
            Box::pin(async move {
                next.run(ctx).await?;
                ctx.insert("upstream", ctx.event().to_owned());
                Ok(())
            })
        });
        let composed = compose([Arc::new(upstream) as Arc<dyn DynMiddleware>]);

        let mut ctx = Context::detached("req", vec![]);
        composed.call(&mut ctx).await.unwrap();
        assert_eq!(ctx.get::<String>("upstream").map(String::as_str), Some("req"));
    }
}
