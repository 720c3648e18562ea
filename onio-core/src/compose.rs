//! # Middleware Composer
//!
//! [`compose`] turns an ordered list of middleware into a single entry point,
//! [`Composed`], that implements the onion model.
//!
//! The chain is a fixed array. One call of [`Composed::call`] owns a cursor
//! recording the furthest position entered so far; every [`Next`] handed to
//! a middleware refers to that cursor and to its own position. Running the
//! frame at position `i` is only allowed while the cursor is below `i`, which
//! gives both guarantees at once:
//!
//! - each middleware is entered at most once per call
//! - a second `next.run` from the same middleware is rejected with
//!   [`DispatchError::DuplicateNextInvocation`]
//!
//! A fault leaves a frame as [`DispatchError::Middleware`] naming that
//! frame's position. Frames above it that propagate the error unchanged keep
//! that attribution; a frame that returns any other error is blamed itself.
//!
//! The composed value itself is immutable and shared; all per-call state
//! lives in the cursor and in the [`Context`].

use crate::{
    context::Context,
    error::{BoxError, DispatchError, PanicError},
    middleware::DynMiddleware,
};
use futures::{FutureExt, future::BoxFuture};
use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

// Positions are stored off by one so that zero means "none".
const NONE: usize = 0;

/// Per-call bookkeeping shared by every `Next` of one composed call.
struct Cursor {
    reached: AtomicUsize,
    duplicate: AtomicUsize,
    catch_panics: bool,
}

impl Cursor {
    fn new(catch_panics: bool) -> Self {
        Self {
            reached: AtomicUsize::new(NONE),
            duplicate: AtomicUsize::new(NONE),
            catch_panics,
        }
    }

    /// Mark `position` as entered. Returns `false` if it was entered already.
    fn enter(&self, position: usize) -> bool {
        self.reached.fetch_max(position + 1, Ordering::AcqRel) <= position
    }

    fn record_duplicate(&self, owner: usize) {
        let _ = self
            .duplicate
            .compare_exchange(NONE, owner + 1, Ordering::AcqRel, Ordering::Acquire);
    }

    fn duplicate(&self) -> Option<usize> {
        match self.duplicate.load(Ordering::Acquire) {
            NONE => None,
            stored => Some(stored - 1),
        }
    }
}

/// The continuation handed to a middleware.
///
/// Calling [`Next::run`] executes every middleware after the current one and
/// resolves once all of them (including their upstream phases) finished.
pub struct Next<'a> {
    chain: &'a [Arc<dyn DynMiddleware>],
    cursor: &'a Cursor,
    position: usize,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain.
    ///
    /// Resolves immediately when the current middleware is the last one.
    /// A downstream failure arrives as a boxed [`DispatchError`]; return it
    /// unchanged to keep it attributed to the middleware that raised it.
    /// Calling this a second time fails with
    /// [`DispatchError::DuplicateNextInvocation`] and aborts the dispatch even
    /// if the caller discards the error.
    pub fn run<'b>(&'b self, ctx: &'b mut Context) -> BoxFuture<'b, Result<(), BoxError>> {
        run_frame(self.chain, self.cursor, self.position + 1, ctx)
    }

    /// Position of the middleware that owns this continuation.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of middleware that `run` would still execute.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.position + 1)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("position", &self.position)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

fn run_frame<'a>(
    chain: &'a [Arc<dyn DynMiddleware>],
    cursor: &'a Cursor,
    position: usize,
    ctx: &'a mut Context,
) -> BoxFuture<'a, Result<(), BoxError>> {
    Box::pin(async move {
        if !cursor.enter(position) {
            let owner = position.saturating_sub(1);
            cursor.record_duplicate(owner);
            return Err(Box::new(DispatchError::DuplicateNextInvocation { position: owner })
                as BoxError);
        }

        let Some(middleware) = chain.get(position) else {
            // Chain exhausted
            return Ok(());
        };

        let next = Next {
            chain,
            cursor,
            position,
        };

        let result = if cursor.catch_panics {
            AssertUnwindSafe(middleware.handle_dyn(ctx, next))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Box::new(PanicError::from_payload(payload)) as BoxError))
        } else {
            middleware.handle_dyn(ctx, next).await
        };

        result.map_err(|err| attribute(err, position))
    })
}

/// Blame `position` for `err` unless it is a downstream fault passed through.
fn attribute(err: BoxError, position: usize) -> BoxError {
    if err.is::<DispatchError>() {
        err
    } else {
        Box::new(DispatchError::Middleware {
            position,
            source: err,
        })
    }
}

/// An immutable, composed middleware chain.
///
/// Cloning is cheap: the chain is shared behind an `Arc`.
#[derive(Clone)]
pub struct Composed {
    chain: Arc<[Arc<dyn DynMiddleware>]>,
    catch_panics: bool,
}

/// Compose an ordered list of middleware into a single entry point.
///
/// An empty list yields a chain whose call resolves immediately.
pub fn compose<I>(middleware: I) -> Composed
where
    I: IntoIterator<Item = Arc<dyn DynMiddleware>>,
{
    Composed {
        chain: middleware.into_iter().collect(),
        catch_panics: true,
    }
}

impl Composed {
    /// Whether panics raised by middleware are converted into faults.
    ///
    /// Enabled by default.
    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Return a new chain with `middleware` appended.
    ///
    /// `self` is left untouched, so calls already in flight keep running
    /// against the chain they started with.
    pub fn with(&self, middleware: Arc<dyn DynMiddleware>) -> Composed {
        let chain: Vec<_> = self
            .chain
            .iter()
            .cloned()
            .chain(std::iter::once(middleware))
            .collect();
        Composed {
            chain: chain.into(),
            catch_panics: self.catch_panics,
        }
    }

    /// Number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Run the chain against `ctx`.
    ///
    /// Resolves after every middleware's upstream phase has run, or with the
    /// first fault raised.
    pub async fn call(&self, ctx: &mut Context) -> Result<(), DispatchError> {
        if self.chain.is_empty() {
            return Ok(());
        }

        let cursor = Cursor::new(self.catch_panics);
        let result = run_frame(&self.chain, &cursor, 0, ctx).await;

        if let Some(position) = cursor.duplicate() {
            return Err(DispatchError::DuplicateNextInvocation { position });
        }

        match result {
            Ok(()) => Ok(()),
            Err(err) => match err.downcast::<DispatchError>() {
                Ok(dispatch) => Err(*dispatch),
                Err(source) => Err(DispatchError::Middleware {
                    position: 0,
                    source,
                }),
            },
        }
    }
}

impl Default for Composed {
    fn default() -> Self {
        compose(Vec::new())
    }
}

impl fmt::Debug for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composed")
            .field("len", &self.chain.len())
            .field("catch_panics", &self.catch_panics)
            .finish()
    }
}
