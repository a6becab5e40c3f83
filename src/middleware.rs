//! Route handlers and middleware chains.
//!
//! Every route owns an ordered chain of [`RouteHandler`]s. When a fragment
//! matches, the chain runs one handler at a time with the route's captures;
//! a handler resolving to [`Flow::Stop`] ends its chain early, and an error
//! ends the whole dispatch.
//!
//! # Creating handlers
//!
//! | Approach | When to use |
//! |----------|-------------|
//! | Implement [`RouteHandler`] | Full control, named |
//! | [`handler_fn`] | Quick one-off from an async closure |
//!
//! Handlers are registered and removed as `Arc<dyn RouteHandler>`; removal
//! compares `Arc` identity.
//!
//! # Example
//!
//! ```
//! use compose_navigator::{handler_fn, Flow};
//!
//! let auth = handler_fn(|args| async move {
//!     if args.first().and_then(Option::as_deref) == Some("admin") {
//!         Ok(Flow::Stop)
//!     } else {
//!         Ok(Flow::Continue)
//!     }
//! });
//! assert_eq!(auth.name(), "FnHandler");
//! ```

use crate::error::Result;
use crate::trace_log;
use crate::viewmodel::Args;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// RouteHandler trait
// ============================================================================

/// What a handler tells its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Run the next handler of the chain.
    #[default]
    Continue,
    /// Skip the rest of the chain.
    Stop,
}

/// Future returned by [`RouteHandler::handle`].
pub type HandlerFuture = BoxFuture<'static, Result<Flow>>;

/// A step of a route's middleware chain.
///
/// # Example
///
/// ```
/// use compose_navigator::{Args, Flow, HandlerFuture, RouteHandler};
/// use futures::FutureExt;
///
/// struct PageView;
///
/// impl RouteHandler for PageView {
///     fn handle(&self, args: Args) -> HandlerFuture {
///         async move {
///             println!("visited with {:?}", args);
///             Ok(Flow::Continue)
///         }
///         .boxed()
///     }
///
///     fn name(&self) -> &'static str {
///         "PageView"
///     }
/// }
/// ```
pub trait RouteHandler: Send + Sync + 'static {
    /// Handle a matched fragment; `args` are the route's captures.
    fn handle(&self, args: Args) -> HandlerFuture;

    /// Handler name for debugging.
    fn name(&self) -> &'static str {
        "RouteHandler"
    }
}

// ============================================================================
// handler_fn helper
// ============================================================================

/// Create a handler from an async closure.
pub fn handler_fn<F, Fut>(handler: F) -> Arc<dyn RouteHandler>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow>> + Send + 'static,
{
    Arc::new(FnHandler { handler })
}

/// Handler created from a closure via [`handler_fn`].
pub struct FnHandler<F> {
    handler: F,
}

impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow>> + Send + 'static,
{
    fn handle(&self, args: Args) -> HandlerFuture {
        (self.handler)(args).boxed()
    }

    fn name(&self) -> &'static str {
        "FnHandler"
    }
}

// ============================================================================
// Chain execution
// ============================================================================

/// Run `handlers` in order with `args`, stopping at the first
/// [`Flow::Stop`] or error.
pub async fn run_chain(handlers: Vec<Arc<dyn RouteHandler>>, args: Args) -> Result<Flow> {
    for handler in handlers {
        trace_log!("Running handler '{}'", handler.name());
        if handler.handle(args.clone()).await? == Flow::Stop {
            trace_log!("Handler '{}' stopped its chain", handler.name());
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

// ============================================================================
// Tests
// ============================================================================
