//! Router core.
//!
//! [`Router`] keeps an ordered registry of routes, each a compiled
//! [`RouteMatcher`] with a middleware chain, and dispatches fragments to
//! them:
//!
//! - every route whose matcher accepts the fragment contributes one chain,
//!   bound to that route's captures;
//! - chains run one after another in registration order, handlers within a
//!   chain strictly in order, and [`Flow::Stop`] ends only its own chain;
//! - no match at all runs the not-found chain, which fails with
//!   [`Error::NotFound`] until a custom one is registered with
//!   [`Router::none`];
//! - an error aborts the dispatch and goes to the error hook once. The
//!   default hook logs, rolls the visible URL back to the last good fragment
//!   without dispatching it, and re-raises.
//!
//! [`Router::start`] returns a [`PollLoop`] future that watches the
//! [`Location`] and dispatches every change.
//!
//! # Example
//!
//! ```
//! use compose_navigator::{handler_fn, Flow, MemoryLocation, Router};
//! use std::sync::Arc;
//!
//! let router = Router::new(Arc::new(MemoryLocation::new()));
//! router
//!     .add("users/:id", [handler_fn(|args| async move {
//!         assert_eq!(args, vec![Some("7".to_string())]);
//!         Ok(Flow::Continue)
//!     })])
//!     .unwrap();
//!
//! pollster::block_on(router.handle("users/7")).unwrap();
//! assert_eq!(router.current().as_deref(), Some("users/7"));
//! ```

use crate::error::{Error, Result};
use crate::location::Location;
use crate::middleware::{handler_fn, run_chain, Flow, RouteHandler};
use crate::pattern::{normalize_route, Pattern, RouteMatcher};
use crate::viewmodel::Args;
use crate::{debug_log, error_log, info_log, trace_log, warn_log};
use futures::future::{BoxFuture, FutureExt};
use futures_timer::Delay;
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Default delay between two location checks of a [`PollLoop`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Options
// ============================================================================

/// Which part of the location holds the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The path, written with history entries.
    History,
    /// The hash.
    Hash,
}

/// Fragment to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Read it from the location.
    Current,
    /// This fragment.
    Path(String),
    /// Nothing to dispatch; handling is a no-op.
    Nothing,
}

impl From<&str> for Fragment {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Fragment {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<Option<String>> for Fragment {
    fn from(path: Option<String>) -> Self {
        path.map_or(Self::Nothing, Self::Path)
    }
}

/// Navigation error hook. Returning `Ok(())` absorbs the failure.
pub type RouterErrorHook = Arc<dyn Fn(&Router, Error) -> Result<()> + Send + Sync>;

/// Router configuration.
#[derive(Clone, Default)]
pub struct RouterOptions {
    /// Fragment source; defaults to history when the location supports it.
    pub mode: Option<Mode>,
    /// Path prefix owned by the router.
    pub root: Option<String>,
    /// Navigation error hook.
    pub on_error: Option<RouterErrorHook>,
    /// Delay between two location checks.
    pub poll_interval: Option<Duration>,
}

impl RouterOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mode. History falls back to hash without history support.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the root prefix.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Router, Error) -> Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Set the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

impl fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("mode", &self.mode)
            .field("root", &self.root)
            .field("on_error", &self.on_error.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

struct Route {
    matcher: RouteMatcher,
    handlers: Vec<Arc<dyn RouteHandler>>,
}

type Chain = (Vec<Arc<dyn RouteHandler>>, Args);

struct RouterState {
    mode: Mode,
    root: String,
    routes: IndexMap<String, Route>,
    /// `None` while the built-in not-found handler is in place.
    none: Option<Vec<Arc<dyn RouteHandler>>>,
    current: Option<String>,
    on_error: Option<RouterErrorHook>,
    poll_interval: Duration,
}

struct RouterInner {
    location: Arc<dyn Location>,
    state: Mutex<RouterState>,
    skip: AtomicUsize,
    generation: AtomicU64,
    navigating: AtomicBool,
}

/// Pattern-and-middleware router over a [`Location`].
///
/// Cheap to clone; clones share routes and state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Router with default options.
    pub fn new(location: Arc<dyn Location>) -> Self {
        Self::with_options(location, RouterOptions::default())
    }

    /// Router with `options`.
    pub fn with_options(location: Arc<dyn Location>, options: RouterOptions) -> Self {
        let history = location.supports_history();
        let mode = match options.mode {
            Some(Mode::History) | None if history => Mode::History,
            _ => Mode::Hash,
        };
        let root = options
            .root
            .as_deref()
            .map(normalize_route)
            .filter(|root| !root.is_empty())
            .map(|root| format!("{root}/"))
            .unwrap_or_default();

        Self {
            inner: Arc::new(RouterInner {
                location,
                state: Mutex::new(RouterState {
                    mode,
                    root,
                    routes: IndexMap::new(),
                    none: None,
                    current: None,
                    on_error: options.on_error,
                    poll_interval: options.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
                }),
                skip: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
                navigating: AtomicBool::new(false),
            }),
        }
    }

    /// The location the router reads and writes.
    pub fn location(&self) -> &Arc<dyn Location> {
        &self.inner.location
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.inner.state.lock().mode
    }

    /// Root prefix, with a trailing `/` when not empty.
    pub fn root(&self) -> String {
        self.inner.state.lock().root.clone()
    }

    /// Last successfully handled fragment.
    pub fn current(&self) -> Option<String> {
        self.inner.state.lock().current.clone()
    }

    /// `true` while a dispatch is in flight.
    pub fn is_navigating(&self) -> bool {
        self.inner.navigating.load(Ordering::SeqCst)
    }

    /// Location changes the poll loop will ignore before dispatching again.
    pub fn pending_skips(&self) -> usize {
        self.inner.skip.load(Ordering::SeqCst)
    }

    /// Canonical keys of the registered routes, in registration order.
    pub fn route_keys(&self) -> Vec<String> {
        self.inner.state.lock().routes.keys().cloned().collect()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register handlers for every fragment.
    pub fn use_all<I>(&self, handlers: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        self.register(RouteMatcher::Any, handlers.into_iter().collect());
        self
    }

    /// Register handlers for every fragment below a path prefix, or matching
    /// a regex.
    pub fn use_at<I>(&self, path: impl Into<Pattern>, handlers: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        self.register(RouteMatcher::prefix(path)?, handlers.into_iter().collect());
        Ok(self)
    }

    /// Register handlers for an exact route template or regex.
    pub fn add<I>(&self, path: impl Into<Pattern>, handlers: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        self.register(RouteMatcher::template(path)?, handlers.into_iter().collect());
        Ok(self)
    }

    /// Remove handlers registered with [`use_all`](Self::use_all).
    pub fn unuse_all<I>(&self, handlers: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        self.unregister(RouteMatcher::Any.key(), handlers.into_iter().collect());
        self
    }

    /// Remove handlers registered with [`use_at`](Self::use_at).
    pub fn unuse_at<I>(&self, path: impl Into<Pattern>, handlers: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        let matcher = RouteMatcher::prefix(path)?;
        self.unregister(matcher.key(), handlers.into_iter().collect());
        Ok(self)
    }

    /// Remove handlers registered with [`add`](Self::add).
    pub fn remove<I>(&self, path: impl Into<Pattern>, handlers: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        let matcher = RouteMatcher::template(path)?;
        self.unregister(matcher.key(), handlers.into_iter().collect());
        Ok(self)
    }

    /// Register the not-found chain. The first registration replaces the
    /// built-in handler, later ones append.
    pub fn none<I>(&self, handlers: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn RouteHandler>>,
    {
        let mut state = self.inner.state.lock();
        state.none.get_or_insert_with(Vec::new).extend(handlers);
        info_log!("Registered not-found chain");
        self
    }

    /// Register `child` (or a new router rooted at `prefix`) for every
    /// fragment below `prefix`. The child receives the rest of the fragment,
    /// or reads its own when nothing follows the prefix.
    pub fn child(&self, prefix: &str, child: Option<Router>) -> Result<Router> {
        let child = child.unwrap_or_else(|| {
            Router::with_options(self.inner.location.clone(), self.child_options(prefix))
        });
        let target = child.clone();
        self.delegate(prefix, move |fragment| {
            let target = target.clone();
            async move { target.handle(fragment).await }.boxed()
        })?;
        Ok(child)
    }

    /// Options for a child router rooted at `prefix`: same mode, failures
    /// passed up unreported so that this router's own dispatch reports them.
    pub(crate) fn child_options(&self, prefix: &str) -> RouterOptions {
        let mut options = RouterOptions::new().mode(self.mode()).root(prefix);
        options.poll_interval = Some(self.inner.state.lock().poll_interval);
        options.on_error(|_, err| Err(err))
    }

    /// Forward every fragment below `prefix` to `target`.
    pub(crate) fn delegate<F>(&self, prefix: &str, target: F) -> Result<()>
    where
        F: Fn(Fragment) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let source = format!("^{}(?:/(.*))?$", regex::escape(prefix));
        let regex = Regex::new(&source).map_err(|source| Error::Pattern {
            pattern: prefix.to_string(),
            source,
        })?;
        let handler = handler_fn(move |args: Args| {
            let fragment = args
                .into_iter()
                .next()
                .flatten()
                .map_or(Fragment::Current, Fragment::Path);
            let forward = target(fragment);
            async move {
                forward.await?;
                Ok(Flow::Continue)
            }
        });
        self.register(RouteMatcher::Regex(regex), vec![handler]);
        Ok(())
    }

    fn register(&self, matcher: RouteMatcher, handlers: Vec<Arc<dyn RouteHandler>>) {
        let key = matcher.key().to_string();
        let count = handlers.len();
        let mut state = self.inner.state.lock();
        match state.routes.get_mut(&key) {
            Some(route) => {
                route.handlers.extend(handlers);
                info_log!("Added {} handler(s) to route '{}'", count, key);
            }
            None => {
                state.routes.insert(key.clone(), Route { matcher, handlers });
                info_log!("Registered route '{}' ({} handler(s))", key, count);
            }
        }
    }

    fn unregister(&self, key: &str, handlers: Vec<Arc<dyn RouteHandler>>) {
        let mut state = self.inner.state.lock();
        let Some(route) = state.routes.get_mut(key) else {
            return;
        };
        for handler in &handlers {
            if let Some(index) = route.handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
                route.handlers.remove(index);
            }
        }
        if route.handlers.is_empty() {
            state.routes.shift_remove(key);
            info_log!("Removed route '{}'", key);
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dispatch a fragment.
    ///
    /// On success the fragment becomes [`current`](Self::current). On
    /// failure the error hook decides: its error is returned, an `Ok` from it
    /// absorbs the failure.
    pub async fn handle(&self, fragment: impl Into<Fragment>) -> Result<()> {
        let fragment = match fragment.into() {
            Fragment::Current => self.fragment(),
            Fragment::Path(path) => Some(path),
            Fragment::Nothing => None,
        };
        let Some(fragment) = fragment else {
            trace_log!("Nothing to dispatch");
            return Ok(());
        };

        self.inner.navigating.store(true, Ordering::SeqCst);
        let outcome = self.dispatch(&fragment).await;
        self.inner.navigating.store(false, Ordering::SeqCst);

        if let Err(err) = outcome {
            self.on_error(err)?;
        }

        self.inner.state.lock().current = Some(fragment);
        Ok(())
    }

    async fn dispatch(&self, fragment: &str) -> Result<()> {
        let chains = self.chains_for(fragment)?;
        debug_log!("Dispatching '{}' to {} chain(s)", fragment, chains.len());
        for (handlers, args) in chains {
            run_chain(handlers, args).await?;
        }
        Ok(())
    }

    fn chains_for(&self, fragment: &str) -> Result<Vec<Chain>> {
        let state = self.inner.state.lock();
        let chains: Vec<Chain> = state
            .routes
            .values()
            .filter_map(|route| {
                trace_log!("Testing route '{}' against '{}'", route.matcher, fragment);
                route
                    .matcher
                    .captures(fragment)
                    .map(|args| (route.handlers.clone(), args))
            })
            .collect();

        if !chains.is_empty() {
            return Ok(chains);
        }
        match &state.none {
            Some(handlers) => Ok(vec![(handlers.clone(), Args::new())]),
            None => Err(Error::not_found(fragment)),
        }
    }

    /// Report a navigation failure through the error hook.
    pub fn on_error(&self, err: Error) -> Result<()> {
        let hook = self.inner.state.lock().on_error.clone();
        match hook {
            Some(hook) => hook(self, err),
            None => {
                error_log!("router> {}", err);
                if let Some(current) = self.current() {
                    warn_log!("router> rolling back to '{}'", current);
                    self.replace(&current, true);
                }
                Err(err)
            }
        }
    }

    /// The fragment the location currently shows, relative to the root.
    /// `None` when the location is outside the root.
    pub fn fragment(&self) -> Option<String> {
        let (mode, root) = {
            let state = self.inner.state.lock();
            (state.mode, state.root.clone())
        };
        let raw = match mode {
            Mode::History => self.inner.location.path(),
            Mode::Hash => self.inner.location.hash(),
        };
        let fragment = normalize_route(&raw);
        if root.is_empty() {
            return Some(fragment.to_string());
        }
        fragment
            .strip_prefix(root.trim_end_matches('/'))
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .map(|rest| rest.strip_prefix('/').unwrap_or(rest).to_string())
    }

    // ========================================================================
    // Location
    // ========================================================================

    /// Push `path` onto the location. The poll loop dispatches it.
    pub fn navigate(&self, path: &str) {
        let url = self.url_for(path);
        self.inner.skip.store(0, Ordering::SeqCst);
        debug_log!("Navigating to '{}'", url);
        self.inner.location.push(&url);
    }

    /// Replace the location with `path`. With `skip_handling` the next
    /// poll tick does not dispatch it.
    pub fn replace(&self, path: &str, skip_handling: bool) {
        let url = self.url_for(path);
        if skip_handling {
            self.inner.skip.fetch_add(1, Ordering::SeqCst);
        } else {
            self.inner.skip.store(0, Ordering::SeqCst);
        }
        debug_log!("Replacing location with '{}'", url);
        self.inner.location.replace(&url);
    }

    fn url_for(&self, path: &str) -> String {
        let (mode, root) = {
            let state = self.inner.state.lock();
            (state.mode, state.root.clone())
        };
        let path = format!("{root}{}", normalize_route(path));
        if mode == Mode::History && self.inner.location.supports_history() {
            path
        } else {
            format!("#{path}")
        }
    }

    fn consume_skip(&self) -> bool {
        self.inner
            .skip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Watch the location. The returned future dispatches every fragment
    /// change until [`stop`](Self::stop) or the router is dropped; it must
    /// be polled by the host's executor.
    pub fn start(&self) -> PollLoop {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);
        info_log!("Router started");

        let poll = async move {
            let mut last: Option<String> = None;
            loop {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let interval = inner.state.lock().poll_interval;
                drop(inner);
                Delay::new(interval).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let router = Router { inner };

                if router.consume_skip() {
                    trace_log!("Skipping one location change");
                    last = router.current();
                    continue;
                }

                let fragment = router.fragment();
                if fragment != last {
                    last.clone_from(&fragment);
                    if let Err(err) = router.handle(Fragment::from(fragment)).await {
                        debug_log!("Poll loop continues after failed navigation: {}", err);
                    }
                }
            }
        };

        PollLoop {
            inner: poll.boxed(),
        }
    }

    /// End the poll loop at its next tick.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        info_log!("Router stopped");
    }

    /// Stop and forget every route; mode becomes hash and the root empty.
    pub fn clear(&self) {
        self.stop();
        let mut state = self.inner.state.lock();
        state.routes.clear();
        state.none = None;
        state.mode = Mode::Hash;
        state.root.clear();
        info_log!("Router cleared");
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Router")
            .field("mode", &state.mode)
            .field("root", &state.root)
            .field("routes", &state.routes.len())
            .field("current", &state.current)
            .finish()
    }
}

/// Future returned by [`Router::start`].
pub struct PollLoop {
    inner: BoxFuture<'static, ()>,
}

impl Future for PollLoop {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for PollLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollLoop").finish_non_exhaustive()
    }
}
