//! Route-to-view-model binding.
//!
//! [`ViewModelRouter`] layers view-models over the [`Router`] core: each
//! [`ViewModelRoute`] registers a generated handler that writes the route's
//! view-model into an [`ActivationSlot`], sets the page title and composes
//! the activated view-model into every attached outlet.
//!
//! # Example
//!
//! ```
//! use compose_navigator::{
//!     MemoryLocation, StaticLoader, ViewModel, ViewModelHandle, ViewModelRoute,
//!     ViewModelRouter,
//! };
//! use std::sync::Arc;
//!
//! struct Users;
//! impl ViewModel for Users {
//!     fn title(&self) -> Option<String> {
//!         Some("Users".to_string())
//!     }
//! }
//!
//! let location = Arc::new(MemoryLocation::new());
//! let router = ViewModelRouter::new(location.clone(), Arc::new(StaticLoader::new()));
//! router
//!     .route(ViewModelRoute::new("users/:id", ViewModelHandle::new(Users)))
//!     .unwrap();
//!
//! pollster::block_on(router.handle("users/7")).unwrap();
//! assert_eq!(location.title(), "Users");
//! ```

use crate::activator::ActivationSlot;
use crate::composer::{CompositionEngine, CompositionHooks, CompositionOptions};
use crate::dom::NodeId;
use crate::error::Result;
use crate::loader::Loader;
use crate::location::Location;
use crate::middleware::{handler_fn, Flow, RouteHandler};
use crate::pattern::Pattern;
use crate::router::{Fragment, Mode, Router, RouterOptions};
use crate::viewmodel::{Args, View, ViewModelHandle, ViewModelSource};
use crate::{debug_log, info_log, trace_log};
use futures::future::{self, FutureExt};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

// ============================================================================
// Reactive values
// ============================================================================

/// A value that is either fixed or computed on every read.
#[derive(Clone)]
pub enum Reactive<T> {
    /// Fixed value.
    Value(T),
    /// Recomputed on every [`get`](Reactive::get).
    Computed(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Reactive<T> {
    /// Computed value.
    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(compute))
    }

    /// Current value.
    pub fn get(&self) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Computed(compute) => compute(),
        }
    }
}

impl<T: Default> Default for Reactive<T> {
    fn default() -> Self {
        Self::Value(T::default())
    }
}

impl<T: fmt::Debug + Clone> fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

// ============================================================================
// ViewModelRoute
// ============================================================================

/// A route bound to a view-model.
#[derive(Clone)]
pub struct ViewModelRoute {
    /// Route template or regex.
    pub path: Pattern,
    /// View-model activated on match.
    pub viewmodel: ViewModelSource,
    /// View composed into outlets; defaults to the view-model's own.
    pub view: Option<View>,
    /// Forwarded to outlet composition.
    pub activate: bool,
    /// Completion hooks for outlet composition.
    pub hooks: Option<Arc<dyn CompositionHooks>>,
    /// Link target; computed on registration when missing.
    pub href: Option<String>,
    /// Page title, used when the view-model has none.
    pub title: Reactive<Option<String>>,
    /// Whether [`ViewModelRouter::navigation`] lists the route.
    pub visible: Reactive<bool>,
    handler: Option<Arc<dyn RouteHandler>>,
}

impl ViewModelRoute {
    /// Route `path` to `viewmodel`. Visible, untitled.
    pub fn new(path: impl Into<Pattern>, viewmodel: impl Into<ViewModelSource>) -> Self {
        Self {
            path: path.into(),
            viewmodel: viewmodel.into(),
            view: None,
            activate: false,
            hooks: None,
            href: None,
            title: Reactive::Value(None),
            visible: Reactive::Value(true),
            handler: None,
        }
    }

    /// Set the view.
    pub fn view(mut self, view: impl Into<View>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Set the outlet composition `activate` flag.
    pub fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    /// Set the completion hooks.
    pub fn hooks(mut self, hooks: impl CompositionHooks) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Set the link target.
    pub fn href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Set a fixed title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Reactive::Value(Some(title.into()));
        self
    }

    /// Compute the title on every read.
    pub fn title_with<F>(mut self, title: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.title = Reactive::computed(title);
        self
    }

    /// Set a fixed visibility.
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Reactive::Value(visible);
        self
    }

    /// Compute the visibility on every read.
    pub fn visible_with<F>(mut self, visible: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.visible = Reactive::computed(visible);
        self
    }

    /// The generated handler, once registered.
    pub fn handler(&self) -> Option<&Arc<dyn RouteHandler>> {
        self.handler.as_ref()
    }

    /// Key under which the route is registered.
    pub fn key(&self) -> String {
        match &self.path {
            Pattern::Path(path) => path.clone(),
            Pattern::Regex(regex) => regex.as_str().to_string(),
        }
    }

    fn composition(&self, viewmodel: ViewModelHandle, args: Args) -> CompositionOptions {
        CompositionOptions {
            viewmodel: viewmodel.into(),
            view: self.view.clone(),
            args,
            activate: self.activate,
            hooks: self.hooks.clone(),
        }
    }
}

impl fmt::Debug for ViewModelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModelRoute")
            .field("path", &self.key())
            .field("viewmodel", &self.viewmodel)
            .field("href", &self.href)
            .field("title", &self.title)
            .field("visible", &self.visible)
            .finish()
    }
}

// ============================================================================
// ViewModelRouter
// ============================================================================

#[derive(Clone)]
struct Outlet {
    engine: CompositionEngine,
    region: NodeId,
}

struct CurrentRoute {
    route: Arc<ViewModelRoute>,
    args: Args,
}

struct BinderInner {
    router: Router,
    loader: Arc<dyn Loader>,
    slot: ActivationSlot,
    current: Mutex<Option<CurrentRoute>>,
    routes: Mutex<IndexMap<String, ViewModelRoute>>,
    outlets: Mutex<Vec<Outlet>>,
    // Regions with a removal callback registered on the document.
    watched: Mutex<HashSet<NodeId>>,
}

/// Router whose routes activate view-models and compose them into outlets.
///
/// Cheap to clone; clones share routes, slot and outlets.
#[derive(Clone)]
pub struct ViewModelRouter {
    inner: Arc<BinderInner>,
}

impl ViewModelRouter {
    /// Router with default options.
    pub fn new(location: Arc<dyn Location>, loader: Arc<dyn Loader>) -> Self {
        Self::with_options(location, loader, RouterOptions::default())
    }

    /// Router with `options`.
    pub fn with_options(
        location: Arc<dyn Location>,
        loader: Arc<dyn Loader>,
        options: RouterOptions,
    ) -> Self {
        Self::from_router(Router::with_options(location, options), loader)
    }

    fn from_router(router: Router, loader: Arc<dyn Loader>) -> Self {
        Self {
            inner: Arc::new(BinderInner {
                router,
                slot: ActivationSlot::new(loader.clone()),
                loader,
                current: Mutex::new(None),
                routes: Mutex::new(IndexMap::new()),
                outlets: Mutex::new(Vec::new()),
                watched: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// The router core.
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// The slot holding the current view-model.
    pub fn slot(&self) -> &ActivationSlot {
        &self.inner.slot
    }

    /// The route that produced the current view-model.
    pub fn current_route(&self) -> Option<Arc<ViewModelRoute>> {
        self.inner.current.lock().as_ref().map(|current| current.route.clone())
    }

    /// The current view-model.
    pub fn current_viewmodel(&self) -> Option<ViewModelHandle> {
        self.inner.slot.get()
    }

    /// `true` while a dispatch is in flight.
    pub fn is_navigating(&self) -> bool {
        self.inner.router.is_navigating()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `route` and return it with its generated handler and `href`.
    pub fn route(&self, mut route: ViewModelRoute) -> Result<ViewModelRoute> {
        if route.href.is_none() {
            if let Pattern::Path(path) = &route.path {
                let hash = if self.inner.router.mode() == Mode::Hash { "#" } else { "" };
                route.href = Some(format!("{hash}{}{path}", self.inner.router.root()));
            }
        }

        let handler = self.generate_handler(&route);
        route.handler = Some(handler.clone());
        self.inner.router.add(route.path.clone(), [handler])?;

        let key = route.key();
        info_log!("Bound route '{}' to {:?}", key, route.viewmodel);
        self.inner.routes.lock().insert(key, route.clone());
        Ok(route)
    }

    /// Remove a route registered with [`route`](Self::route).
    pub fn deroute(&self, route: &ViewModelRoute) -> Result<()> {
        let key = route.key();
        let Some(registered) = self.inner.routes.lock().shift_remove(&key) else {
            return Ok(());
        };
        let handler = route.handler.clone().or(registered.handler);
        if let Some(handler) = handler {
            self.inner.router.remove(registered.path, [handler])?;
        }
        info_log!("Unbound route '{}'", key);
        Ok(())
    }

    /// Activate `route` when no other route matches.
    pub fn not_found(&self, route: ViewModelRoute) -> &Self {
        let handler = self.generate_handler(&route);
        self.inner.router.none([handler]);
        self
    }

    /// Register `child` (or a new router rooted at `prefix`) for every
    /// fragment below `prefix`.
    pub fn child(&self, prefix: &str, child: Option<ViewModelRouter>) -> Result<ViewModelRouter> {
        let child = child.unwrap_or_else(|| {
            let router = Router::with_options(
                self.inner.router.location().clone(),
                self.inner.router.child_options(prefix),
            );
            Self::from_router(router, self.inner.loader.clone())
        });
        let target = child.clone();
        self.inner.router.delegate(prefix, move |fragment| {
            let target = target.clone();
            async move { target.handle(fragment).await }.boxed()
        })?;
        Ok(child)
    }

    /// Visible routes, in registration order.
    pub fn navigation(&self) -> Vec<ViewModelRoute> {
        self.inner
            .routes
            .lock()
            .values()
            .filter(|route| route.visible.get())
            .cloned()
            .collect()
    }

    /// Stop, forget every route, and reset the current route and the slot.
    pub fn clear(&self) {
        self.inner.router.clear();
        self.inner.routes.lock().clear();
        *self.inner.current.lock() = None;
        self.inner.slot.reset();
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dispatch a fragment through the router core.
    pub async fn handle(&self, fragment: impl Into<Fragment>) -> Result<()> {
        self.inner.router.handle(fragment).await
    }

    /// Push `path` onto the location.
    pub fn navigate(&self, path: &str) {
        self.inner.router.navigate(path);
    }

    // ========================================================================
    // Outlets
    // ========================================================================

    /// Compose every future view-model into `region`, starting with the
    /// current one if any. The outlet is detached once `region` leaves the
    /// document.
    pub async fn attach_outlet(&self, engine: CompositionEngine, region: NodeId) -> Result<()> {
        let outlet = Outlet { engine, region };
        {
            let mut outlets = self.inner.outlets.lock();
            outlets.retain(|existing| existing.region != region);
            outlets.push(outlet.clone());
        }
        if self.inner.watched.lock().insert(region) {
            let weak = Arc::downgrade(&self.inner);
            outlet.engine.dom().on_removed(
                region,
                Box::new(move |node| {
                    if let Some(inner) = weak.upgrade() {
                        inner.watched.lock().remove(&node);
                        inner.outlets.lock().retain(|outlet| outlet.region != node);
                        debug_log!("Outlet {} left the document", node);
                    }
                    future::ready(()).boxed()
                }),
            );
        }
        debug_log!("Attached outlet {}", region);

        let current = self.inner.current.lock().as_ref().map(|current| {
            (current.route.clone(), current.args.clone())
        });
        match (current, self.inner.slot.get()) {
            (Some((route, args)), Some(viewmodel)) => {
                compose_outlets(&[outlet], &route, &viewmodel, &args).await
            }
            _ => Ok(()),
        }
    }

    /// Stop composing into `region`.
    pub fn detach_outlet(&self, region: NodeId) {
        self.inner.outlets.lock().retain(|outlet| outlet.region != region);
    }

    fn generate_handler(&self, route: &ViewModelRoute) -> Arc<dyn RouteHandler> {
        let weak = Arc::downgrade(&self.inner);
        let route = Arc::new(route.clone());
        handler_fn(move |args: Args| run_route(weak.clone(), route.clone(), args))
    }
}

async fn run_route(weak: Weak<BinderInner>, route: Arc<ViewModelRoute>, args: Args) -> Result<Flow> {
    let Some(inner) = weak.upgrade() else {
        return Ok(Flow::Continue);
    };

    let old = inner.current.lock().replace(CurrentRoute {
        route: route.clone(),
        args: args.clone(),
    });
    trace_log!("Route '{}' matched with {:?}", route.key(), args);

    match enter_route(&inner, &route, &args).await {
        Ok(()) => Ok(Flow::Continue),
        Err(err) => {
            *inner.current.lock() = old;
            Err(err)
        }
    }
}

async fn enter_route(inner: &BinderInner, route: &ViewModelRoute, args: &Args) -> Result<()> {
    inner.slot.set_args(args.clone());
    let viewmodel = inner.slot.set(Some(route.viewmodel.clone())).await?;

    let title = viewmodel
        .as_ref()
        .and_then(|viewmodel| viewmodel.viewmodel().title())
        .or_else(|| route.title.get());
    if let Some(title) = title.filter(|title| !title.is_empty()) {
        inner.router.location().set_title(&title);
    }

    let Some(viewmodel) = viewmodel else {
        return Ok(());
    };
    let outlets = inner.outlets.lock().clone();
    compose_outlets(&outlets, route, &viewmodel, args).await
}

async fn compose_outlets(
    outlets: &[Outlet],
    route: &ViewModelRoute,
    viewmodel: &ViewModelHandle,
    args: &Args,
) -> Result<()> {
    let compositions = outlets.iter().map(|outlet| {
        let options = route.composition(viewmodel.clone(), args.clone());
        outlet.engine.compose(outlet.region, options)
    });
    future::try_join_all(compositions).await?;
    Ok(())
}

impl fmt::Debug for ViewModelRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModelRouter")
            .field("router", &self.inner.router)
            .field("routes", &self.inner.routes.lock().len())
            .field("outlets", &self.inner.outlets.lock().len())
            .finish()
    }
}
