//! Composition engine.
//!
//! [`CompositionEngine::compose`] binds a view-model to a region of the
//! document: it loads the view-model module and its view, runs the lifecycle
//! (or only constructs, when activation is off), swaps the region's children
//! for a fresh clone of the view and fires the completion hooks in order:
//!
//! 1. `binding_complete(node, args)`
//! 2. `descendants_complete(node, args)`, once the binding layer reports that
//!    every nested binding inside the region has settled
//! 3. `composition_complete(args)`
//!
//! Within a stage the view-model's hook and the matching
//! [`CompositionHooks`] hook run concurrently; the next stage starts once
//! both resolved.
//!
//! The engine keeps one record per region: the view-model bound to it and
//! the handle of its pending descendants-settled wait. Composing the same
//! instance into a region again is a no-op. When the host removes a region
//! from the document, its occupant is deactivated and disposed.
//!
//! ```
//! use compose_navigator::{
//!     CompositionEngine, CompositionOptions, MemoryDocument, StaticLoader, ViewModel,
//!     ViewModelHandle,
//! };
//! use std::sync::Arc;
//!
//! struct Home;
//! impl ViewModel for Home {}
//!
//! let document = Arc::new(MemoryDocument::new());
//! let region = document.create_element("main", Some("content"));
//! let engine = CompositionEngine::from_document(document.clone(), Arc::new(StaticLoader::new()));
//!
//! let options = CompositionOptions::new(ViewModelHandle::new(Home))
//!     .view("<h1>Home</h1>")
//!     .activate(true);
//! let node = pollster::block_on(engine.compose("content", options)).unwrap();
//!
//! assert_eq!(node, region);
//! assert_eq!(document.text_content(region), vec!["<h1>Home</h1>"]);
//! ```

use crate::cache::{CacheStats, ViewCache};
use crate::dom::{BindingLayer, Dom, NodeId};
use crate::error::{CompositionError, Result};
use crate::lifecycle::{self, HookCall};
use crate::loader::Loader;
use crate::viewmodel::{Arg, Args, Hook, View, ViewModelHandle, ViewModelRef, ViewModelSource};
use crate::{debug_log, error_log, trace_log, warn_log};
use futures::channel::oneshot;
use futures::future::{self, AbortHandle, Abortable, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

// ============================================================================
// Options
// ============================================================================

/// Region to compose into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionTarget {
    /// A node of the document.
    Node(NodeId),
    /// The identifier of an element, looked up with [`Dom::element_by_id`].
    Id(String),
}

impl From<NodeId> for RegionTarget {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl From<&str> for RegionTarget {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for RegionTarget {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for RegionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// Completion callbacks supplied by the caller of a composition, fired next
/// to the view-model's own hooks. All default to absent.
pub trait CompositionHooks: Send + Sync + 'static {
    /// Bindings were applied to the region.
    fn binding_complete(&self, _node: NodeId, _viewmodel: &ViewModelHandle, _args: &[Arg]) -> Hook {
        Hook::Absent
    }

    /// Every nested binding inside the region has settled.
    fn descendants_complete(
        &self,
        _node: NodeId,
        _viewmodel: &ViewModelHandle,
        _args: &[Arg],
    ) -> Hook {
        Hook::Absent
    }

    /// The whole composition is done.
    fn composition_complete(&self, _viewmodel: &ViewModelHandle, _args: &[Arg]) -> Hook {
        Hook::Absent
    }
}

/// What to compose and how.
#[derive(Clone)]
pub struct CompositionOptions {
    /// The view-model, or the module exporting it.
    pub viewmodel: ViewModelSource,
    /// The view. Overridden by the view-model's own view when it has one;
    /// defaults to the module identifier for module sources.
    pub view: Option<View>,
    /// Activation and completion-hook arguments.
    pub args: Args,
    /// Run the lifecycle. When off the view-model is only constructed.
    pub activate: bool,
    /// Caller-side completion callbacks.
    pub hooks: Option<Arc<dyn CompositionHooks>>,
}

impl CompositionOptions {
    /// Compose `viewmodel`, without activation.
    pub fn new(viewmodel: impl Into<ViewModelSource>) -> Self {
        Self {
            viewmodel: viewmodel.into(),
            view: None,
            args: Args::new(),
            activate: false,
            hooks: None,
        }
    }

    /// Set the view.
    pub fn view(mut self, view: impl Into<View>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Set the arguments.
    pub fn args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Turn the lifecycle on or off.
    pub fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    /// Set the completion callbacks.
    pub fn hooks(mut self, hooks: impl CompositionHooks) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }
}

impl fmt::Debug for CompositionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionOptions")
            .field("viewmodel", &self.viewmodel)
            .field("view", &self.view)
            .field("args", &self.args)
            .field("activate", &self.activate)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Default)]
struct RegionRecord {
    viewmodel: Option<ViewModelHandle>,
    completion: Option<AbortHandle>,
}

struct EngineInner {
    dom: Arc<dyn Dom>,
    bindings: Arc<dyn BindingLayer>,
    loader: Arc<dyn Loader>,
    views: Mutex<ViewCache>,
    regions: Mutex<HashMap<NodeId, RegionRecord>>,
    // Regions with a removal callback registered on the document.
    watched: Mutex<HashSet<NodeId>>,
}

type Settled = Abortable<oneshot::Receiver<()>>;

/// Binds view-models to document regions.
///
/// Cheap to clone; clones share the view cache and the region records.
#[derive(Clone)]
pub struct CompositionEngine {
    inner: Arc<EngineInner>,
}

impl CompositionEngine {
    /// Engine over a document, a binding layer and a loader.
    pub fn new(dom: Arc<dyn Dom>, bindings: Arc<dyn BindingLayer>, loader: Arc<dyn Loader>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                dom,
                bindings,
                loader,
                views: Mutex::new(ViewCache::new()),
                regions: Mutex::new(HashMap::new()),
                watched: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Engine over a host that is both the document and the binding layer.
    pub fn from_document<D>(document: Arc<D>, loader: Arc<dyn Loader>) -> Self
    where
        D: Dom + BindingLayer,
    {
        Self::new(document.clone(), document, loader)
    }

    /// Replace the view cache, e.g. with a bounded one.
    pub fn with_view_cache(self, cache: ViewCache) -> Self {
        *self.inner.views.lock() = cache;
        self
    }

    /// The loader used for modules and views.
    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.inner.loader
    }

    /// The document the engine mutates.
    pub fn dom(&self) -> &Arc<dyn Dom> {
        &self.inner.dom
    }

    /// Compose into `target` and resolve with the region once every
    /// completion stage has run.
    ///
    /// Failures other than composition errors are wrapped into a
    /// [`CompositionError`] carrying `options.viewmodel`.
    pub async fn compose(
        &self,
        target: impl Into<RegionTarget>,
        options: CompositionOptions,
    ) -> Result<NodeId> {
        let target = target.into();
        let source = options.viewmodel.clone();
        let node = match &target {
            RegionTarget::Node(node) => *node,
            RegionTarget::Id(id) => self.inner.dom.element_by_id(id).ok_or_else(|| {
                CompositionError::new(source.clone(), format!("Can't find element: {id}"))
            })?,
        };

        debug_log!("Composing {:?} into region {}", source, target);
        self.compose_into(node, options)
            .await
            .map_err(|err| CompositionError::wrap(source, err))?;
        Ok(node)
    }

    /// Release the region's pending completion wait, then deactivate and
    /// dispose its occupant. Runs automatically when the host removes the
    /// region from the document.
    pub async fn dispose_region(&self, node: NodeId) -> Result<()> {
        dispose(&self.inner, node).await
    }

    /// The view-model currently bound to `node`.
    pub fn viewmodel_of(&self, node: NodeId) -> Option<ViewModelHandle> {
        self.inner
            .regions
            .lock()
            .get(&node)
            .and_then(|record| record.viewmodel.clone())
    }

    /// View cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        *self.inner.views.lock().stats()
    }

    /// Drop every cached view.
    pub fn clear_view_cache(&self) {
        self.inner.views.lock().clear();
    }

    async fn compose_into(&self, node: NodeId, options: CompositionOptions) -> Result<()> {
        let CompositionOptions {
            viewmodel: source,
            view,
            args,
            activate,
            hooks,
        } = options;

        let (reference, view) = self.load_viewmodel(&source, view).await?;
        let templates = self.load_view(&reference, view, &args).await?;

        let occupant = self.viewmodel_of(node);
        let (old, viewmodel) = if activate {
            let old = lifecycle::deactivate(occupant.as_ref(), Some(&reference)).await?;
            let viewmodel = lifecycle::activate(reference.clone(), &args).await?;
            (old, viewmodel)
        } else {
            (occupant, lifecycle::construct(Some(&reference)))
        };
        let viewmodel = viewmodel.ok_or_else(|| {
            CompositionError::new(source.clone(), "ViewModel module can't be empty!")
        })?;

        if old.as_ref().is_some_and(|old| old.ptr_eq(&viewmodel)) {
            trace_log!(
                "Region {} already holds {}, nothing to do",
                node,
                viewmodel.type_name()
            );
            return Ok(());
        }

        let settled = self.bind(node, &viewmodel, &templates)?;
        self.complete(node, &viewmodel, &args, hooks.as_deref(), settled)
            .await
    }

    async fn load_viewmodel(
        &self,
        source: &ViewModelSource,
        view: Option<View>,
    ) -> Result<(ViewModelRef, Option<View>)> {
        match source {
            ViewModelSource::Ref(reference) => Ok((reference.clone(), view)),
            ViewModelSource::Module(id) => {
                let view = view.or_else(|| Some(View::Markup(id.clone())));
                let reference = self.inner.loader.load_module(id).await?.ok_or_else(|| {
                    CompositionError::new(source.clone(), "ViewModel module can't be empty!")
                })?;
                Ok((reference, view))
            }
        }
    }

    async fn load_view(
        &self,
        reference: &ViewModelRef,
        view: Option<View>,
        args: &[Arg],
    ) -> Result<Vec<NodeId>> {
        let view = reference.view(args).or(view).ok_or_else(|| {
            CompositionError::new(reference.clone().into(), "No view is provided!")
        })?;

        match view {
            View::Markup(text) => self.parse_view(text).await,
            View::Nodes(nodes) => Ok(nodes),
            View::Fragment(fragment) => Ok(self.inner.dom.child_nodes(fragment)),
        }
    }

    /// Template nodes for literal markup or a logical view name, parsed once
    /// per distinct string.
    async fn parse_view(&self, text: String) -> Result<Vec<NodeId>> {
        let cached = self.inner.views.lock().get(&text);
        if let Some(nodes) = cached {
            return Ok(nodes);
        }

        let nodes = if text.contains('<') {
            self.inner.dom.parse_markup(&text)?
        } else {
            let markup = self.inner.loader.load_view(&text).await?;
            let cached = self.inner.views.lock().get(&markup);
            match cached {
                Some(nodes) => nodes,
                None => {
                    let nodes = self.inner.dom.parse_markup(&markup)?;
                    self.inner.views.lock().insert(markup, nodes.clone());
                    nodes
                }
            }
        };

        self.inner.views.lock().insert(text, nodes.clone());
        Ok(nodes)
    }

    fn bind(
        &self,
        node: NodeId,
        viewmodel: &ViewModelHandle,
        templates: &[NodeId],
    ) -> Result<Settled> {
        let dom = &self.inner.dom;

        if self.inner.watched.lock().insert(node) {
            let engine = Arc::downgrade(&self.inner);
            dom.on_removed(node, Box::new(move |node| on_region_removed(engine, node)));
        }

        dom.empty_node(node);
        let clones = templates.iter().map(|t| dom.clone_node(*t)).collect();
        dom.set_children(node, clones);

        let (handle, registration) = AbortHandle::new_pair();
        let settled = Abortable::new(self.inner.bindings.descendants_complete(node), registration);
        let previous = self
            .inner
            .regions
            .lock()
            .entry(node)
            .or_default()
            .completion
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        self.inner
            .bindings
            .apply_bindings_to_descendants(viewmodel, node)?;
        self.inner.regions.lock().entry(node).or_default().viewmodel = Some(viewmodel.clone());

        debug_log!("Bound {} to region {}", viewmodel.type_name(), node);
        Ok(settled)
    }

    async fn complete(
        &self,
        node: NodeId,
        viewmodel: &ViewModelHandle,
        args: &[Arg],
        hooks: Option<&dyn CompositionHooks>,
        settled: Settled,
    ) -> Result<()> {
        let vm = viewmodel.viewmodel();

        future::try_join(
            lifecycle::call(vm, HookCall::BindingComplete { node, args }),
            lifecycle::invoke(hooks.map_or(Hook::Absent, |h| {
                h.binding_complete(node, viewmodel, args)
            })),
        )
        .await?;

        match settled.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                warn_log!(
                    "Descendants of region {} never settled for {}, skipping completion",
                    node,
                    viewmodel.type_name()
                );
                return Ok(());
            }
        }

        future::try_join(
            lifecycle::call(vm, HookCall::DescendantsComplete { node, args }),
            lifecycle::invoke(hooks.map_or(Hook::Absent, |h| {
                h.descendants_complete(node, viewmodel, args)
            })),
        )
        .await?;

        future::try_join(
            lifecycle::call(vm, HookCall::CompositionComplete(args)),
            lifecycle::invoke(hooks.map_or(Hook::Absent, |h| {
                h.composition_complete(viewmodel, args)
            })),
        )
        .await?;

        trace_log!("Composition of region {} complete", node);
        Ok(())
    }
}

impl fmt::Debug for CompositionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionEngine")
            .field("regions", &self.inner.regions.lock().len())
            .field("views", &self.inner.views.lock().len())
            .finish()
    }
}

fn on_region_removed(engine: Weak<EngineInner>, node: NodeId) -> BoxFuture<'static, ()> {
    async move {
        let Some(engine) = engine.upgrade() else {
            return;
        };
        engine.watched.lock().remove(&node);
        if let Err(err) = dispose(&engine, node).await {
            error_log!("Disposing region {} failed: {}", node, err);
        }
    }
    .boxed()
}

async fn dispose(engine: &EngineInner, node: NodeId) -> Result<()> {
    let record = engine.regions.lock().remove(&node);
    let Some(record) = record else {
        return Ok(());
    };
    if let Some(completion) = record.completion {
        completion.abort();
    }
    let Some(viewmodel) = record.viewmodel else {
        return Ok(());
    };

    debug_log!("Disposing {} from region {}", viewmodel.type_name(), node);
    // Dispose runs even when deactivation fails; the first error wins.
    let deactivated = lifecycle::deactivate(Some(&viewmodel), None).await;
    let disposed = lifecycle::call(viewmodel.viewmodel(), HookCall::Dispose).await;
    deactivated.and(disposed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;
    use crate::error::Error;
    use crate::loader::StaticLoader;
    use crate::viewmodel::ViewModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        activations: AtomicUsize,
        completions: AtomicUsize,
        disposals: AtomicUsize,
    }

    impl ViewModel for Counting {
        fn activate(&self, _args: &[Arg]) -> Hook {
            self.activations.fetch_add(1, Ordering::SeqCst);
            Hook::Absent
        }

        fn composition_complete(&self, _args: &[Arg]) -> Hook {
            self.completions.fetch_add(1, Ordering::SeqCst);
            Hook::done()
        }

        fn dispose(&self) -> Hook {
            self.disposals.fetch_add(1, Ordering::SeqCst);
            Hook::done()
        }
    }

    fn setup() -> (Arc<MemoryDocument>, Arc<StaticLoader>, CompositionEngine, NodeId) {
        let document = Arc::new(MemoryDocument::new());
        let loader = Arc::new(StaticLoader::new());
        let region = document.create_element("div", Some("region"));
        let engine = CompositionEngine::from_document(document.clone(), loader.clone());
        (document, loader, engine, region)
    }

    fn composition_message(err: &Error) -> &str {
        match err {
            Error::Composition(inner) => inner.message(),
            other => panic!("expected a composition error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_region() {
        let (_, _, engine, _) = setup();
        let err = engine
            .compose("nowhere", CompositionOptions::new("shell"))
            .await
            .unwrap_err();
        assert_eq!(composition_message(&err), "Can't find element: nowhere");
    }

    #[tokio::test]
    async fn test_empty_module() {
        let (_, loader, engine, _) = setup();
        loader.register_empty_module("shell");
        let err = engine
            .compose("region", CompositionOptions::new("shell"))
            .await
            .unwrap_err();
        assert_eq!(composition_message(&err), "ViewModel module can't be empty!");
    }

    #[tokio::test]
    async fn test_no_view() {
        let (_, _, engine, _) = setup();
        let vm = ViewModelHandle::new(Counting::default());
        let err = engine
            .compose("region", CompositionOptions::new(vm))
            .await
            .unwrap_err();
        assert_eq!(composition_message(&err), "No view is provided!");
    }

    #[tokio::test]
    async fn test_module_view_defaults_to_identifier() {
        let (document, loader, engine, region) = setup();
        loader.register_module("shell", ViewModelHandle::new(Counting::default()));
        loader.register_view("shell", "<nav>shell</nav>");

        engine
            .compose(region, CompositionOptions::new("shell"))
            .await
            .unwrap();
        assert_eq!(document.text_content(region), vec!["<nav>shell</nav>"]);
    }

    #[tokio::test]
    async fn test_activate_and_complete() {
        let (document, _, engine, region) = setup();
        let vm = ViewModelHandle::new(Counting::default());

        engine
            .compose(
                region,
                CompositionOptions::new(vm.clone())
                    .view("<p>hi</p>")
                    .activate(true),
            )
            .await
            .unwrap();

        let counting = vm.downcast_ref::<Counting>().unwrap();
        assert!(vm.is_activated());
        assert_eq!(counting.activations.load(Ordering::SeqCst), 1);
        assert_eq!(counting.completions.load(Ordering::SeqCst), 1);
        assert_eq!(engine.viewmodel_of(region), Some(vm.clone()));
        assert_eq!(document.bound_viewmodel(region), Some(vm));
    }

    #[tokio::test]
    async fn test_without_activation_only_constructs() {
        let (_, _, engine, region) = setup();
        let vm = ViewModelHandle::new(Counting::default());

        engine
            .compose(region, CompositionOptions::new(vm.clone()).view("<p>hi</p>"))
            .await
            .unwrap();

        assert!(!vm.is_activated());
        assert_eq!(engine.viewmodel_of(region), Some(vm));
    }

    #[tokio::test]
    async fn test_same_instance_is_noop() {
        let (document, _, engine, region) = setup();
        let vm = ViewModelHandle::new(Counting::default());
        let options = CompositionOptions::new(vm.clone())
            .view("<p>hi</p>")
            .activate(true);

        engine.compose(region, options.clone()).await.unwrap();
        let mutations = document.mutation_count();
        engine.compose(region, options).await.unwrap();

        assert_eq!(document.mutation_count(), mutations);
        let counting = vm.downcast_ref::<Counting>().unwrap();
        assert_eq!(counting.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_markup_is_parsed_once() {
        let (document, _, engine, region) = setup();
        for _ in 0..3 {
            let vm = ViewModelHandle::new(Counting::default());
            engine
                .compose(region, CompositionOptions::new(vm).view("<p>same</p>"))
                .await
                .unwrap();
        }
        assert_eq!(document.parse_count(), 1);
        assert_eq!(engine.cache_stats().hits, 2);
    }

    #[tokio::test]
    async fn test_hook_failure_is_wrapped() {
        struct Broken;
        impl ViewModel for Broken {
            fn binding_complete(&self, _node: NodeId, _args: &[Arg]) -> Hook {
                Hook::fail(Error::msg("binding exploded"))
            }
        }

        let (_, _, engine, region) = setup();
        let err = engine
            .compose(
                region,
                CompositionOptions::new(ViewModelHandle::new(Broken)).view("<p>x</p>"),
            )
            .await
            .unwrap_err();

        let Error::Composition(inner) = &err else {
            panic!("expected a composition error");
        };
        assert_eq!(inner.message(), "binding exploded");
        assert!(inner.viewmodel().reference().is_some());
    }

    #[tokio::test]
    async fn test_region_removal_disposes() {
        let (document, _, engine, region) = setup();
        let vm = ViewModelHandle::new(Counting::default());
        engine
            .compose(
                region,
                CompositionOptions::new(vm.clone())
                    .view("<p>hi</p>")
                    .activate(true),
            )
            .await
            .unwrap();

        document.remove_node(region).await;

        let counting = vm.downcast_ref::<Counting>().unwrap();
        assert!(!vm.is_activated());
        assert_eq!(counting.disposals.load(Ordering::SeqCst), 1);
        assert!(engine.viewmodel_of(region).is_none());
    }
}
