//! Reactive-layer integration.
//!
//! The host's binding layer exposes a [`BindingRegistry`]; [`install`]
//! registers two handlers on it:
//!
//! - `compose` ([`ComposeBinding`]) composes its value into the bound
//!   element on every update;
//! - `router` ([`RouterBinding`]) attaches the bound element as an outlet of
//!   a [`ViewModelRouter`] on init.
//!
//! Both control their descendants' bindings and may be used on virtual
//! elements. The `compose-region` and `router-region` components wrap them.
//! Failures are logged, never returned to the binding layer.

use crate::binder::ViewModelRouter;
use crate::composer::{CompositionEngine, CompositionOptions};
use crate::dom::NodeId;
use crate::{debug_log, error_log, warn_log};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Name of the composition binding.
pub const COMPOSE_BINDING: &str = "compose";

/// Name of the router binding.
pub const ROUTER_BINDING: &str = "router";

/// Future returned by binding callbacks.
pub type BindingFuture = BoxFuture<'static, ()>;

// ============================================================================
// Values
// ============================================================================

/// Which router a `router` binding follows.
#[derive(Clone, Default)]
pub enum RouterBindingValue {
    /// The router passed to [`install`].
    #[default]
    Default,
    /// A specific router.
    Router(ViewModelRouter),
}

impl RouterBindingValue {
    fn resolve(self, default: &ViewModelRouter) -> ViewModelRouter {
        match self {
            Self::Default => default.clone(),
            Self::Router(router) => router,
        }
    }
}

impl From<ViewModelRouter> for RouterBindingValue {
    fn from(router: ViewModelRouter) -> Self {
        Self::Router(router)
    }
}

impl From<Option<ViewModelRouter>> for RouterBindingValue {
    fn from(router: Option<ViewModelRouter>) -> Self {
        router.map_or(Self::Default, Self::Router)
    }
}

impl fmt::Debug for RouterBindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Router(router) => f.debug_tuple("Router").field(router).finish(),
        }
    }
}

/// Value handed to a binding handler.
#[derive(Debug, Clone)]
pub enum BindingValue {
    /// Options for `compose`.
    Compose(CompositionOptions),
    /// Router for `router`.
    Router(RouterBindingValue),
}

impl From<CompositionOptions> for BindingValue {
    fn from(options: CompositionOptions) -> Self {
        Self::Compose(options)
    }
}

impl From<RouterBindingValue> for BindingValue {
    fn from(value: RouterBindingValue) -> Self {
        Self::Router(value)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// A binding handler as seen by the host's binding layer.
pub trait BindingHandler: Send + Sync + 'static {
    /// Binding name.
    fn name(&self) -> &'static str;

    /// First application to `element`.
    fn init(&self, _element: NodeId, _value: BindingValue) -> BindingFuture {
        future::ready(()).boxed()
    }

    /// Every time the bound value changes, including the first time.
    fn update(&self, _element: NodeId, _value: BindingValue) -> BindingFuture {
        future::ready(()).boxed()
    }

    /// `true` when the handler binds the element's descendants itself.
    fn controls_descendant_bindings(&self) -> bool {
        false
    }
}

/// `compose` binding.
#[derive(Debug, Clone)]
pub struct ComposeBinding {
    engine: CompositionEngine,
}

impl ComposeBinding {
    /// Binding composing through `engine`.
    pub fn new(engine: CompositionEngine) -> Self {
        Self { engine }
    }
}

impl BindingHandler for ComposeBinding {
    fn name(&self) -> &'static str {
        COMPOSE_BINDING
    }

    fn update(&self, element: NodeId, value: BindingValue) -> BindingFuture {
        let BindingValue::Compose(options) = value else {
            warn_log!("compose binding on {} expects composition options", element);
            return future::ready(()).boxed();
        };
        let engine = self.engine.clone();
        async move {
            if let Err(err) = engine.compose(element, options).await {
                error_log!("{}", err);
            }
        }
        .boxed()
    }

    fn controls_descendant_bindings(&self) -> bool {
        true
    }
}

/// `router` binding.
#[derive(Debug, Clone)]
pub struct RouterBinding {
    engine: CompositionEngine,
    default_router: ViewModelRouter,
}

impl RouterBinding {
    /// Binding attaching outlets through `engine`, following
    /// `default_router` unless told otherwise.
    pub fn new(engine: CompositionEngine, default_router: ViewModelRouter) -> Self {
        Self {
            engine,
            default_router,
        }
    }
}

impl BindingHandler for RouterBinding {
    fn name(&self) -> &'static str {
        ROUTER_BINDING
    }

    fn init(&self, element: NodeId, value: BindingValue) -> BindingFuture {
        let BindingValue::Router(value) = value else {
            warn_log!("router binding on {} expects a router", element);
            return future::ready(()).boxed();
        };
        let router = value.resolve(&self.default_router);
        let engine = self.engine.clone();
        async move {
            if let Err(err) = router.attach_outlet(engine, element).await {
                error_log!("{}", err);
            }
        }
        .boxed()
    }

    fn controls_descendant_bindings(&self) -> bool {
        true
    }
}

// ============================================================================
// Registry
// ============================================================================

/// A zero-argument component whose template applies one binding to its
/// own data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDefinition {
    /// Component tag name.
    pub name: String,
    /// Markup of the component.
    pub template: String,
}

impl ComponentDefinition {
    /// Component named `name` applying `binding` on a virtual element.
    pub fn wrapping(name: impl Into<String>, binding: &str) -> Self {
        Self {
            name: name.into(),
            template: format!("<!-- {binding}: $data --><!-- /{binding} -->"),
        }
    }
}

/// Where binding handlers and components are registered.
pub trait BindingRegistry {
    /// Register `handler` under `name`.
    fn register_handler(&self, name: &str, handler: Arc<dyn BindingHandler>);

    /// Allow `name` on virtual elements.
    fn allow_virtual(&self, name: &str);

    /// Register a component.
    fn register_component(&self, component: ComponentDefinition);
}

/// Register the `compose` and `router` bindings and their components.
pub fn install(
    registry: &dyn BindingRegistry,
    engine: CompositionEngine,
    default_router: ViewModelRouter,
) {
    let compose = ComposeBinding::new(engine.clone());
    let router = RouterBinding::new(engine, default_router);

    registry.register_handler(COMPOSE_BINDING, Arc::new(compose));
    registry.allow_virtual(COMPOSE_BINDING);
    registry.register_component(ComponentDefinition::wrapping("compose-region", COMPOSE_BINDING));

    registry.register_handler(ROUTER_BINDING, Arc::new(router));
    registry.allow_virtual(ROUTER_BINDING);
    registry.register_component(ComponentDefinition::wrapping("router-region", ROUTER_BINDING));

    debug_log!("Installed compose and router bindings");
}

#[derive(Default)]
struct RegistryState {
    handlers: HashMap<String, Arc<dyn BindingHandler>>,
    virtual_allowed: HashSet<String>,
    components: HashMap<String, ComponentDefinition>,
}

/// In-memory [`BindingRegistry`] for headless hosts and tests.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler registered under `name`.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn BindingHandler>> {
        self.state.lock().handlers.get(name).cloned()
    }

    /// `true` if `name` may be used on virtual elements.
    pub fn is_virtual_allowed(&self, name: &str) -> bool {
        self.state.lock().virtual_allowed.contains(name)
    }

    /// Component registered under `name`.
    pub fn component(&self, name: &str) -> Option<ComponentDefinition> {
        self.state.lock().components.get(name).cloned()
    }
}

impl BindingRegistry for MemoryRegistry {
    fn register_handler(&self, name: &str, handler: Arc<dyn BindingHandler>) {
        self.state.lock().handlers.insert(name.to_string(), handler);
    }

    fn allow_virtual(&self, name: &str) {
        self.state.lock().virtual_allowed.insert(name.to_string());
    }

    fn register_component(&self, component: ComponentDefinition) {
        self.state
            .lock()
            .components
            .insert(component.name.clone(), component);
    }
}

impl fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let mut handlers: Vec<_> = state.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("MemoryRegistry")
            .field("handlers", &handlers)
            .field("components", &state.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;
    use crate::loader::StaticLoader;
    use crate::location::MemoryLocation;
    use crate::viewmodel::{ViewModel, ViewModelHandle};

    struct Page;
    impl ViewModel for Page {}

    fn fixture() -> (MemoryRegistry, Arc<MemoryDocument>, ViewModelRouter) {
        let loader = Arc::new(StaticLoader::new());
        let document = Arc::new(MemoryDocument::new());
        let engine = CompositionEngine::from_document(document.clone(), loader.clone());
        let router = ViewModelRouter::new(Arc::new(MemoryLocation::new()), loader);
        let registry = MemoryRegistry::new();
        install(&registry, engine, router.clone());
        (registry, document, router)
    }

    #[test]
    fn test_install_registers_everything() {
        let (registry, _, _) = fixture();

        for name in [COMPOSE_BINDING, ROUTER_BINDING] {
            let handler = registry.handler(name).unwrap();
            assert_eq!(handler.name(), name);
            assert!(handler.controls_descendant_bindings());
            assert!(registry.is_virtual_allowed(name));
        }
        assert_eq!(
            registry.component("compose-region").unwrap().template,
            "<!-- compose: $data --><!-- /compose -->"
        );
        assert!(registry.component("router-region").is_some());
    }

    #[tokio::test]
    async fn test_compose_binding_composes() {
        let (registry, document, _) = fixture();
        let region = document.create_element("div", None);
        let vm = ViewModelHandle::new(Page);

        let compose = registry.handler(COMPOSE_BINDING).unwrap();
        let options = CompositionOptions::new(vm.clone()).view("<p>page</p>");
        compose.update(region, options.into()).await;

        assert_eq!(document.bound_viewmodel(region), Some(vm));
    }

    #[tokio::test]
    async fn test_compose_binding_logs_failures() {
        let (registry, document, _) = fixture();
        let region = document.create_element("div", None);

        let compose = registry.handler(COMPOSE_BINDING).unwrap();
        let options = CompositionOptions::new(ViewModelHandle::new(Page));
        compose.update(region, options.into()).await;

        assert_eq!(document.bound_viewmodel(region), None);
    }

    #[tokio::test]
    async fn test_wrong_value_is_ignored() {
        let (registry, document, _) = fixture();
        let region = document.create_element("div", None);

        let router = registry.handler(ROUTER_BINDING).unwrap();
        let options = CompositionOptions::new(ViewModelHandle::new(Page));
        router.init(region, options.into()).await;
        assert_eq!(document.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_router_binding_uses_default_router() {
        let (registry, document, router) = fixture();
        let vm = ViewModelHandle::new(Page);
        router
            .route(crate::binder::ViewModelRoute::new("home", vm.clone()).view("<p>home</p>"))
            .unwrap();
        router.handle("home").await.unwrap();

        let region = document.create_element("main", None);
        let binding = registry.handler(ROUTER_BINDING).unwrap();
        binding
            .init(region, RouterBindingValue::default().into())
            .await;

        assert_eq!(document.bound_viewmodel(region), Some(vm));
    }
}
