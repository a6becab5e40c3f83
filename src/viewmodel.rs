//! View-model capabilities and references.
//!
//! A view-model is any type implementing [`ViewModel`]. Every lifecycle
//! method has a default body returning [`Hook::Absent`], so an implementation
//! only overrides the hooks it actually cares about:
//!
//! ```
//! use compose_navigator::{Arg, Hook, ViewModel, ViewModelHandle};
//!
//! struct Dashboard;
//!
//! impl ViewModel for Dashboard {
//!     fn activate(&self, args: &[Arg]) -> Hook {
//!         println!("loading dashboard for {:?}", args);
//!         Hook::done()
//!     }
//!
//!     fn title(&self) -> Option<String> {
//!         Some("Dashboard".into())
//!     }
//! }
//!
//! let vm = ViewModelHandle::new(Dashboard);
//! assert!(!vm.is_activated());
//! ```
//!
//! The engine never works with bare view-models. It works with
//! [`ViewModelHandle`]s (identity + activation state),
//! [`ViewModelRef`]s ("a view-model or a factory producing one") and
//! [`ViewModelSource`]s (a reference, or a module identifier to load).

use crate::dom::NodeId;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// One positional argument. `None` stands for an optional route segment that
/// did not participate in the match.
pub type Arg = Option<String>;

/// Positional arguments passed to `activate` and the completion hooks.
pub type Args = Vec<Arg>;

/// Future returned by an asynchronous hook.
pub type HookFuture = BoxFuture<'static, Result<()>>;

// ============================================================================
// Hook
// ============================================================================

/// What a lifecycle method hands back to the engine.
///
/// `Ready(Err(_))` is the synchronous-throw case and `Pending` resolving to
/// `Err(_)` the asynchronous-reject case; [`lifecycle::invoke`] treats both
/// the same way.
///
/// [`lifecycle::invoke`]: crate::lifecycle::invoke
pub enum Hook {
    /// The view-model does not implement this hook.
    Absent,
    /// The hook ran synchronously.
    Ready(Result<()>),
    /// The hook completes asynchronously.
    Pending(HookFuture),
}

impl Hook {
    /// A hook that ran and succeeded synchronously.
    pub fn done() -> Self {
        Self::Ready(Ok(()))
    }

    /// A hook that failed synchronously.
    pub fn fail(err: Error) -> Self {
        Self::Ready(Err(err))
    }

    /// A hook completing with `future`.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Pending(future.boxed())
    }

    /// The "has capability" test.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<Result<()>> for Hook {
    fn from(result: Result<()>) -> Self {
        Self::Ready(result)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Hook::Absent"),
            Self::Ready(result) => f.debug_tuple("Hook::Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Hook::Pending(..)"),
        }
    }
}

// ============================================================================
// ViewModel
// ============================================================================

/// A unit of UI behaviour that can be activated and bound into a region.
///
/// None of the methods are required.
pub trait ViewModel: Send + Sync + 'static {
    /// One-time startup work when the view-model is passed to
    /// [`bootstrap::start`](crate::bootstrap::start) as an initializer.
    fn init(&self) -> Hook {
        Hook::Absent
    }

    /// Make the view-model live. Receives the activation arguments.
    fn activate(&self, _args: &[Arg]) -> Hook {
        Hook::Absent
    }

    /// Undo activation. `closing` is `false` when the same instance is being
    /// swapped for itself and `true` for a genuine replacement.
    fn deactivate(&self, _closing: bool) -> Hook {
        Hook::Absent
    }

    /// The view was cloned into `node` and bindings were applied.
    fn binding_complete(&self, _node: NodeId, _args: &[Arg]) -> Hook {
        Hook::Absent
    }

    /// Every nested binding inside `node` has completed.
    fn descendants_complete(&self, _node: NodeId, _args: &[Arg]) -> Hook {
        Hook::Absent
    }

    /// The whole composition is finished.
    fn composition_complete(&self, _args: &[Arg]) -> Hook {
        Hook::Absent
    }

    /// The owning region left the document.
    fn dispose(&self) -> Hook {
        Hook::Absent
    }

    /// Provide the view to compose, overriding the one in the options.
    fn view(&self, _args: &[Arg]) -> Option<View> {
        None
    }

    /// Page title used by the router once this view-model is active.
    fn title(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// View
// ============================================================================

/// Markup or nodes to clone into a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Literal markup when it contains `<`, a logical view name otherwise.
    Markup(String),
    /// An existing node sequence, used as is.
    Nodes(Vec<NodeId>),
    /// A document fragment whose children are used.
    Fragment(NodeId),
}

impl View {
    /// Markup or logical view name.
    pub fn markup(text: impl Into<String>) -> Self {
        Self::Markup(text.into())
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        Self::Markup(text.to_string())
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        Self::Markup(text)
    }
}

// ============================================================================
// ViewModelHandle
// ============================================================================

/// Activation state of a single view-model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Not live. Initial state.
    #[default]
    Inactive,
    /// `activate` hook in flight.
    Activating,
    /// `activate` resolved and no deactivation resolved since.
    Active,
    /// `deactivate` hook in flight.
    Deactivating,
}

struct HandleInner {
    viewmodel: Arc<dyn ViewModel>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    state: Mutex<ActivationState>,
}

/// Shared, identity-carrying handle to a view-model instance.
///
/// Clones refer to the same instance; [`ptr_eq`](Self::ptr_eq) is the
/// reference equality the composition engine uses to detect no-op swaps.
#[derive(Clone)]
pub struct ViewModelHandle {
    inner: Arc<HandleInner>,
}

impl ViewModelHandle {
    /// Wrap a view-model. The handle starts [`ActivationState::Inactive`].
    pub fn new<V: ViewModel>(viewmodel: V) -> Self {
        let viewmodel = Arc::new(viewmodel);
        Self {
            inner: Arc::new(HandleInner {
                viewmodel: viewmodel.clone(),
                any: viewmodel,
                type_name: std::any::type_name::<V>(),
                state: Mutex::new(ActivationState::Inactive),
            }),
        }
    }

    /// The wrapped view-model.
    pub fn viewmodel(&self) -> &dyn ViewModel {
        self.inner.viewmodel.as_ref()
    }

    /// Downcast to the concrete view-model type.
    pub fn downcast_ref<V: ViewModel>(&self) -> Option<&V> {
        self.inner.any.downcast_ref::<V>()
    }

    /// Name of the concrete view-model type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Current activation state.
    pub fn state(&self) -> ActivationState {
        *self.inner.state.lock()
    }

    /// The `activated` flag.
    pub fn is_activated(&self) -> bool {
        self.state() == ActivationState::Active
    }

    /// Reference equality.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Move to `to` if the current state satisfies `allowed`. Returns the
    /// state observed before the attempt.
    pub(crate) fn transition(
        &self,
        allowed: impl FnOnce(ActivationState) -> bool,
        to: ActivationState,
    ) -> std::result::Result<ActivationState, ActivationState> {
        let mut state = self.inner.state.lock();
        let observed = *state;
        if allowed(observed) {
            *state = to;
            Ok(observed)
        } else {
            Err(observed)
        }
    }

    pub(crate) fn set_state(&self, to: ActivationState) {
        *self.inner.state.lock() = to;
    }
}

impl PartialEq for ViewModelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ViewModelHandle {}

impl fmt::Debug for ViewModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModelHandle")
            .field("type", &self.inner.type_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ViewModelFactory / ViewModelRef / ViewModelSource
// ============================================================================

/// Zero-argument constructor for a view-model.
///
/// Implemented for every `Fn() -> ViewModelHandle`. Implement it by hand to
/// also expose a constructor-level view.
pub trait ViewModelFactory: Send + Sync + 'static {
    /// Produce a fresh instance.
    fn construct(&self) -> ViewModelHandle;

    /// View used when composing this factory, before any instance exists.
    fn view(&self, _args: &[Arg]) -> Option<View> {
        None
    }
}

impl<F> ViewModelFactory for F
where
    F: Fn() -> ViewModelHandle + Send + Sync + 'static,
{
    fn construct(&self) -> ViewModelHandle {
        self()
    }
}

/// A view-model or something that produces one.
#[derive(Clone)]
pub enum ViewModelRef {
    /// An existing instance.
    Instance(ViewModelHandle),
    /// A constructor invoked on [`construct`](crate::lifecycle::construct).
    Factory(Arc<dyn ViewModelFactory>),
}

impl ViewModelRef {
    /// Reference a factory.
    pub fn factory<F: ViewModelFactory>(factory: F) -> Self {
        Self::Factory(Arc::new(factory))
    }

    /// The instance, when this is not a factory.
    pub fn instance(&self) -> Option<&ViewModelHandle> {
        match self {
            Self::Instance(handle) => Some(handle),
            Self::Factory(_) => None,
        }
    }

    /// `true` when this refers to exactly `handle`.
    pub fn is(&self, handle: &ViewModelHandle) -> bool {
        self.instance().is_some_and(|own| own.ptr_eq(handle))
    }

    /// The view exposed before construction: the instance's view, or the
    /// factory's static view.
    pub fn view(&self, args: &[Arg]) -> Option<View> {
        match self {
            Self::Instance(handle) => handle.viewmodel().view(args),
            Self::Factory(factory) => factory.view(args),
        }
    }
}

impl From<ViewModelHandle> for ViewModelRef {
    fn from(handle: ViewModelHandle) -> Self {
        Self::Instance(handle)
    }
}

impl From<ViewModelHandle> for Option<ViewModelRef> {
    fn from(handle: ViewModelHandle) -> Self {
        Some(ViewModelRef::Instance(handle))
    }
}

impl fmt::Debug for ViewModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(handle) => f.debug_tuple("Instance").field(handle).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// What composition and the activation slot accept.
#[derive(Debug, Clone)]
pub enum ViewModelSource {
    /// A module identifier resolved through the [`Loader`](crate::Loader).
    Module(String),
    /// An instance or a factory.
    Ref(ViewModelRef),
}

impl ViewModelSource {
    /// A module identifier.
    pub fn module(identifier: impl Into<String>) -> Self {
        Self::Module(identifier.into())
    }

    /// The module identifier, if this is one.
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::Module(id) => Some(id),
            Self::Ref(_) => None,
        }
    }

    /// The reference, if this is not a module identifier.
    pub fn reference(&self) -> Option<&ViewModelRef> {
        match self {
            Self::Module(_) => None,
            Self::Ref(reference) => Some(reference),
        }
    }
}

impl From<ViewModelRef> for ViewModelSource {
    fn from(reference: ViewModelRef) -> Self {
        Self::Ref(reference)
    }
}

impl From<ViewModelHandle> for ViewModelSource {
    fn from(handle: ViewModelHandle) -> Self {
        Self::Ref(ViewModelRef::Instance(handle))
    }
}

impl From<&str> for ViewModelSource {
    fn from(identifier: &str) -> Self {
        Self::Module(identifier.to_string())
    }
}
