//! View-model lifecycle controller.
//!
//! Free functions that drive a view-model through
//! construct → activate → deactivate, tolerating missing hooks and treating a
//! synchronous failure and an asynchronous failure the same way.
//!
//! # State machine
//!
//! ```text
//!              activate ok
//! Inactive ──► Activating ──────────► Active
//!    ▲             │ activate err        │
//!    └─────────────┘                     │ deactivate
//!    ▲                                   ▼
//!    └──────────────────────────── Deactivating
//!          deactivate ok      (deactivate err → Active)
//! ```
//!
//! `activate` only runs the hook from `Inactive`; in any other state it is a
//! no-op resolving with the instance. `deactivate` only runs the hook from
//! `Active`.
//!
//! Dropping an `activate` future mid-hook puts the instance back to
//! `Inactive`; dropping a `deactivate` future puts it back to `Active`.
//!
//! Every hook, lifecycle or completion, goes through [`invoke`].

use crate::dom::NodeId;
use crate::error::Result;
use crate::viewmodel::{
    ActivationState, Arg, Hook, ViewModel, ViewModelHandle, ViewModelRef,
};
use crate::{debug_log, trace_log};
use std::future::Future;

/// A named lifecycle hook together with its arguments.
#[derive(Debug, Clone, Copy)]
pub enum HookCall<'a> {
    /// `activate(args)`
    Activate(&'a [Arg]),
    /// `deactivate(closing)`
    Deactivate {
        /// `false` when swapping an instance for itself.
        closing: bool,
    },
    /// `binding_complete(node, args)`
    BindingComplete {
        /// The region.
        node: NodeId,
        /// Composition arguments.
        args: &'a [Arg],
    },
    /// `descendants_complete(node, args)`
    DescendantsComplete {
        /// The region.
        node: NodeId,
        /// Composition arguments.
        args: &'a [Arg],
    },
    /// `composition_complete(args)`
    CompositionComplete(&'a [Arg]),
    /// `dispose()`
    Dispose,
    /// `init()`
    Init,
}

impl HookCall<'_> {
    /// Hook name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activate(_) => "activate",
            Self::Deactivate { .. } => "deactivate",
            Self::BindingComplete { .. } => "bindingComplete",
            Self::DescendantsComplete { .. } => "descendantsComplete",
            Self::CompositionComplete(_) => "compositionComplete",
            Self::Dispose => "dispose",
            Self::Init => "init",
        }
    }
}

/// Resolve a reference to an instance: factories are invoked, instances are
/// returned unchanged, absence propagates.
pub fn construct(reference: Option<&ViewModelRef>) -> Option<ViewModelHandle> {
    match reference? {
        ViewModelRef::Instance(handle) => Some(handle.clone()),
        ViewModelRef::Factory(factory) => Some(factory.construct()),
    }
}

/// Normalise a hook outcome: absent resolves `Ok(())`, a ready result is
/// returned as is, a pending one is awaited.
pub async fn invoke(hook: Hook) -> Result<()> {
    match hook {
        Hook::Absent => Ok(()),
        Hook::Ready(result) => result,
        Hook::Pending(future) => future.await,
    }
}

/// Call the named hook on `viewmodel` if it implements it.
///
/// The hook body runs immediately; only its completion is deferred to the
/// returned future.
pub fn call(
    viewmodel: &dyn ViewModel,
    hook: HookCall<'_>,
) -> impl Future<Output = Result<()>> + Send + 'static {
    let outcome = match hook {
        HookCall::Activate(args) => viewmodel.activate(args),
        HookCall::Deactivate { closing } => viewmodel.deactivate(closing),
        HookCall::BindingComplete { node, args } => viewmodel.binding_complete(node, args),
        HookCall::DescendantsComplete { node, args } => viewmodel.descendants_complete(node, args),
        HookCall::CompositionComplete(args) => viewmodel.composition_complete(args),
        HookCall::Dispose => viewmodel.dispose(),
        HookCall::Init => viewmodel.init(),
    };
    if !outcome.is_absent() {
        trace_log!("Invoking '{}' hook", hook.name());
    }
    invoke(outcome)
}

/// Activate a view-model (constructing it first if needed).
///
/// Resolves with `None` for an absent reference and with the instance,
/// untouched, when it is already active or activating. On hook failure the
/// instance goes back to [`ActivationState::Inactive`] and the error is
/// returned unchanged.
pub async fn activate(
    reference: impl Into<Option<ViewModelRef>>,
    args: &[Arg],
) -> Result<Option<ViewModelHandle>> {
    let Some(viewmodel) = construct(reference.into().as_ref()) else {
        return Ok(None);
    };

    if let Err(state) = viewmodel.transition(
        |state| state == ActivationState::Inactive,
        ActivationState::Activating,
    ) {
        trace_log!(
            "Skipping activate on {} ({:?})",
            viewmodel.type_name(),
            state
        );
        return Ok(Some(viewmodel));
    }

    let guard = StateGuard::new(&viewmodel, ActivationState::Inactive);
    match call(viewmodel.viewmodel(), HookCall::Activate(args)).await {
        Ok(()) => {
            guard.settle(ActivationState::Active);
            debug_log!("Activated {}", viewmodel.type_name());
            Ok(Some(viewmodel))
        }
        Err(err) => {
            guard.settle(ActivationState::Inactive);
            debug_log!("Activation of {} failed: {}", viewmodel.type_name(), err);
            Err(err)
        }
    }
}

/// Deactivate `viewmodel` ahead of `next` taking its place.
///
/// The hook receives `closing = false` when `next` is the very same instance
/// and `true` otherwise. A no-op unless the instance is active.
pub async fn deactivate(
    viewmodel: Option<&ViewModelHandle>,
    next: Option<&ViewModelRef>,
) -> Result<Option<ViewModelHandle>> {
    let Some(viewmodel) = viewmodel else {
        return Ok(None);
    };

    if viewmodel
        .transition(
            |state| state == ActivationState::Active,
            ActivationState::Deactivating,
        )
        .is_err()
    {
        return Ok(Some(viewmodel.clone()));
    }

    let closing = !next.is_some_and(|next| next.is(viewmodel));
    let guard = StateGuard::new(viewmodel, ActivationState::Active);
    match call(viewmodel.viewmodel(), HookCall::Deactivate { closing }).await {
        Ok(()) => {
            guard.settle(ActivationState::Inactive);
            debug_log!(
                "Deactivated {} (closing: {})",
                viewmodel.type_name(),
                closing
            );
            Ok(Some(viewmodel.clone()))
        }
        Err(err) => {
            guard.settle(ActivationState::Active);
            Err(err)
        }
    }
}

/// Restores `fallback` if the hook future is dropped before it resolves.
struct StateGuard {
    viewmodel: ViewModelHandle,
    fallback: Option<ActivationState>,
}

impl StateGuard {
    fn new(viewmodel: &ViewModelHandle, fallback: ActivationState) -> Self {
        Self {
            viewmodel: viewmodel.clone(),
            fallback: Some(fallback),
        }
    }

    fn settle(mut self, state: ActivationState) {
        self.fallback = None;
        self.viewmodel.set_state(state);
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if let Some(state) = self.fallback.take() {
            debug_log!(
                "Lifecycle hook on {} cancelled, back to {:?}",
                self.viewmodel.type_name(),
                state
            );
            self.viewmodel.set_state(state);
        }
    }
}
