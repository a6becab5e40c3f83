//! The "current view-model" slot.
//!
//! [`ActivationSlot`] is a single shared cell holding the active view-model.
//! Writing a new value runs deactivate (old) → load (new, if a module) →
//! activate (new) → publish, and hands back the chain as a shared future.
//! Writes do not queue: each write deactivates whatever the slot held when
//! it was made, and only the latest write is authoritative, see
//! [`ActivationSlot::settled`].

use crate::error::{Error, Result};
use crate::lifecycle;
use crate::loader::Loader;
use crate::viewmodel::{Args, ViewModelHandle, ViewModelSource};
use crate::{debug_log, error_log};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Outcome of a slot write, awaitable by any number of clones.
pub type SlotFuture = Shared<BoxFuture<'static, Result<Option<ViewModelHandle>>>>;

/// Replaces a failed write's outcome.
pub type SlotErrorHook = Arc<dyn Fn(Error) -> Result<Option<ViewModelHandle>> + Send + Sync>;

#[derive(Clone)]
enum PendingArgs {
    Static(Args),
    Computed(Arc<dyn Fn() -> Args + Send + Sync>),
}

impl PendingArgs {
    fn resolve(&self) -> Args {
        match self {
            Self::Static(args) => args.clone(),
            Self::Computed(compute) => compute(),
        }
    }
}

struct SlotInner {
    loader: Arc<dyn Loader>,
    current: Mutex<Option<ViewModelHandle>>,
    args: Mutex<PendingArgs>,
    on_error: Mutex<Option<SlotErrorHook>>,
    pending: Mutex<Option<SlotFuture>>,
}

/// Lifecycle-aware cell holding the current view-model.
#[derive(Clone)]
pub struct ActivationSlot {
    inner: Arc<SlotInner>,
}

impl ActivationSlot {
    /// Empty slot loading modules through `loader`.
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                loader,
                current: Mutex::new(None),
                args: Mutex::new(PendingArgs::Static(Args::new())),
                on_error: Mutex::new(None),
                pending: Mutex::new(None),
            }),
        }
    }

    /// The published occupant.
    pub fn get(&self) -> Option<ViewModelHandle> {
        self.inner.current.lock().clone()
    }

    /// Arguments for the next activation.
    pub fn set_args(&self, args: Args) {
        *self.inner.args.lock() = PendingArgs::Static(args);
    }

    /// Compute the arguments of each activation at write time.
    pub fn set_args_with<F>(&self, compute: F)
    where
        F: Fn() -> Args + Send + Sync + 'static,
    {
        *self.inner.args.lock() = PendingArgs::Computed(Arc::new(compute));
    }

    /// Handle failed writes with `hook`; its result becomes the write's
    /// outcome.
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(Error) -> Result<Option<ViewModelHandle>> + Send + Sync + 'static,
    {
        *self.inner.on_error.lock() = Some(Arc::new(hook));
    }

    /// The error hook, if one is set.
    pub fn error_hook(&self) -> Option<SlotErrorHook> {
        self.inner.on_error.lock().clone()
    }

    /// Write `source` into the slot.
    ///
    /// The occupant and the arguments are captured now; the chain runs once
    /// the returned future, or the one from [`settled`](Self::settled), is
    /// polled.
    pub fn set(&self, source: Option<ViewModelSource>) -> SlotFuture {
        let old = self.get();
        let args = self.inner.args.lock().resolve();
        let on_error = self.inner.on_error.lock().clone();
        let inner = Arc::clone(&self.inner);

        let chain = async move {
            match write(&inner, old, source, args).await {
                Ok(viewmodel) => Ok(viewmodel),
                Err(err) => match on_error {
                    Some(hook) => hook(err),
                    None => {
                        error_log!("activator> {}", err);
                        Err(err)
                    }
                },
            }
        }
        .boxed()
        .shared();

        *self.inner.pending.lock() = Some(chain.clone());
        chain
    }

    /// Outcome of the latest write, or the current occupant when nothing was
    /// ever written.
    pub fn settled(&self) -> SlotFuture {
        let pending = self.inner.pending.lock().clone();
        pending.unwrap_or_else(|| future::ready(Ok(self.get())).boxed().shared())
    }

    /// Forget the occupant and the pending write without running any hook.
    pub fn reset(&self) {
        *self.inner.current.lock() = None;
        *self.inner.pending.lock() = None;
    }
}

async fn write(
    inner: &SlotInner,
    old: Option<ViewModelHandle>,
    source: Option<ViewModelSource>,
    args: Args,
) -> Result<Option<ViewModelHandle>> {
    let next = source.as_ref().and_then(ViewModelSource::reference);
    lifecycle::deactivate(old.as_ref(), next).await?;

    let reference = match source {
        None => None,
        Some(ViewModelSource::Ref(reference)) => Some(reference),
        Some(ViewModelSource::Module(id)) => inner.loader.load_module(&id).await?,
    };

    let viewmodel = lifecycle::activate(reference, &args).await?;
    if let Some(viewmodel) = &viewmodel {
        debug_log!("activator> published {}", viewmodel.type_name());
    }
    *inner.current.lock() = viewmodel.clone();
    Ok(viewmodel)
}

impl fmt::Debug for ActivationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationSlot")
            .field("current", &self.get())
            .field("pending", &self.inner.pending.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticLoader;
    use crate::viewmodel::{Arg, Hook, ViewModel};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Page {
        args: Mutex<Vec<Args>>,
        closing: Mutex<Vec<bool>>,
        fail: AtomicBool,
    }

    impl ViewModel for Page {
        fn activate(&self, args: &[Arg]) -> Hook {
            if self.fail.load(Ordering::SeqCst) {
                return Hook::fail(Error::msg("activation refused"));
            }
            self.args.lock().push(args.to_vec());
            Hook::done()
        }

        fn deactivate(&self, closing: bool) -> Hook {
            self.closing.lock().push(closing);
            Hook::done()
        }
    }

    fn slot() -> (ActivationSlot, Arc<StaticLoader>) {
        let loader = Arc::new(StaticLoader::new());
        (ActivationSlot::new(loader.clone()), loader)
    }

    fn page() -> ViewModelHandle {
        ViewModelHandle::new(Page::default())
    }

    #[tokio::test]
    async fn test_set_activates_and_publishes() {
        let (slot, _) = slot();
        let vm = page();
        slot.set_args(vec![Some("7".to_string())]);

        let published = slot.set(Some(vm.clone().into())).await.unwrap();

        assert_eq!(published, Some(vm.clone()));
        assert_eq!(slot.get(), Some(vm.clone()));
        assert!(vm.is_activated());
        let page = vm.downcast_ref::<Page>().unwrap();
        assert_eq!(*page.args.lock(), vec![vec![Some("7".to_string())]]);
    }

    #[tokio::test]
    async fn test_set_deactivates_previous_occupant() {
        let (slot, _) = slot();
        let first = page();
        let second = page();

        slot.set(Some(first.clone().into())).await.unwrap();
        slot.set(Some(second.clone().into())).await.unwrap();

        assert!(!first.is_activated());
        assert!(second.is_activated());
        let first_page = first.downcast_ref::<Page>().unwrap();
        assert_eq!(*first_page.closing.lock(), vec![true]);
    }

    #[tokio::test]
    async fn test_same_occupant_is_not_closing() {
        let (slot, _) = slot();
        let vm = page();

        slot.set(Some(vm.clone().into())).await.unwrap();
        slot.set(Some(vm.clone().into())).await.unwrap();

        let page = vm.downcast_ref::<Page>().unwrap();
        assert_eq!(*page.closing.lock(), vec![false]);
        assert_eq!(page.args.lock().len(), 2);
        assert!(vm.is_activated());
    }

    #[tokio::test]
    async fn test_module_is_loaded() {
        let (slot, loader) = slot();
        let vm = page();
        loader.register_module("users", vm.clone());

        let published = slot.set(Some(ViewModelSource::module("users"))).await.unwrap();
        assert_eq!(published, Some(vm));
        assert_eq!(loader.module_loads(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_reraised() {
        let (slot, _) = slot();
        let vm = page();
        vm.downcast_ref::<Page>().unwrap().fail.store(true, Ordering::SeqCst);

        let err = slot.set(Some(vm.clone().into())).await.unwrap_err();
        assert_eq!(err.to_string(), "activation refused");
        assert!(slot.get().is_none());
        assert!(!vm.is_activated());
    }

    #[tokio::test]
    async fn test_error_hook_replaces_outcome() {
        let (slot, _) = slot();
        let fallback = page();
        let hook_fallback = fallback.clone();
        slot.on_error(move |_| Ok(Some(hook_fallback.clone())));

        let vm = page();
        vm.downcast_ref::<Page>().unwrap().fail.store(true, Ordering::SeqCst);

        let outcome = slot.set(Some(vm.into())).await.unwrap();
        assert_eq!(outcome, Some(fallback));
    }

    #[tokio::test]
    async fn test_args_computed_at_write_time() {
        let (slot, _) = slot();
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();
        slot.set_args_with(move || {
            vec![Some(source.fetch_add(1, Ordering::SeqCst).to_string())]
        });

        let vm = page();
        let write = slot.set(Some(vm.clone().into()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        write.await.unwrap();

        let page = vm.downcast_ref::<Page>().unwrap();
        assert_eq!(*page.args.lock(), vec![vec![Some("0".to_string())]]);
    }

    #[tokio::test]
    async fn test_write_is_lazy_and_settled_tracks_latest() {
        let (slot, _) = slot();
        let first = page();
        let second = page();

        let _ignored = slot.set(Some(first.clone().into()));
        assert!(!first.is_activated());

        let _latest = slot.set(Some(second.clone().into()));
        let settled = slot.settled().await.unwrap();

        assert_eq!(settled, Some(second.clone()));
        assert!(second.is_activated());
        assert!(!first.is_activated());
    }

    #[tokio::test]
    async fn test_settled_without_writes() {
        let (slot, _) = slot();
        assert_eq!(slot.settled().await.unwrap(), None);
    }
}
