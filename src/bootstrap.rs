//! Application startup.
//!
//! [`start`] runs a list of initializers one after another, waiting for each,
//! then composes the root view-model into its container (`"main"` unless set
//! otherwise) with activation on by default.
//!
//! ```
//! use compose_navigator::bootstrap::{start, Initializer, StartOptions};
//! use compose_navigator::{CompositionEngine, Hook, MemoryDocument, StaticLoader, ViewModel, ViewModelHandle};
//! use std::sync::Arc;
//!
//! struct Shell;
//! impl ViewModel for Shell {}
//!
//! let document = Arc::new(MemoryDocument::new());
//! let main = document.create_element("main", Some("main"));
//! let engine = CompositionEngine::from_document(document.clone(), Arc::new(StaticLoader::new()));
//!
//! let shell = ViewModelHandle::new(Shell);
//! let options = StartOptions::new(shell.clone()).view("<div>app</div>");
//! let node = pollster::block_on(start(&engine, options, [Initializer::function(Hook::done)])).unwrap();
//!
//! assert_eq!(node, main);
//! assert!(shell.is_activated());
//! ```

use crate::composer::{CompositionEngine, CompositionHooks, CompositionOptions, RegionTarget};
use crate::dom::NodeId;
use crate::error::Result;
use crate::lifecycle::{self, HookCall};
use crate::loader::Loader;
use crate::viewmodel::{Args, Hook, View, ViewModelHandle, ViewModelRef, ViewModelSource};
use crate::{debug_log, info_log};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Container used when none is given.
pub const DEFAULT_CONTAINER: &str = "main";

/// Startup function.
pub type InitFn = Arc<dyn Fn() -> Hook + Send + Sync>;

/// One unit of startup work.
pub enum Initializer {
    /// Load the module through the engine's loader and run its `init` hook.
    /// An empty module is skipped.
    Module(String),
    /// Run the `init` hook of a view-model.
    Object(ViewModelRef),
    /// Call a function and wait for its outcome.
    Function(InitFn),
    /// Wait for a future.
    Future(BoxFuture<'static, Result<()>>),
}

impl Initializer {
    /// Initializer calling `init`.
    pub fn function<F>(init: F) -> Self
    where
        F: Fn() -> Hook + Send + Sync + 'static,
    {
        Self::Function(Arc::new(init))
    }

    /// Initializer awaiting `future`.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Future(future.boxed())
    }

    async fn run(self, loader: &dyn Loader) -> Result<()> {
        match self {
            Self::Module(id) => match loader.load_module(&id).await? {
                Some(module) => init(&module).await,
                None => {
                    debug_log!("Module '{}' is empty, nothing to initialize", id);
                    Ok(())
                }
            },
            Self::Object(reference) => init(&reference).await,
            Self::Function(init) => lifecycle::invoke(init()).await,
            Self::Future(future) => future.await,
        }
    }
}

async fn init(reference: &ViewModelRef) -> Result<()> {
    match lifecycle::construct(Some(reference)) {
        Some(viewmodel) => lifecycle::call(viewmodel.viewmodel(), HookCall::Init).await,
        None => Ok(()),
    }
}

impl From<&str> for Initializer {
    fn from(id: &str) -> Self {
        Self::Module(id.to_string())
    }
}

impl From<String> for Initializer {
    fn from(id: String) -> Self {
        Self::Module(id)
    }
}

impl From<ViewModelHandle> for Initializer {
    fn from(handle: ViewModelHandle) -> Self {
        Self::Object(handle.into())
    }
}

impl From<ViewModelRef> for Initializer {
    fn from(reference: ViewModelRef) -> Self {
        Self::Object(reference)
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(id) => f.debug_tuple("Module").field(id).finish(),
            Self::Object(reference) => f.debug_tuple("Object").field(reference).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// Root composition for [`start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Region receiving the root view-model.
    pub container: RegionTarget,
    /// How to compose it.
    pub composition: CompositionOptions,
}

impl StartOptions {
    /// Compose `viewmodel` into [`DEFAULT_CONTAINER`], activated.
    pub fn new(viewmodel: impl Into<ViewModelSource>) -> Self {
        Self {
            container: RegionTarget::from(DEFAULT_CONTAINER),
            composition: CompositionOptions::new(viewmodel).activate(true),
        }
    }

    pub fn container(mut self, container: impl Into<RegionTarget>) -> Self {
        self.container = container.into();
        self
    }

    pub fn view(mut self, view: impl Into<View>) -> Self {
        self.composition = self.composition.view(view);
        self
    }

    pub fn args(mut self, args: Args) -> Self {
        self.composition = self.composition.args(args);
        self
    }

    pub fn activate(mut self, activate: bool) -> Self {
        self.composition = self.composition.activate(activate);
        self
    }

    pub fn hooks(mut self, hooks: impl CompositionHooks) -> Self {
        self.composition = self.composition.hooks(hooks);
        self
    }
}

/// Run `initializers` in order, then compose the root view-model. The first
/// failing initializer aborts startup with its error.
pub async fn start<I>(
    engine: &CompositionEngine,
    options: StartOptions,
    initializers: I,
) -> Result<NodeId>
where
    I: IntoIterator<Item = Initializer>,
{
    let initializers: Vec<Initializer> = initializers.into_iter().collect();
    info_log!("Starting with {} initializer(s)", initializers.len());

    for initializer in initializers {
        debug_log!("Running initializer {:?}", initializer);
        initializer.run(engine.loader().as_ref()).await?;
    }

    let StartOptions {
        container,
        composition,
    } = options;
    engine.compose(container, composition).await
}
