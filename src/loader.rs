//! Module and view loading.
//!
//! The composition engine and the activation slot turn module identifiers
//! into view-model references, and logical view names into markup, through
//! the [`Loader`] trait. Two implementations ship with the crate:
//!
//! - [`ModuleLoader`]: a locator/loader pair for modules and one for views,
//!   each replaceable. The default view locator appends `.html`; the default
//!   loaders fail because module resolution is host specific.
//! - [`StaticLoader`]: an in-memory registry, for hosts that compile their
//!   view-models in and for tests.
//!
//! ```
//! use compose_navigator::{Loader, StaticLoader};
//!
//! let loader = StaticLoader::new();
//! loader.register_view("home", "<h1>Home</h1>");
//!
//! let markup = pollster::block_on(loader.load_view("home")).unwrap();
//! assert_eq!(markup, "<h1>Home</h1>");
//! ```

use crate::error::{Error, Result};
use crate::trace_log;
use crate::viewmodel::ViewModelRef;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Loads modules and views by identifier.
pub trait Loader: Send + Sync + 'static {
    /// Load a module. `Ok(None)` means the module exists but is empty.
    fn load_module(&self, identifier: &str) -> BoxFuture<'static, Result<Option<ViewModelRef>>>;

    /// Load the markup of a logical view.
    fn load_view(&self, identifier: &str) -> BoxFuture<'static, Result<String>>;
}

/// Maps a logical identifier to the identifier handed to the loader.
pub type Locator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Asynchronous module loader function.
pub type ModuleLoaderFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<ViewModelRef>>> + Send + Sync>;

/// Asynchronous view loader function.
pub type ViewLoaderFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Append `.html` unless the path already ends with it.
pub fn add_html_extension(path: &str) -> String {
    if path.ends_with(".html") {
        path.to_string()
    } else {
        format!("{path}.html")
    }
}

/// Locator/loader pairs for modules and views.
#[derive(Clone)]
pub struct ModuleLoader {
    module_locator: Locator,
    view_locator: Locator,
    module_loader: ModuleLoaderFn,
    view_loader: ViewLoaderFn,
}

impl ModuleLoader {
    /// Identity module locator, `.html` view locator, and loaders that fail
    /// until replaced.
    pub fn new() -> Self {
        Self {
            module_locator: Arc::new(str::to_string),
            view_locator: Arc::new(add_html_extension),
            module_loader: Arc::new(|id| {
                future::ready(Err(Error::load(id, "No import mechanism available!"))).boxed()
            }),
            view_loader: Arc::new(|id| {
                future::ready(Err(Error::load(id, "No import mechanism available!"))).boxed()
            }),
        }
    }

    /// Replace the module locator.
    pub fn with_module_locator<F>(mut self, locator: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.module_locator = Arc::new(locator);
        self
    }

    /// Replace the view locator.
    pub fn with_view_locator<F>(mut self, locator: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.view_locator = Arc::new(locator);
        self
    }

    /// Replace the module loader.
    pub fn with_module_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<Option<ViewModelRef>>> + Send + Sync + 'static,
    {
        self.module_loader = Arc::new(loader);
        self
    }

    /// Replace the view loader.
    pub fn with_view_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync + 'static,
    {
        self.view_loader = Arc::new(loader);
        self
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for ModuleLoader {
    fn load_module(&self, identifier: &str) -> BoxFuture<'static, Result<Option<ViewModelRef>>> {
        let located = (self.module_locator)(identifier);
        trace_log!("Loading module '{}' as '{}'", identifier, located);
        (self.module_loader)(located)
    }

    fn load_view(&self, identifier: &str) -> BoxFuture<'static, Result<String>> {
        let located = (self.view_locator)(identifier);
        trace_log!("Loading view '{}' as '{}'", identifier, located);
        (self.view_loader)(located)
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader").finish_non_exhaustive()
    }
}

/// In-memory module and view registry.
#[derive(Default)]
pub struct StaticLoader {
    modules: Mutex<HashMap<String, Option<ViewModelRef>>>,
    views: Mutex<HashMap<String, String>>,
    module_loads: AtomicUsize,
    view_loads: AtomicUsize,
}

impl StaticLoader {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `identifier`.
    pub fn register_module(&self, identifier: impl Into<String>, module: impl Into<ViewModelRef>) {
        self.modules
            .lock()
            .insert(identifier.into(), Some(module.into()));
    }

    /// Register a module that resolves to nothing.
    pub fn register_empty_module(&self, identifier: impl Into<String>) {
        self.modules.lock().insert(identifier.into(), None);
    }

    /// Register the markup of a logical view.
    pub fn register_view(&self, identifier: impl Into<String>, markup: impl Into<String>) {
        self.views.lock().insert(identifier.into(), markup.into());
    }

    /// Number of `load_module` calls so far.
    pub fn module_loads(&self) -> usize {
        self.module_loads.load(Ordering::SeqCst)
    }

    /// Number of `load_view` calls so far.
    pub fn view_loads(&self) -> usize {
        self.view_loads.load(Ordering::SeqCst)
    }
}

impl Loader for StaticLoader {
    fn load_module(&self, identifier: &str) -> BoxFuture<'static, Result<Option<ViewModelRef>>> {
        self.module_loads.fetch_add(1, Ordering::SeqCst);
        let result = self
            .modules
            .lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::load(identifier, "module is not registered"));
        future::ready(result).boxed()
    }

    fn load_view(&self, identifier: &str) -> BoxFuture<'static, Result<String>> {
        self.view_loads.fetch_add(1, Ordering::SeqCst);
        let result = self
            .views
            .lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::load(identifier, "view is not registered"));
        future::ready(result).boxed()
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLoader")
            .field("modules", &self.modules.lock().len())
            .field("views", &self.views.lock().len())
            .finish()
    }
}
