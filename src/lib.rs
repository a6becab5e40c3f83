//! # compose-navigator
//!
//! View-model lifecycle, region composition and middleware routing for
//! document-driven user interfaces.
//!
//! The crate has two halves:
//!
//! - **Composition.** [`lifecycle`] sequences construction, activation and
//!   deactivation of [`ViewModel`]s; [`ActivationSlot`] holds "the current
//!   view-model"; [`CompositionEngine`] resolves a view-model and its view
//!   through a [`Loader`], binds them into a region of the host [`Dom`] and
//!   fires the completion hooks in order.
//! - **Routing.** [`Router`] dispatches URL fragments read from a
//!   [`Location`] to ordered middleware chains, rolls back on failure and
//!   delegates to child routers; [`ViewModelRouter`] binds routes to
//!   view-models and composes them into outlets.
//! - **Startup.** [`bootstrap::start`] runs initializers in order and
//!   composes the root view-model.
//!
//! Everything is asynchronous, built on `futures` and runnable on any
//! executor. The document, the reactive layer, the loader and the location
//! are traits the host implements; in-memory versions ([`MemoryDocument`],
//! [`StaticLoader`], [`MemoryLocation`], [`MemoryRegistry`]) cover headless
//! use and tests.
//!
//! # Quick start
//!
//! ```
//! use compose_navigator::{
//!     CompositionEngine, MemoryDocument, MemoryLocation, StaticLoader, ViewModel,
//!     ViewModelHandle, ViewModelRoute, ViewModelRouter,
//! };
//! use std::sync::Arc;
//!
//! struct Home;
//! impl ViewModel for Home {}
//!
//! let loader = Arc::new(StaticLoader::new());
//! let document = Arc::new(MemoryDocument::new());
//! let engine = CompositionEngine::from_document(document.clone(), loader.clone());
//! let router = ViewModelRouter::new(Arc::new(MemoryLocation::new()), loader);
//!
//! let home = ViewModelHandle::new(Home);
//! router
//!     .route(ViewModelRoute::new("home", home.clone()).view("<h1>Home</h1>"))
//!     .unwrap();
//!
//! let outlet = document.create_element("main", Some("outlet"));
//! pollster::block_on(async {
//!     router.attach_outlet(engine.clone(), outlet).await.unwrap();
//!     router.handle("home").await.unwrap();
//! });
//!
//! assert!(home.is_activated());
//! assert_eq!(engine.viewmodel_of(outlet), Some(home));
//! ```
//!
//! # Logging
//!
//! See [`logging`] for the `log` / `tracing` feature switch.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
pub mod logging;

pub mod activator;
pub mod binder;
pub mod bindings;
pub mod bootstrap;
pub mod cache;
pub mod composer;
pub mod dom;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod location;
pub mod middleware;
pub mod pattern;
pub mod router;
pub mod viewmodel;

pub use activator::{ActivationSlot, SlotErrorHook, SlotFuture};
pub use binder::{Reactive, ViewModelRoute, ViewModelRouter};
pub use bindings::{
    install, BindingFuture, BindingHandler, BindingRegistry, BindingValue, ComponentDefinition,
    ComposeBinding, MemoryRegistry, RouterBinding, RouterBindingValue,
};
pub use bootstrap::{start, Initializer, StartOptions};
pub use cache::{CacheStats, ViewCache};
pub use composer::{CompositionEngine, CompositionHooks, CompositionOptions, RegionTarget};
pub use dom::{BindingLayer, Dom, MemoryDocument, NodeId, NodeKind, RemovalCallback};
pub use error::{CompositionError, Error, Result};
pub use loader::{Loader, ModuleLoader, StaticLoader};
pub use location::{Location, MemoryLocation};
pub use middleware::{handler_fn, Flow, HandlerFuture, RouteHandler};
pub use pattern::{Pattern, RouteMatcher};
pub use router::{Fragment, Mode, PollLoop, Router, RouterErrorHook, RouterOptions};
pub use viewmodel::{
    ActivationState, Arg, Args, Hook, HookFuture, View, ViewModel, ViewModelFactory,
    ViewModelHandle, ViewModelRef, ViewModelSource,
};
