//! Shared fixtures for the integration tests.
//!
//! Provides a recording view-model, a headless host (document, loader,
//! location, engine) and small async helpers.

#![allow(dead_code)]

use compose_navigator::*;
use futures_timer::Delay;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// View-model recording every lifecycle hook it receives.
#[derive(Default)]
pub struct Tracker {
    pub name: &'static str,
    pub title: Option<String>,
    pub view: Option<String>,
    pub refuse: AtomicBool,
    pub refuse_deactivate: AtomicBool,
    pub stall_once: AtomicBool,
    pub events: Mutex<Vec<String>>,
    pub activations: Mutex<Vec<Args>>,
}

impl Tracker {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn with_view(mut self, view: &str) -> Self {
        self.view = Some(view.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn refusing(self) -> Self {
        self.refuse.store(true, Ordering::SeqCst);
        self
    }

    pub fn refusing_deactivate(self) -> Self {
        self.refuse_deactivate.store(true, Ordering::SeqCst);
        self
    }

    /// The first activation never resolves.
    pub fn stalling_once(self) -> Self {
        self.stall_once.store(true, Ordering::SeqCst);
        self
    }

    pub fn handle(self) -> ViewModelHandle {
        ViewModelHandle::new(self)
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl ViewModel for Tracker {
    fn activate(&self, args: &[Arg]) -> Hook {
        if self.refuse.load(Ordering::SeqCst) {
            return Hook::fail(Error::msg(format!("{} refused", self.name)));
        }
        if self.stall_once.swap(false, Ordering::SeqCst) {
            self.record("stall");
            return Hook::pending(futures::future::pending());
        }
        self.record("activate");
        self.activations.lock().push(args.to_vec());
        Hook::done()
    }

    fn deactivate(&self, closing: bool) -> Hook {
        self.record(format!("deactivate:{closing}"));
        if self.refuse_deactivate.load(Ordering::SeqCst) {
            return Hook::fail(Error::msg(format!("{} stays", self.name)));
        }
        Hook::done()
    }

    fn binding_complete(&self, _node: NodeId, _args: &[Arg]) -> Hook {
        self.record("binding_complete");
        Hook::done()
    }

    fn descendants_complete(&self, _node: NodeId, _args: &[Arg]) -> Hook {
        self.record("descendants_complete");
        Hook::done()
    }

    fn composition_complete(&self, _args: &[Arg]) -> Hook {
        self.record("composition_complete");
        Hook::done()
    }

    fn dispose(&self) -> Hook {
        self.record("dispose");
        Hook::done()
    }

    fn view(&self, _args: &[Arg]) -> Option<View> {
        self.view.clone().map(View::Markup)
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}

/// The tracker behind `handle`.
pub fn tracker(handle: &ViewModelHandle) -> &Tracker {
    handle.downcast_ref::<Tracker>().expect("handle wraps a Tracker")
}

/// Events recorded by the tracker behind `handle`.
pub fn events(handle: &ViewModelHandle) -> Vec<String> {
    tracker(handle).events.lock().clone()
}

/// Everything a headless host provides.
pub struct Host {
    pub document: Arc<MemoryDocument>,
    pub loader: Arc<StaticLoader>,
    pub location: Arc<MemoryLocation>,
    pub engine: CompositionEngine,
}

impl Host {
    pub fn new() -> Self {
        Self::at("/")
    }

    pub fn at(url: &str) -> Self {
        let document = Arc::new(MemoryDocument::new());
        let loader = Arc::new(StaticLoader::new());
        let engine = CompositionEngine::from_document(document.clone(), loader.clone());
        Self {
            document,
            loader,
            location: Arc::new(MemoryLocation::at(url)),
            engine,
        }
    }

    pub fn router(&self) -> Router {
        Router::with_options(self.location.clone(), fast())
    }

    pub fn binder(&self) -> ViewModelRouter {
        ViewModelRouter::with_options(self.location.clone(), self.loader.clone(), fast())
    }

    pub fn region(&self, id: &str) -> NodeId {
        self.document.create_element("div", Some(id))
    }
}

/// Router options with a short polling interval.
pub fn fast() -> RouterOptions {
    RouterOptions::new().poll_interval(Duration::from_millis(5))
}

/// Handler counting its invocations and recording the captures it got.
pub fn counting(
    calls: &Arc<AtomicUsize>,
    seen: &Arc<Mutex<Vec<Args>>>,
    flow: Flow,
) -> Arc<dyn RouteHandler> {
    let calls = calls.clone();
    let seen = seen.clone();
    handler_fn(move |args| {
        calls.fetch_add(1, Ordering::SeqCst);
        seen.lock().push(args);
        async move { Ok(flow) }
    })
}

/// Handler appending `label` to a shared log.
pub fn labelled(log: &Arc<Mutex<Vec<String>>>, label: &'static str, flow: Flow) -> Arc<dyn RouteHandler> {
    let log = log.clone();
    handler_fn(move |_| {
        log.lock().push(label.to_string());
        async move { Ok(flow) }
    })
}

/// Wait until `condition` holds, up to two seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        Delay::new(Duration::from_millis(5)).await;
    }
    condition()
}

/// Let a running poll loop go through a few ticks.
pub async fn settle() {
    Delay::new(Duration::from_millis(60)).await;
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
