//! Document and reactive-layer contracts.
//!
//! The composition engine does not touch a real document. It talks to two
//! host-provided collaborators:
//!
//! - [`Dom`]: node lookup, markup parsing, cloning, child replacement and
//!   removal notification.
//! - [`BindingLayer`]: the reactive layer that binds a view-model to the
//!   nodes of a region and signals once nested bindings have settled.
//!
//! [`MemoryDocument`] implements both over an in-memory node arena. It backs
//! headless hosts and the test-suite.

use crate::error::{Error, Result};
use crate::viewmodel::ViewModelHandle;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// Opaque identity of a node in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback run when a node leaves the document. The host drives the
/// returned future.
pub type RemovalCallback = Box<dyn FnOnce(NodeId) -> BoxFuture<'static, ()> + Send>;

/// Low-level document operations consumed by the composition engine.
pub trait Dom: Send + Sync + 'static {
    /// Find an element by its identifier.
    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    /// Parse markup into detached template nodes.
    fn parse_markup(&self, markup: &str) -> Result<Vec<NodeId>>;

    /// Children of `node`, in order.
    fn child_nodes(&self, node: NodeId) -> Vec<NodeId>;

    /// Deep clone of `node`, detached.
    fn clone_node(&self, node: NodeId) -> NodeId;

    /// Remove every child of `node`.
    fn empty_node(&self, node: NodeId);

    /// Replace the children of `node`.
    fn set_children(&self, node: NodeId, children: Vec<NodeId>);

    /// Run `callback` once `node` is removed from the document.
    fn on_removed(&self, node: NodeId, callback: RemovalCallback);
}

/// Reactive layer consumed by the composition engine.
pub trait BindingLayer: Send + Sync + 'static {
    /// Bind `viewmodel` against the descendants of `node`.
    fn apply_bindings_to_descendants(&self, viewmodel: &ViewModelHandle, node: NodeId)
        -> Result<()>;

    /// One-shot signal fired once every nested binding inside `node` has
    /// completed. Dropping the receiver releases the subscription.
    fn descendants_complete(&self, node: NodeId) -> oneshot::Receiver<()>;
}

// ============================================================================
// MemoryDocument
// ============================================================================

/// Kind of a node held by [`MemoryDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element, optionally carrying an identifier.
    Element {
        /// Tag name.
        tag: String,
        /// Identifier used by [`Dom::element_by_id`].
        id: Option<String>,
    },
    /// Opaque parsed markup.
    Markup(String),
    /// A document fragment.
    Fragment,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: NodeKind,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Default)]
struct DocState {
    next_id: u64,
    nodes: HashMap<NodeId, MemoryNode>,
    ids: HashMap<String, NodeId>,
    removal: HashMap<NodeId, Vec<RemovalCallback>>,
    pending_descendants: HashMap<NodeId, Vec<oneshot::Sender<()>>>,
    bound: HashMap<NodeId, ViewModelHandle>,
    hold_descendants: bool,
    mutations: usize,
    parses: usize,
}

impl DocState {
    fn insert(&mut self, kind: NodeKind) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            MemoryNode {
                kind,
                children: Vec::new(),
                parent: None,
            },
        );
        id
    }

    fn clone_deep(&mut self, node: NodeId) -> NodeId {
        let Some(source) = self.nodes.get(&node).cloned() else {
            return self.insert(NodeKind::Fragment);
        };
        let copy = self.insert(source.kind);
        let children: Vec<NodeId> = source
            .children
            .into_iter()
            .map(|child| self.clone_deep(child))
            .collect();
        for child in &children {
            if let Some(entry) = self.nodes.get_mut(child) {
                entry.parent = Some(copy);
            }
        }
        if let Some(entry) = self.nodes.get_mut(&copy) {
            entry.children = children;
        }
        copy
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != node);
        }
    }

    fn subtree(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.push(node);
        if let Some(entry) = self.nodes.get(&node) {
            for child in &entry.children {
                self.subtree(*child, out);
            }
        }
    }
}

/// In-memory document and binding layer.
///
/// Parsed markup becomes a single [`NodeKind::Markup`] node; the document
/// does not interpret markup. Bindings are recorded per region and the
/// descendants-settled signal fires as soon as bindings are applied, unless
/// [`hold_descendants`](Self::hold_descendants) is set.
///
/// # Example
///
/// ```
/// use compose_navigator::{Dom, MemoryDocument};
///
/// let doc = MemoryDocument::new();
/// let region = doc.create_element("main", Some("content"));
/// assert_eq!(doc.element_by_id("content"), Some(region));
/// ```
#[derive(Default)]
pub struct MemoryDocument {
    state: Mutex<DocState>,
}

impl MemoryDocument {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element, registered under `id` when given.
    pub fn create_element(&self, tag: &str, id: Option<&str>) -> NodeId {
        let mut state = self.state.lock();
        let node = state.insert(NodeKind::Element {
            tag: tag.to_string(),
            id: id.map(str::to_string),
        });
        if let Some(id) = id {
            state.ids.insert(id.to_string(), node);
        }
        node
    }

    /// Create a fragment whose children are one markup node per entry.
    pub fn create_fragment(&self, markup: &[&str]) -> NodeId {
        let mut state = self.state.lock();
        let fragment = state.insert(NodeKind::Fragment);
        let children: Vec<NodeId> = markup
            .iter()
            .map(|text| state.insert(NodeKind::Markup((*text).to_string())))
            .collect();
        for child in &children {
            if let Some(entry) = state.nodes.get_mut(child) {
                entry.parent = Some(fragment);
            }
        }
        if let Some(entry) = state.nodes.get_mut(&fragment) {
            entry.children = children;
        }
        fragment
    }

    /// Append `child` to `parent`.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.lock();
        state.detach(child);
        if let Some(entry) = state.nodes.get_mut(&child) {
            entry.parent = Some(parent);
        }
        if let Some(entry) = state.nodes.get_mut(&parent) {
            entry.children.push(child);
        }
    }

    /// Kind of `node`.
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.state.lock().nodes.get(&node).map(|n| n.kind.clone())
    }

    /// Markup text of every markup node under `node`, in document order.
    pub fn text_content(&self, node: NodeId) -> Vec<String> {
        let state = self.state.lock();
        let mut all = Vec::new();
        state.subtree(node, &mut all);
        all.into_iter()
            .filter_map(|id| match state.nodes.get(&id).map(|n| &n.kind) {
                Some(NodeKind::Markup(text)) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of child-list mutations performed through [`Dom`].
    pub fn mutation_count(&self) -> usize {
        self.state.lock().mutations
    }

    /// Removal callbacks currently registered on `node`.
    pub fn removal_callbacks(&self, node: NodeId) -> usize {
        self.state.lock().removal.get(&node).map_or(0, Vec::len)
    }

    /// Number of [`Dom::parse_markup`] calls.
    pub fn parse_count(&self) -> usize {
        self.state.lock().parses
    }

    /// The view-model most recently bound to `node`.
    pub fn bound_viewmodel(&self, node: NodeId) -> Option<ViewModelHandle> {
        self.state.lock().bound.get(&node).cloned()
    }

    /// Keep descendants-settled signals pending until
    /// [`settle_descendants`](Self::settle_descendants) is called.
    pub fn hold_descendants(&self, hold: bool) {
        self.state.lock().hold_descendants = hold;
    }

    /// Fire the pending descendants-settled signals of `node`.
    pub fn settle_descendants(&self, node: NodeId) {
        let senders = self
            .state
            .lock()
            .pending_descendants
            .remove(&node)
            .unwrap_or_default();
        for sender in senders {
            let _ = sender.send(());
        }
    }

    /// Number of descendants-settled subscriptions still pending on `node`.
    pub fn pending_descendants(&self, node: NodeId) -> usize {
        self.state
            .lock()
            .pending_descendants
            .get(&node)
            .map_or(0, |pending| {
                pending.iter().filter(|s| !s.is_canceled()).count()
            })
    }

    /// Remove `node` from the document and run the removal callbacks of the
    /// node and its descendants.
    pub async fn remove_node(&self, node: NodeId) {
        let callbacks = {
            let mut state = self.state.lock();
            state.detach(node);
            let mut subtree = Vec::new();
            state.subtree(node, &mut subtree);
            let mut callbacks = Vec::new();
            for id in subtree {
                let name = match state.nodes.get(&id).map(|n| &n.kind) {
                    Some(NodeKind::Element { id: Some(name), .. }) => Some(name.clone()),
                    _ => None,
                };
                if let Some(name) = name {
                    state.ids.remove(&name);
                }
                if let Some(registered) = state.removal.remove(&id) {
                    callbacks.extend(registered.into_iter().map(|cb| (id, cb)));
                }
            }
            callbacks
        };
        for (id, callback) in callbacks {
            callback(id).await;
        }
    }
}

impl Dom for MemoryDocument {
    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.state.lock().ids.get(id).copied()
    }

    fn parse_markup(&self, markup: &str) -> Result<Vec<NodeId>> {
        if markup.trim().is_empty() {
            return Err(Error::msg("cannot parse empty markup"));
        }
        let mut state = self.state.lock();
        state.parses += 1;
        Ok(vec![state.insert(NodeKind::Markup(markup.to_string()))])
    }

    fn child_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn clone_node(&self, node: NodeId) -> NodeId {
        self.state.lock().clone_deep(node)
    }

    fn empty_node(&self, node: NodeId) {
        let mut state = self.state.lock();
        state.mutations += 1;
        let children = state
            .nodes
            .get_mut(&node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(entry) = state.nodes.get_mut(&child) {
                entry.parent = None;
            }
        }
    }

    fn set_children(&self, node: NodeId, children: Vec<NodeId>) {
        let mut state = self.state.lock();
        state.mutations += 1;
        for child in &children {
            state.detach(*child);
            if let Some(entry) = state.nodes.get_mut(child) {
                entry.parent = Some(node);
            }
        }
        if let Some(entry) = state.nodes.get_mut(&node) {
            entry.children = children;
        }
    }

    fn on_removed(&self, node: NodeId, callback: RemovalCallback) {
        self.state
            .lock()
            .removal
            .entry(node)
            .or_default()
            .push(callback);
    }
}

impl BindingLayer for MemoryDocument {
    fn apply_bindings_to_descendants(
        &self,
        viewmodel: &ViewModelHandle,
        node: NodeId,
    ) -> Result<()> {
        let senders = {
            let mut state = self.state.lock();
            state.bound.insert(node, viewmodel.clone());
            if state.hold_descendants {
                Vec::new()
            } else {
                state.pending_descendants.remove(&node).unwrap_or_default()
            }
        };
        for sender in senders {
            let _ = sender.send(());
        }
        Ok(())
    }

    fn descendants_complete(&self, node: NodeId) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.state
            .lock()
            .pending_descendants
            .entry(node)
            .or_default()
            .push(sender);
        receiver
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDocument")
            .field("nodes", &state.nodes.len())
            .field("mutations", &state.mutations)
            .field("parses", &state.parses)
            .finish_non_exhaustive()
    }
}
