//! Browser location contract.
//!
//! The router reads the current path or hash from a [`Location`] and writes
//! navigations back to it. [`MemoryLocation`] keeps a history stack in
//! memory for headless hosts and tests.

use parking_lot::Mutex;
use std::fmt;

/// Where the router reads and writes the visible URL.
pub trait Location: Send + Sync + 'static {
    /// The path part, e.g. `/users/7`.
    fn path(&self) -> String;

    /// The hash part including `#`, or an empty string.
    fn hash(&self) -> String;

    /// Add a history entry. `url` starting with `#` only changes the hash.
    fn push(&self, url: &str);

    /// Replace the current history entry.
    fn replace(&self, url: &str);

    /// Set the document title.
    fn set_title(&self, title: &str);

    /// Whether `push`/`replace` can write the path. Without history support
    /// the router navigates through the hash.
    fn supports_history(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    path: String,
    hash: String,
}

impl Entry {
    fn resolve(&self, url: &str) -> Self {
        if url.starts_with('#') {
            return Self {
                path: self.path.clone(),
                hash: url.to_string(),
            };
        }
        let (path, hash) = url
            .find('#')
            .map_or((url, ""), |index| url.split_at(index));
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self {
            path,
            hash: hash.to_string(),
        }
    }
}

struct LocationState {
    history: Vec<Entry>,
    current: usize,
    title: String,
}

/// In-memory [`Location`] with a back/forward history.
///
/// # Example
///
/// ```
/// use compose_navigator::{Location, MemoryLocation};
///
/// let location = MemoryLocation::new();
/// location.push("users/7");
/// location.push("#settings");
///
/// assert_eq!(location.path(), "/users/7");
/// assert_eq!(location.hash(), "#settings");
/// assert!(location.back());
/// assert_eq!(location.hash(), "");
/// ```
pub struct MemoryLocation {
    state: Mutex<LocationState>,
    history_support: bool,
}

impl MemoryLocation {
    /// Location at `/` with history support.
    pub fn new() -> Self {
        Self::at("/")
    }

    /// Location at `url` with history support.
    pub fn at(url: &str) -> Self {
        let root = Entry {
            path: "/".to_string(),
            hash: String::new(),
        };
        Self {
            state: Mutex::new(LocationState {
                history: vec![root.resolve(url)],
                current: 0,
                title: String::new(),
            }),
            history_support: true,
        }
    }

    /// Location at `/` that only navigates through the hash.
    pub fn without_history() -> Self {
        Self {
            history_support: false,
            ..Self::new()
        }
    }

    /// The full current URL, path then hash.
    pub fn url(&self) -> String {
        let state = self.state.lock();
        let entry = &state.history[state.current];
        format!("{}{}", entry.path, entry.hash)
    }

    /// The last title set.
    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    /// Number of history entries.
    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Always `false`: the history holds at least the initial entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Step back. Returns `false` at the first entry.
    pub fn back(&self) -> bool {
        let mut state = self.state.lock();
        if state.current > 0 {
            state.current -= 1;
            true
        } else {
            false
        }
    }

    /// Step forward. Returns `false` at the last entry.
    pub fn forward(&self) -> bool {
        let mut state = self.state.lock();
        if state.current + 1 < state.history.len() {
            state.current += 1;
            true
        } else {
            false
        }
    }

    /// `true` if [`back`](Self::back) would move.
    pub fn can_go_back(&self) -> bool {
        self.state.lock().current > 0
    }

    /// `true` if [`forward`](Self::forward) would move.
    pub fn can_go_forward(&self) -> bool {
        let state = self.state.lock();
        state.current + 1 < state.history.len()
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Location for MemoryLocation {
    fn path(&self) -> String {
        let state = self.state.lock();
        state.history[state.current].path.clone()
    }

    fn hash(&self) -> String {
        let state = self.state.lock();
        state.history[state.current].hash.clone()
    }

    fn push(&self, url: &str) {
        let mut state = self.state.lock();
        let entry = state.history[state.current].resolve(url);
        let keep = state.current + 1;
        state.history.truncate(keep);
        state.history.push(entry);
        state.current += 1;
    }

    fn replace(&self, url: &str) {
        let mut state = self.state.lock();
        let current = state.current;
        let entry = state.history[current].resolve(url);
        state.history[current] = entry;
    }

    fn set_title(&self, title: &str) {
        self.state.lock().title = title.to_string();
    }

    fn supports_history(&self) -> bool {
        self.history_support
    }
}

impl fmt::Debug for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLocation")
            .field("url", &self.url())
            .field("entries", &self.len())
            .finish()
    }
}
