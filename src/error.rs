//! Error types shared by the lifecycle controller, the composition engine and
//! the router.
//!
//! - [`Error`]: the crate-wide error. Lifecycle hooks return it, route
//!   handlers return it, and every async operation resolves to
//!   [`Result<T>`].
//! - [`CompositionError`]: raised by
//!   [`CompositionEngine::compose`](crate::CompositionEngine::compose). It
//!   keeps the view-model reference that was being composed together with the
//!   inner failure, so a broken composition can be traced back to its source.
//!
//! `Error` is `Clone`: the activation slot hands the same outcome to every
//! awaiter of a write, so foreign errors are stored behind an `Arc`.
//!
//! # Examples
//!
//! ```
//! use compose_navigator::Error;
//!
//! let err = Error::not_found("users/7");
//! assert!(err.is_not_found());
//! assert_eq!(err.to_string(), "Not Found");
//!
//! let err = Error::msg("session expired");
//! assert_eq!(err.to_string(), "session expired");
//! ```

use crate::viewmodel::ViewModelSource;
use std::sync::Arc;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by lifecycle hooks, composition and navigation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No route matched the fragment and no custom not-found handler is set.
    #[error("Not Found")]
    NotFound {
        /// The fragment that failed to match.
        fragment: String,
    },

    /// Composition failed; see [`CompositionError`].
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// A module or a view could not be loaded.
    #[error("failed to load '{identifier}': {message}")]
    Load {
        /// Identifier after locator resolution.
        identifier: String,
        /// Loader-provided reason.
        message: String,
    },

    /// A route template or regex did not compile.
    #[error("invalid route pattern '{pattern}': {source}")]
    Pattern {
        /// The template or regex source.
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A foreign error raised by a hook or a handler.
    #[error(transparent)]
    Failed(Arc<dyn std::error::Error + Send + Sync>),

    /// A plain message raised by a hook or a handler.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Build a route-not-found error for `fragment`.
    pub fn not_found(fragment: impl Into<String>) -> Self {
        Self::NotFound {
            fragment: fragment.into(),
        }
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap any foreign error.
    pub fn failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Arc::new(err))
    }

    /// Build a loader failure.
    pub fn load(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// `true` for [`Error::Composition`].
    pub fn is_composition(&self) -> bool {
        matches!(self, Self::Composition(_))
    }
}

/// A failed composition.
///
/// Carries the original view-model reference for diagnostics and, when the
/// failure came from somewhere else (loader, hook, binding layer), the inner
/// error as its [`source`](std::error::Error::source).
#[derive(Debug, Clone, thiserror::Error)]
#[error("composer: {message}")]
pub struct CompositionError {
    viewmodel: ViewModelSource,
    message: String,
    #[source]
    inner: Option<Box<Error>>,
}

impl CompositionError {
    /// A composition-specific failure with no inner cause.
    pub fn new(viewmodel: ViewModelSource, message: impl Into<String>) -> Self {
        Self {
            viewmodel,
            message: message.into(),
            inner: None,
        }
    }

    /// Wrap `inner` unless it already is a composition error.
    pub fn wrap(viewmodel: ViewModelSource, inner: Error) -> Error {
        match inner {
            Error::Composition(_) => inner,
            other => Error::Composition(Self {
                viewmodel,
                message: other.to_string(),
                inner: Some(Box::new(other)),
            }),
        }
    }

    /// The view-model reference that was being composed.
    pub fn viewmodel(&self) -> &ViewModelSource {
        &self.viewmodel
    }

    /// Human-readable reason, without the `composer:` prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped failure, if any.
    pub fn inner(&self) -> Option<&Error> {
        self.inner.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("missing/page");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not Found");
    }

    #[test]
    fn test_load_display() {
        let err = Error::load("views/home.html", "no such module");
        assert_eq!(
            err.to_string(),
            "failed to load 'views/home.html': no such module"
        );
    }

    #[test]
    fn test_wrap_keeps_inner_as_source() {
        let wrapped = CompositionError::wrap(
            ViewModelSource::module("shell"),
            Error::msg("hook exploded"),
        );
        assert!(wrapped.is_composition());
        assert_eq!(wrapped.to_string(), "composer: hook exploded");

        let Error::Composition(inner) = &wrapped else {
            panic!("expected a composition error");
        };
        assert_eq!(inner.viewmodel().module_id(), Some("shell"));
        assert_eq!(inner.source().unwrap().to_string(), "hook exploded");
    }

    #[test]
    fn test_wrap_does_not_double_wrap() {
        let original: Error =
            CompositionError::new(ViewModelSource::module("shell"), "No view is provided!").into();
        let wrapped = CompositionError::wrap(ViewModelSource::module("other"), original);

        let Error::Composition(inner) = &wrapped else {
            panic!("expected a composition error");
        };
        assert_eq!(inner.viewmodel().module_id(), Some("shell"));
        assert!(inner.inner().is_none());
        assert_eq!(wrapped.to_string(), "composer: No view is provided!");
    }

    #[test]
    fn test_failed_wraps_foreign_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::failed(io);
        assert_eq!(err.to_string(), "disk gone");
    }
}
