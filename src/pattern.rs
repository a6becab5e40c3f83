//! Route templates and matchers.
//!
//! A route template is a path with a few special forms, compiled into an
//! anchored regular expression by [`compile_pattern`]:
//!
//! | Template   | Regex            | Meaning                               |
//! |------------|------------------|---------------------------------------|
//! | `*`        | `.*`             | anything                              |
//! | `?`        | `\?`             | a literal question mark               |
//! | `(...)`    | `(?:...)?`       | an optional group                     |
//! | `:name`    | `([^/()?]+?)`    | a capture, inside or outside a group  |
//!
//! A `?` right after a group repeats the group's own optionality and is
//! absorbed, so `a(/:b)?` and `a(/:b)` compile to the same matcher.
//!
//! # Examples
//!
//! ```
//! use compose_navigator::pattern::RouteMatcher;
//!
//! let matcher = RouteMatcher::template("items/:id").unwrap();
//! assert_eq!(matcher.captures("items/42"), Some(vec![Some("42".to_string())]));
//! assert_eq!(matcher.captures("items"), None);
//! ```

use crate::error::{Error, Result};
use crate::viewmodel::Args;
use regex::Regex;
use std::fmt;

const CAPTURE: &str = r"([^/()?]+?)";

/// Canonical key of the match-everything matcher.
pub const ANY_KEY: &str = "(.*)";

/// Strip one leading `#`, then one trailing `/`, then one leading `/`.
pub fn normalize_route(path: &str) -> &str {
    let path = path.strip_prefix('#').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.strip_prefix('/').unwrap_or(path)
}

/// Compile a route template into an anchored regular expression.
pub fn compile_pattern(template: &str) -> Result<Regex> {
    let route = normalize_route(template);
    let mut source = String::with_capacity(route.len() * 2 + 2);
    source.push('^');

    let mut rest = route;
    while !rest.is_empty() {
        let group = rest
            .strip_prefix('(')
            .and_then(|tail| tail.find(')').map(|end| (&tail[..end], &tail[end + 1..])))
            .filter(|(inner, _)| !inner.is_empty());

        if let Some((inner, tail)) = group {
            source.push_str("(?:");
            translate(inner, &mut source);
            source.push_str(")?");
            rest = tail.strip_prefix('?').unwrap_or(tail);
        } else {
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let end = rest[first..].find('(').map_or(rest.len(), |i| i + first);
            translate(&rest[..end], &mut source);
            rest = &rest[end..];
        }
    }

    source.push('$');
    Regex::new(&source).map_err(|source| Error::Pattern {
        pattern: template.to_string(),
        source,
    })
}

/// Translate `*`, `?` and `:name` in a template run without groups.
fn translate(run: &str, out: &mut String) {
    let mut chars = run.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push_str(r"\?"),
            ':' if chars.peek().is_some_and(char::is_ascii_alphanumeric) => {
                while chars.next_if(char::is_ascii_alphanumeric).is_some() {}
                out.push_str(CAPTURE);
            }
            other => out.push(other),
        }
    }
}

/// What a path prefix or a route can be registered against.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// A route template.
    Path(String),
    /// A ready-made regular expression, used as is.
    Regex(Regex),
}

impl From<&str> for Pattern {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Pattern {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

/// A compiled route matcher.
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    /// Matches every fragment, capturing it whole.
    Any,
    /// Matches through a regular expression.
    Regex(Regex),
}

impl RouteMatcher {
    /// Exact match of a template, or a regex used as is.
    pub fn template(pattern: impl Into<Pattern>) -> Result<Self> {
        match pattern.into() {
            Pattern::Path(path) => compile_pattern(&path).map(Self::Regex),
            Pattern::Regex(regex) => Ok(Self::Regex(regex)),
        }
    }

    /// Match of a template followed by anything, or a regex used as is.
    pub fn prefix(pattern: impl Into<Pattern>) -> Result<Self> {
        match pattern.into() {
            Pattern::Path(path) => compile_pattern(&format!("{path}(*)")).map(Self::Regex),
            Pattern::Regex(regex) => Ok(Self::Regex(regex)),
        }
    }

    /// Canonical form; equal keys denote the same route.
    pub fn key(&self) -> &str {
        match self {
            Self::Any => ANY_KEY,
            Self::Regex(regex) => regex.as_str(),
        }
    }

    /// Positional captures when `fragment` matches. Groups that did not
    /// participate are `None`.
    pub fn captures(&self, fragment: &str) -> Option<Args> {
        match self {
            Self::Any => Some(vec![Some(fragment.to_string())]),
            Self::Regex(regex) => regex.captures(fragment).map(|caps| {
                caps.iter()
                    .skip(1)
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect()
            }),
        }
    }
}

impl fmt::Display for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
