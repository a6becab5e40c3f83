//! Logging facade.
//!
//! The engine, the activation slot and the router report what they do through
//! a handful of macros that forward to either [`log`](https://docs.rs/log) or
//! [`tracing`](https://docs.rs/tracing), selected by Cargo feature. Enable at
//! most one of the two.
//!
//! | Feature    | Backend         | Default |
//! |------------|-----------------|---------|
//! | `log`      | `log` crate     | yes     |
//! | `tracing`  | `tracing` crate | no      |
//!
//! With neither feature enabled every macro expands to nothing. Records are
//! emitted under the `compose_navigator` target so hosts can filter them as a
//! group.
//!
//! Levels used across the crate:
//!
//! - `trace_log!`: per-route match attempts, per-hook invocations.
//! - `debug_log!`: dispatch and composition steps.
//! - `info_log!`: route registration, router start/stop.
//! - `warn_log!`: recovered failures (rollback, aborted completion waits).
//! - `error_log!`: hook and navigation failures that are re-raised.
//!
//! ```ignore
//! use compose_navigator::{debug_log, error_log, info_log, trace_log, warn_log};
//!
//! trace_log!("Testing route '{}' against '{}'", key, fragment);
//! debug_log!("Dispatching '{}' to {} chain(s)", fragment, chains);
//! info_log!("Registered route '{}'", key);
//! warn_log!("Rolling back to '{}'", last_good);
//! error_log!("activator> {}", err);
//! ```

/// Log target shared by every record of the crate.
pub const TARGET: &str = "compose_navigator";

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($level:ident, $($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::$level!(target: $crate::logging::TARGET, $($arg)*);
        #[cfg(feature = "log")]
        ::log::$level!(target: $crate::logging::TARGET, $($arg)*);
    };
}

/// Per-route match attempts, per-hook invocations.
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => { $crate::__emit!(trace, $($arg)*); };
}

/// Dispatch and composition steps.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => { $crate::__emit!(debug, $($arg)*); };
}

/// Registrations, router start and stop.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => { $crate::__emit!(info, $($arg)*); };
}

/// Failures the crate recovers from.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => { $crate::__emit!(warn, $($arg)*); };
}

/// Failures about to be re-raised. Logged where the error crosses an async
/// boundary, so it shows up even if the caller drops it.
#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => { $crate::__emit!(error, $($arg)*); };
}
