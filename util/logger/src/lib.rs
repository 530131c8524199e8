//! PLCR logging facade.
//!
//! This crate is a facade over the [`log`] crate: the runtime and every
//! plugin crate log through these macros, and a single process installs the
//! backend via `plcr-logger-service`. Keeping the facade separate lets leaf
//! crates log without dragging the service (writer thread, socket sink) into
//! their dependency tree.
//!
//! The `*_target!` variants pin the component tag that ends up between the
//! brackets in the emitted line; the plain macros use the module path.

pub use log::{self, Level, SetLoggerError};

/// Logs a message at the trace level using the caller's module path as target.
#[macro_export]
macro_rules! trace {
    ($( $args:tt )*) => {
        $crate::log::trace!($( $args )*);
    }
}

/// Logs a message at the debug level using the caller's module path as target.
#[macro_export]
macro_rules! debug {
    ($( $args:tt )*) => {
        $crate::log::debug!($( $args )*);
    }
}

/// Logs a message at the info level using the caller's module path as target.
#[macro_export]
macro_rules! info {
    ($( $args:tt )*) => {
        $crate::log::info!($( $args )*);
    }
}

/// Logs a message at the warn level using the caller's module path as target.
#[macro_export]
macro_rules! warn {
    ($( $args:tt )*) => {
        $crate::log::warn!($( $args )*);
    }
}

/// Logs a message at the error level using the caller's module path as target.
#[macro_export]
macro_rules! error {
    ($( $args:tt )*) => {
        $crate::log::error!($( $args )*);
    }
}

/// Logs a message at the trace level with an explicit component target.
#[macro_export]
macro_rules! trace_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::log::trace!(target: $target, $( $args )*);
    }
}

/// Logs a message at the debug level with an explicit component target.
#[macro_export]
macro_rules! debug_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::log::debug!(target: $target, $( $args )*);
    }
}

/// Logs a message at the info level with an explicit component target.
#[macro_export]
macro_rules! info_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::log::info!(target: $target, $( $args )*);
    }
}

/// Logs a message at the warn level with an explicit component target.
#[macro_export]
macro_rules! warn_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::log::warn!(target: $target, $( $args )*);
    }
}

/// Logs a message at the error level with an explicit component target.
#[macro_export]
macro_rules! error_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::log::error!(target: $target, $( $args )*);
    }
}
