//! Macros for generating log messages.
//!
//! Each level macro accepts three forms:
//!
//! ```ignore
//! level!(threshold, key = value, ...; "format string", args...);
//! level!(threshold, "format string", args...);
//! level!("message");                        // threshold 0
//! ```
//!
//! There is no threshold-less form with format arguments: in `level!("{}", x)` the format string would bind to the
//! threshold.
//!
//! The threshold must be a `u8`. Field values must implement `tracing::Value`.

#[doc(hidden)]
#[macro_export]
macro_rules! __forge_event {
    ($level:expr, $critical:expr, $threshold:expr, $($key:ident = $value:expr),* ; $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            let threshold: u8 = $threshold;
            $crate::log::tracing::event!(
                $level,
                critical = $critical,
                threshold = threshold,
                $($key = $value,)*
                message = format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! critical {
    ($threshold:expr, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::ERROR, true, $threshold, $($key = $value),+ ; $($arg)+)
    };
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::ERROR, true, $threshold, ; $($arg)+)
    };
    ($message:literal) => {
        $crate::__forge_event!($crate::log::tracing::Level::ERROR, true, 0, ; $message)
    };
}

#[macro_export]
macro_rules! error {
    ($threshold:expr, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::ERROR, false, $threshold, $($key = $value),+ ; $($arg)+)
    };
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::ERROR, false, $threshold, ; $($arg)+)
    };
    ($message:literal) => {
        $crate::__forge_event!($crate::log::tracing::Level::ERROR, false, 0, ; $message)
    };
}

#[macro_export]
macro_rules! warning {
    ($threshold:expr, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::WARN, false, $threshold, $($key = $value),+ ; $($arg)+)
    };
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::WARN, false, $threshold, ; $($arg)+)
    };
    ($message:literal) => {
        $crate::__forge_event!($crate::log::tracing::Level::WARN, false, 0, ; $message)
    };
}

#[macro_export]
macro_rules! info {
    ($threshold:expr, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::INFO, false, $threshold, $($key = $value),+ ; $($arg)+)
    };
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::INFO, false, $threshold, ; $($arg)+)
    };
    ($message:literal) => {
        $crate::__forge_event!($crate::log::tracing::Level::INFO, false, 0, ; $message)
    };
}

#[macro_export]
macro_rules! debug {
    ($threshold:expr, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::DEBUG, false, $threshold, $($key = $value),+ ; $($arg)+)
    };
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::DEBUG, false, $threshold, ; $($arg)+)
    };
    ($message:literal) => {
        $crate::__forge_event!($crate::log::tracing::Level::DEBUG, false, 0, ; $message)
    };
}

#[macro_export]
macro_rules! trace {
    ($threshold:expr, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::TRACE, false, $threshold, $($key = $value),+ ; $($arg)+)
    };
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__forge_event!($crate::log::tracing::Level::TRACE, false, $threshold, ; $($arg)+)
    };
    ($message:literal) => {
        $crate::__forge_event!($crate::log::tracing::Level::TRACE, false, 0, ; $message)
    };
}


// The following makes the macros importable directly from the `log` module.
pub use crate::{critical, error, warning, info, debug, trace};
