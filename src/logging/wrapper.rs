// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `[context] message` macros over the `log` facade.
//!
//! When structured logging is on, `slog-stdlog` forwards the records to the
//! global `slog` logger.

/// Log an error message prefixed with `[context]`.
#[macro_export]
macro_rules! error_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__log::error!("[{}] {}", $context, format_args!($($arg)+))
    };
}

/// Log a warning message prefixed with `[context]`.
#[macro_export]
macro_rules! warn_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__log::warn!("[{}] {}", $context, format_args!($($arg)+))
    };
}

/// Log an info message prefixed with `[context]`.
#[macro_export]
macro_rules! info_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__log::info!("[{}] {}", $context, format_args!($($arg)+))
    };
}

/// Log a debug message prefixed with `[context]`.
#[macro_export]
macro_rules! debug_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__log::debug!("[{}] {}", $context, format_args!($($arg)+))
    };
}

/// Log a trace message prefixed with `[context]`.
#[macro_export]
macro_rules! trace_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__log::trace!("[{}] {}", $context, format_args!($($arg)+))
    };
}
