#![deny(missing_docs)]
//! Shared logging utilities for the exporter workspace.
//!
//! This crate provides the `export_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Records emitted while
//! a [`PageContextGuard`] is alive are prefixed with the page being processed,
//! so a failure can be traced back to a page id and title without threading
//! that information through every call.

use std::cell::RefCell;
use std::fmt;

thread_local! {
    /// Label of the page currently being exported on this thread.
    static PAGE_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Restores the previous page context when dropped.
#[must_use = "the page context is cleared when the guard is dropped"]
pub struct PageContextGuard {
    previous: Option<String>,
}

impl Drop for PageContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        PAGE_CONTEXT.with(|ctx| *ctx.borrow_mut() = previous);
    }
}

/// Sets the page context for the current thread until the guard is dropped.
pub fn enter_page(page_id: &str, title: &str) -> PageContextGuard {
    let label = format!("{page_id} {title:?}");
    let previous = PAGE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(label));
    PageContextGuard { previous }
}

/// Returns the page context label for the current thread, if any.
pub fn current_page() -> Option<String> {
    PAGE_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Forwards a record to the `log` facade, prefixed with the page context.
///
/// Used by the `export_*` macros; call those instead.
#[doc(hidden)]
pub fn log_with_context(target: &str, level: log::Level, args: fmt::Arguments<'_>) {
    if !log::log_enabled!(target: target, level) {
        return;
    }
    PAGE_CONTEXT.with(|ctx| match ctx.borrow().as_deref() {
        Some(page) => log::log!(target: target, level, "[{page}] {args}"),
        None => log::log!(target: target, level, "{args}"),
    });
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! export_trace {
    ($($arg:tt)*) => {{
        $crate::log_with_context(module_path!(), $crate::Level::Trace, format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! export_info {
    ($($arg:tt)*) => {{
        $crate::log_with_context(module_path!(), $crate::Level::Info, format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! export_debug {
    ($($arg:tt)*) => {{
        $crate::log_with_context(module_path!(), $crate::Level::Debug, format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! export_warn {
    ($($arg:tt)*) => {{
        $crate::log_with_context(module_path!(), $crate::Level::Warn, format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! export_error {
    ($($arg:tt)*) => {{
        $crate::log_with_context(module_path!(), $crate::Level::Error, format_args!($($arg)*));
    }};
}

/// Log level, re-exported for the logging macros.
pub use log::Level;

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )]);
}
