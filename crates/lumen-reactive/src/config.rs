#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Thread-local, since the engine is single-threaded: tests that toggle
//! these run on their own thread and cannot leak into each other.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EvalError;

type ErrorHandler = Rc<dyn Fn(&EvalError, &str)>;

struct RuntimeConfig {
    async_enabled: bool,
    error_handler: Option<ErrorHandler>,
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig {
        async_enabled: true,
        error_handler: None,
    });
}

/// Whether scheduler flushes are deferred to the next tick.
///
/// When disabled the scheduler flushes synchronously from `queue_watcher`,
/// a debug/testing escape hatch; `Dep::notify` then sorts its subscriber
/// snapshot by id so ordering still matches a batched flush.
#[must_use]
pub fn async_enabled() -> bool {
    CONFIG.with_borrow(|c| c.async_enabled)
}

pub fn set_async(enabled: bool) {
    CONFIG.with_borrow_mut(|c| c.async_enabled = enabled);
}

/// Install the global fallback error handler.
pub fn set_error_handler(handler: impl Fn(&EvalError, &str) + 'static) {
    CONFIG.with_borrow_mut(|c| c.error_handler = Some(Rc::new(handler)));
}

pub fn clear_error_handler() {
    CONFIG.with_borrow_mut(|c| c.error_handler = None);
}

/// Invoke the global handler if one is installed. Returns `false` when no
/// handler is set so the caller can fall back to logging.
pub(crate) fn invoke_error_handler(err: &EvalError, info: &str) -> bool {
    let handler = CONFIG.with_borrow(|c| c.error_handler.clone());
    match handler {
        Some(h) => {
            h(err, info);
            true
        }
        None => false,
    }
}
