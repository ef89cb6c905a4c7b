#![forbid(unsafe_code)]

//! Centralized error routing for evaluator failures.
//!
//! Evaluator errors (a watch getter, a computed getter, a render function)
//! are routed through [`handle_error`]: the owning scope's error-capture
//! hooks run first, walking up the scope chain; if none claims the error it
//! falls through to the global handler installed via
//! [`config::set_error_handler`](crate::config::set_error_handler), and
//! finally to `tracing::error!`. Dependency tracking is suspended for the
//! duration (a `None` frame on the target stack) so the handlers themselves
//! cannot create spurious reactive edges.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config;
use crate::dep::{pop_target, push_target};

/// Failure of a watcher evaluator.
///
/// Rust closures surface failure as `Result`, so the evaluator is the only
/// fallible seam in the engine; watcher callbacks are infallible.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A watch path was not a simple dot-delimited identifier path.
    #[error("invalid watch path {0:?}: only dot-delimited paths are supported")]
    InvalidPath(String),

    /// A host-supplied evaluator failed with a message.
    #[error("{0}")]
    Message(String),

    /// A host-supplied evaluator failed with a typed error.
    #[error(transparent)]
    Source(Box<dyn std::error::Error + 'static>),
}

impl EvalError {
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn source_of(err: impl std::error::Error + 'static) -> Self {
        Self::Source(Box::new(err))
    }
}

type CapturedHook = Box<dyn Fn(&EvalError, &str) -> bool>;

struct ScopeInner {
    parent: Option<ErrorScope>,
    captured: RefCell<Vec<CapturedHook>>,
}

/// One link in an error-capture chain.
///
/// The host component layer attaches a scope per component; a hook that
/// returns `true` claims the error and stops propagation.
#[derive(Clone)]
pub struct ErrorScope {
    inner: Rc<ScopeInner>,
}

impl ErrorScope {
    #[must_use]
    pub fn new(parent: Option<&ErrorScope>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                parent: parent.cloned(),
                captured: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register an error-capture hook on this scope.
    pub fn on_error_captured(&self, hook: impl Fn(&EvalError, &str) -> bool + 'static) {
        self.inner.captured.borrow_mut().push(Box::new(hook));
    }

    fn parent(&self) -> Option<ErrorScope> {
        self.inner.parent.clone()
    }
}

impl std::fmt::Debug for ErrorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorScope")
            .field("hooks", &self.inner.captured.borrow().len())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Route an evaluator error through the capture chain, then the global
/// handler, then logging.
pub fn handle_error(err: &EvalError, scope: Option<&ErrorScope>, info: &str) {
    // Suspend dependency tracking while handlers run.
    push_target(None);
    let mut cur = scope.cloned();
    while let Some(s) = cur {
        let claimed = s
            .inner
            .captured
            .borrow()
            .iter()
            .any(|hook| hook(err, info));
        if claimed {
            pop_target();
            return;
        }
        cur = s.parent();
    }
    if !config::invoke_error_handler(err, info) {
        tracing::error!(target: "lumen::error", info, error = %err, "unhandled evaluator error");
    }
    pop_target();
}
