#![forbid(unsafe_code)]

//! Lazy computed values on top of [`Watcher`].
//!
//! A [`Computed`] wraps a lazy watcher: dependency notifications only mark
//! it dirty, and the value is recomputed on the next read. Reading a
//! computed while another watcher is collecting re-registers the
//! computed's entire dependency set onto that outer watcher, so a render
//! that reads a computed transitively depends on everything the computed
//! reads.

use crate::dep::current_target;
use crate::error::EvalError;
use crate::value::Value;
use crate::watcher::{WatchSource, Watcher, WatcherOptions};

pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// Create a computed value. The getter is not called until the first
    /// `get()`.
    #[must_use]
    pub fn new(getter: impl FnMut(&Value) -> Result<Value, EvalError> + 'static) -> Self {
        Self::with_ctx(Value::Null, getter)
    }

    /// Create a computed value evaluated against an owner context.
    #[must_use]
    pub fn with_ctx(
        ctx: Value,
        getter: impl FnMut(&Value) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        let watcher = Watcher::new(
            ctx,
            WatchSource::getter(getter),
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .unwrap_or_else(|_| unreachable!("lazy watchers do not evaluate at construction"));
        Self { watcher }
    }

    /// Current value, recomputing if any dependency changed since the
    /// last read.
    ///
    /// # Errors
    ///
    /// Propagates the getter's error; the cached value and dirty flag are
    /// left as-is so the next read retries.
    pub fn get(&self) -> Result<Value, EvalError> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if current_target().is_some() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// Stop tracking; the last cached value remains readable.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.watcher.is_dirty())
            .field("value", &self.watcher.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn lazy_and_memoized() {
        let state = Value::object([("n", Value::Int(2))]);
        observe(&state).unwrap();
        let evals = Rc::new(Cell::new(0u32));
        let evals2 = Rc::clone(&evals);
        let state2 = state.clone();
        let doubled = Computed::new(move |_| {
            evals2.set(evals2.get() + 1);
            Ok(Value::Int(
                state2.as_object().unwrap().get("n").as_int().unwrap() * 2,
            ))
        });

        assert_eq!(evals.get(), 0);
        assert_eq!(doubled.get().unwrap().as_int(), Some(4));
        assert_eq!(evals.get(), 1);
        // Cached.
        assert_eq!(doubled.get().unwrap().as_int(), Some(4));
        assert_eq!(evals.get(), 1);

        state.as_object().unwrap().set("n", Value::Int(5));
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get().unwrap().as_int(), Some(10));
        assert_eq!(evals.get(), 2);
    }

    #[test]
    fn outer_watcher_transitively_depends_through_computed() {
        let state = Value::object([("n", Value::Int(1))]);
        observe(&state).unwrap();
        let state2 = state.clone();
        let squared = Rc::new(Computed::new(move |_| {
            let n = state2.as_object().unwrap().get("n").as_int().unwrap();
            Ok(Value::Int(n * n))
        }));

        let runs = Rc::new(Cell::new(0u32));
        let runs2 = Rc::clone(&runs);
        let sq = Rc::clone(&squared);
        let outer = Watcher::new(
            Value::Null,
            WatchSource::getter(move |_| sq.get()),
            Some(Box::new(move |_, _| runs2.set(runs2.get() + 1))),
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outer.value().as_int(), Some(1));
        // The outer watcher depends on n even though it never read n
        // directly.
        state.as_object().unwrap().set("n", Value::Int(3));
        assert_eq!(runs.get(), 1);
        assert_eq!(outer.value().as_int(), Some(9));
    }

    #[test]
    fn getter_error_keeps_dirty_for_retry() {
        let fail = Rc::new(Cell::new(true));
        let fail2 = Rc::clone(&fail);
        let c = Computed::new(move |_| {
            if fail2.get() {
                Err(EvalError::msg("boom"))
            } else {
                Ok(Value::Int(1))
            }
        });
        assert!(c.get().is_err());
        assert!(c.is_dirty());
        fail.set(false);
        assert_eq!(c.get().unwrap().as_int(), Some(1));
    }
}
