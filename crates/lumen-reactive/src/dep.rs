#![forbid(unsafe_code)]

//! Dependency nodes and the global collecting-target stack.
//!
//! A [`Dep`] is the publisher side of one reactive field: it holds the set
//! of subscribed watchers and notifies them on mutation. Subscriber slots
//! are nullable so removal is O(1); compaction of the nulled slots is
//! deferred to a thread-local pending list drained once per scheduler flush
//! by [`cleanup_deps`], which keeps high-fanout deps from paying a
//! quadratic in-place removal cost.
//!
//! The collecting target is a push/pop stack, not a bare slot: a getter
//! that recursively triggers another watcher's evaluation (computed within
//! render) must restore the outer target when the inner evaluation pops.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::config;
use crate::watcher::{Watcher, WatcherInner};

thread_local! {
    static DEP_ID: Cell<u64> = const { Cell::new(0) };
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
    static PENDING_CLEANUP: RefCell<Vec<Dep>> = const { RefCell::new(Vec::new()) };
}

struct DepInner {
    id: u64,
    /// No-op dep used for mock (non-DOM evaluation) observers.
    mock: bool,
    /// Nullable slots: `remove_sub` nulls instead of compacting.
    subs: RefCell<Vec<Option<Weak<WatcherInner>>>>,
    /// Already queued on the pending-cleanup list.
    pending: Cell<bool>,
}

/// A dependency node: publisher of change notifications for one tracked
/// field, ref cell, or container.
///
/// Cloning a `Dep` clones the handle, not the node.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    fn alloc(mock: bool) -> Self {
        let id = DEP_ID.with(|c| {
            let id = c.get();
            c.set(id + 1);
            id
        });
        Self {
            inner: Rc::new(DepInner {
                id,
                mock,
                subs: RefCell::new(Vec::new()),
                pending: Cell::new(false),
            }),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::alloc(false)
    }

    /// A dep that ignores `depend`/`notify`, for mock observers.
    #[must_use]
    pub fn mock() -> Self {
        Self::alloc(true)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn ptr_eq(a: &Dep, b: &Dep) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Register the edge Dep -> watcher.
    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        if self.inner.mock {
            return;
        }
        self.inner
            .subs
            .borrow_mut()
            .push(Some(Rc::downgrade(&watcher.inner)));
    }

    /// Null the subscriber's slot and defer compaction to the next flush.
    pub(crate) fn remove_sub(&self, watcher: &Watcher) {
        if self.inner.mock {
            return;
        }
        let mut subs = self.inner.subs.borrow_mut();
        for slot in subs.iter_mut() {
            let matches = slot
                .as_ref()
                .and_then(Weak::upgrade)
                .is_some_and(|inner| Rc::ptr_eq(&inner, &watcher.inner));
            if matches {
                *slot = None;
                break;
            }
        }
        drop(subs);
        if !self.inner.pending.get() {
            self.inner.pending.set(true);
            PENDING_CLEANUP.with_borrow_mut(|pending| pending.push(self.clone()));
        }
    }

    /// Register this dep on whatever watcher is currently collecting.
    pub fn depend(&self) {
        if self.inner.mock {
            return;
        }
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Notify every live subscriber, iterating a stable snapshot.
    pub fn notify(&self) {
        if self.inner.mock {
            return;
        }
        let mut snapshot: Vec<Watcher> = self
            .inner
            .subs
            .borrow()
            .iter()
            .filter_map(|slot| slot.as_ref().and_then(Weak::upgrade))
            .map(Watcher::from_inner)
            .collect();
        if !config::async_enabled() {
            // Subs are not sorted by the scheduler in sync mode, so order
            // them here to keep the flush-order guarantee.
            snapshot.sort_by_key(Watcher::id);
        }
        for watcher in snapshot {
            watcher.update();
        }
    }

    /// Number of live (non-null, alive) subscribers. Diagnostic.
    #[must_use]
    pub fn sub_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .iter()
            .filter(|slot| slot.as_ref().and_then(Weak::upgrade).is_some())
            .count()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subs", &self.sub_count())
            .finish()
    }
}

/// Compact every dep whose subscriber list was soft-deleted since the last
/// flush. Called once per scheduler flush.
pub fn cleanup_deps() {
    let pending = PENDING_CLEANUP.with_borrow_mut(std::mem::take);
    for dep in pending {
        dep.inner
            .subs
            .borrow_mut()
            .retain(|slot| slot.as_ref().is_some_and(|w| w.strong_count() > 0));
        dep.inner.pending.set(false);
    }
}

/// Push a collecting target. `None` suspends collection.
pub fn push_target(target: Option<Watcher>) {
    TARGET_STACK.with_borrow_mut(|stack| stack.push(target));
}

pub fn pop_target() {
    TARGET_STACK.with_borrow_mut(|stack| {
        stack.pop();
    });
}

/// The watcher currently collecting dependencies, if any.
#[must_use]
pub fn current_target() -> Option<Watcher> {
    TARGET_STACK.with_borrow(|stack| stack.last().cloned().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::watcher::{WatchSource, Watcher, WatcherOptions};

    fn noop_watcher() -> Watcher {
        Watcher::new(
            Value::Null,
            WatchSource::getter(|_| Ok(Value::Null)),
            None,
            WatcherOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = Dep::new();
        let b = Dep::new();
        assert!(b.id() > a.id());
    }

    #[test]
    fn remove_sub_defers_compaction() {
        let dep = Dep::new();
        let w = noop_watcher();
        dep.add_sub(&w);
        assert_eq!(dep.sub_count(), 1);

        dep.remove_sub(&w);
        assert_eq!(dep.sub_count(), 0);
        // The slot itself is only nulled, not compacted.
        assert_eq!(dep.inner.subs.borrow().len(), 1);

        cleanup_deps();
        assert_eq!(dep.inner.subs.borrow().len(), 0);
    }

    #[test]
    fn cleanup_is_registered_once_per_dep() {
        let dep = Dep::new();
        let a = noop_watcher();
        let b = noop_watcher();
        dep.add_sub(&a);
        dep.add_sub(&b);
        dep.remove_sub(&a);
        dep.remove_sub(&b);
        let queued = PENDING_CLEANUP.with_borrow(|p| {
            p.iter().filter(|d| Dep::ptr_eq(d, &dep)).count()
        });
        assert_eq!(queued, 1);
        cleanup_deps();
    }

    #[test]
    fn dead_watchers_are_dropped_from_snapshot() {
        let dep = Dep::new();
        {
            let w = noop_watcher();
            dep.add_sub(&w);
            assert_eq!(dep.sub_count(), 1);
        }
        assert_eq!(dep.sub_count(), 0);
        // notify on a dep full of dead weaks is a no-op, not a panic
        dep.notify();
    }

    #[test]
    fn target_stack_nests() {
        assert!(current_target().is_none());
        let outer = noop_watcher();
        let inner = noop_watcher();
        push_target(Some(outer.clone()));
        push_target(Some(inner.clone()));
        assert_eq!(current_target().unwrap().id(), inner.id());
        pop_target();
        assert_eq!(current_target().unwrap().id(), outer.id());
        pop_target();
        assert!(current_target().is_none());
    }

    #[test]
    fn none_frame_suspends_collection() {
        let w = noop_watcher();
        push_target(Some(w));
        push_target(None);
        assert!(current_target().is_none());
        pop_target();
        assert!(current_target().is_some());
        pop_target();
    }

    #[test]
    fn mock_dep_is_inert() {
        let dep = Dep::mock();
        let w = noop_watcher();
        dep.add_sub(&w);
        assert_eq!(dep.sub_count(), 0);
        dep.notify();
    }
}
