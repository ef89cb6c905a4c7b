#![forbid(unsafe_code)]

//! Patch modules.
//!
//! Cross-cutting concerns (attributes, classes, event listeners) plug into
//! the patcher as [`PatchModule`]s. The patcher invokes every module at each
//! lifecycle point; modules read the vnode pair and write to the host
//! element through whatever channel they hold.
//!
//! Removal is cooperative: an element leaves the host tree only after every
//! module with a `remove` override has called [`RemoveHandle::done`], which
//! lets a transition module keep the element alive until an animation ends.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::host::HostOps;
use crate::vnode::VNode;

/// Lifecycle hooks for a cross-cutting patch concern. All default to
/// no-ops except `remove`, which must release its slot.
pub trait PatchModule<H: HostOps> {
    /// A fresh element was created for `vnode`; `empty` is a blank node to
    /// diff against.
    fn create(&self, _empty: &VNode<H::Node>, _vnode: &VNode<H::Node>) {}
    /// A matching node pair is being patched in place.
    fn update(&self, _old: &VNode<H::Node>, _new: &VNode<H::Node>) {}
    /// A kept-alive subtree re-entered the tree with its element already
    /// realized; fired instead of `create`. What reactivation means (for
    /// example, scheduling activated callbacks) is up to the host layer.
    fn activate(&self, _empty: &VNode<H::Node>, _vnode: &VNode<H::Node>) {}
    /// The node is leaving the tree for good.
    fn destroy(&self, _vnode: &VNode<H::Node>) {}
    /// The node's element is about to be detached. Call `done.done()` when
    /// this module no longer needs the element in place.
    fn remove(&self, _vnode: &VNode<H::Node>, done: &RemoveHandle) {
        done.done();
    }
}

/// Countdown latch guarding element detachment.
pub struct RemoveHandle {
    remaining: Cell<usize>,
    finish: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl RemoveHandle {
    /// `listeners` is the number of `done()` calls required before
    /// `finish` runs.
    #[must_use]
    pub fn new(listeners: usize, finish: impl FnOnce() + 'static) -> Rc<Self> {
        Rc::new(Self {
            remaining: Cell::new(listeners),
            finish: RefCell::new(Some(Box::new(finish))),
        })
    }

    pub fn done(&self) {
        let left = self.remaining.get().saturating_sub(1);
        self.remaining.set(left);
        if left == 0
            && let Some(finish) = self.finish.borrow_mut().take()
        {
            finish();
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.remaining.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_runs_after_last_done() {
        let fired = Rc::new(Cell::new(false));
        let fired2 = Rc::clone(&fired);
        let handle = RemoveHandle::new(3, move || fired2.set(true));
        handle.done();
        handle.done();
        assert!(!fired.get());
        handle.done();
        assert!(fired.get());
        // Extra calls are inert.
        handle.done();
        assert_eq!(handle.pending(), 0);
    }
}
