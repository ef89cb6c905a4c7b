#![forbid(unsafe_code)]

//! Deferred-callback queue: the microtask boundary.
//!
//! [`next_tick`] appends a callback to a thread-local list; the first
//! append in a window notifies the host-installed waker, and the host
//! event loop drains the batch with [`run_ticks`] at its next microtask
//! opportunity. Callbacks enqueued *while* a batch runs land in the next
//! batch, matching microtask-queue semantics.
//!
//! Tests and hosts without an event loop simply call [`run_ticks`]
//! directly after mutating state.

use std::cell::RefCell;
use std::rc::Rc;

type TickFn = Box<dyn FnOnce()>;

struct TickState {
    callbacks: Vec<TickFn>,
    pending: bool,
    waker: Option<Rc<dyn Fn()>>,
}

thread_local! {
    static TICKS: RefCell<TickState> = RefCell::new(TickState {
        callbacks: Vec::new(),
        pending: false,
        waker: None,
    });
}

/// Install the waker invoked when a tick window opens. The waker must
/// arrange for [`run_ticks`] to be called on the host's microtask queue.
pub fn set_waker(waker: impl Fn() + 'static) {
    TICKS.with_borrow_mut(|t| t.waker = Some(Rc::new(waker)));
}

pub fn clear_waker() {
    TICKS.with_borrow_mut(|t| t.waker = None);
}

/// Defer a callback to the next tick batch.
pub fn next_tick(cb: impl FnOnce() + 'static) {
    let wake = TICKS.with_borrow_mut(|t| {
        t.callbacks.push(Box::new(cb));
        if t.pending {
            None
        } else {
            t.pending = true;
            t.waker.clone()
        }
    });
    if let Some(wake) = wake {
        wake();
    }
}

/// Whether a batch is waiting to run.
#[must_use]
pub fn has_pending_ticks() -> bool {
    TICKS.with_borrow(|t| t.pending)
}

/// Run the current batch of deferred callbacks.
pub fn run_ticks() {
    let batch = TICKS.with_borrow_mut(|t| {
        t.pending = false;
        std::mem::take(&mut t.callbacks)
    });
    for cb in batch {
        cb();
    }
}

/// Run tick batches until none are pending. Convenience for tests and
/// synchronous hosts; each nested batch is one extra turn, capped to
/// avoid masking runaway re-queue loops.
pub fn drain_ticks() {
    let mut turns = 0;
    while has_pending_ticks() {
        run_ticks();
        turns += 1;
        if turns > 1024 {
            tracing::error!(target: "lumen::tick", "drain_ticks exceeded 1024 turns; giving up");
            return;
        }
    }
}
