#![forbid(unsafe_code)]

//! The update scheduler: a process-wide job queue of pending watchers,
//! deduplicated by id and flushed at most once per tick.
//!
//! # Ordering invariants
//!
//! The queue is sorted immediately before flush so that:
//!
//! 1. Parent-component watchers run before child-component watchers
//!    (parents are constructed first, so their ids are smaller).
//! 2. A component's user watchers run before its render watcher.
//! 3. Watchers of a component destroyed during an ancestor's run are
//!    skipped via the `active` check in `Watcher::run`.
//! 4. Post watchers sort after all normal watchers regardless of id.
//!
//! Watchers enqueued *during* a flush are spliced into sorted position
//! after the flush cursor rather than appended.
//!
//! # Failure Modes
//!
//! Debug builds count re-enqueues of the same watcher id within one flush;
//! past [`MAX_UPDATE_COUNT`] the flush aborts with a diagnostic naming the
//! offending watcher (probable infinite update loop). Already-run jobs
//! stay applied; there is no rollback. Errors from an individual job are
//! routed to the error handler and never abort the rest of the flush.

use std::cell::RefCell;

use ahash::{AHashMap, AHashSet};

use crate::config;
use crate::dep::{cleanup_deps, current_target};
use crate::error::handle_error;
use crate::tick::next_tick;
use crate::watcher::Watcher;

/// Re-enqueue threshold per watcher id within one flush before the flush
/// is treated as an infinite update loop.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Diagnostic produced when the cycle guard trips.
#[derive(Debug, Clone)]
pub struct InfiniteLoopReport {
    pub watcher_id: u64,
    pub expression: String,
    pub user: bool,
}

type ActivatedHook = Box<dyn FnOnce()>;

struct SchedulerState {
    queue: Vec<Watcher>,
    activated: Vec<ActivatedHook>,
    has: AHashSet<u64>,
    circular: AHashMap<u64, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
    report: Option<InfiniteLoopReport>,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState {
        queue: Vec::new(),
        activated: Vec::new(),
        has: AHashSet::new(),
        circular: AHashMap::new(),
        waiting: false,
        flushing: false,
        index: 0,
        report: None,
    });
}

fn sort_compare(a: &Watcher, b: &Watcher) -> std::cmp::Ordering {
    (a.is_post(), a.id()).cmp(&(b.is_post(), b.id()))
}

enum QueueAction {
    None,
    FlushNow,
    ScheduleTick,
}

/// Push a watcher onto the queue. A no-op if the same id is already queued
/// in the current flush window.
pub fn queue_watcher(watcher: &Watcher) {
    let action = SCHEDULER.with_borrow_mut(|s| {
        let id = watcher.id();
        if s.has.contains(&id) {
            return QueueAction::None;
        }
        if let Some(target) = current_target()
            && target == *watcher
            && watcher.no_recurse()
        {
            return QueueAction::None;
        }
        s.has.insert(id);
        if !s.flushing {
            s.queue.push(watcher.clone());
        } else {
            // Splice into sorted position past the flush cursor so a job
            // enqueued by a running job still runs in id order.
            let mut i = s.queue.len();
            while i > s.index + 1 && s.queue[i - 1].id() > id {
                i -= 1;
            }
            s.queue.insert(i, watcher.clone());
        }
        if !s.waiting {
            s.waiting = true;
            if !config::async_enabled() {
                return QueueAction::FlushNow;
            }
            return QueueAction::ScheduleTick;
        }
        QueueAction::None
    });
    match action {
        QueueAction::None => {}
        QueueAction::FlushNow => flush_scheduler_queue(),
        QueueAction::ScheduleTick => next_tick(flush_scheduler_queue),
    }
}

/// Queue a callback for a component reactivated during patching; runs
/// after the main queue drains.
pub fn queue_activated(hook: impl FnOnce() + 'static) {
    SCHEDULER.with_borrow_mut(|s| s.activated.push(Box::new(hook)));
}

/// Flush the queue: sort, run every job (including jobs enqueued along the
/// way), then run activated hooks, updated hooks (most recent first), and
/// the deferred dep-subscriber compaction. Scheduler state is fully reset
/// afterwards.
pub fn flush_scheduler_queue() {
    SCHEDULER.with_borrow_mut(|s| {
        s.flushing = true;
        s.queue.sort_by(sort_compare);
    });

    loop {
        let Some(watcher) = SCHEDULER.with_borrow_mut(|s| {
            if s.index >= s.queue.len() {
                return None;
            }
            let w = s.queue[s.index].clone();
            s.has.remove(&w.id());
            Some(w)
        }) else {
            break;
        };

        watcher.invoke_before();
        if let Err(e) = watcher.run() {
            handle_error(
                &e,
                watcher.scope(),
                &format!("scheduled run of watcher \"{}\"", watcher.expression()),
            );
        }

        if cfg!(debug_assertions) {
            let tripped = SCHEDULER.with_borrow_mut(|s| {
                if s.has.contains(&watcher.id()) {
                    let count = s.circular.entry(watcher.id()).or_insert(0);
                    *count += 1;
                    if *count > MAX_UPDATE_COUNT {
                        s.report = Some(InfiniteLoopReport {
                            watcher_id: watcher.id(),
                            expression: watcher.expression().to_owned(),
                            user: watcher.is_user(),
                        });
                        return true;
                    }
                }
                false
            });
            if tripped {
                if watcher.is_user() {
                    tracing::error!(
                        target: "lumen::scheduler",
                        watcher_id = watcher.id(),
                        expression = watcher.expression(),
                        "probable infinite update loop in watcher"
                    );
                } else {
                    tracing::error!(
                        target: "lumen::scheduler",
                        watcher_id = watcher.id(),
                        "probable infinite update loop in a component render function"
                    );
                }
                break;
            }
        }

        SCHEDULER.with_borrow_mut(|s| s.index += 1);
    }

    let (activated, updated) = SCHEDULER.with_borrow_mut(|s| {
        let activated = std::mem::take(&mut s.activated);
        let updated = std::mem::take(&mut s.queue);
        s.has.clear();
        s.circular.clear();
        s.index = 0;
        s.waiting = false;
        s.flushing = false;
        (activated, updated)
    });

    for hook in activated {
        hook();
    }
    // Updated notifications, most-recently-queued first, render watchers
    // of still-live components only.
    for watcher in updated.iter().rev() {
        if watcher.is_render() && watcher.is_active() {
            watcher.invoke_updated();
        }
    }
    cleanup_deps();
}

/// Take the most recent cycle-guard diagnostic, if a flush aborted.
#[must_use]
pub fn take_infinite_loop_report() -> Option<InfiniteLoopReport> {
    SCHEDULER.with_borrow_mut(|s| s.report.take())
}
