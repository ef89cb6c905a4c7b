#![forbid(unsafe_code)]

//! Reactivity engine: dependency tracking, change propagation, and the
//! batched update scheduler.
//!
//! This crate provides the change-tracking half of the Lumen runtime:
//!
//! - [`Dep`]: a publisher of change notifications, one per tracked field.
//! - [`Value`], [`RObject`], [`RArray`]: an explicit reactive data model.
//!   Reads through the container accessors register dependency edges on the
//!   currently collecting [`Watcher`]; writes notify the field's [`Dep`].
//! - [`Watcher`]: a subscriber that evaluates a getter, records which Deps
//!   it read, and re-evaluates when any of them notify.
//! - [`Computed`]: a lazy watcher behind a memoizing `get()`.
//! - [`scheduler`]: a process-wide job queue that batches watcher
//!   re-evaluations into a single flush per tick, sorted for correctness.
//!
//! # Architecture
//!
//! Everything is single-threaded and cooperative. Shared state uses
//! `Rc`/`RefCell`; process-wide state (the collecting-target stack, the
//! scheduler queue, the pending Dep cleanup list, the next-tick callbacks)
//! is `thread_local!`. A Dep holds only `Weak` references to its
//! subscribers; ownership is unidirectional (a watcher owns its dep list,
//! never the other way around).
//!
//! # Invariants
//!
//! 1. During one evaluation exactly one watcher is the collecting target;
//!    the target slot is a push/pop stack so re-entrant evaluation nests.
//! 2. A dependency edge is deduplicated by dep id within one evaluation
//!    pass, and dependency sets are live: a dep read on a previous pass but
//!    not on the current one is unsubscribed when the pass ends.
//! 3. N synchronous mutations in one call stack produce exactly one
//!    scheduler flush of each affected watcher.
//! 4. Scheduler jobs run in watcher-id order (parents before children,
//!    user watchers before render watchers), post watchers last.

pub mod computed;
pub mod config;
pub mod dep;
pub mod error;
pub mod observer;
pub mod path;
pub mod scheduler;
pub mod tick;
pub mod traverse;
pub mod value;
pub mod watcher;

pub use computed::Computed;
pub use dep::{Dep, current_target, pop_target, push_target};
pub use error::{ErrorScope, EvalError, handle_error};
pub use observer::{RArray, RObject, RefValue, del_key, observe, set_key, toggle_observing};
pub use scheduler::{MAX_UPDATE_COUNT, queue_watcher};
pub use value::{Value, has_changed};
pub use watcher::{WatchSource, Watcher, WatcherOptions};
