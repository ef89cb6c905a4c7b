#![forbid(unsafe_code)]

//! Lumen: a reactive UI runtime.
//!
//! State lives in [`Value`] trees converted by [`observe`]; render
//! functions read state and return [`VNode`] trees; [`App::mount`] wires
//! the two together so mutations batch through the scheduler and flow out
//! as minimal host-tree patches.
//!
//! The host advances the runtime by draining the microtask queue
//! ([`run_ticks`] or [`drain_ticks`]) whenever the installed waker fires.

pub mod app;

pub use app::{App, MountOptions};

pub use lumen_reactive::{
    Computed, ErrorScope, EvalError, RArray, RObject, RefValue, Value, WatchSource, Watcher,
    WatcherOptions, del_key, handle_error, observe, set_key,
};
pub use lumen_reactive::config::{set_async, set_error_handler};
pub use lumen_reactive::observer::{mark_readonly, observe_with, observer_of, toggle_observing};
pub use lumen_reactive::scheduler::{
    InfiniteLoopReport, MAX_UPDATE_COUNT, queue_activated, take_infinite_loop_report,
};
pub use lumen_reactive::tick::{clear_waker, drain_ticks, next_tick, run_ticks, set_waker};

pub use lumen_vdom::{
    HostOps, Key, NodeHooks, PatchError, PatchModule, Patcher, RemoveHandle, VNode, VNodeData,
    VNodeFlags,
};
