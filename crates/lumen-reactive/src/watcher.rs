#![forbid(unsafe_code)]

//! Computation nodes.
//!
//! A [`Watcher`] evaluates a getter with itself installed as the collecting
//! target, records which deps it read, and re-evaluates when any of them
//! notify. The same type backs component renders (render flag), computed
//! values (lazy flag), and user watch registrations (user flag).
//!
//! # Invariants
//!
//! 1. Dependency sets are live: after each evaluation pass, any dep read on
//!    the previous pass but not this one is unsubscribed.
//! 2. `run()` fires the callback iff the value changed by the NaN-aware
//!    rule, or the new value is a container, or the watcher is deep.
//! 3. `teardown()` is idempotent; after it, no dep retains a live
//!    subscription to this watcher.
//!
//! # Failure Modes
//!
//! Getter errors from *user* watchers are routed to
//! [`handle_error`](crate::error::handle_error) and the watcher keeps
//! running (its value resets to `Null` for that pass). Getter errors from
//! render and plain watchers propagate out of [`Watcher::get`] so the
//! render pipeline can substitute a fallback tree.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashSet;

use crate::dep::{Dep, pop_target, push_target};
use crate::error::{ErrorScope, EvalError, handle_error};
use crate::path;
use crate::scheduler::queue_watcher;
use crate::traverse::traverse;
use crate::value::{Value, has_changed};

thread_local! {
    static WATCHER_ID: Cell<u64> = const { Cell::new(0) };
}

pub type Getter = Box<dyn FnMut(&Value) -> Result<Value, EvalError>>;
pub type Callback = Box<dyn FnMut(&Value, &Value)>;

/// What a watcher evaluates: a dotted path into the owner context, or a
/// getter closure.
pub enum WatchSource {
    Path(String),
    Getter(Getter),
}

impl WatchSource {
    #[must_use]
    pub fn path(p: impl Into<String>) -> Self {
        Self::Path(p.into())
    }

    #[must_use]
    pub fn getter(f: impl FnMut(&Value) -> Result<Value, EvalError> + 'static) -> Self {
        Self::Getter(Box::new(f))
    }
}

/// Construction options. All flags default off.
#[derive(Default)]
pub struct WatcherOptions {
    /// Recursively touch the result to register nested deps.
    pub deep: bool,
    /// Explicitly-registered watch: getter errors are swallowed and
    /// reported instead of propagating.
    pub user: bool,
    /// Compute on demand (computed values); skips the construction-time
    /// evaluation.
    pub lazy: bool,
    /// Re-evaluate inline on notify instead of batching.
    pub sync: bool,
    /// Sort after all non-post watchers in a flush, regardless of id.
    pub post: bool,
    /// Marks a component's render watcher (drives the updated pass).
    pub render: bool,
    /// Invoked by the scheduler just before `run()` (host beforeUpdate).
    pub before: Option<Box<dyn Fn()>>,
    /// Invoked in the post-flush updated pass, render watchers only.
    pub on_updated: Option<Box<dyn Fn()>>,
    /// Invoked once on teardown.
    pub on_stop: Option<Box<dyn FnOnce()>>,
    /// Error-capture chain of the owning component.
    pub scope: Option<ErrorScope>,
}

pub(crate) struct WatcherInner {
    id: u64,
    ctx: Value,
    getter: RefCell<Getter>,
    cb: RefCell<Option<Callback>>,
    expression: String,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    post: bool,
    render: bool,
    no_recurse: Cell<bool>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    value: RefCell<Value>,
    deps: RefCell<Vec<Dep>>,
    new_deps: RefCell<Vec<Dep>>,
    dep_ids: RefCell<AHashSet<u64>>,
    new_dep_ids: RefCell<AHashSet<u64>>,
    before: Option<Box<dyn Fn()>>,
    on_updated: Option<Box<dyn Fn()>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    scope: Option<ErrorScope>,
}

/// A subscriber that re-evaluates a getter when any dep it read last time
/// notifies. Cloning clones the handle.
#[derive(Clone)]
pub struct Watcher {
    pub(crate) inner: Rc<WatcherInner>,
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Watcher {
    /// Construct and, unless lazy, immediately evaluate once to seed the
    /// dependency set and cached value.
    ///
    /// # Errors
    ///
    /// Propagates the first evaluation's error for non-user watchers.
    pub fn new(
        ctx: Value,
        source: WatchSource,
        cb: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self, EvalError> {
        let id = WATCHER_ID.with(|c| {
            let id = c.get() + 1;
            c.set(id);
            id
        });
        let (getter, expression): (Getter, String) = match source {
            WatchSource::Getter(g) => (g, "<function>".to_owned()),
            WatchSource::Path(p) => match path::path_getter(&p) {
                Some(g) => (g, p),
                None => {
                    if cfg!(debug_assertions) {
                        tracing::warn!(
                            target: "lumen::watcher",
                            path = %p,
                            "failed watching path: only simple dot-delimited paths are supported"
                        );
                    }
                    (Box::new(|_| Ok(Value::Null)), p)
                }
            },
        };
        let watcher = Self {
            inner: Rc::new(WatcherInner {
                id,
                ctx,
                getter: RefCell::new(getter),
                cb: RefCell::new(cb),
                expression,
                deep: options.deep,
                user: options.user,
                lazy: options.lazy,
                sync: options.sync,
                post: options.post,
                render: options.render,
                no_recurse: Cell::new(false),
                dirty: Cell::new(options.lazy),
                active: Cell::new(true),
                value: RefCell::new(Value::Null),
                deps: RefCell::new(Vec::new()),
                new_deps: RefCell::new(Vec::new()),
                dep_ids: RefCell::new(AHashSet::new()),
                new_dep_ids: RefCell::new(AHashSet::new()),
                before: options.before,
                on_updated: options.on_updated,
                on_stop: RefCell::new(options.on_stop),
                scope: options.scope,
            }),
        };
        if !watcher.inner.lazy {
            let value = watcher.get()?;
            *watcher.inner.value.borrow_mut() = value;
        }
        Ok(watcher)
    }

    pub(crate) fn from_inner(inner: Rc<WatcherInner>) -> Self {
        Self { inner }
    }

    /// Monotonic id; defines default execution order.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    #[must_use]
    pub fn is_post(&self) -> bool {
        self.inner.post
    }

    #[must_use]
    pub fn is_render(&self) -> bool {
        self.inner.render
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    #[must_use]
    pub fn no_recurse(&self) -> bool {
        self.inner.no_recurse.get()
    }

    pub fn set_no_recurse(&self, val: bool) {
        self.inner.no_recurse.set(val);
    }

    #[must_use]
    pub fn scope(&self) -> Option<&ErrorScope> {
        self.inner.scope.as_ref()
    }

    /// Cached result of the most recent evaluation.
    #[must_use]
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Number of deps currently subscribed to. Diagnostic.
    #[must_use]
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub(crate) fn invoke_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    pub(crate) fn invoke_updated(&self) {
        if let Some(updated) = &self.inner.on_updated {
            updated();
        }
    }

    /// Evaluate the getter with this watcher installed as the collecting
    /// target, then reconcile subscriptions to exactly the deps read on
    /// this pass.
    pub fn get(&self) -> Result<Value, EvalError> {
        push_target(Some(self.clone()));
        let result = {
            let mut getter = self.inner.getter.borrow_mut();
            getter(&self.inner.ctx)
        };
        let out = match result {
            Ok(v) => Ok(v),
            Err(e) => {
                if self.inner.user {
                    handle_error(
                        &e,
                        self.inner.scope.as_ref(),
                        &format!("getter for watcher \"{}\"", self.inner.expression),
                    );
                    Ok(Value::Null)
                } else {
                    Err(e)
                }
            }
        };
        if self.inner.deep
            && let Ok(v) = &out
        {
            // Touch every reachable property so nested deps register.
            traverse(v);
        }
        pop_target();
        self.cleanup_deps();
        out
    }

    /// Register the edge watcher -> dep (and dep -> watcher unless already
    /// subscribed), deduplicated by dep id within this pass.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        if !self.inner.new_dep_ids.borrow().contains(&id) {
            self.inner.new_dep_ids.borrow_mut().insert(id);
            self.inner.new_deps.borrow_mut().push(dep.clone());
            if !self.inner.dep_ids.borrow().contains(&id) {
                dep.add_sub(self);
            }
        }
    }

    /// Unsubscribe from deps not read on the current pass; the current
    /// pass's dep set becomes canonical.
    fn cleanup_deps(&self) {
        {
            let deps = self.inner.deps.borrow();
            let new_ids = self.inner.new_dep_ids.borrow();
            for dep in deps.iter() {
                if !new_ids.contains(&dep.id()) {
                    dep.remove_sub(self);
                }
            }
        }
        self.inner.dep_ids.swap(&self.inner.new_dep_ids);
        self.inner.new_dep_ids.borrow_mut().clear();
        self.inner.deps.swap(&self.inner.new_deps);
        self.inner.new_deps.borrow_mut().clear();
    }

    /// Subscriber interface, invoked by a dep's `notify`.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.set(true);
        } else if self.inner.sync {
            if let Err(e) = self.run() {
                handle_error(
                    &e,
                    self.inner.scope.as_ref(),
                    &format!("sync watcher \"{}\"", self.inner.expression),
                );
            }
        } else {
            queue_watcher(self);
        }
    }

    /// Scheduler job interface: re-evaluate and fire the callback if the
    /// value changed.
    pub fn run(&self) -> Result<(), EvalError> {
        if !self.inner.active.get() {
            return Ok(());
        }
        let value = self.get()?;
        let old = self.inner.value.borrow().clone();
        if has_changed(&value, &old) || value.is_container() || self.inner.deep {
            *self.inner.value.borrow_mut() = value.clone();
            let mut cb = self.inner.cb.borrow_mut();
            if let Some(cb) = cb.as_mut() {
                cb(&value, &old);
            }
        }
        Ok(())
    }

    /// Force recomputation and clear the dirty flag. Lazy watchers only;
    /// used by computed getters.
    pub fn evaluate(&self) -> Result<(), EvalError> {
        let value = self.get()?;
        *self.inner.value.borrow_mut() = value;
        self.inner.dirty.set(false);
        Ok(())
    }

    /// Re-register all of this watcher's deps onto whatever watcher is
    /// currently collecting. Bridges computed reads into the outer
    /// watcher's dependency set.
    pub fn depend(&self) {
        let deps = self.inner.deps.borrow().clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        let deps = self.inner.deps.borrow().clone();
        for dep in deps {
            dep.remove_sub(self);
        }
        self.inner.deps.borrow_mut().clear();
        self.inner.dep_ids.borrow_mut().clear();
        self.inner.active.set(false);
        if let Some(on_stop) = self.inner.on_stop.borrow_mut().take() {
            on_stop();
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .field("deps", &self.dep_count())
            .finish()
    }
}
