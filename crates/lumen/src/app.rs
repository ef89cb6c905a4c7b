#![forbid(unsafe_code)]

//! Application mounting.
//!
//! [`App::mount`] ties the two halves together: the render function runs
//! inside a render watcher, so every reactive read it performs subscribes
//! the app to that piece of state, and every later mutation queues exactly
//! one re-render through the shared scheduler. The produced tree is
//! patched against the previous one; the previous tree is kept on the app
//! between passes.
//!
//! # Invariants
//!
//! 1. The mounted state root is pinned: structural `set_key`/`del_key` on
//!    it are refused while the app is mounted.
//! 2. One flush renders the app at most once, regardless of how many
//!    state mutations preceded it.
//! 3. `teardown` stops tracking, runs destroy hooks over the last tree,
//!    and unpins the state root. Idempotent.

use std::cell::RefCell;
use std::rc::Rc;

use lumen_reactive::observer::{observe, observer_of};
use lumen_reactive::{ErrorScope, EvalError, Value, WatchSource, Watcher, WatcherOptions};
use lumen_vdom::{HostOps, Patcher, VNode};

/// Optional lifecycle wiring for [`App::mount_with`].
#[derive(Default)]
pub struct MountOptions {
    /// Runs just before each re-render pass.
    pub before_update: Option<Box<dyn Fn()>>,
    /// Runs in the post-flush updated phase, after the tree is patched.
    pub updated: Option<Box<dyn Fn()>>,
    /// Error-capture chain consulted when a render fails after mount.
    pub scope: Option<ErrorScope>,
}

/// A mounted reactive application over host `H`.
pub struct App<H: HostOps + 'static> {
    state: Value,
    patcher: Rc<Patcher<H>>,
    watcher: Watcher,
    tree: Rc<RefCell<Option<VNode<H::Node>>>>,
    mounted: RefCell<bool>,
}

impl<H: HostOps + 'static> App<H> {
    /// Observe `state`, render once, and realize the tree in place of
    /// `host`.
    ///
    /// # Errors
    ///
    /// Propagates a failure of the first render; the app is not mounted
    /// in that case.
    pub fn mount(
        patcher: Patcher<H>,
        host: H::Node,
        state: Value,
        render: impl Fn(&Value) -> Result<VNode<H::Node>, EvalError> + 'static,
    ) -> Result<Self, EvalError> {
        Self::mount_with(patcher, host, state, render, MountOptions::default())
    }

    pub fn mount_with(
        patcher: Patcher<H>,
        host: H::Node,
        state: Value,
        render: impl Fn(&Value) -> Result<VNode<H::Node>, EvalError> + 'static,
        options: MountOptions,
    ) -> Result<Self, EvalError> {
        let patcher = Rc::new(patcher);
        observe(&state);
        if let Some(ob) = observer_of(&state) {
            ob.inc_vm_count();
        }

        let tree: Rc<RefCell<Option<VNode<H::Node>>>> = Rc::new(RefCell::new(None));
        let getter = {
            let patcher = Rc::clone(&patcher);
            let tree = Rc::clone(&tree);
            move |ctx: &Value| -> Result<Value, EvalError> {
                let next = render(ctx)?;
                {
                    let slot = tree.borrow();
                    match slot.as_ref() {
                        None => patcher
                            .patch_root(&host, &next)
                            .map_err(EvalError::source_of)?,
                        Some(prev) => patcher
                            .patch(Some(prev), &next)
                            .map_err(EvalError::source_of)?,
                    };
                }
                *tree.borrow_mut() = Some(next);
                Ok(Value::Null)
            }
        };

        let watcher = Watcher::new(
            state.clone(),
            WatchSource::getter(getter),
            None,
            WatcherOptions {
                render: true,
                before: options.before_update,
                on_updated: options.updated,
                scope: options.scope,
                ..Default::default()
            },
        );
        let watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                if let Some(ob) = observer_of(&state) {
                    ob.dec_vm_count();
                }
                return Err(e);
            }
        };

        tracing::debug!(target: "lumen::app", "mounted");
        Ok(Self {
            state,
            patcher,
            watcher,
            tree,
            mounted: RefCell::new(true),
        })
    }

    #[must_use]
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Root host element of the current tree.
    #[must_use]
    pub fn root(&self) -> Option<H::Node> {
        self.tree.borrow().as_ref().and_then(VNode::elm)
    }

    /// Current virtual tree.
    #[must_use]
    pub fn tree(&self) -> Option<VNode<H::Node>> {
        self.tree.borrow().clone()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        *self.mounted.borrow()
    }

    /// Queue a re-render regardless of tracked changes.
    pub fn force_update(&self) {
        self.watcher.update();
    }

    /// Stop tracking and destroy the current tree. Idempotent.
    pub fn teardown(&self) {
        if !*self.mounted.borrow() {
            return;
        }
        *self.mounted.borrow_mut() = false;
        self.watcher.teardown();
        if let Some(ob) = observer_of(&self.state) {
            ob.dec_vm_count();
        }
        if let Some(tree) = self.tree.borrow().as_ref() {
            self.patcher.destroy(tree);
        }
        tracing::debug!(target: "lumen::app", "torn down");
    }
}
