#![forbid(unsafe_code)]

//! Attribute patch module for the in-memory host.
//!
//! Diffs the attribute maps of a node pair and applies only the
//! difference: removed names are cleared, changed and added names are
//! written. Untouched attributes generate no host operations.

use crate::mem_host::{MemHost, NodeId};
use lumen_vdom::{PatchModule, VNode};

pub struct AttrsModule {
    host: MemHost,
}

impl AttrsModule {
    #[must_use]
    pub fn new(host: MemHost) -> Self {
        Self { host }
    }

    fn apply(&self, old: &VNode<NodeId>, new: &VNode<NodeId>) {
        let Some(elm) = new.elm() else { return };
        let old_attrs = old.attrs();
        let new_attrs = new.attrs();
        for name in old_attrs.keys() {
            if !new_attrs.contains_key(name) {
                self.host.remove_attr(elm, name);
            }
        }
        for (name, value) in &new_attrs {
            if old_attrs.get(name) != Some(value) {
                self.host.set_attr(elm, name, value);
            }
        }
    }
}

impl PatchModule<MemHost> for AttrsModule {
    fn create(&self, empty: &VNode<NodeId>, vnode: &VNode<NodeId>) {
        self.apply(empty, vnode);
    }

    fn update(&self, old: &VNode<NodeId>, new: &VNode<NodeId>) {
        self.apply(old, new);
    }
}
