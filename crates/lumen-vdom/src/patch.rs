#![forbid(unsafe_code)]

//! Tree diffing and patching.
//!
//! # Architecture
//!
//! [`Patcher`] owns the host operations and the module list. A patch pass
//! compares an old and a new virtual tree top-down: node pairs that pass
//! [`same_vnode`] are updated in place, everything else is replaced.
//! Children are reconciled by [`Patcher::update_children`], a four-pointer
//! sweep over both child lists that falls back to a key index only when
//! none of the four boundary pairs match. Ties are broken in a fixed
//! order: start/start, end/end, start moved to end, end moved to start.
//!
//! # Invariants
//!
//! 1. Insert hooks run after the whole pass, never mid-diff, in creation
//!    order.
//! 2. Destroy hooks run depth-first on every removed subtree exactly once.
//! 3. With unique keys, a pure reorder of keyed children moves existing
//!    elements and creates or removes nothing.
//!
//! # Failure Modes
//!
//! Patching expects every old node to have been realized by a previous
//! pass; a missing element aborts the pass with
//! [`PatchError::MissingElm`]. Duplicate sibling keys are diagnosed in
//! debug builds and then processed best-effort.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use thiserror::Error;

use crate::host::HostOps;
use crate::modules::{PatchModule, RemoveHandle};
use crate::vnode::{Key, VNode, VNodeFlags, same_vnode};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("node was never realized into a host element")]
    MissingElm,
}

type InsertQueue<N> = SmallVec<[VNode<N>; 8]>;

/// Applies virtual tree diffs to a host tree.
pub struct Patcher<H: HostOps> {
    ops: Rc<H>,
    modules: Vec<Box<dyn PatchModule<H>>>,
    blank: VNode<H::Node>,
}

impl<H: HostOps + 'static> Patcher<H> {
    #[must_use]
    pub fn new(ops: H, modules: Vec<Box<dyn PatchModule<H>>>) -> Self {
        Self {
            ops: Rc::new(ops),
            modules,
            blank: VNode::element("", None, Vec::new()),
        }
    }

    #[must_use]
    pub fn ops(&self) -> &H {
        &self.ops
    }

    /// Diff `new` against `old` and apply the difference. With `old` of
    /// `None` the tree is freshly realized, detached; the caller inserts
    /// the returned element. Root replacement detaches the old tree and
    /// realizes the new one in its place.
    ///
    /// # Errors
    ///
    /// [`PatchError::MissingElm`] when `old` was never realized.
    pub fn patch(
        &self,
        old: Option<&VNode<H::Node>>,
        new: &VNode<H::Node>,
    ) -> Result<H::Node, PatchError> {
        let mut queue = InsertQueue::new();
        match old {
            None => self.create_elm(new, &mut queue, None, None),
            Some(old) if same_vnode(old, new) => {
                self.patch_vnode(old, new, &mut queue, false)?;
            }
            Some(old) => {
                let old_elm = old.elm().ok_or(PatchError::MissingElm)?;
                let parent = self.ops.parent_node(&old_elm);
                self.create_elm(
                    new,
                    &mut queue,
                    parent.as_ref(),
                    self.ops.next_sibling(&old_elm).as_ref(),
                );
                if parent.is_some() {
                    self.remove_vnode(old);
                } else {
                    self.invoke_destroy_hook(old);
                }
            }
        }
        self.flush_insert_hooks(&queue);
        new.elm().ok_or(PatchError::MissingElm)
    }

    /// First mount: realize `new` in place of the host element `host`,
    /// which is discarded.
    ///
    /// # Errors
    ///
    /// [`PatchError::MissingElm`] when realization produced no element,
    /// which cannot happen for well-formed trees.
    pub fn patch_root(
        &self,
        host: &H::Node,
        new: &VNode<H::Node>,
    ) -> Result<H::Node, PatchError> {
        let mut queue = InsertQueue::new();
        let parent = self.ops.parent_node(host);
        self.create_elm(
            new,
            &mut queue,
            parent.as_ref(),
            self.ops.next_sibling(host).as_ref(),
        );
        if let Some(parent) = &parent {
            self.ops.remove_child(parent, host);
        }
        self.flush_insert_hooks(&queue);
        new.elm().ok_or(PatchError::MissingElm)
    }

    /// Run destroy hooks over a tree that is being abandoned without a
    /// replacing patch (component teardown).
    pub fn destroy(&self, vnode: &VNode<H::Node>) {
        self.invoke_destroy_hook(vnode);
    }

    fn create_elm(
        &self,
        vnode: &VNode<H::Node>,
        queue: &mut InsertQueue<H::Node>,
        parent: Option<&H::Node>,
        ref_elm: Option<&H::Node>,
    ) {
        if let Some(hooks) = vnode.hooks() {
            hooks.init(vnode);
            // A kept-alive component resurfaces from `init` with its
            // instance and element already realized; re-insert the element
            // and fire `activate` instead of rebuilding the subtree.
            if vnode.instance().is_some()
                && let Some(elm) = vnode.elm()
            {
                self.reactivate(vnode, queue, parent, ref_elm, &elm);
                return;
            }
        }
        if let Some(tag) = vnode.tag() {
            let elm = self.ops.create_element(&tag);
            vnode.set_elm(Some(elm.clone()));
            let children = vnode.children();
            if children.is_empty() {
                if let Some(text) = vnode.text_content() {
                    let t = self.ops.create_text(&text);
                    self.ops.append_child(&elm, &t);
                }
            } else {
                if cfg!(debug_assertions) {
                    check_duplicate_keys(&children);
                }
                for child in &children {
                    self.create_elm(child, queue, Some(&elm), None);
                }
            }
            if vnode.has_data() {
                self.invoke_create_hooks(vnode, queue);
            }
            self.insert(parent, &elm, ref_elm);
        } else if vnode.is_comment() {
            let text = vnode.text_content();
            let elm = self.ops.create_comment(text.as_deref().unwrap_or(""));
            vnode.set_elm(Some(elm.clone()));
            self.insert(parent, &elm, ref_elm);
        } else {
            let text = vnode.text_content();
            let elm = self.ops.create_text(text.as_deref().unwrap_or(""));
            vnode.set_elm(Some(elm.clone()));
            self.insert(parent, &elm, ref_elm);
        }
    }

    fn insert(&self, parent: Option<&H::Node>, elm: &H::Node, ref_elm: Option<&H::Node>) {
        let Some(parent) = parent else { return };
        match ref_elm {
            Some(r) => {
                // A stale anchor (already detached or reparented) means the
                // position no longer exists; skip rather than misplace.
                if self.ops.parent_node(r).as_ref() == Some(parent) {
                    self.ops.insert_before(parent, elm, Some(r));
                }
            }
            None => self.ops.append_child(parent, elm),
        }
    }

    fn reactivate(
        &self,
        vnode: &VNode<H::Node>,
        queue: &mut InsertQueue<H::Node>,
        parent: Option<&H::Node>,
        ref_elm: Option<&H::Node>,
        elm: &H::Node,
    ) {
        for module in &self.modules {
            module.activate(&self.blank, vnode);
        }
        queue.push(vnode.clone());
        self.insert(parent, elm, ref_elm);
    }

    fn invoke_create_hooks(&self, vnode: &VNode<H::Node>, queue: &mut InsertQueue<H::Node>) {
        for module in &self.modules {
            module.create(&self.blank, vnode);
        }
        if vnode.hooks().is_some() {
            queue.push(vnode.clone());
        }
    }

    fn flush_insert_hooks(&self, queue: &InsertQueue<H::Node>) {
        for vnode in queue {
            if let Some(hooks) = vnode.hooks() {
                hooks.insert(vnode);
            }
        }
    }

    fn patch_vnode(
        &self,
        old: &VNode<H::Node>,
        new: &VNode<H::Node>,
        queue: &mut InsertQueue<H::Node>,
        remove_only: bool,
    ) -> Result<(), PatchError> {
        if VNode::ptr_eq(old, new) {
            return Ok(());
        }
        let elm = old.elm().ok_or(PatchError::MissingElm)?;
        new.set_elm(Some(elm.clone()));

        // The placeholder element stays until the async subtree resolves
        // and patches over it.
        if old.is_async_placeholder() {
            return Ok(());
        }

        // A re-rendered static or v-once subtree arrives as a clone of the
        // hoisted original; the realized element carries over untouched.
        if new.is_static()
            && old.is_static()
            && new.key() == old.key()
            && (new.flags().contains(VNodeFlags::CLONED)
                || new.flags().contains(VNodeFlags::ONCE))
        {
            new.set_instance(old.instance());
            return Ok(());
        }

        if let Some(hooks) = new.hooks() {
            hooks.prepatch(old, new);
        }
        if new.has_data() && new.tag().is_some() {
            for module in &self.modules {
                module.update(old, new);
            }
        }

        let old_ch = old.children();
        let new_ch = new.children();
        if new.text_content().is_none() {
            if !old_ch.is_empty() && !new_ch.is_empty() {
                self.update_children(&elm, &old_ch, &new_ch, queue, remove_only)?;
            } else if !new_ch.is_empty() {
                if cfg!(debug_assertions) {
                    check_duplicate_keys(&new_ch);
                }
                if old.text_content().is_some() {
                    self.ops.set_text_content(&elm, "");
                }
                self.add_vnodes(&elm, None, &new_ch, queue);
            } else if !old_ch.is_empty() {
                self.remove_vnodes(&old_ch);
            } else if old.text_content().is_some() {
                self.ops.set_text_content(&elm, "");
            }
        } else if old.text_content() != new.text_content() {
            let text = new.text_content();
            self.ops
                .set_text_content(&elm, text.as_deref().unwrap_or(""));
        }

        if let Some(hooks) = new.hooks() {
            hooks.postpatch(old, new);
        }
        Ok(())
    }

    /// Keyed child reconciliation. Pointers close in from both ends; the
    /// four boundary comparisons are tried in order, then a key index over
    /// the untouched old span resolves arbitrary moves. Consumed old slots
    /// are nulled so later sweeps skip them.
    fn update_children(
        &self,
        parent: &H::Node,
        old_ch: &[VNode<H::Node>],
        new_ch: &[VNode<H::Node>],
        queue: &mut InsertQueue<H::Node>,
        remove_only: bool,
    ) -> Result<(), PatchError> {
        if cfg!(debug_assertions) {
            check_duplicate_keys(new_ch);
        }
        let mut old: Vec<Option<VNode<H::Node>>> = old_ch.iter().cloned().map(Some).collect();
        let mut old_start: isize = 0;
        let mut old_end: isize = old.len() as isize - 1;
        let mut new_start: isize = 0;
        let mut new_end: isize = new_ch.len() as isize - 1;
        // During a transition-group removal pass only removals may reorder
        // the host tree.
        let can_move = !remove_only;
        let mut key_index: Option<AHashMap<Key, isize>> = None;

        while old_start <= old_end && new_start <= new_end {
            let Some(os) = old[old_start as usize].clone() else {
                old_start += 1;
                continue;
            };
            let Some(oe) = old[old_end as usize].clone() else {
                old_end -= 1;
                continue;
            };
            let ns = new_ch[new_start as usize].clone();
            let ne = new_ch[new_end as usize].clone();

            if same_vnode(&os, &ns) {
                self.patch_vnode(&os, &ns, queue, remove_only)?;
                old_start += 1;
                new_start += 1;
            } else if same_vnode(&oe, &ne) {
                self.patch_vnode(&oe, &ne, queue, remove_only)?;
                old_end -= 1;
                new_end -= 1;
            } else if same_vnode(&os, &ne) {
                // Old head moved right: place it after the current old
                // tail.
                self.patch_vnode(&os, &ne, queue, remove_only)?;
                if can_move
                    && let (Some(elm), Some(tail)) = (os.elm(), oe.elm())
                {
                    self.ops
                        .insert_before(parent, &elm, self.ops.next_sibling(&tail).as_ref());
                }
                old_start += 1;
                new_end -= 1;
            } else if same_vnode(&oe, &ns) {
                // Old tail moved left: place it before the current old
                // head.
                self.patch_vnode(&oe, &ns, queue, remove_only)?;
                if can_move
                    && let (Some(elm), Some(head)) = (oe.elm(), os.elm())
                {
                    self.ops.insert_before(parent, &elm, Some(&head));
                }
                old_end -= 1;
                new_start += 1;
            } else {
                if key_index.is_none() {
                    key_index = Some(build_key_index(&old, old_start, old_end));
                }
                let idx = match ns.key() {
                    Some(key) => key_index
                        .as_ref()
                        .and_then(|index| index.get(&key).copied()),
                    None => find_unkeyed(&old, old_start, old_end, &ns),
                };
                let matched = idx.and_then(|i| old[i as usize].clone());
                match (idx, matched) {
                    (Some(i), Some(moved)) if same_vnode(&moved, &ns) => {
                        self.patch_vnode(&moved, &ns, queue, remove_only)?;
                        old[i as usize] = None;
                        if can_move
                            && let (Some(elm), Some(head)) = (moved.elm(), os.elm())
                        {
                            self.ops.insert_before(parent, &elm, Some(&head));
                        }
                    }
                    // Same key but a different element, or no old
                    // counterpart at all: a fresh element goes in front of
                    // the current old head.
                    _ => self.create_elm(&ns, queue, Some(parent), os.elm().as_ref()),
                }
                new_start += 1;
            }
        }

        if old_start > old_end {
            // Old list exhausted: everything left in new is an addition,
            // anchored before the node that follows the span.
            let anchor = new_ch
                .get((new_end + 1) as usize)
                .and_then(VNode::elm);
            for i in new_start..=new_end {
                self.create_elm(&new_ch[i as usize], queue, Some(parent), anchor.as_ref());
            }
        } else if new_start > new_end {
            for slot in &old[old_start as usize..=old_end as usize] {
                if let Some(stale) = slot {
                    self.remove_vnode(stale);
                }
            }
        }
        Ok(())
    }

    fn add_vnodes(
        &self,
        parent: &H::Node,
        ref_elm: Option<&H::Node>,
        vnodes: &[VNode<H::Node>],
        queue: &mut InsertQueue<H::Node>,
    ) {
        for vnode in vnodes {
            self.create_elm(vnode, queue, Some(parent), ref_elm);
        }
    }

    fn remove_vnodes(&self, vnodes: &[VNode<H::Node>]) {
        for vnode in vnodes {
            self.remove_vnode(vnode);
        }
    }

    fn remove_vnode(&self, vnode: &VNode<H::Node>) {
        if vnode.tag().is_some() {
            self.remove_and_invoke_remove_hook(vnode);
            self.invoke_destroy_hook(vnode);
        } else if let Some(elm) = vnode.elm() {
            self.remove_node(&elm);
        }
    }

    fn remove_node(&self, elm: &H::Node) {
        if let Some(parent) = self.ops.parent_node(elm) {
            self.ops.remove_child(&parent, elm);
        }
    }

    /// Detach an element once every module releases it. Modules without a
    /// `remove` override release immediately, so plain elements detach
    /// synchronously.
    fn remove_and_invoke_remove_hook(&self, vnode: &VNode<H::Node>) {
        let Some(elm) = vnode.elm() else { return };
        if !vnode.has_data() || self.modules.is_empty() {
            self.remove_node(&elm);
            return;
        }
        let ops = Rc::clone(&self.ops);
        let handle = RemoveHandle::new(self.modules.len() + 1, move || {
            if let Some(parent) = ops.parent_node(&elm) {
                ops.remove_child(&parent, &elm);
            }
        });
        for module in &self.modules {
            module.remove(vnode, &handle);
        }
        handle.done();
    }

    fn invoke_destroy_hook(&self, vnode: &VNode<H::Node>) {
        if let Some(hooks) = vnode.hooks() {
            hooks.destroy(vnode);
        }
        if vnode.has_data() {
            for module in &self.modules {
                module.destroy(vnode);
            }
        }
        for child in vnode.children() {
            self.invoke_destroy_hook(&child);
        }
    }
}

fn build_key_index<N: Clone>(
    old: &[Option<VNode<N>>],
    start: isize,
    end: isize,
) -> AHashMap<Key, isize> {
    let mut index = AHashMap::new();
    for i in start..=end {
        if let Some(child) = &old[i as usize]
            && let Some(key) = child.key()
        {
            index.insert(key, i);
        }
    }
    index
}

fn find_unkeyed<N: Clone>(
    old: &[Option<VNode<N>>],
    start: isize,
    end: isize,
    target: &VNode<N>,
) -> Option<isize> {
    for i in start..=end {
        if let Some(child) = &old[i as usize]
            && child.key().is_none()
            && same_vnode(child, target)
        {
            return Some(i);
        }
    }
    None
}

fn check_duplicate_keys<N: Clone>(children: &[VNode<N>]) {
    let mut seen: AHashSet<Key> = AHashSet::new();
    for child in children {
        if let Some(key) = child.key()
            && !seen.insert(key.clone())
        {
            tracing::warn!(
                target: "lumen::patch",
                key = ?key,
                "duplicate sibling key; keyed reconciliation may misbehave"
            );
        }
    }
}
