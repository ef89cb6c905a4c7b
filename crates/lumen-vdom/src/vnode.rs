#![forbid(unsafe_code)]

//! Virtual node representation.
//!
//! A [`VNode`] is a cheap handle (reference-counted, interior-mutable) over
//! the node record, generic over the host node type `N`. Handles are what
//! render functions build and what the patcher walks; the patcher writes the
//! realized host element back into the record as it goes.
//!
//! # Invariants
//!
//! 1. A node is exactly one of: element (`tag` set), text (`tag` unset,
//!    `COMMENT` clear), or comment (`COMMENT` set).
//! 2. `elm` is set iff the node has been realized by a patch pass.
//! 3. A `CLONED` node shares children handles with its source; the patcher
//!    must not rely on child identity across a clone boundary.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use bitflags::bitflags;

bitflags! {
    /// Render-time node markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VNodeFlags: u8 {
        /// Hoisted static subtree; skipped on re-patch when keys match.
        const STATIC = 1;
        /// Rendered once, then reused like a static subtree.
        const ONCE = 1 << 1;
        /// Comment placeholder node.
        const COMMENT = 1 << 2;
        /// Produced by `clone_node`.
        const CLONED = 1 << 3;
        /// Stand-in emitted while an async subtree resolves.
        const ASYNC_PLACEHOLDER = 1 << 4;
    }
}

/// Identity key used by keyed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Num(i64),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Num(n)
    }
}

/// Lifecycle callbacks attached to a node's data. All default to no-ops;
/// component integrations override the ones they need.
pub trait NodeHooks<N> {
    /// Before the element for this node is created.
    fn init(&self, _vnode: &VNode<N>) {}
    /// Before an in-place patch of a matching node pair.
    fn prepatch(&self, _old: &VNode<N>, _new: &VNode<N>) {}
    /// After an in-place patch of a matching node pair.
    fn postpatch(&self, _old: &VNode<N>, _new: &VNode<N>) {}
    /// After the whole patch pass, once the element is in the host tree.
    fn insert(&self, _vnode: &VNode<N>) {}
    /// When the node is removed from the tree for good.
    fn destroy(&self, _vnode: &VNode<N>) {}
}

/// Per-node payload. Presence of data (not its contents) participates in
/// the same-node test, so a bare element and a decorated element never
/// patch into each other.
pub struct VNodeData<N> {
    pub attrs: AHashMap<Rc<str>, Rc<str>>,
    pub hooks: Option<Rc<dyn NodeHooks<N>>>,
}

impl<N> Default for VNodeData<N> {
    fn default() -> Self {
        Self {
            attrs: AHashMap::new(),
            hooks: None,
        }
    }
}

impl<N> VNodeData<N> {
    #[must_use]
    pub fn with_attrs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            attrs: pairs
                .into_iter()
                .map(|(k, v)| (Rc::from(k.as_ref()), Rc::from(v.as_ref())))
                .collect(),
            hooks: None,
        }
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Rc<dyn NodeHooks<N>>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

struct VNodeInner<N> {
    tag: Option<Rc<str>>,
    data: Option<VNodeData<N>>,
    children: Vec<VNode<N>>,
    text: Option<Rc<str>>,
    elm: Option<N>,
    key: Option<Key>,
    flags: VNodeFlags,
    instance: Option<Rc<dyn Any>>,
}

/// Handle to a virtual node. Clones share the record; use
/// [`VNode::ptr_eq`] for identity and [`VNode::clone_node`] for a new
/// record.
pub struct VNode<N> {
    inner: Rc<RefCell<VNodeInner<N>>>,
}

impl<N> Clone for VNode<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<N: Clone> VNode<N> {
    /// Element node.
    #[must_use]
    pub fn element(
        tag: impl AsRef<str>,
        data: Option<VNodeData<N>>,
        children: Vec<VNode<N>>,
    ) -> Self {
        Self::build(
            Some(Rc::from(tag.as_ref())),
            data,
            children,
            None,
            VNodeFlags::empty(),
        )
    }

    /// Text node.
    #[must_use]
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::build(
            None,
            None,
            Vec::new(),
            Some(Rc::from(text.as_ref())),
            VNodeFlags::empty(),
        )
    }

    /// Comment node. An empty comment is the canonical "render nothing"
    /// result.
    #[must_use]
    pub fn comment(text: impl AsRef<str>) -> Self {
        Self::build(
            None,
            None,
            Vec::new(),
            Some(Rc::from(text.as_ref())),
            VNodeFlags::COMMENT,
        )
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::comment("")
    }

    /// Comment stand-in holding the place of an unresolved async subtree.
    #[must_use]
    pub fn async_placeholder() -> Self {
        Self::build(
            None,
            None,
            Vec::new(),
            Some(Rc::from("")),
            VNodeFlags::COMMENT | VNodeFlags::ASYNC_PLACEHOLDER,
        )
    }

    fn build(
        tag: Option<Rc<str>>,
        data: Option<VNodeData<N>>,
        children: Vec<VNode<N>>,
        text: Option<Rc<str>>,
        flags: VNodeFlags,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(VNodeInner {
                tag,
                data,
                children,
                text,
                elm: None,
                key: None,
                flags,
                instance: None,
            })),
        }
    }

    #[must_use]
    pub fn keyed(self, key: impl Into<Key>) -> Self {
        self.inner.borrow_mut().key = Some(key.into());
        self
    }

    #[must_use]
    pub fn marked(self, flags: VNodeFlags) -> Self {
        self.inner.borrow_mut().flags |= flags;
        self
    }

    /// New record sharing this node's fields, marked `CLONED`. Children
    /// handles are shared, not copied.
    #[must_use]
    pub fn clone_node(&self) -> Self {
        let b = self.inner.borrow();
        Self {
            inner: Rc::new(RefCell::new(VNodeInner {
                tag: b.tag.clone(),
                data: b.data.as_ref().map(|d| VNodeData {
                    attrs: d.attrs.clone(),
                    hooks: d.hooks.clone(),
                }),
                children: b.children.clone(),
                text: b.text.clone(),
                elm: b.elm.clone(),
                key: b.key.clone(),
                flags: b.flags | VNodeFlags::CLONED,
                instance: b.instance.clone(),
            })),
        }
    }

    #[must_use]
    pub fn ptr_eq(a: &VNode<N>, b: &VNode<N>) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    #[must_use]
    pub fn tag(&self) -> Option<Rc<str>> {
        self.inner.borrow().tag.clone()
    }

    #[must_use]
    pub fn key(&self) -> Option<Key> {
        self.inner.borrow().key.clone()
    }

    #[must_use]
    pub fn text_content(&self) -> Option<Rc<str>> {
        self.inner.borrow().text.clone()
    }

    #[must_use]
    pub fn elm(&self) -> Option<N> {
        self.inner.borrow().elm.clone()
    }

    pub fn set_elm(&self, elm: Option<N>) {
        self.inner.borrow_mut().elm = elm;
    }

    #[must_use]
    pub fn children(&self) -> Vec<VNode<N>> {
        self.inner.borrow().children.clone()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.inner.borrow().children.len()
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.inner.borrow().data.is_some()
    }

    /// Copy of the attribute map; empty when the node carries no data.
    #[must_use]
    pub fn attrs(&self) -> AHashMap<Rc<str>, Rc<str>> {
        self.inner
            .borrow()
            .data
            .as_ref()
            .map(|d| d.attrs.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<Rc<str>> {
        self.inner
            .borrow()
            .data
            .as_ref()
            .and_then(|d| d.attrs.get(name).cloned())
    }

    #[must_use]
    pub fn hooks(&self) -> Option<Rc<dyn NodeHooks<N>>> {
        self.inner
            .borrow()
            .data
            .as_ref()
            .and_then(|d| d.hooks.clone())
    }

    #[must_use]
    pub fn flags(&self) -> VNodeFlags {
        self.inner.borrow().flags
    }

    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.flags().contains(VNodeFlags::COMMENT)
    }

    #[must_use]
    pub fn is_async_placeholder(&self) -> bool {
        self.flags().contains(VNodeFlags::ASYNC_PLACEHOLDER)
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags().contains(VNodeFlags::STATIC)
    }

    #[must_use]
    pub fn instance(&self) -> Option<Rc<dyn Any>> {
        self.inner.borrow().instance.clone()
    }

    pub fn set_instance(&self, instance: Option<Rc<dyn Any>>) {
        self.inner.borrow_mut().instance = instance;
    }
}

impl<N: Clone> fmt::Debug for VNode<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.inner.borrow();
        let mut d = f.debug_struct("VNode");
        match (&b.tag, b.flags.contains(VNodeFlags::COMMENT)) {
            (Some(tag), _) => d.field("tag", tag),
            (None, true) => d.field("comment", &b.text),
            (None, false) => d.field("text", &b.text),
        };
        if let Some(key) = &b.key {
            d.field("key", key);
        }
        if !b.children.is_empty() {
            d.field("children", &b.children.len());
        }
        d.field("realized", &b.elm.is_some()).finish()
    }
}

/// Text-ish `<input>` types are interchangeable for patching purposes; a
/// checkbox must not be patched into a text field even when the tags match.
fn is_text_input_type(ty: &str) -> bool {
    matches!(
        ty,
        "text" | "number" | "password" | "search" | "email" | "tel" | "url"
    )
}

fn same_input_type<N: Clone>(a: &VNode<N>, b: &VNode<N>) -> bool {
    if a.tag().as_deref() != Some("input") {
        return true;
    }
    let type_a = a.attr("type");
    let type_b = b.attr("type");
    match (&type_a, &type_b) {
        (Some(ta), Some(tb)) => {
            ta == tb || (is_text_input_type(ta) && is_text_input_type(tb))
        }
        (None, None) => true,
        _ => false,
    }
}

/// Whether `a` and `b` denote the same logical node, so the patcher may
/// update in place instead of replacing.
#[must_use]
pub fn same_vnode<N: Clone>(a: &VNode<N>, b: &VNode<N>) -> bool {
    if a.key() != b.key() {
        return false;
    }
    if a.is_async_placeholder() != b.is_async_placeholder() {
        return false;
    }
    a.tag() == b.tag()
        && a.is_comment() == b.is_comment()
        && a.has_data() == b.has_data()
        && same_input_type(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TNode = u32;

    fn el(tag: &str) -> VNode<TNode> {
        VNode::element(tag, None, vec![])
    }

    #[test]
    fn node_taxonomy() {
        let e: VNode<TNode> = VNode::element("div", None, vec![]);
        assert_eq!(e.tag().as_deref(), Some("div"));
        assert!(!e.is_comment());

        let t: VNode<TNode> = VNode::text("hi");
        assert!(t.tag().is_none());
        assert!(!t.is_comment());
        assert_eq!(t.text_content().as_deref(), Some("hi"));

        let c: VNode<TNode> = VNode::comment("gone");
        assert!(c.tag().is_none());
        assert!(c.is_comment());

        let p: VNode<TNode> = VNode::async_placeholder();
        assert!(p.is_comment());
        assert!(p.is_async_placeholder());
    }

    #[test]
    fn same_vnode_requires_key_tag_comment_and_data_parity() {
        assert!(same_vnode(&el("div"), &el("div")));
        assert!(!same_vnode(&el("div"), &el("span")));
        assert!(!same_vnode(
            &el("div").keyed("a"),
            &el("div").keyed("b")
        ));
        assert!(same_vnode(
            &el("div").keyed(1i64),
            &el("div").keyed(1i64)
        ));
        // Data presence must match even when the contents would.
        let with_data: VNode<TNode> =
            VNode::element("div", Some(VNodeData::default()), vec![]);
        assert!(!same_vnode(&el("div"), &with_data));
        // Text vs comment never match.
        let t: VNode<TNode> = VNode::text("x");
        let c: VNode<TNode> = VNode::comment("x");
        assert!(!same_vnode(&t, &c));
        // Async placeholder only matches another placeholder.
        let p: VNode<TNode> = VNode::async_placeholder();
        assert!(!same_vnode(&p, &VNode::comment("")));
        assert!(same_vnode(&p, &VNode::async_placeholder()));
    }

    #[test]
    fn input_types_gate_same_vnode() {
        let input = |ty: &str| -> VNode<TNode> {
            VNode::element("input", Some(VNodeData::with_attrs([("type", ty)])), vec![])
        };
        assert!(same_vnode(&input("text"), &input("text")));
        // Text-ish types are interchangeable.
        assert!(same_vnode(&input("text"), &input("password")));
        assert!(!same_vnode(&input("text"), &input("checkbox")));
        assert!(!same_vnode(&input("radio"), &input("checkbox")));
    }

    #[test]
    fn clone_node_copies_fields_and_marks_cloned() {
        let orig: VNode<TNode> = VNode::element(
            "div",
            Some(VNodeData::with_attrs([("id", "x")])),
            vec![VNode::text("a")],
        )
        .keyed("k")
        .marked(VNodeFlags::STATIC);
        orig.set_elm(Some(7));

        let copy = orig.clone_node();
        assert!(!VNode::ptr_eq(&orig, &copy));
        assert!(copy.flags().contains(VNodeFlags::CLONED));
        assert!(copy.is_static());
        assert_eq!(copy.key(), orig.key());
        assert_eq!(copy.elm(), Some(7));
        // Children handles are shared.
        assert!(VNode::ptr_eq(&orig.children()[0], &copy.children()[0]));
    }
}
