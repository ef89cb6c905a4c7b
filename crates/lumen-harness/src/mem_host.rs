#![forbid(unsafe_code)]

//! Arena-backed host tree.
//!
//! [`MemHost`] implements [`HostOps`] over a slab of nodes addressed by
//! [`NodeId`], so tests can mount real patch passes and then assert on both
//! the resulting tree shape and the operation counts that produced it. Ids
//! are never reused; a removed node stays in the arena, detached, which
//! keeps stale-handle bugs visible instead of aliasing a new node.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use lumen_vdom::HostOps;

/// Handle into the arena. Plain index; identity, not position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
pub enum MemKind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct MemNode {
    kind: MemKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Structural operation counts for one or more patch passes. Inserting a
/// node that already has a parent counts as a move, not an insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub created_elements: usize,
    pub created_texts: usize,
    pub created_comments: usize,
    pub inserted: usize,
    pub moved: usize,
    pub removed: usize,
    pub text_sets: usize,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<MemNode>,
}

impl Arena {
    fn alloc(&mut self, kind: MemKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MemNode {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }
}

/// In-memory host. Cheap to clone; clones share the arena.
#[derive(Clone, Default)]
pub struct MemHost {
    arena: Rc<RefCell<Arena>>,
    counters: Rc<RefCell<OpCounters>>,
}

impl MemHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Detached element to mount into, playing the role of the page's
    /// mount point.
    #[must_use]
    pub fn create_root(&self) -> NodeId {
        let body = self.arena.borrow_mut().alloc(MemKind::Element {
            tag: "body".to_owned(),
            attrs: BTreeMap::new(),
        });
        let mount = self.arena.borrow_mut().alloc(MemKind::Element {
            tag: "app".to_owned(),
            attrs: BTreeMap::new(),
        });
        self.arena.borrow_mut().nodes[mount.0].parent = Some(body);
        self.arena.borrow_mut().nodes[body.0].children.push(mount);
        mount
    }

    #[must_use]
    pub fn counters(&self) -> OpCounters {
        *self.counters.borrow()
    }

    pub fn reset_counters(&self) {
        *self.counters.borrow_mut() = OpCounters::default();
    }

    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.arena.borrow().nodes[node.0].parent.is_some()
    }

    #[must_use]
    pub fn child_ids(&self, node: NodeId) -> Vec<NodeId> {
        self.arena.borrow().nodes[node.0].children.clone()
    }

    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.arena.borrow().nodes[node.0].kind {
            MemKind::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        if let MemKind::Element { attrs, .. } = &mut self.arena.borrow_mut().nodes[node.0].kind {
            attrs.insert(name.to_owned(), value.to_owned());
        }
    }

    pub fn remove_attr(&self, node: NodeId, name: &str) {
        if let MemKind::Element { attrs, .. } = &mut self.arena.borrow_mut().nodes[node.0].kind {
            attrs.remove(name);
        }
    }

    /// HTML-ish serialization for assertions. Attributes render in sorted
    /// order.
    #[must_use]
    pub fn render_to_string(&self, node: NodeId) -> String {
        let arena = self.arena.borrow();
        let mut out = String::new();
        render(&arena, node, &mut out);
        out
    }
}

fn render(arena: &Arena, node: NodeId, out: &mut String) {
    let n = &arena.nodes[node.0];
    match &n.kind {
        MemKind::Element { tag, attrs } => {
            let _ = write!(out, "<{tag}");
            for (k, v) in attrs {
                let _ = write!(out, " {k}=\"{v}\"");
            }
            out.push('>');
            for child in &n.children {
                render(arena, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
        MemKind::Text(text) => out.push_str(text),
        MemKind::Comment(text) => {
            let _ = write!(out, "<!--{text}-->");
        }
    }
}

impl HostOps for MemHost {
    type Node = NodeId;

    fn create_element(&self, tag: &str) -> NodeId {
        self.counters.borrow_mut().created_elements += 1;
        self.arena.borrow_mut().alloc(MemKind::Element {
            tag: tag.to_owned(),
            attrs: BTreeMap::new(),
        })
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.counters.borrow_mut().created_texts += 1;
        self.arena
            .borrow_mut()
            .alloc(MemKind::Text(text.to_owned()))
    }

    fn create_comment(&self, text: &str) -> NodeId {
        self.counters.borrow_mut().created_comments += 1;
        self.arena
            .borrow_mut()
            .alloc(MemKind::Comment(text.to_owned()))
    }

    fn insert_before(&self, parent: &NodeId, node: &NodeId, reference: Option<&NodeId>) {
        {
            let mut c = self.counters.borrow_mut();
            if self.arena.borrow().nodes[node.0].parent.is_some() {
                c.moved += 1;
            } else {
                c.inserted += 1;
            }
        }
        let mut arena = self.arena.borrow_mut();
        arena.detach(*node);
        arena.nodes[node.0].parent = Some(*parent);
        let at = reference
            .and_then(|r| arena.nodes[parent.0].children.iter().position(|c| c == r))
            .unwrap_or_else(|| arena.nodes[parent.0].children.len());
        arena.nodes[parent.0].children.insert(at, *node);
    }

    fn append_child(&self, parent: &NodeId, node: &NodeId) {
        self.insert_before(parent, node, None);
    }

    fn remove_child(&self, parent: &NodeId, node: &NodeId) {
        let mut arena = self.arena.borrow_mut();
        if arena.nodes[node.0].parent == Some(*parent) {
            arena.detach(*node);
            self.counters.borrow_mut().removed += 1;
        }
    }

    fn parent_node(&self, node: &NodeId) -> Option<NodeId> {
        self.arena.borrow().nodes[node.0].parent
    }

    fn next_sibling(&self, node: &NodeId) -> Option<NodeId> {
        let arena = self.arena.borrow();
        let parent = arena.nodes[node.0].parent?;
        let siblings = &arena.nodes[parent.0].children;
        let at = siblings.iter().position(|c| c == node)?;
        siblings.get(at + 1).copied()
    }

    fn set_text_content(&self, node: &NodeId, text: &str) {
        self.counters.borrow_mut().text_sets += 1;
        let new_child = match &self.arena.borrow().nodes[node.0].kind {
            MemKind::Element { .. } if !text.is_empty() => {
                Some(MemKind::Text(text.to_owned()))
            }
            _ => None,
        };
        let mut arena = self.arena.borrow_mut();
        match &mut arena.nodes[node.0].kind {
            MemKind::Text(t) | MemKind::Comment(t) => *t = text.to_owned(),
            MemKind::Element { .. } => {
                let old_children = std::mem::take(&mut arena.nodes[node.0].children);
                for child in old_children {
                    arena.nodes[child.0].parent = None;
                }
                if let Some(kind) = new_child {
                    let child = arena.alloc(kind);
                    arena.nodes[child.0].parent = Some(*node);
                    arena.nodes[node.0].children.push(child);
                }
            }
        }
    }

    fn tag_name(&self, node: &NodeId) -> Option<String> {
        match &self.arena.borrow().nodes[node.0].kind {
            MemKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }
}
