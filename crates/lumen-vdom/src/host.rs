#![forbid(unsafe_code)]

//! Host platform abstraction.
//!
//! The patcher never touches a real tree directly; every structural
//! operation goes through [`HostOps`]. A host implementation supplies the
//! node handle type and the primitive operations over it. Handles must be
//! cheap to clone and comparable, so the patcher can hold references into
//! the host tree across a pass.

/// Primitive operations a host tree must provide.
pub trait HostOps {
    /// Host node handle. Equality is node identity.
    type Node: Clone + PartialEq + 'static;

    fn create_element(&self, tag: &str) -> Self::Node;
    fn create_text(&self, text: &str) -> Self::Node;
    fn create_comment(&self, text: &str) -> Self::Node;

    /// Insert `node` into `parent` before `reference`; append when
    /// `reference` is `None`.
    fn insert_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>);
    fn append_child(&self, parent: &Self::Node, node: &Self::Node);
    fn remove_child(&self, parent: &Self::Node, node: &Self::Node);

    fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Replace the node's text. Clears children when called on an element.
    fn set_text_content(&self, node: &Self::Node, text: &str);

    /// Tag of an element node, `None` for text and comment nodes.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;
}
