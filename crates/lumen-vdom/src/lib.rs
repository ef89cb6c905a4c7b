#![forbid(unsafe_code)]

//! Lumen's virtual tree layer.
//!
//! Render functions build [`VNode`] trees; a [`Patcher`] diffs consecutive
//! trees and applies the difference to a host tree through the [`HostOps`]
//! abstraction. The layer knows nothing about reactivity or scheduling;
//! whoever calls [`Patcher::patch`] decides when a new tree exists.
//!
//! Cross-cutting element concerns (attributes, transitions) plug in as
//! [`PatchModule`]s; per-node lifecycle callbacks attach as [`NodeHooks`]
//! on the node's data.

pub mod host;
pub mod modules;
pub mod patch;
pub mod vnode;

pub use host::HostOps;
pub use modules::{PatchModule, RemoveHandle};
pub use patch::{PatchError, Patcher};
pub use vnode::{Key, NodeHooks, VNode, VNodeData, VNodeFlags, same_vnode};
