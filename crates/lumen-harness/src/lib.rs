#![forbid(unsafe_code)]

//! Test harness for Lumen.
//!
//! Provides [`MemHost`], an arena-backed implementation of
//! [`lumen_vdom::HostOps`] with operation counters, plus the
//! [`AttrsModule`] patch module wired to it. Tests mount real patch
//! passes against the arena and assert on both the rendered tree and the
//! exact structural operations that produced it.

pub mod attrs;
pub mod mem_host;

pub use attrs::AttrsModule;
pub use mem_host::{MemHost, MemKind, NodeId, OpCounters};

use lumen_vdom::{PatchModule, Patcher};

/// Patcher over a fresh [`MemHost`] with the attribute module installed.
#[must_use]
pub fn patcher(host: &MemHost) -> Patcher<MemHost> {
    Patcher::new(
        host.clone(),
        vec![Box::new(AttrsModule::new(host.clone())) as Box<dyn PatchModule<MemHost>>],
    )
}
