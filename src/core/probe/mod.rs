//! Probe-side plumbing: the execution context handed to hooks by the
//! probe-invocation framework, the hook contract itself and the kprobe
//! address helper.

pub mod context;
pub mod kprobe;
// Re-export context.rs
pub use context::*;

use thiserror::Error;

use super::events::RawEvent;

/// Failures aborting the remaining work of a single probe firing. Never
/// propagated past the firing: sections written before the failure stand
/// and the next firing starts from scratch.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum HookError {
    /// A required pointer or descriptor could not be resolved from the
    /// execution context.
    #[error("could not resolve {0}")]
    Unresolved(&'static str),
    /// The event buffer could not fit a requested section.
    #[error("no room left for a new event section")]
    EventFull,
}

/// What a hook produced for one probe firing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookResult {
    /// The hook wrote its mandatory section (optional ones may be missing).
    Event,
    /// Nothing usable at this firing; the hook added no mandatory section.
    /// Whether the surrounding event is kept is the framework's call.
    NoEvent,
}

/// A probe hook. Hooks run synchronously and to completion within a single
/// firing; they abort internally on resolution or allocation failures
/// rather than reporting errors to the framework.
pub trait Hook {
    fn process(&mut self, ctx: &ProbeContext, event: &mut RawEvent) -> HookResult;
}

/// Opaque handle to the packet descriptor a probe fired on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Packet {
    /// Kernel address of the descriptor.
    pub addr: u64,
}

/// Resolves the packet descriptor from an execution context. Owned by the
/// probe framework, which knows where each attachment point keeps its
/// packet.
pub trait PacketResolver: Send + Sync {
    fn packet(&self, ctx: &ProbeContext) -> Option<Packet>;
}
