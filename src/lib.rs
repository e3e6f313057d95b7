//! # dptrace
//!
//! Event enrichment and cross-probe correlation core for tracing packets
//! through the Open vSwitch kernel datapath.
//!
//! Two instrumentation points are covered: the spot where the datapath
//! executes a single action on a packet, and the spot where a packet is
//! enqueued for delivery to userspace. Each probe firing appends typed
//! sections to a raw event buffer; a userspace collector later assembles
//! those sections into a timeline. The two points share no explicit
//! identifier, so executions triggered by a pending userspace command are
//! tagged with a fingerprint derived from the packet content, which the
//! consumer matches against the enqueue-side output.
//!
//! The surrounding machinery (probe attachment, event transport, the shared
//! per-thread and per-cpu stores) is owned by external collaborators and
//! only shows up here as narrow trait seams.

pub mod bindings;
pub mod core;
pub mod module;
