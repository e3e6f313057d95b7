//! Shared stores and primitives used to correlate observations across
//! probes.
//!
//! Both stores below are owned and populated outside of this crate; hooks
//! reach them through single-operation lookups only and never add locking
//! of their own. An entry can disappear between a lookup and the use of its
//! result; the rare mis-tag this produces is accepted rather than
//! synchronized against.

use super::probe::Packet;

/// Threads currently executing a userspace-issued datapath command.
/// Presence of a thread means the command wants its resulting packet
/// actions tracked. This crate only ever reads the store.
pub trait InflightCommands: Send + Sync {
    /// Whether the `pid_tgid` thread runs a datapath command on behalf of
    /// userspace right now.
    fn contains(&self, pid_tgid: u64) -> bool;
}

/// Size of a packet scratch buffer, bounding how much of a packet gets
/// staged for fingerprinting.
pub const PACKET_BUFFER_SIZE: usize = 256;

/// Work area packet bytes and metadata are staged into before hashing.
pub struct PacketBuffer {
    data: [u8; PACKET_BUFFER_SIZE],
}

impl Default for PacketBuffer {
    fn default() -> Self {
        PacketBuffer {
            data: [0; PACKET_BUFFER_SIZE],
        }
    }
}

impl PacketBuffer {
    pub fn new() -> PacketBuffer {
        PacketBuffer::default()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Closure run with a borrowed scratch buffer, returning the computed
/// fingerprint.
pub type ScratchFn<'a> = &'a mut dyn FnMut(&mut PacketBuffer) -> u32;

/// Externally-allocated scratch buffers, one per concurrent execution
/// unit. The per-unit isolation makes concurrent reuse safe; buffer
/// contents never persist from one firing to the next.
pub trait PacketBuffers: Send + Sync {
    /// Run `f` with the scratch buffer of the current execution unit, or
    /// return None if no buffer is available.
    fn with_scratch(&self, f: ScratchFn<'_>) -> Option<u32>;
}

/// Computes a stable 32-bit fingerprint of a packet. The value is a
/// function of the packet content alone: two observations of the same
/// bytes yield the same fingerprint even from different threads or call
/// stacks, which is what makes cross-probe matching possible.
pub trait PacketHasher: Send + Sync {
    fn hash_packet(&self, buf: &mut PacketBuffer, packet: &Packet) -> u32;
}
