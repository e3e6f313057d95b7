//! Execution context of a single probe firing, filled by the
//! probe-invocation framework before hooks run. Contexts only live for the
//! duration of one firing and are never stored.

/// Number of argument registers captured at an attachment point.
pub const REG_MAX: usize = 8;

/// Bit set in [`ProbeContext::filters_ret`] when the global packet
/// filtering policy matched the packet of this firing.
pub const FILTER_PACKET_PASS: u32 = 1 << 0;

/// Register values captured at the attachment point.
#[derive(Clone, Copy, Debug, Default)]
pub struct Registers {
    /// Argument registers. A value of zero means the argument was not
    /// resolvable at this attachment point.
    pub reg: [u64; REG_MAX],
    /// Return value, captured at exit attachment points only.
    pub ret: u64,
}

/// Per-firing execution context.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbeContext {
    pub regs: Registers,
    /// Instruction pointer at which the probe fired.
    pub ip: u64,
    /// pid/tgid pair of the thread running the firing.
    pub pid_tgid: u64,
    /// Result bitset of the global filtering policy, evaluated once per
    /// firing.
    pub filters_ret: u32,
}
