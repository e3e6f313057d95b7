//! Kprobe compatibility helpers.

use super::context::ProbeContext;
use crate::core::inspect::KernelInspect;

/// Enum and value looked up in the running kernel's type information to
/// detect the get-func-ip helper (added in Linux v5.15).
const BPF_FUNC_ID_ENUM: &str = "bpf_func_id";
const BPF_FUNC_GET_FUNC_IP: &str = "BPF_FUNC_get_func_ip";

/// Size of the software breakpoint a kprobe installs at its attachment
/// point.
const BREAKPOINT_LEN: u64 = 1;

/// Retrieve the entry address of the currently probed function.
///
/// The right way is the kernel's get-func-ip helper (`get_func_ip` here,
/// injected so both paths stay testable). On kernels without it the entry
/// address is approximated as the current instruction pointer minus one
/// breakpoint length. With CONFIG_X86_KERNEL_IBT=y entry points carry an
/// extra landing instruction and only the helper can return the right
/// address; helper support and the IBT option were merged in different
/// kernel versions though, so the helper is used whenever the running
/// kernel has it and the manual computation stays as a best effort for
/// older kernels, where it can be wrong if IBT is enabled.
pub fn func_ip<F>(ctx: &ProbeContext, inspect: &dyn KernelInspect, get_func_ip: F) -> u64
where
    F: FnOnce(&ProbeContext) -> u64,
{
    if inspect.enum_value_exists(BPF_FUNC_ID_ENUM, BPF_FUNC_GET_FUNC_IP) {
        get_func_ip(ctx)
    } else {
        ctx.ip.wrapping_sub(BREAKPOINT_LEN)
    }
}
