//! Hooks running at the ovs datapath instrumentation points. Both run
//! synchronously within a single probe firing and communicate only through
//! the sections they write and the shared in-flight command registry.

use std::sync::Arc;

use anyhow::Result;
use memoffset::offset_of;

use super::raw::*;
use crate::{
    bindings::{nlattr, NLA_HDRLEN, NLA_TYPE_MASK, OVS_ACTION_ATTR_OUTPUT},
    core::{
        events::{RawEvent, SectionOwner},
        inspect::KernelInspect,
        kernel::{KernelReader, ReadError},
        probe::{
            Hook, HookError, HookResult, PacketResolver, ProbeContext, FILTER_PACKET_PASS,
        },
        tracking::{InflightCommands, PacketBuffers, PacketHasher},
    },
};

/// Registers carrying the flow key and the action attribute pointers at the
/// action execution attachment point.
const EXEC_KEY_REG: usize = 2;
const EXEC_ATTR_REG: usize = 3;

/// Register carrying the upcall descriptor pointer at the upcall enqueue
/// attachment point.
const ENQUEUE_UPCALL_REG: usize = 3;

/// Whether a firing runs on behalf of a pending userspace command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Tracking {
    NotTracked,
    Tracked,
}

/// Hook for the action execution probe. Reports which action the datapath
/// runs on a packet, tags executions belonging to an in-flight userspace
/// command with the packet fingerprint and carries action-specific data
/// for some actions.
pub struct ExecHook {
    /// Offset of recirc_id in struct sw_flow_key on the running kernel.
    recirc_id_offset: u32,
    reader: Arc<dyn KernelReader>,
    packets: Arc<dyn PacketResolver>,
    inflight: Arc<dyn InflightCommands>,
    buffers: Arc<dyn PacketBuffers>,
    hasher: Arc<dyn PacketHasher>,
}

impl ExecHook {
    pub fn new(
        inspect: &dyn KernelInspect,
        reader: Arc<dyn KernelReader>,
        packets: Arc<dyn PacketResolver>,
        inflight: Arc<dyn InflightCommands>,
        buffers: Arc<dyn PacketBuffers>,
        hasher: Arc<dyn PacketHasher>,
    ) -> Result<ExecHook> {
        Ok(ExecHook {
            recirc_id_offset: inspect.field_offset("sw_flow_key", "recirc_id")?,
            reader,
            packets,
            inflight,
            buffers,
            hasher,
        })
    }

    /// Attribute type tag, with the netlink flag bits masked off.
    fn nla_type(&self, attr: u64) -> Result<u8, ReadError> {
        let nla_type = self
            .reader
            .read_u16(attr + offset_of!(nlattr, nla_type) as u64)?;
        Ok((nla_type & NLA_TYPE_MASK) as u8)
    }

    /// Decide whether the current thread's packet action is part of an
    /// in-flight userspace command and, if so, record the packet
    /// fingerprint linking it to the matching enqueue observation.
    ///
    /// The fingerprint is derived from the packet content: the enqueue side
    /// can run on another thread and call stack, so no execution-local
    /// token would survive between the two points. An entry can vanish
    /// from the registry right after the lookup; the resulting rare
    /// mis-tag is accepted.
    fn handle_tracking(
        &self,
        ctx: &ProbeContext,
        event: &mut RawEvent,
    ) -> Result<Tracking, HookError> {
        if !self.inflight.contains(ctx.pid_tgid) {
            // This call does not come from a userspace command.
            return Ok(Tracking::NotTracked);
        }

        let packet = self
            .packets
            .packet(ctx)
            .ok_or(HookError::Unresolved("packet descriptor"))?;

        let queue_id = self
            .buffers
            .with_scratch(&mut |buf| self.hasher.hash_packet(buf, &packet))
            .ok_or(HookError::Unresolved("packet scratch buffer"))?;

        let track = event
            .section::<ExecTrackEvent>(SectionOwner::Ovs, OvsDataType::ActionExecTrack as u8)
            .ok_or(HookError::EventFull)?;
        track.queue_id = queue_id;

        Ok(Tracking::Tracked)
    }
}

impl Hook for ExecHook {
    fn process(&mut self, ctx: &ProbeContext, event: &mut RawEvent) -> HookResult {
        let key = ctx.regs.reg[EXEC_KEY_REG];
        if key == 0 {
            return HookResult::NoEvent;
        }

        let attr = ctx.regs.reg[EXEC_ATTR_REG];
        if attr == 0 {
            return HookResult::NoEvent;
        }

        // Without the attribute type tag there is no action to report; read
        // it before committing the section.
        let Ok(action) = self.nla_type(attr) else {
            return HookResult::NoEvent;
        };

        let Some(exec) =
            event.section::<ExecEvent>(SectionOwner::Ovs, OvsDataType::ActionExec as u8)
        else {
            return HookResult::NoEvent;
        };
        exec.action = action;
        // The flow key layout can drift between kernel releases; the
        // summary stands with a zero recirculation id if the read fails.
        exec.recirc_id = self
            .reader
            .read_u32(key + self.recirc_id_offset as u64)
            .unwrap_or_default();

        // Skip the enrichment below for packets neither coming from
        // userspace nor matching the filters. The summary above stands
        // either way; keeping or dropping the whole event is the
        // framework's call.
        match self.handle_tracking(ctx, event) {
            Ok(Tracking::NotTracked) if ctx.filters_ret & FILTER_PACKET_PASS == 0 => {
                return HookResult::Event
            }
            Err(_) => return HookResult::Event,
            Ok(_) => (),
        }

        // Add action-specific data for some actions.
        match action {
            OVS_ACTION_ATTR_OUTPUT => {
                let Some(output) = event
                    .section::<ExecOutputEvent>(SectionOwner::Ovs, OvsDataType::OutputAction as u8)
                else {
                    return HookResult::Event;
                };

                // Attribute payloads live in kernel-controlled memory too;
                // a failed read leaves the port at zero.
                output.port = self.reader.read_u32(attr + NLA_HDRLEN).unwrap_or_default();
            }
            _ => (),
        }

        HookResult::Event
    }
}

/// Hook for the return of the enqueue-to-userspace operation. Reports the
/// enqueue outcome together with the upcall command and destination port.
pub struct UpcallEnqueueHook {
    /// Offsets of portid and cmd in struct dp_upcall_info on the running
    /// kernel.
    portid_offset: u32,
    cmd_offset: u32,
    reader: Arc<dyn KernelReader>,
}

impl UpcallEnqueueHook {
    pub fn new(
        inspect: &dyn KernelInspect,
        reader: Arc<dyn KernelReader>,
    ) -> Result<UpcallEnqueueHook> {
        Ok(UpcallEnqueueHook {
            portid_offset: inspect.field_offset("dp_upcall_info", "portid")?,
            cmd_offset: inspect.field_offset("dp_upcall_info", "cmd")?,
            reader,
        })
    }
}

impl Hook for UpcallEnqueueHook {
    fn process(&mut self, ctx: &ProbeContext, event: &mut RawEvent) -> HookResult {
        let upcall = ctx.regs.reg[ENQUEUE_UPCALL_REG];
        if upcall == 0 {
            // The operation can legitimately run without an upcall
            // descriptor; nothing to report then.
            return HookResult::NoEvent;
        }

        let Some(enqueue) =
            event.section::<EnqueueEvent>(SectionOwner::Ovs, OvsDataType::UpcallEnqueue as u8)
        else {
            return HookResult::NoEvent;
        };

        enqueue.port = self
            .reader
            .read_u32(upcall + self.portid_offset as u64)
            .unwrap_or_default();
        enqueue.cmd = self
            .reader
            .read_u8(upcall + self.cmd_offset as u64)
            .unwrap_or_default();
        enqueue.ret = ctx.regs.ret as i32;

        HookResult::Event
    }
}
