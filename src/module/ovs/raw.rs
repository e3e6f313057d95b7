//! Raw section layouts of the ovs module and their unmarshaling into typed
//! events. Struct layouts and identifier values are wire format; please
//! keep them in sync with every consumer.

use anyhow::{anyhow, bail, Result};
use plain::Plain;

use super::event::*;
use crate::core::events::{parse_raw_section, RawSection, SectionOwner};

/// Section data types of the ovs module. Values are part of the wire
/// format; ids not listed here are owned by probes outside this crate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OvsDataType {
    /// Upcall enqueue probe.
    UpcallEnqueue = 1,
    /// Execute action probe.
    ActionExec = 5,
    /// Execute action tracking.
    ActionExecTrack = 6,
    /// OUTPUT action specific data.
    OutputAction = 7,
}

impl OvsDataType {
    pub fn from_u8(val: u8) -> Result<OvsDataType> {
        use OvsDataType::*;
        Ok(match val {
            1 => UpcallEnqueue,
            5 => ActionExec,
            6 => ActionExecTrack,
            7 => OutputAction,
            x => bail!("Can't construct an OvsDataType from {}", x),
        })
    }
}

/// Action execution section data.
#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub(crate) struct ExecEvent {
    /// Action applied to the packet.
    pub(crate) action: u8,
    /// Recirculation id.
    pub(crate) recirc_id: u32,
}
unsafe impl Plain for ExecEvent {}

/// Action tracking section data.
#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub(crate) struct ExecTrackEvent {
    /// Packet fingerprint, aka. queue id.
    pub(crate) queue_id: u32,
}
unsafe impl Plain for ExecTrackEvent {}

/// OUTPUT action section data.
#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub(crate) struct ExecOutputEvent {
    /// Output port.
    pub(crate) port: u32,
}
unsafe impl Plain for ExecOutputEvent {}

/// Upcall enqueue section data.
#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub(crate) struct EnqueueEvent {
    pub(crate) ret: i32,
    pub(crate) cmd: u8,
    pub(crate) port: u32,
}
unsafe impl Plain for EnqueueEvent {}

/// Values from enum ovs_action_attr (uapi/linux/openvswitch.h).
fn action_name(val: u8) -> Result<&'static str> {
    Ok(match val {
        0 => "unspecified",
        1 => "output",
        2 => "userspace",
        3 => "set",
        4 => "push_vlan",
        5 => "pop_vlan",
        6 => "sample",
        7 => "recirc",
        8 => "hash",
        9 => "push_mpls",
        10 => "pop_mpls",
        11 => "set_masked",
        12 => "ct",
        13 => "trunc",
        14 => "push_eth",
        15 => "pop_eth",
        16 => "ct_clear",
        17 => "push_nsh",
        18 => "pop_nsh",
        19 => "meter",
        20 => "clone",
        21 => "check_pkt_len",
        22 => "add_mpls",
        23 => "dec_ttl",
        24 => "drop",
        25 => "psample",
        val => bail!("Unsupported action id {val}"),
    })
}

fn unmarshal_exec(section: &RawSection) -> Result<ActionEvent> {
    let raw = parse_raw_section::<ExecEvent>(section)?;

    Ok(ActionEvent {
        action: action_name(raw.action)?.to_string(),
        recirc_id: raw.recirc_id,
        ..ActionEvent::default()
    })
}

fn unmarshal_enqueue(section: &RawSection) -> Result<UpcallEnqueueEvent> {
    let raw = parse_raw_section::<EnqueueEvent>(section)?;

    Ok(UpcallEnqueueEvent {
        ret: raw.ret,
        cmd: raw.cmd,
        port: raw.port,
    })
}

/// Unmarshal the ovs sections of a single raw event into a typed event.
/// Optional sections (tracking, output) enrich the action event written
/// before them.
pub fn unmarshal(raw_sections: &[RawSection]) -> Result<OvsEvent> {
    let mut event = None;

    for section in raw_sections.iter() {
        if SectionOwner::from_u8(section.header.owner)? != SectionOwner::Ovs {
            bail!("Section owned by another collector ({})", section.header.owner);
        }

        match OvsDataType::from_u8(section.header.data_type)? {
            OvsDataType::ActionExec => {
                if event.is_some() {
                    bail!("Conflicting ovs sections in one event");
                }
                event = Some(OvsEvent::Action {
                    action_execute: unmarshal_exec(section)?,
                });
            }
            OvsDataType::ActionExecTrack => {
                let raw = parse_raw_section::<ExecTrackEvent>(section)?;
                match event.as_mut() {
                    Some(OvsEvent::Action { action_execute }) => {
                        action_execute.queue_id = Some(raw.queue_id)
                    }
                    _ => bail!("Tracking section without an action section"),
                }
            }
            OvsDataType::OutputAction => {
                let raw = parse_raw_section::<ExecOutputEvent>(section)?;
                match event.as_mut() {
                    Some(OvsEvent::Action { action_execute }) => {
                        action_execute.port = Some(raw.port)
                    }
                    _ => bail!("Output section without an action section"),
                }
            }
            OvsDataType::UpcallEnqueue => {
                if event.is_some() {
                    bail!("Conflicting ovs sections in one event");
                }
                event = Some(OvsEvent::UpcallEnqueue {
                    upcall_enqueue: unmarshal_enqueue(section)?,
                });
            }
        }
    }

    event.ok_or_else(|| anyhow!("No ovs section in the event"))
}
