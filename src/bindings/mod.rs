//! Hand-maintained mirrors of the kernel UAPI definitions consumed by the
//! hooks and the unmarshalers. Please keep in sync with the kernel headers
//! referenced on each item.

#![allow(non_camel_case_types)]

use plain::Plain;

/// Netlink attribute header. Mirrors struct nlattr from
/// include/uapi/linux/netlink.h; the attribute payload starts right after
/// the (4-byte aligned) header.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct nlattr {
    pub nla_len: u16,
    pub nla_type: u16,
}

unsafe impl Plain for nlattr {}

pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Size of the attribute header, which is already 4-byte aligned.
pub const NLA_HDRLEN: u64 = std::mem::size_of::<nlattr>() as u64;

/// enum ovs_action_attr, include/uapi/linux/openvswitch.h. Only the action
/// with kind-specific event data gets its own constant; the full value
/// space is decoded by name in the ovs module.
pub const OVS_ACTION_ATTR_OUTPUT: u8 = 1;

/// enum ovs_packet_cmd, include/uapi/linux/openvswitch.h. Carried verbatim
/// in the upcall enqueue section.
pub const OVS_PACKET_CMD_UNSPEC: u8 = 0;
pub const OVS_PACKET_CMD_MISS: u8 = 1;
pub const OVS_PACKET_CMD_ACTION: u8 = 2;
pub const OVS_PACKET_CMD_EXECUTE: u8 = 3;
