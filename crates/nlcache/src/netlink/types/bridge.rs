//! Bridge family headers and attribute numbers (VLAN database, MDB, link AF_SPEC).

use crate::netlink::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

macro_rules! wire_struct_impl {
    ($ty:ty) => {
        impl $ty {
            /// Size of this structure.
            pub const SIZE: usize = std::mem::size_of::<Self>();

            /// Convert to bytes.
            pub fn as_bytes(&self) -> &[u8] {
                <Self as IntoBytes>::as_bytes(self)
            }

            /// Parse from bytes.
            pub fn from_bytes(data: &[u8]) -> Result<&Self> {
                Self::ref_from_prefix(data)
                    .map(|(r, _)| r)
                    .map_err(|_| Error::Truncated {
                        expected: Self::SIZE,
                        actual: data.len(),
                    })
            }
        }
    };
}

/// VLAN database message header (struct br_vlan_msg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BrVlanMsg {
    /// Address family, AF_BRIDGE.
    pub family: u8,
    pub reserved1: u8,
    pub reserved2: u16,
    /// Interface index of the port or bridge.
    pub ifindex: u32,
}

wire_struct_impl!(BrVlanMsg);

impl BrVlanMsg {
    pub fn new(family: u8, ifindex: u32) -> Self {
        Self {
            family,
            ifindex,
            ..Default::default()
        }
    }
}

/// Bridge port message header used by MDB messages (struct br_port_msg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BrPortMsg {
    /// Address family, AF_BRIDGE.
    pub family: u8,
    pub pad: [u8; 3],
    /// Interface index of the bridge.
    pub ifindex: u32,
}

wire_struct_impl!(BrPortMsg);

impl BrPortMsg {
    pub fn new(family: u8, ifindex: u32) -> Self {
        Self {
            family,
            ifindex,
            ..Default::default()
        }
    }
}

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

wire_struct_impl!(IfInfoMsg);

impl IfInfoMsg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address family.
    pub fn with_family(mut self, family: u8) -> Self {
        self.ifi_family = family;
        self
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }
}

/// VLAN info blob (struct bridge_vlan_info).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BridgeVlanInfo {
    pub flags: u16,
    pub vid: u16,
}

wire_struct_impl!(BridgeVlanInfo);

impl BridgeVlanInfo {
    pub fn new(vid: u16) -> Self {
        Self { flags: 0, vid }
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }
}

/// MDB entry record (struct br_mdb_entry).
///
/// `addr` holds the group address union and `proto` the ethertype, both in
/// network byte order. The record is padded to 28 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BrMdbEntry {
    pub ifindex: u32,
    pub state: u8,
    pub flags: u8,
    pub vid: u16,
    pub addr: [u8; 16],
    pub proto: [u8; 2],
    pub pad: [u8; 2],
}

wire_struct_impl!(BrMdbEntry);

/// Top-level VLAN database attributes (BRIDGE_VLANDB_*).
pub mod vlandb {
    pub const UNSPEC: u16 = 0;
    pub const ENTRY: u16 = 1;
    pub const GLOBAL_OPTIONS: u16 = 2;
}

/// Attributes inside BRIDGE_VLANDB_ENTRY (BRIDGE_VLANDB_ENTRY_*).
pub mod vlandb_entry {
    pub const UNSPEC: u16 = 0;
    pub const INFO: u16 = 1;
    pub const RANGE: u16 = 2;
    pub const STATE: u16 = 3;
    pub const TUNNEL_INFO: u16 = 4;
}

/// Bridge VLAN flags (BRIDGE_VLAN_INFO_*).
pub mod bridge_vlan_flags {
    /// Operate on the bridge device itself.
    pub const MASTER: u16 = 1 << 0;
    /// VLAN is the port's PVID.
    pub const PVID: u16 = 1 << 1;
    /// VLAN egresses untagged.
    pub const UNTAGGED: u16 = 1 << 2;
    /// First VLAN of a range.
    pub const RANGE_BEGIN: u16 = 1 << 3;
    /// Last VLAN of a range.
    pub const RANGE_END: u16 = 1 << 4;
    /// Global bridge VLAN entry.
    pub const BRENTRY: u16 = 1 << 5;
    /// Only change options, not membership.
    pub const ONLY_OPTS: u16 = 1 << 6;
}

/// Top-level MDB attributes (MDBA_*).
pub mod mdba {
    pub const UNSPEC: u16 = 0;
    pub const MDB: u16 = 1;
    pub const ROUTER: u16 = 2;

    /// Inside MDBA_MDB.
    pub const MDB_ENTRY: u16 = 1;
    /// Inside MDBA_MDB_ENTRY.
    pub const MDB_ENTRY_INFO: u16 = 1;

    /// Extra attributes following a br_mdb_entry (MDBA_MDB_EATTR_*).
    pub const MDB_EATTR_TIMER: u16 = 1;
    pub const MDB_EATTR_SRC_LIST: u16 = 2;
    pub const MDB_EATTR_GROUP_MODE: u16 = 3;
    pub const MDB_EATTR_SOURCE: u16 = 4;
    pub const MDB_EATTR_RTPROT: u16 = 5;

    /// Inside MDBA_ROUTER.
    pub const ROUTER_PORT: u16 = 1;

    /// Request attribute carrying a br_mdb_entry (MDBA_SET_ENTRY).
    pub const SET_ENTRY: u16 = 1;
}

/// MDB entry states.
pub mod mdb_state {
    pub const TEMPORARY: u8 = 0;
    pub const PERMANENT: u8 = 1;
}

/// MDB entry flags (MDB_FLAGS_*).
pub mod mdb_flags {
    pub const OFFLOAD: u8 = 1 << 0;
    pub const FAST_LEAVE: u8 = 1 << 1;
    pub const STAR_EXCL: u8 = 1 << 2;
    pub const BLOCKED: u8 = 1 << 3;
}

/// Link attributes used by VLAN membership requests.
pub mod ifla {
    pub const AF_SPEC: u16 = 26;
}

/// Attributes inside IFLA_AF_SPEC for AF_BRIDGE.
pub mod bridge_af {
    pub const IFLA_BRIDGE_FLAGS: u16 = 0;
    pub const IFLA_BRIDGE_MODE: u16 = 1;
    pub const IFLA_BRIDGE_VLAN_INFO: u16 = 2;
}

/// Ethertypes carried in br_mdb_entry.proto.
pub mod eth_p {
    pub const IP: u16 = 0x0800;
    pub const IPV6: u16 = 0x86dd;
}
