//! Bridge multicast group database (`route/mdb`).
//!
//! One [`Mdb`] per bridge. Its entries are the group memberships the bridge
//! snooped or had configured, one [`MdbEntry`] per (port, VLAN, group); the
//! router ports are the ports behind which a multicast router was detected.
//!
//! Wire layout of an `RTM_NEWMDB` message:
//!
//! ```text
//! br_port_msg
//! MDBA_MDB
//!   MDBA_MDB_ENTRY
//!     MDBA_MDB_ENTRY_INFO: br_mdb_entry [MDBA_MDB_EATTR_*...]
//!     ...
//! MDBA_ROUTER
//!   MDBA_ROUTER_PORT: u32 ifindex [MDBA_ROUTER_PATTR_*...]
//! ```

use std::fmt::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use super::attr::{NLA_HDRLEN, get};
use super::builder::MessageBuilder;
use super::cache::Cache;
use super::cache_ops::{Action, AfGroup, CacheType, MsgTypeAction, TypeDescriptor};
use super::change::ChangeRequest;
use super::dump::DumpParams;
use super::error::Result;
use super::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
use super::object::{AttrDiff, NlObject};
use super::parse::FromNetlink;
use super::policy::{AttrKind, Policy, PolicyTable, decode_message};
use super::socket::rtnetlink_groups::RTNLGRP_MDB;
use super::transport::Transport;
use super::types::bridge::{BrMdbEntry, BrPortMsg, eth_p, mdb_state, mdba};

const AF_BRIDGE: u8 = libc::AF_BRIDGE as u8;

/// Attribute bits of [`Mdb`].
pub mod attrs {
    pub const IFINDEX: u64 = 1 << 0;
    pub const FAMILY: u64 = 1 << 1;
    pub const ENTRIES: u64 = 1 << 2;
    pub const ROUTER_PORTS: u64 = 1 << 3;
}

pub static MDB_POLICY: PolicyTable<3> = PolicyTable::new(
    "mdba",
    [
        Policy::UNSPEC,
        Policy::new(AttrKind::Nested),
        Policy::new(AttrKind::Nested),
    ],
);

static MDB_NEST_POLICY: PolicyTable<2> =
    PolicyTable::new("mdba_mdb", [Policy::UNSPEC, Policy::new(AttrKind::Nested)]);

static MDB_ENTRY_POLICY: PolicyTable<2> = PolicyTable::new(
    "mdba_mdb_entry",
    [Policy::UNSPEC, Policy::new(AttrKind::Binary).min(BrMdbEntry::SIZE)],
);

static MDB_EATTR_POLICY: PolicyTable<6> = PolicyTable::new(
    "mdba_mdb_eattr",
    [
        Policy::UNSPEC,
        Policy::new(AttrKind::U32),
        Policy::new(AttrKind::Nested),
        Policy::new(AttrKind::U8),
        Policy::new(AttrKind::Binary),
        Policy::new(AttrKind::U8),
    ],
);

static ROUTER_POLICY: PolicyTable<2> = PolicyTable::new(
    "mdba_router",
    [Policy::UNSPEC, Policy::new(AttrKind::Binary).min(4)],
);

/// Multicast group address of an MDB entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    /// Layer 2 group, for protocols other than IPv4/IPv6.
    L2([u8; 6]),
}

impl GroupAddr {
    /// Decode the `br_mdb_entry` address union according to its ethertype.
    pub fn from_wire(proto: u16, addr: &[u8; 16]) -> Self {
        match proto {
            eth_p::IP => Self::V4(Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3])),
            eth_p::IPV6 => Self::V6(Ipv6Addr::from(*addr)),
            _ => {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&addr[..6]);
                Self::L2(mac)
            }
        }
    }

    /// Ethertype to send with this address.
    pub fn proto(&self) -> u16 {
        match self {
            Self::V4(_) => eth_p::IP,
            Self::V6(_) => eth_p::IPV6,
            Self::L2(_) => 0,
        }
    }

    fn to_wire(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        match self {
            Self::V4(a) => out[..4].copy_from_slice(&a.octets()),
            Self::V6(a) => out = a.octets(),
            Self::L2(mac) => out[..6].copy_from_slice(&mac),
        }
        out
    }
}

impl fmt::Display for GroupAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(a) => fmt::Display::fmt(a, f),
            Self::V6(a) => fmt::Display::fmt(a, f),
            Self::L2(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
        }
    }
}

#[cfg(feature = "output")]
impl serde::Serialize for GroupAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One group membership of a bridge port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(serde::Serialize))]
pub struct MdbEntry {
    /// Port the group was joined on.
    pub ifindex: u32,
    pub vid: u16,
    /// `MDB_TEMPORARY` or `MDB_PERMANENT`.
    pub state: u8,
    /// `MDB_FLAGS_*`.
    pub flags: u8,
    /// Ethertype of the group address.
    pub proto: u16,
    pub addr: GroupAddr,
    /// Remaining membership time in centiseconds, for temporary entries.
    pub timer: Option<u32>,
}

impl MdbEntry {
    /// A temporary membership of `port` in `addr`.
    pub fn new(port: u32, addr: GroupAddr) -> Self {
        Self {
            ifindex: port,
            vid: 0,
            state: mdb_state::TEMPORARY,
            flags: 0,
            proto: addr.proto(),
            addr,
            timer: None,
        }
    }

    pub fn with_vid(mut self, vid: u16) -> Self {
        self.vid = vid;
        self
    }

    pub fn permanent(mut self) -> Self {
        self.state = mdb_state::PERMANENT;
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.state == mdb_state::PERMANENT
    }

    /// Parse an `MDBA_MDB_ENTRY_INFO` payload.
    pub fn from_info(payload: &[u8]) -> Result<Self> {
        let (record, rest) = BrMdbEntry::from_prefix(payload)?;
        let eattrs = MDB_EATTR_POLICY.decode(rest)?;
        let proto = u16::from_be_bytes(record.proto);

        Ok(Self {
            ifindex: record.ifindex,
            vid: record.vid,
            state: record.state,
            flags: record.flags,
            proto,
            addr: GroupAddr::from_wire(proto, &record.addr),
            timer: eattrs.u32(mdba::MDB_EATTR_TIMER),
        })
    }

    /// The wire record for requests.
    pub fn to_record(&self) -> BrMdbEntry {
        BrMdbEntry {
            ifindex: self.ifindex,
            state: self.state,
            flags: self.flags,
            vid: self.vid,
            addr: self.addr.to_wire(),
            proto: self.proto.to_be_bytes(),
            pad: [0; 2],
        }
    }

    fn same_group(&self, other: &Self) -> bool {
        self.ifindex == other.ifindex && self.vid == other.vid && self.addr == other.addr
    }
}

/// Multicast database of one bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(serde::Serialize))]
pub struct Mdb {
    ifindex: Option<u32>,
    family: Option<u8>,
    entries: Vec<MdbEntry>,
    router_ports: Vec<u32>,
}

impl Mdb {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached database of bridge `ifindex`.
    pub fn get(cache: &Cache<Self>, ifindex: u32) -> Option<Arc<Self>> {
        cache.find(|m| m.ifindex == Some(ifindex))
    }

    pub fn ifindex(&self) -> Option<u32> {
        self.ifindex
    }

    pub fn set_ifindex(&mut self, ifindex: u32) {
        self.ifindex = Some(ifindex);
    }

    pub fn family(&self) -> Option<u8> {
        self.family
    }

    pub fn entries(&self) -> &[MdbEntry] {
        &self.entries
    }

    pub fn first_entry(&self) -> Option<&MdbEntry> {
        self.entries.first()
    }

    pub fn for_each_entry(&self, f: impl FnMut(&MdbEntry)) {
        self.entries.iter().for_each(f);
    }

    pub fn add_entry(&mut self, entry: MdbEntry) {
        self.entries.push(entry);
    }

    pub fn router_ports(&self) -> &[u32] {
        &self.router_ports
    }

    fn build_request(msg_type: u16, bridge: u32, entry: &MdbEntry, flags: u16) -> Result<ChangeRequest> {
        let capacity = NLMSG_HDRLEN + BrPortMsg::SIZE + NLA_HDRLEN + BrMdbEntry::SIZE;
        let mut builder =
            MessageBuilder::try_with_capacity(msg_type, NLM_F_REQUEST | NLM_F_ACK | flags, capacity)?;
        builder.append(&BrPortMsg::new(AF_BRIDGE, bridge));
        builder.append_attr(mdba::SET_ENTRY, entry.to_record().as_bytes());
        Ok(ChangeRequest::new(builder))
    }

    /// Request adding `entry` to the database of bridge `bridge`.
    pub fn build_add_request(bridge: u32, entry: &MdbEntry, flags: u16) -> Result<ChangeRequest> {
        Self::build_request(NlMsgType::RTM_NEWMDB, bridge, entry, flags)
    }

    pub fn add<T: Transport + ?Sized>(transport: &mut T, bridge: u32, entry: &MdbEntry, flags: u16) -> Result<()> {
        Self::build_add_request(bridge, entry, flags)?
            .execute(transport)
            .map_err(|e| e.with_context(format!("adding mdb group {} on port {}", entry.addr, entry.ifindex)))
    }

    /// Request removing `entry` from the database of bridge `bridge`.
    pub fn build_delete_request(bridge: u32, entry: &MdbEntry) -> Result<ChangeRequest> {
        Self::build_request(NlMsgType::RTM_DELMDB, bridge, entry, 0)
    }

    pub fn delete<T: Transport + ?Sized>(transport: &mut T, bridge: u32, entry: &MdbEntry) -> Result<()> {
        Self::build_delete_request(bridge, entry)?
            .execute(transport)
            .map_err(|e| e.with_context(format!("deleting mdb group {} on port {}", entry.addr, entry.ifindex)))
    }
}

impl NlObject for Mdb {
    fn id_attrs(&self) -> u64 {
        attrs::IFINDEX
    }

    fn mask(&self) -> u64 {
        let mut mask = 0;
        if self.ifindex.is_some() {
            mask |= attrs::IFINDEX;
        }
        if self.family.is_some() {
            mask |= attrs::FAMILY;
        }
        if !self.entries.is_empty() {
            mask |= attrs::ENTRIES;
        }
        if !self.router_ports.is_empty() {
            mask |= attrs::ROUTER_PORTS;
        }
        mask
    }

    fn compare_attrs(&self, other: &Self, attrs: u64, _loose: bool) -> u64 {
        AttrDiff::new(self, other, attrs)
            .field(attrs::IFINDEX, |o| o.ifindex)
            .field(attrs::FAMILY, |o| o.family)
            .field(attrs::ENTRIES, |o| o.entries.clone())
            .field(attrs::ROUTER_PORTS, |o| o.router_ports.clone())
            .finish()
    }

    /// Replace entries of the same (port, VLAN, group), append the rest and
    /// add new router ports.
    fn update(&mut self, new: &Self) -> bool {
        for entry in &new.entries {
            match self.entries.iter_mut().find(|e| e.same_group(entry)) {
                Some(existing) => *existing = *entry,
                None => self.entries.push(*entry),
            }
        }
        for port in &new.router_ports {
            if !self.router_ports.contains(port) {
                self.router_ports.push(*port);
            }
        }
        true
    }

    fn subtract(&mut self, gone: &Self) -> bool {
        if gone.entries.is_empty() && gone.router_ports.is_empty() {
            return false;
        }
        self.entries
            .retain(|e| !gone.entries.iter().any(|g| e.same_group(g)));
        self.router_ports.retain(|p| !gone.router_ports.contains(p));
        !self.entries.is_empty() || !self.router_ports.is_empty()
    }

    fn dump_line(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        let name = params.ifname(self.ifindex.unwrap_or(0));
        write!(params, "dev {name} groups {}", self.entries.len())?;
        if !self.router_ports.is_empty() {
            write!(params, " router ports {}", self.router_ports.len())?;
        }
        Ok(())
    }

    fn dump_details(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        let name = params.ifname(self.ifindex.unwrap_or(0));
        write!(params, "dev {name}")?;
        for e in &self.entries {
            let port = params.ifname(e.ifindex);
            let state = if e.is_permanent() { "permanent" } else { "temp" };
            write!(params, "\n    port {port} grp {} {state}", e.addr)?;
            if e.vid != 0 {
                write!(params, " vid {}", e.vid)?;
            }
            if let Some(t) = e.timer {
                write!(params, " {}.{:02}", t / 100, t % 100)?;
            }
        }
        for port in &self.router_ports {
            let port = params.ifname(*port);
            write!(params, "\n    router port {port}")?;
        }
        Ok(())
    }
}

impl CacheType for Mdb {
    const NAME: &'static str = "route/mdb";
    const HDR_SIZE: usize = BrPortMsg::SIZE;
    const MSG_TYPES: &'static [MsgTypeAction] = &[
        MsgTypeAction::new(NlMsgType::RTM_NEWMDB, Action::New, "new"),
        MsgTypeAction::new(NlMsgType::RTM_DELMDB, Action::Del, "del"),
        MsgTypeAction::new(NlMsgType::RTM_GETMDB, Action::Get, "get"),
    ];
    const GROUPS: &'static [AfGroup] = &[AfGroup {
        family: AF_BRIDGE,
        group: RTNLGRP_MDB,
    }];

    fn dump_request() -> MessageBuilder {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_GETMDB, NLM_F_REQUEST | NLM_F_DUMP);
        builder.append(&BrPortMsg::new(AF_BRIDGE, 0));
        builder
    }

    fn parse(_hdr: &NlMsgHdr, payload: &[u8]) -> Result<Option<Self>> {
        let msg = BrPortMsg::from_bytes(payload)?;
        if msg.family != AF_BRIDGE {
            return Ok(None);
        }
        let attrs = decode_message(payload, BrPortMsg::SIZE, &MDB_POLICY)?;

        let mut mdb = Self::new();
        mdb.ifindex = Some(msg.ifindex);
        mdb.family = Some(msg.family);

        if let Some(db) = attrs.nested(mdba::MDB, &MDB_NEST_POLICY)? {
            for nest in db.all(mdba::MDB_ENTRY) {
                let entry = MDB_ENTRY_POLICY.decode(nest)?;
                for info in entry.all(mdba::MDB_ENTRY_INFO) {
                    mdb.add_entry(MdbEntry::from_info(info)?);
                }
            }
        }

        if let Some(router) = attrs.nested(mdba::ROUTER, &ROUTER_POLICY)? {
            for port in router.all(mdba::ROUTER_PORT) {
                mdb.router_ports.push(get::u32_ne(port)?);
            }
        }

        Ok(Some(mdb))
    }
}

/// Descriptor registered as `route/mdb`.
pub static MDB_OPS: TypeDescriptor<Mdb> = TypeDescriptor::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::AttrIter;
    use crate::netlink::dump::DumpType;
    use crate::netlink::fixtures::{MdbSpec, MockTransport, ack, mdb_payload};
    use crate::netlink::message::{NLM_F_CREATE, NLM_F_EXCL};
    use crate::netlink::object::{ALL_ATTRS, CompareMode};

    const GROUP: [u8; 4] = [239, 0, 1, 13];

    fn parse(payload: &[u8]) -> Mdb {
        Mdb::parse(&NlMsgHdr::new(NlMsgType::RTM_NEWMDB, 0), payload)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_two_records_become_two_sub_records() {
        let payload = mdb_payload(4, &[MdbSpec::ipv4(5, GROUP), MdbSpec::ipv4(6, GROUP)], &[]);
        let mdb = parse(&payload);

        assert_eq!(mdb.ifindex(), Some(4));
        assert_eq!(mdb.entries().len(), 2);
        for e in mdb.entries() {
            assert_eq!(e.proto, 0x0800);
            assert_eq!(e.addr, GroupAddr::V4(Ipv4Addr::new(239, 0, 1, 13)));
        }
        let ports: Vec<_> = mdb.entries().iter().map(|e| e.ifindex).collect();
        assert_eq!(ports, vec![5, 6]);
    }

    #[test]
    fn test_empty_database() {
        let mdb = parse(&mdb_payload(4, &[], &[]));
        assert!(mdb.entries().is_empty());
        assert!(mdb.first_entry().is_none());
        assert_eq!(mdb.mask(), attrs::IFINDEX | attrs::FAMILY);
    }

    #[test]
    fn test_router_ports() {
        let mdb = parse(&mdb_payload(4, &[MdbSpec::ipv4(5, GROUP)], &[5, 7]));
        assert_eq!(mdb.router_ports(), &[5, 7]);
    }

    #[test]
    fn test_entry_timer_and_v6() {
        let mut addr = [0u8; 16];
        addr[0] = 0xff;
        addr[1] = 0x02;
        addr[15] = 0x6b;
        let spec = MdbSpec {
            port: 5,
            vid: 10,
            state: 0,
            proto: eth_p::IPV6,
            addr,
        };
        let mut info = spec.record().as_bytes().to_vec();
        // MDBA_MDB_EATTR_TIMER = 2.5s
        info.extend_from_slice(&[8, 0, 1, 0]);
        info.extend_from_slice(&250u32.to_ne_bytes());

        let entry = MdbEntry::from_info(&info).unwrap();
        assert_eq!(entry.addr.to_string(), "ff02::6b");
        assert_eq!(entry.vid, 10);
        assert_eq!(entry.timer, Some(250));
    }

    #[test]
    fn test_truncated_record() {
        let payload = mdb_payload(4, &[MdbSpec::ipv4(5, GROUP)], &[]);
        // br_port_msg(8) + MDBA_MDB hdr(4) + MDBA_MDB_ENTRY hdr(4) + INFO hdr(4)
        let mut short = payload.clone();
        short[16] = 4 + 20;
        short.truncate(20 + 24);
        assert!(Mdb::parse(&NlMsgHdr::new(NlMsgType::RTM_NEWMDB, 0), &short).is_err());
    }

    #[test]
    fn test_unpadded_record_rejected() {
        let record = MdbSpec::ipv4(5, GROUP).record();
        let mut b = MessageBuilder::new(0, 0);
        b.append(&BrPortMsg::new(AF_BRIDGE, 4));
        let db = b.nest_start(mdba::MDB);
        let entry = b.nest_start(mdba::MDB_ENTRY);
        b.append_attr(mdba::MDB_ENTRY_INFO, &record.as_bytes()[..BrMdbEntry::SIZE - 2]);
        b.nest_end(entry);
        b.nest_end(db);
        let payload = b.finish()[NLMSG_HDRLEN..].to_vec();

        let err = Mdb::parse(&NlMsgHdr::new(NlMsgType::RTM_NEWMDB, 0), &payload).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_other_family_ignored() {
        let mut payload = mdb_payload(4, &[], &[]);
        payload[0] = libc::AF_INET as u8;
        assert!(
            Mdb::parse(&NlMsgHdr::new(NlMsgType::RTM_NEWMDB, 0), &payload)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_update_merges_groups() {
        let mut a = parse(&mdb_payload(4, &[MdbSpec::ipv4(5, GROUP)], &[5]));
        let b = parse(&mdb_payload(
            4,
            &[
                MdbSpec {
                    state: mdb_state::PERMANENT,
                    ..MdbSpec::ipv4(5, GROUP)
                },
                MdbSpec::ipv4(6, GROUP),
            ],
            &[5, 6],
        ));

        assert!(a.identical(&b));
        assert_ne!(a.compare(&b, ALL_ATTRS, CompareMode::Exact), 0);
        assert!(a.update(&b));
        assert_eq!(a.entries().len(), 2);
        assert!(a.entries()[0].is_permanent());
        assert_eq!(a.router_ports(), &[5, 6]);
    }

    #[test]
    fn test_add_request_layout() {
        let entry = MdbEntry::new(5, GroupAddr::V4(Ipv4Addr::new(239, 0, 1, 13)))
            .with_vid(10)
            .permanent();
        let req = Mdb::build_add_request(4, &entry, NLM_F_CREATE | NLM_F_EXCL).unwrap();
        assert_eq!(req.msg_type(), NlMsgType::RTM_NEWMDB);
        assert_eq!(req.fallback(), None);

        let msg = req.builder().clone().finish();
        let payload = &msg[NLMSG_HDRLEN..];
        assert_eq!(BrPortMsg::from_bytes(payload).unwrap().ifindex, 4);

        let (kind, data) = AttrIter::new(&payload[BrPortMsg::SIZE..]).next().unwrap();
        assert_eq!(kind, mdba::SET_ENTRY);
        let record = BrMdbEntry::from_bytes(data).unwrap();
        assert_eq!(*record, entry.to_record());
        assert_eq!(record.addr[..4], GROUP);
        assert_eq!(u16::from_be_bytes(record.proto), eth_p::IP);
    }

    #[test]
    fn test_delete_reports_context() {
        let mut mock = MockTransport::new(|hdr, _| vec![ack(hdr.nlmsg_seq, hdr, -libc::ENOENT)]);
        let entry = MdbEntry::new(5, GroupAddr::V4(Ipv4Addr::new(239, 0, 1, 13)));
        let err = Mdb::delete(&mut mock, 4, &entry).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("deleting mdb group 239.0.1.13 on port 5"));
        assert_eq!(mock.sent_headers()[0].nlmsg_type, NlMsgType::RTM_DELMDB);
    }

    #[test]
    fn test_dump_details() {
        let mdb = parse(&mdb_payload(
            4,
            &[MdbSpec {
                vid: 10,
                ..MdbSpec::ipv4(5, GROUP)
            }],
            &[6],
        ));
        let mut out = String::new();
        NlObject::dump(&mdb, &mut DumpParams::new(&mut out)).unwrap();
        assert_eq!(out, "dev if4 groups 1 router ports 1");

        let mut out = String::new();
        NlObject::dump(&mdb, &mut DumpParams::new(&mut out).dump_type(DumpType::Details)).unwrap();
        assert_eq!(
            out,
            "dev if4\n    port if5 grp 239.0.1.13 temp vid 10\n    router port if6"
        );
    }

    #[test]
    fn test_l2_group_display() {
        let mut addr = [0u8; 16];
        addr[..6].copy_from_slice(&[0x01, 0x80, 0xc2, 0, 0, 0x0e]);
        assert_eq!(GroupAddr::from_wire(0, &addr).to_string(), "01:80:c2:00:00:0e");
    }
}
