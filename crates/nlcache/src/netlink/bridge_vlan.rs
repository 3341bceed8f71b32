//! Bridge VLAN database entries (`route/bridgevlan`).
//!
//! The kernel reports per-port VLAN membership through `RTM_NEWVLAN` /
//! `RTM_DELVLAN` messages on the `RTNLGRP_BRVLAN` group. Each message carries
//! a `br_vlan_msg` header followed by one `BRIDGE_VLANDB_ENTRY` per VLAN or
//! VLAN range; a [`BridgeVlan`] collects them for one interface.
//!
//! Membership is changed through `RTM_NEWLINK` with an `IFLA_AF_SPEC` nest,
//! falling back to `RTM_SETLINK` on kernels that reject the create type.
//!
//! # Example
//!
//! ```ignore
//! use nlcache::netlink::{BridgeVlan, BridgeVlanEntry, Cache, NetlinkSocket};
//!
//! let mut sock = NetlinkSocket::new()?;
//! let cache = Cache::<BridgeVlan>::alloc_and_fill(&mut sock)?;
//!
//! if let Some(orig) = BridgeVlan::get(&cache, 4) {
//!     let mut changes = BridgeVlan::new();
//!     changes.add_entry(BridgeVlanEntry::new(100).with_range(110));
//!     BridgeVlan::change(&mut sock, &orig, &changes, 0)?;
//! }
//! ```

use std::fmt::{self, Write};
use std::sync::Arc;

use super::attr::NLA_HDRLEN;
use super::builder::MessageBuilder;
use super::cache::Cache;
use super::cache_ops::{Action, AfGroup, CacheType, MsgTypeAction, TypeDescriptor};
use super::change::ChangeRequest;
use super::dump::DumpParams;
use super::error::{Error, Result};
use super::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
use super::object::{AttrDiff, NlObject};
use super::parse::FromNetlink;
use super::policy::{AttrKind, Policy, PolicyTable, decode_message};
use super::socket::rtnetlink_groups::RTNLGRP_BRVLAN;
use super::transport::Transport;
use super::types::bridge::{
    BrVlanMsg, BridgeVlanInfo, IfInfoMsg, bridge_af, bridge_vlan_flags, ifla, vlandb,
    vlandb_entry,
};

const AF_BRIDGE: u8 = libc::AF_BRIDGE as u8;

/// Attribute bits of [`BridgeVlan`].
pub mod attrs {
    pub const IFINDEX: u64 = 1 << 0;
    pub const FAMILY: u64 = 1 << 1;
    pub const VLAN_ID: u64 = 1 << 2;
    pub const STATE: u64 = 1 << 3;
    pub const RANGE: u64 = 1 << 4;
    pub const FLAGS: u64 = 1 << 5;
    pub const ENTRIES: u64 = 1 << 6;
}

/// Top-level attributes of a VLAN database message.
pub static VLANDB_POLICY: PolicyTable<3> = PolicyTable::new(
    "bridge_vlandb",
    [
        Policy::UNSPEC,
        Policy::new(AttrKind::Nested),
        Policy::new(AttrKind::Nested),
    ],
);

/// Attributes inside `BRIDGE_VLANDB_ENTRY`.
pub static VLANDB_ENTRY_POLICY: PolicyTable<5> = PolicyTable::new(
    "bridge_vlandb_entry",
    [
        Policy::UNSPEC,
        Policy::exact(AttrKind::Binary, BridgeVlanInfo::SIZE),
        Policy::new(AttrKind::U16),
        Policy::new(AttrKind::U8),
        Policy::new(AttrKind::Nested),
    ],
);

/// Spanning tree state name as printed by `bridge vlan show`.
pub fn state_name(state: u8) -> &'static str {
    match state {
        0 => "disabled",
        1 => "listening",
        2 => "learning",
        3 => "forwarding",
        4 => "blocking",
        _ => "unknown",
    }
}

/// One VLAN (or VLAN range) of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(serde::Serialize))]
pub struct BridgeVlanEntry {
    pub vlan_id: u16,
    /// `BRIDGE_VLAN_INFO_*` flags.
    pub flags: u16,
    pub state: Option<u8>,
    /// Last VLAN of the range, 0 for a single VLAN.
    pub range: u16,
}

impl BridgeVlanEntry {
    pub fn new(vlan_id: u16) -> Self {
        Self {
            vlan_id,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_state(mut self, state: u8) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_range(mut self, last: u16) -> Self {
        self.range = last;
        self
    }

    pub fn is_pvid(&self) -> bool {
        self.flags & bridge_vlan_flags::PVID != 0
    }

    pub fn is_untagged(&self) -> bool {
        self.flags & bridge_vlan_flags::UNTAGGED != 0
    }

    /// Whether this entry spans more than one VLAN.
    pub fn is_range(&self) -> bool {
        self.range > self.vlan_id
    }

    fn write_to(&self, out: &mut impl Write) -> fmt::Result {
        write!(out, "vlan {}", self.vlan_id)?;
        if self.is_range() {
            write!(out, "-{}", self.range)?;
        }
        if let Some(state) = self.state {
            write!(out, " state {}", state_name(state))?;
        }
        if self.is_pvid() {
            out.write_str(" pvid")?;
        }
        if self.is_untagged() {
            out.write_str(" untagged")?;
        }
        Ok(())
    }
}

/// VLAN membership of one bridge port (or the bridge itself).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(serde::Serialize))]
pub struct BridgeVlan {
    ifindex: Option<u32>,
    family: Option<u8>,
    vlan_id: Option<u16>,
    state: Option<u8>,
    range: Option<u16>,
    flags: Option<u16>,
    #[cfg_attr(feature = "output", serde(skip))]
    flag_mask: u16,
    entries: Vec<BridgeVlanEntry>,
}

impl BridgeVlan {
    /// An empty object, ready to be filled through the setters.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached object for `ifindex`.
    pub fn get(cache: &Cache<Self>, ifindex: u32) -> Option<Arc<Self>> {
        cache.find(|v| v.ifindex == Some(ifindex))
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

    pub fn set_family(&mut self, family: u8) {
        self.family = Some(family);
    }

    /// VLAN of the first entry.
    pub fn vlan_id(&self) -> Option<u16> {
        self.vlan_id
    }

    pub fn set_vlan_id(&mut self, vid: u16) {
        self.vlan_id = Some(vid);
    }

    /// Spanning tree state of the first entry.
    pub fn state(&self) -> Option<u8> {
        self.state
    }

    pub fn set_state(&mut self, state: u8) {
        self.state = Some(state);
    }

    /// Range end of the first entry, 0 when it is a single VLAN.
    pub fn range(&self) -> u16 {
        self.range.unwrap_or(0)
    }

    pub fn set_range(&mut self, last: u16) {
        self.range = Some(last);
    }

    pub fn flags(&self) -> u16 {
        self.flags.unwrap_or(0)
    }

    /// Set flag bits and mark them as significant for loose comparison.
    pub fn set_flags(&mut self, flags: u16) {
        self.flags = Some(self.flags() | flags);
        self.flag_mask |= flags;
    }

    /// Clear flag bits and mark them as significant for loose comparison.
    pub fn unset_flags(&mut self, flags: u16) {
        self.flags = Some(self.flags() & !flags);
        self.flag_mask |= flags;
    }

    pub fn entries(&self) -> &[BridgeVlanEntry] {
        &self.entries
    }

    pub fn first_entry(&self) -> Option<&BridgeVlanEntry> {
        self.entries.first()
    }

    pub fn for_each_entry(&self, f: impl FnMut(&BridgeVlanEntry)) {
        self.entries.iter().for_each(f);
    }

    pub fn add_entry(&mut self, entry: BridgeVlanEntry) {
        self.entries.push(entry);
    }

    /// Copy the first entry into the scalar accessors.
    ///
    /// Returns `false` when there is no entry to copy from.
    fn sync_first_entry(&mut self) -> bool {
        let Some(first) = self.entries.first().copied() else {
            return false;
        };
        self.vlan_id = Some(first.vlan_id);
        self.flags = Some(first.flags);
        self.state = first.state;
        self.range = Some(first.range);
        true
    }

    /// VLANs a change request carries: the entries, or the scalar VLAN when
    /// there are none.
    fn requested_vlans(&self) -> Vec<BridgeVlanEntry> {
        if !self.entries.is_empty() {
            return self.entries.clone();
        }
        self.vlan_id
            .map(|vid| BridgeVlanEntry {
                vlan_id: vid,
                flags: self.flags(),
                state: self.state,
                range: self.range(),
            })
            .into_iter()
            .collect()
    }

    fn build_link_request(
        msg_type: u16,
        orig: &Self,
        changes: &Self,
        flags: u16,
    ) -> Result<MessageBuilder> {
        let ifindex = orig.ifindex.ok_or(Error::MissingAttribute("ifindex"))?;
        let vlans = changes.requested_vlans();
        if vlans.is_empty() {
            return Err(Error::MissingAttribute("vlan id"));
        }

        let info_len = NLA_HDRLEN + BridgeVlanInfo::SIZE;
        let capacity = NLMSG_HDRLEN + IfInfoMsg::SIZE + NLA_HDRLEN + vlans.len() * 2 * info_len;
        let mut builder =
            MessageBuilder::try_with_capacity(msg_type, NLM_F_REQUEST | NLM_F_ACK | flags, capacity)?;

        let ifinfo = IfInfoMsg::new()
            .with_family(orig.family.unwrap_or(AF_BRIDGE))
            .with_index(ifindex as i32);
        builder.append(&ifinfo);

        let af_spec = builder.nest_start(ifla::AF_SPEC);
        for vlan in &vlans {
            let base = vlan.flags & !(bridge_vlan_flags::RANGE_BEGIN | bridge_vlan_flags::RANGE_END);
            if vlan.is_range() {
                let begin = BridgeVlanInfo::new(vlan.vlan_id)
                    .with_flags(base | bridge_vlan_flags::RANGE_BEGIN);
                let end =
                    BridgeVlanInfo::new(vlan.range).with_flags(base | bridge_vlan_flags::RANGE_END);
                builder.append_attr(bridge_af::IFLA_BRIDGE_VLAN_INFO, begin.as_bytes());
                builder.append_attr(bridge_af::IFLA_BRIDGE_VLAN_INFO, end.as_bytes());
            } else {
                let info = BridgeVlanInfo::new(vlan.vlan_id).with_flags(base);
                builder.append_attr(bridge_af::IFLA_BRIDGE_VLAN_INFO, info.as_bytes());
            }
        }
        builder.nest_end(af_spec);

        Ok(builder)
    }

    /// Request adding the VLANs of `changes` to the port `orig`.
    ///
    /// Sent as `RTM_NEWLINK`, retried once as `RTM_SETLINK`. `flags` are
    /// extra `NLM_F_*` header flags.
    pub fn build_change_request(orig: &Self, changes: &Self, flags: u16) -> Result<ChangeRequest> {
        let builder = Self::build_link_request(NlMsgType::RTM_NEWLINK, orig, changes, flags)?;
        Ok(ChangeRequest::new(builder).with_fallback(NlMsgType::RTM_SETLINK))
    }

    /// Build and send a change request, waiting for the kernel's ack.
    pub fn change<T: Transport + ?Sized>(
        transport: &mut T,
        orig: &Self,
        changes: &Self,
        flags: u16,
    ) -> Result<()> {
        Self::build_change_request(orig, changes, flags)?
            .execute(transport)
            .map_err(|e| e.with_context(format!("changing bridge vlan on ifindex {}", orig.ifindex.unwrap_or(0))))
    }

    /// Request removing the VLANs of `changes` from the port `orig`.
    pub fn build_delete_request(orig: &Self, changes: &Self) -> Result<ChangeRequest> {
        let builder = Self::build_link_request(NlMsgType::RTM_DELLINK, orig, changes, 0)?;
        Ok(ChangeRequest::new(builder))
    }

    pub fn delete<T: Transport + ?Sized>(transport: &mut T, orig: &Self, changes: &Self) -> Result<()> {
        Self::build_delete_request(orig, changes)?
            .execute(transport)
            .map_err(|e| e.with_context(format!("deleting bridge vlan on ifindex {}", orig.ifindex.unwrap_or(0))))
    }
}

impl NlObject for BridgeVlan {
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
        if self.vlan_id.is_some() {
            mask |= attrs::VLAN_ID;
        }
        if self.state.is_some() {
            mask |= attrs::STATE;
        }
        if self.range.is_some() {
            mask |= attrs::RANGE;
        }
        if self.flags.is_some() {
            mask |= attrs::FLAGS;
        }
        if !self.entries.is_empty() {
            mask |= attrs::ENTRIES;
        }
        mask
    }

    fn compare_attrs(&self, other: &Self, attrs: u64, loose: bool) -> u64 {
        let flag_mask = loose.then_some(other.flag_mask);
        AttrDiff::new(self, other, attrs)
            .field(attrs::IFINDEX, |o| o.ifindex)
            .field(attrs::FAMILY, |o| o.family)
            .field(attrs::VLAN_ID, |o| o.vlan_id)
            .field(attrs::STATE, |o| o.state)
            .field(attrs::RANGE, |o| o.range)
            .flags(attrs::FLAGS, self.flags(), other.flags(), flag_mask)
            .field(attrs::ENTRIES, |o| o.entries.clone())
            .finish()
    }

    /// Merge entries by VLAN id and take the newer scalar attributes.
    fn update(&mut self, new: &Self) -> bool {
        for entry in &new.entries {
            match self.entries.iter_mut().find(|e| e.vlan_id == entry.vlan_id) {
                Some(existing) => *existing = *entry,
                None => self.entries.push(*entry),
            }
        }
        if new.family.is_some() {
            self.family = new.family;
        }
        if new.vlan_id.is_some() {
            self.vlan_id = new.vlan_id;
        }
        if new.state.is_some() {
            self.state = new.state;
        }
        if new.range.is_some() {
            self.range = new.range;
        }
        if new.flags.is_some() {
            self.flags = new.flags;
            self.flag_mask = new.flag_mask;
        }
        true
    }

    fn subtract(&mut self, gone: &Self) -> bool {
        if gone.entries.is_empty() {
            return false;
        }
        self.entries.retain(|e| {
            !gone
                .entries
                .iter()
                .any(|g| (g.vlan_id..=g.range.max(g.vlan_id)).contains(&e.vlan_id))
        });
        self.sync_first_entry()
    }

    fn dump_line(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        let name = params.ifname(self.ifindex.unwrap_or(0));
        write!(params, "{name}")?;
        if let Some(vid) = self.vlan_id {
            write!(params, " vlan {vid}")?;
            if self.range() > vid {
                write!(params, "-{}", self.range())?;
            }
        }
        if let Some(state) = self.state {
            write!(params, " state {}", state_name(state))?;
        }
        if self.entries.len() > 1 {
            write!(params, " (+{} more)", self.entries.len() - 1)?;
        }
        Ok(())
    }

    fn dump_details(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        let name = params.ifname(self.ifindex.unwrap_or(0));
        write!(params, "{name}")?;
        for entry in &self.entries {
            params.write_str("\n    ")?;
            entry.write_to(params)?;
        }
        Ok(())
    }
}

impl CacheType for BridgeVlan {
    const NAME: &'static str = "route/bridgevlan";
    const HDR_SIZE: usize = BrVlanMsg::SIZE;
    const MSG_TYPES: &'static [MsgTypeAction] = &[
        MsgTypeAction::new(NlMsgType::RTM_NEWVLAN, Action::New, "new"),
        MsgTypeAction::new(NlMsgType::RTM_DELVLAN, Action::Del, "del"),
        MsgTypeAction::new(NlMsgType::RTM_GETVLAN, Action::Get, "get"),
    ];
    const GROUPS: &'static [AfGroup] = &[AfGroup {
        family: AF_BRIDGE,
        group: RTNLGRP_BRVLAN,
    }];

    fn dump_request() -> MessageBuilder {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_GETVLAN, NLM_F_REQUEST | NLM_F_DUMP);
        builder.append(&BrVlanMsg::new(AF_BRIDGE, 0));
        builder
    }

    fn parse(_hdr: &NlMsgHdr, payload: &[u8]) -> Result<Option<Self>> {
        let msg = BrVlanMsg::from_bytes(payload)?;
        if msg.family != AF_BRIDGE {
            return Ok(None);
        }
        let attrs = decode_message(payload, BrVlanMsg::SIZE, &VLANDB_POLICY)?;

        let mut vlan = Self::new();
        vlan.ifindex = Some(msg.ifindex);
        vlan.family = Some(msg.family);

        for nest in attrs.all(vlandb::ENTRY) {
            let entry = VLANDB_ENTRY_POLICY.decode(nest)?;
            let info = entry
                .get(vlandb_entry::INFO)
                .ok_or(Error::MissingAttribute("BRIDGE_VLANDB_ENTRY_INFO"))?;
            let (info, _) = BridgeVlanInfo::from_prefix(info)?;
            vlan.add_entry(BridgeVlanEntry {
                vlan_id: info.vid,
                flags: info.flags,
                state: entry.u8(vlandb_entry::STATE),
                range: entry.u16(vlandb_entry::RANGE).unwrap_or(0),
            });
        }

        if !vlan.sync_first_entry() {
            return Err(Error::MissingAttribute("BRIDGE_VLANDB_ENTRY"));
        }
        Ok(Some(vlan))
    }
}

/// Descriptor registered as `route/bridgevlan`.
pub static BRIDGE_VLAN_OPS: TypeDescriptor<BridgeVlan> = TypeDescriptor::new();
