//! Netlink message fixtures and a scripted transport for unit tests.
//!
//! Payload fixtures are returned as `Vec<u8>` without the nlmsghdr; wrap them
//! with [`message`] to get a datagram.

use std::collections::VecDeque;
use std::io;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NLMSG_HDRLEN, NLM_F_MULTI, NlMsgHdr, NlMsgType};
use super::transport::Transport;
use super::types::bridge::{
    BrMdbEntry, BrPortMsg, BrVlanMsg, BridgeVlanInfo, mdba, vlandb, vlandb_entry,
};

type Responder = Box<dyn FnMut(&NlMsgHdr, &[u8]) -> Vec<Vec<u8>>>;

/// Transport whose replies are produced by a closure per sent request.
pub struct MockTransport {
    responder: Responder,
    rx: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    groups: Vec<u32>,
    seq: u32,
}

impl MockTransport {
    pub fn new(responder: impl FnMut(&NlMsgHdr, &[u8]) -> Vec<Vec<u8>> + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            rx: VecDeque::new(),
            sent: Vec::new(),
            groups: Vec::new(),
            seq: 1,
        }
    }

    /// Queue an unsolicited datagram (a multicast event).
    pub fn push(&mut self, datagram: Vec<u8>) {
        self.rx.push_back(datagram);
    }

    pub fn sent_headers(&self) -> Vec<NlMsgHdr> {
        self.sent
            .iter()
            .map(|m| *NlMsgHdr::from_bytes(m).unwrap())
            .collect()
    }

    pub fn groups(&self) -> &[u32] {
        &self.groups
    }
}

impl Transport for MockTransport {
    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn pid(&self) -> u32 {
        4242
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        for result in MessageIter::new(msg) {
            let (header, payload) = result?;
            let replies = (self.responder)(header, payload);
            self.rx.extend(replies);
        }
        self.sent.push(msg.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        self.rx
            .pop_front()
            .ok_or_else(|| Error::Io(io::Error::from(io::ErrorKind::TimedOut)))
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.rx.pop_front())
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        self.groups.push(group);
        Ok(())
    }

    fn drop_membership(&mut self, group: u32) -> Result<()> {
        self.groups.retain(|&g| g != group);
        Ok(())
    }
}

/// Wrap a payload into a complete message.
pub fn message(msg_type: u16, seq: u32, flags: u16, payload: &[u8]) -> Vec<u8> {
    let mut b = MessageBuilder::new(msg_type, flags);
    b.append_bytes(payload);
    b.set_seq(seq);
    b.finish()
}

/// End-of-dump marker.
pub fn done(seq: u32) -> Vec<u8> {
    message(NlMsgType::DONE, seq, NLM_F_MULTI, &0i32.to_ne_bytes())
}

/// Ack (or error when `error` is a negative errno) for `request`.
pub fn ack(seq: u32, request: &NlMsgHdr, error: i32) -> Vec<u8> {
    let mut payload = error.to_ne_bytes().to_vec();
    payload.extend_from_slice(request.as_bytes());
    message(NlMsgType::ERROR, seq, 0, &payload)
}

/// One VLAN entry of a bridge VLAN message.
#[derive(Debug, Clone, Copy, Default)]
pub struct VlanSpec {
    pub flags: u16,
    pub vid: u16,
    pub state: Option<u8>,
    pub range: Option<u16>,
}

/// RTM_NEWVLAN payload for `ifindex` with the given entries.
pub fn vlan_payload(ifindex: u32, entries: &[VlanSpec]) -> Vec<u8> {
    let mut b = MessageBuilder::new(0, 0);
    b.append(&BrVlanMsg::new(libc::AF_BRIDGE as u8, ifindex));
    for e in entries {
        let nest = b.nest_start(vlandb::ENTRY);
        b.append_attr(
            vlandb_entry::INFO,
            BridgeVlanInfo::new(e.vid).with_flags(e.flags).as_bytes(),
        );
        if let Some(range) = e.range {
            b.append_attr_u16(vlandb_entry::RANGE, range);
        }
        if let Some(state) = e.state {
            b.append_attr_u8(vlandb_entry::STATE, state);
        }
        b.nest_end(nest);
    }
    b.finish()[NLMSG_HDRLEN..].to_vec()
}

/// Bridge VLAN message for port 4, VLAN 10, forwarding state, no range.
/// Matches what `bridge -d vlan show` reports for a freshly added VLAN.
pub fn vlan_port4_vid10() -> Vec<u8> {
    vec![
        // br_vlan_msg: family=AF_BRIDGE, reserved, ifindex=4
        0x07, 0x00, 0x00, 0x00, //
        0x04, 0x00, 0x00, 0x00, //
        // BRIDGE_VLANDB_ENTRY (nested), len = 20
        0x14, 0x00, 0x01, 0x80, //
        // BRIDGE_VLANDB_ENTRY_INFO: flags=0, vid=10
        0x08, 0x00, 0x01, 0x00, //
        0x00, 0x00, 0x0a, 0x00, //
        // BRIDGE_VLANDB_ENTRY_STATE = 1 + padding
        0x05, 0x00, 0x03, 0x00, //
        0x01, 0x00, 0x00, 0x00,
    ]
}

/// One group record of an MDB message.
#[derive(Debug, Clone, Copy)]
pub struct MdbSpec {
    pub port: u32,
    pub vid: u16,
    pub state: u8,
    pub proto: u16,
    pub addr: [u8; 16],
}

impl MdbSpec {
    pub fn ipv4(port: u32, addr: [u8; 4]) -> Self {
        let mut full = [0u8; 16];
        full[..4].copy_from_slice(&addr);
        Self {
            port,
            vid: 0,
            state: 0,
            proto: 0x0800,
            addr: full,
        }
    }

    pub fn record(&self) -> BrMdbEntry {
        BrMdbEntry {
            ifindex: self.port,
            state: self.state,
            flags: 0,
            vid: self.vid,
            addr: self.addr,
            proto: self.proto.to_be_bytes(),
            pad: [0; 2],
        }
    }
}

/// RTM_NEWMDB payload for bridge `ifindex`; every record sits in its own
/// MDBA_MDB_ENTRY_INFO within one MDBA_MDB_ENTRY.
pub fn mdb_payload(ifindex: u32, records: &[MdbSpec], router_ports: &[u32]) -> Vec<u8> {
    let mut b = MessageBuilder::new(0, 0);
    b.append(&BrPortMsg::new(libc::AF_BRIDGE as u8, ifindex));
    if !records.is_empty() {
        let mdb = b.nest_start(mdba::MDB);
        let entry = b.nest_start(mdba::MDB_ENTRY);
        for r in records {
            b.append_attr(mdba::MDB_ENTRY_INFO, r.record().as_bytes());
        }
        b.nest_end(entry);
        b.nest_end(mdb);
    }
    if !router_ports.is_empty() {
        let router = b.nest_start(mdba::ROUTER);
        for port in router_ports {
            b.append_attr_u32(mdba::ROUTER_PORT, *port);
        }
        b.nest_end(router);
    }
    b.finish()[NLMSG_HDRLEN..].to_vec()
}
