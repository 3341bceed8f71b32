//! Common test utilities for the engine and live tests.
//!
//! Provides `ScriptedTransport`, a [`Transport`] whose replies come from a
//! closure, message builders for the bridge families, and `TestBridge` for
//! tests that need a real bridge device.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use nlcache::Result;
use nlcache::netlink::message::NLM_F_MULTI;
use nlcache::netlink::types::bridge::{
    BrMdbEntry, BrPortMsg, BrVlanMsg, BridgeVlanInfo, mdba, vlandb, vlandb_entry,
};
use nlcache::netlink::{MessageBuilder, MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, Transport};

// ============================================================================
// Scripted transport
// ============================================================================

type Responder = Box<dyn FnMut(&NlMsgHdr, &[u8]) -> Vec<Vec<u8>>>;

/// Transport that answers each sent message through a closure.
///
/// Replies and pushed events are queued and handed out by `recv` /
/// `try_recv` in order.
pub struct ScriptedTransport {
    responder: Responder,
    rx: VecDeque<Vec<u8>>,
    sent: Vec<NlMsgHdr>,
    groups: Vec<u32>,
    seq: u32,
}

impl ScriptedTransport {
    pub fn new(responder: impl FnMut(&NlMsgHdr, &[u8]) -> Vec<Vec<u8>> + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            rx: VecDeque::new(),
            sent: Vec::new(),
            groups: Vec::new(),
            seq: 100,
        }
    }

    /// A transport that never answers; events are queued with `push`.
    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn push(&mut self, datagram: Vec<u8>) {
        self.rx.push_back(datagram);
    }

    /// Headers of every message sent so far.
    pub fn sent(&self) -> &[NlMsgHdr] {
        &self.sent
    }

    pub fn groups(&self) -> &[u32] {
        &self.groups
    }
}

impl Transport for ScriptedTransport {
    fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    fn pid(&self) -> u32 {
        31337
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        for result in MessageIter::new(msg) {
            let (header, payload) = result?;
            self.sent.push(*header);
            let replies = (self.responder)(header, payload);
            self.rx.extend(replies);
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        self.rx
            .pop_front()
            .ok_or_else(|| nlcache::Error::Io(io::Error::from(io::ErrorKind::TimedOut)))
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

// ============================================================================
// Message builders
// ============================================================================

const AF_BRIDGE: u8 = libc::AF_BRIDGE as u8;

/// Wrap `payload` into a complete message.
pub fn message(msg_type: u16, seq: u32, flags: u16, payload: &[u8]) -> Vec<u8> {
    let mut b = MessageBuilder::new(msg_type, flags);
    b.append_bytes(payload);
    b.set_seq(seq);
    b.finish()
}

pub fn done(seq: u32) -> Vec<u8> {
    message(NlMsgType::DONE, seq, NLM_F_MULTI, &0i32.to_ne_bytes())
}

/// Ack for `request`, or an error reply when `errno` is nonzero.
pub fn ack(request: &NlMsgHdr, errno: i32) -> Vec<u8> {
    let mut payload = (-errno).to_ne_bytes().to_vec();
    payload.extend_from_slice(request.as_bytes());
    message(NlMsgType::ERROR, request.nlmsg_seq, 0, &payload)
}

/// VLAN database payload for one port with `(vid, flags, state)` entries.
pub fn vlan_payload(ifindex: u32, entries: &[(u16, u16, Option<u8>)]) -> Vec<u8> {
    let mut b = MessageBuilder::new(0, 0);
    b.append(&BrVlanMsg::new(AF_BRIDGE, ifindex));
    for &(vid, flags, state) in entries {
        let nest = b.nest_start(vlandb::ENTRY);
        b.append_attr(
            vlandb_entry::INFO,
            BridgeVlanInfo::new(vid).with_flags(flags).as_bytes(),
        );
        if let Some(state) = state {
            b.append_attr_u8(vlandb_entry::STATE, state);
        }
        b.nest_end(nest);
    }
    b.finish()[NLMSG_HDRLEN..].to_vec()
}

/// IPv4 group record of `port` in an MDB message.
pub fn mdb_record(port: u32, group: [u8; 4]) -> BrMdbEntry {
    let mut addr = [0u8; 16];
    addr[..4].copy_from_slice(&group);
    BrMdbEntry {
        ifindex: port,
        state: 0,
        flags: 0,
        vid: 0,
        addr,
        proto: 0x0800u16.to_be_bytes(),
        pad: [0; 2],
    }
}

/// MDB payload for bridge `ifindex`; all records in one MDBA_MDB_ENTRY.
pub fn mdb_payload(ifindex: u32, records: &[BrMdbEntry]) -> Vec<u8> {
    let mut b = MessageBuilder::new(0, 0);
    b.append(&BrPortMsg::new(AF_BRIDGE, ifindex));
    let mdb = b.nest_start(mdba::MDB);
    let entry = b.nest_start(mdba::MDB_ENTRY);
    for record in records {
        b.append_attr(mdba::MDB_ENTRY_INFO, record.as_bytes());
    }
    b.nest_end(entry);
    b.nest_end(mdb);
    b.finish()[NLMSG_HDRLEN..].to_vec()
}

/// Transport answering every dump request with `messages` of `msg_type`.
pub fn dump_transport(msg_type: u16, messages: Vec<Vec<u8>>) -> ScriptedTransport {
    ScriptedTransport::new(move |hdr, _| {
        let seq = hdr.nlmsg_seq;
        let mut out: Vec<Vec<u8>> = messages
            .iter()
            .map(|payload| message(msg_type, seq, NLM_F_MULTI, payload))
            .collect();
        out.push(done(seq));
        out
    })
}

// ============================================================================
// Live kernel helpers
// ============================================================================

static BRIDGE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A bridge with one dummy port, deleted on drop.
pub struct TestBridge {
    pub bridge: String,
    pub port: String,
}

impl TestBridge {
    /// Create `nlcbrN` with VLAN filtering enabled and `nlcpN` enslaved to it.
    pub fn new() -> Result<Self> {
        let id = BRIDGE_COUNTER.fetch_add(1, Ordering::SeqCst) + std::process::id() % 1000 * 10;
        let bridge = format!("nlcbr{id}");
        let port = format!("nlcp{id}");

        ip(&["link", "add", &bridge, "type", "bridge", "vlan_filtering", "1", "mcast_snooping", "1"])?;
        let tb = Self { bridge, port };
        ip(&["link", "add", &tb.port, "type", "dummy"])?;
        ip(&["link", "set", &tb.port, "master", &tb.bridge])?;
        ip(&["link", "set", &tb.port, "up"])?;
        ip(&["link", "set", &tb.bridge, "up"])?;
        Ok(tb)
    }

    pub fn bridge_index(&self) -> Result<u32> {
        nlcache::util::name_to_index(&self.bridge)
    }

    pub fn port_index(&self) -> Result<u32> {
        nlcache::util::name_to_index(&self.port)
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        let _ = Command::new("ip").args(["link", "del", &self.port]).status();
        let _ = Command::new("ip").args(["link", "del", &self.bridge]).status();
    }
}

/// Run `ip` with `args`, failing on a nonzero exit.
pub fn ip(args: &[&str]) -> Result<String> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .map_err(|e| nlcache::Error::Io(io::Error::from(e.kind())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(nlcache::Error::InvalidMessage(format!(
            "ip {:?}: {}",
            args, stderr
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
