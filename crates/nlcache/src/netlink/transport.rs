//! The datagram transport the caches talk through.
//!
//! [`Transport`] is the seam between the engine and the kernel socket:
//! [`NetlinkSocket`](super::NetlinkSocket) implements it for real use and
//! tests script it. The free functions implement the request patterns on
//! top of it (auto-sequenced send, ack wait, dump collection).

use tracing::trace;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NlMsgError, NlMsgHdr, NlMsgType};

/// A netlink datagram channel.
pub trait Transport {
    /// Allocate the next request sequence number.
    fn next_seq(&mut self) -> u32;

    /// Local port ID.
    fn pid(&self) -> u32;

    /// Send one complete message.
    fn send(&mut self, msg: &[u8]) -> Result<()>;

    /// Receive one datagram, blocking until it arrives.
    fn recv(&mut self) -> Result<Vec<u8>>;

    /// Receive one datagram if one is queued.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>>;

    /// Join a multicast group.
    fn add_membership(&mut self, group: u32) -> Result<()>;

    /// Leave a multicast group.
    fn drop_membership(&mut self, group: u32) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn next_seq(&mut self) -> u32 {
        (**self).next_seq()
    }

    fn pid(&self) -> u32 {
        (**self).pid()
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        (**self).send(msg)
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        (**self).recv()
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
        (**self).try_recv()
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        (**self).add_membership(group)
    }

    fn drop_membership(&mut self, group: u32) -> Result<()> {
        (**self).drop_membership(group)
    }
}

/// Send `builder` with a freshly assigned sequence number and port ID.
///
/// The builder itself is left untouched so it can be sent again.
///
/// # Panics
///
/// If the builder already carries a sequence number. Sequence numbers are
/// owned by the transport.
pub fn send_auto<T: Transport + ?Sized>(transport: &mut T, builder: &MessageBuilder) -> Result<u32> {
    assert_eq!(
        builder.seq(),
        0,
        "request already carries sequence number {}",
        builder.seq()
    );

    let seq = transport.next_seq();
    let mut msg = builder.clone();
    msg.set_seq(seq);
    msg.set_pid(transport.pid());
    trace!(
        msg_type = NlMsgType::name(msg.msg_type()),
        seq, "sending request"
    );
    transport.send(&msg.finish())?;
    Ok(seq)
}

/// Wait for the ack answering request `seq`.
///
/// Messages for other sequence numbers are skipped. A negative error code
/// in the ack becomes [`Error::Kernel`].
pub fn wait_for_ack<T: Transport + ?Sized>(transport: &mut T, seq: u32) -> Result<()> {
    loop {
        let data = transport.recv()?;
        for result in MessageIter::new(&data) {
            let (header, payload) = result?;
            if header.nlmsg_seq != seq {
                trace!(seq = header.nlmsg_seq, expected = seq, "skipping unrelated message");
                continue;
            }
            if header.is_error() {
                return NlMsgError::from_bytes(payload)?.into_result();
            }
            if header.is_done() {
                return Ok(());
            }
        }
    }
}

/// Send a dump request; returns the sequence number to collect with [`recv_dump`].
pub fn request_dump<T: Transport + ?Sized>(transport: &mut T, builder: &MessageBuilder) -> Result<u32> {
    send_auto(transport, builder)
}

/// Feed every message of dump `seq` to `on_message` until `NLMSG_DONE`.
///
/// If any part was flagged `NLM_F_DUMP_INTR` the dump is still drained, then
/// reported as [`Error::DumpInterrupted`].
pub fn recv_dump<T, F>(transport: &mut T, seq: u32, mut on_message: F) -> Result<()>
where
    T: Transport + ?Sized,
    F: FnMut(&NlMsgHdr, &[u8]) -> Result<()>,
{
    let mut interrupted = false;
    loop {
        let data = transport.recv()?;
        for result in MessageIter::new(&data) {
            let (header, payload) = result?;
            if header.nlmsg_seq != seq {
                continue;
            }
            if header.is_dump_interrupted() {
                interrupted = true;
            }
            if header.is_done() {
                return if interrupted {
                    Err(Error::DumpInterrupted)
                } else {
                    Ok(())
                };
            }
            if header.is_error() {
                NlMsgError::from_bytes(payload)?.into_result()?;
                return Ok(());
            }
            if header.nlmsg_type == NlMsgType::NOOP {
                continue;
            }
            on_message(header, payload)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::fixtures::{MockTransport, ack, done, message};
    use crate::netlink::message::{NLM_F_ACK, NLM_F_DUMP_INTR, NLM_F_MULTI, NLM_F_REQUEST};

    #[test]
    fn test_send_auto_assigns_seq() {
        let mut mock = MockTransport::new(|_, _| Vec::new());
        let builder = MessageBuilder::new(NlMsgType::RTM_GETVLAN, NLM_F_REQUEST);

        let first = send_auto(&mut mock, &builder).unwrap();
        let second = send_auto(&mut mock, &builder).unwrap();
        assert_ne!(first, second);
        assert_eq!(builder.seq(), 0);

        let sent = mock.sent_headers();
        assert_eq!(sent[0].nlmsg_seq, first);
        assert_eq!(sent[1].nlmsg_seq, second);
        assert_eq!(sent[0].nlmsg_pid, mock.pid());
    }

    #[test]
    #[should_panic(expected = "already carries sequence number")]
    fn test_send_auto_rejects_preset_seq() {
        let mut mock = MockTransport::new(|_, _| Vec::new());
        let mut builder = MessageBuilder::new(NlMsgType::RTM_NEWLINK, NLM_F_REQUEST);
        builder.set_seq(7);
        let _ = send_auto(&mut mock, &builder);
    }

    #[test]
    fn test_wait_for_ack_skips_other_seq() {
        let mut mock = MockTransport::new(|hdr, _| {
            vec![ack(hdr.nlmsg_seq + 100, hdr, -libc::EPERM), ack(hdr.nlmsg_seq, hdr, 0)]
        });
        let builder = MessageBuilder::new(NlMsgType::RTM_SETLINK, NLM_F_REQUEST | NLM_F_ACK);
        let seq = send_auto(&mut mock, &builder).unwrap();
        wait_for_ack(&mut mock, seq).unwrap();
    }

    #[test]
    fn test_wait_for_ack_error() {
        let mut mock = MockTransport::new(|hdr, _| vec![ack(hdr.nlmsg_seq, hdr, -libc::EOPNOTSUPP)]);
        let builder = MessageBuilder::new(NlMsgType::RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK);
        let seq = send_auto(&mut mock, &builder).unwrap();
        assert!(wait_for_ack(&mut mock, seq).unwrap_err().is_not_supported());
    }

    #[test]
    fn test_recv_dump_collects_until_done() {
        let mut mock = MockTransport::new(|hdr, _| {
            let seq = hdr.nlmsg_seq;
            let mut batch = message(NlMsgType::RTM_NEWVLAN, seq, NLM_F_MULTI, &[7, 0, 0, 0, 1, 0, 0, 0]);
            batch.extend(message(NlMsgType::RTM_NEWVLAN, seq, NLM_F_MULTI, &[7, 0, 0, 0, 2, 0, 0, 0]));
            vec![batch, done(seq)]
        });
        let builder = MessageBuilder::new(NlMsgType::RTM_GETVLAN, NLM_F_REQUEST);
        let seq = request_dump(&mut mock, &builder).unwrap();

        let mut seen = Vec::new();
        recv_dump(&mut mock, seq, |_, payload| {
            seen.push(payload[4]);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_recv_dump_interrupted() {
        let mut mock = MockTransport::new(|hdr, _| {
            let seq = hdr.nlmsg_seq;
            vec![
                message(NlMsgType::RTM_NEWMDB, seq, NLM_F_MULTI | NLM_F_DUMP_INTR, &[7, 0, 0, 0, 1, 0, 0, 0]),
                done(seq),
            ]
        });
        let builder = MessageBuilder::new(NlMsgType::RTM_GETMDB, NLM_F_REQUEST);
        let seq = request_dump(&mut mock, &builder).unwrap();
        let err = recv_dump(&mut mock, seq, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, Error::DumpInterrupted));
    }
}
