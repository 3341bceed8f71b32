//! Message builder for constructing netlink messages.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_header(NlMsgHdr::new(msg_type, flags))
    }

    /// Create a builder whose buffer is reserved up front.
    ///
    /// Fails with [`Error::NoMemory`] instead of aborting when the
    /// allocation cannot be satisfied.
    pub fn try_with_capacity(msg_type: u16, flags: u16, capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve(capacity.max(NLMSG_HDRLEN))
            .map_err(|_| Error::NoMemory)?;
        buf.extend_from_slice(NlMsgHdr::new(msg_type, flags).as_bytes());
        Ok(Self { buf })
    }

    /// Create a builder from an existing header.
    pub fn with_header(header: NlMsgHdr) -> Self {
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self { buf }
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    // The buffer always starts with a full header.
    fn header_u16(&self, offset: usize) -> u16 {
        u16::from_ne_bytes([self.buf[offset], self.buf[offset + 1]])
    }

    /// Message type currently in the header.
    pub fn msg_type(&self) -> u16 {
        self.header_u16(4)
    }

    /// Rewrite the message type, keeping flags and payload.
    pub fn set_msg_type(&mut self, msg_type: u16) {
        self.buf[4..6].copy_from_slice(&msg_type.to_ne_bytes());
    }

    /// Header flags.
    pub fn flags(&self) -> u16 {
        self.header_u16(6)
    }

    /// Sequence number currently in the header (0 until assigned).
    pub fn seq(&self) -> u32 {
        u32::from_ne_bytes([self.buf[8], self.buf[9], self.buf[10], self.buf[11]])
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a fixed-size family header.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        let attr = NlAttr::new(attr_type, data.len());
        self.buf.extend_from_slice(attr.as_bytes());
        self.buf.extend_from_slice(data);
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) {
        self.append_attr(attr_type, &[value]);
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn append_attr_empty(&mut self, attr_type: u16) {
        self.append_attr(attr_type, &[]);
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a u64 attribute (native endian).
    pub fn append_attr_u64(&mut self, attr_type: u16, value: u64) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.buf.len();
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.buf.extend_from_slice(attr.as_bytes());
        NestToken { offset }
    }

    /// End a nested attribute started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) {
        let len = self.buf.len() - token.offset;
        let len_bytes = (len as u16).to_ne_bytes();
        self.buf[token.offset] = len_bytes[0];
        self.buf[token.offset + 1] = len_bytes[1];
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{AttrIter, NLA_HDRLEN};
    use crate::netlink::message::{NLM_F_REQUEST, NlMsgType};

    #[test]
    fn test_simple_message() {
        let msg = MessageBuilder::new(NlMsgType::RTM_GETVLAN, NLM_F_REQUEST).finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, NlMsgType::RTM_GETVLAN);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST);
    }

    #[test]
    fn test_attribute_padding() {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_NEWVLAN, NLM_F_REQUEST);
        builder.append_attr_u8(3, 1);
        let msg = builder.finish();

        assert_eq!(msg.len(), NLMSG_HDRLEN + NLA_HDRLEN + 4);
        assert_eq!(&msg[NLMSG_HDRLEN..NLMSG_HDRLEN + 2], &5u16.to_ne_bytes());
    }

    #[test]
    fn test_nested_attribute() {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_NEWVLAN, NLM_F_REQUEST);
        let nest = builder.nest_start(1);
        builder.append_attr_u16(2, 100);
        builder.nest_end(nest);
        let msg = builder.finish();

        let (kind, payload) = AttrIter::new(&msg[NLMSG_HDRLEN..]).next().unwrap();
        assert_eq!(kind, 1);
        assert_eq!(payload.len(), NLA_HDRLEN + 4);
        assert_eq!(msg[NLMSG_HDRLEN + 3] & 0x80, 0x80);
    }

    #[test]
    fn test_header_rewrites() {
        let mut builder =
            MessageBuilder::try_with_capacity(NlMsgType::RTM_NEWLINK, NLM_F_REQUEST, 256).unwrap();
        assert_eq!(builder.seq(), 0);
        builder.set_msg_type(NlMsgType::RTM_SETLINK);
        builder.set_seq(41);
        assert_eq!(builder.msg_type(), NlMsgType::RTM_SETLINK);
        assert_eq!(builder.flags(), NLM_F_REQUEST);
        assert_eq!(builder.seq(), 41);
    }
}
