//! Policy-driven attribute validation.
//!
//! A [`PolicyTable`] describes, per attribute type, the kind and length
//! bounds the payload must satisfy. [`PolicyTable::decode`] validates a TLV
//! stream against it and hands back an [`Attrs`] table with one slot per
//! known type.
//!
//! ```ignore
//! static ENTRY: PolicyTable<5> = PolicyTable::new("bridge vlan entry", [
//!     Policy::UNSPEC,
//!     Policy::exact(AttrKind::Binary, 4),
//!     Policy::new(AttrKind::U16),
//!     Policy::new(AttrKind::U8),
//!     Policy::new(AttrKind::Nested),
//! ]);
//!
//! let attrs = ENTRY.decode(payload)?;
//! let state = attrs.u8(3);
//! ```

use super::attr::{AttrIter, NLA_HDRLEN, NlAttr, get, nla_align};
use super::error::{Error, Result};
use super::message::nlmsg_align;

/// Payload kind expected for an attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Anything goes; only the length bounds apply.
    Unspec,
    U8,
    U16,
    U32,
    U64,
    /// Opaque bytes.
    Binary,
    /// A TLV stream of its own.
    Nested,
    /// Presence-only, zero-length payload.
    Flag,
    /// Optionally NUL-terminated text.
    String,
}

impl AttrKind {
    fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
            _ => 0,
        }
    }
}

/// Validation rule for one attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub kind: AttrKind,
    /// Minimum payload length; 0 means no minimum.
    pub min_len: usize,
    /// Maximum payload length; 0 means unbounded.
    pub max_len: usize,
}

impl Policy {
    /// Placeholder for unused type slots.
    pub const UNSPEC: Self = Self::new(AttrKind::Unspec);

    pub const fn new(kind: AttrKind) -> Self {
        Self {
            kind,
            min_len: 0,
            max_len: 0,
        }
    }

    /// A payload of exactly `len` bytes.
    pub const fn exact(kind: AttrKind, len: usize) -> Self {
        Self {
            kind,
            min_len: len,
            max_len: len,
        }
    }

    pub const fn min(mut self, len: usize) -> Self {
        self.min_len = len;
        self
    }

    pub const fn max(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }

    fn validate(&self, attr_type: u16, payload: &[u8]) -> Result<()> {
        let len = payload.len();
        let width = self.kind.width();
        if len < width {
            return Err(Error::malformed(
                attr_type,
                format!("expected at least {width} bytes, got {len}"),
            ));
        }
        if self.min_len > 0 && len < self.min_len {
            return Err(Error::malformed(
                attr_type,
                format!("expected at least {} bytes, got {len}", self.min_len),
            ));
        }
        if self.max_len > 0 && len > self.max_len {
            return Err(Error::malformed(
                attr_type,
                format!("expected at most {} bytes, got {len}", self.max_len),
            ));
        }
        match self.kind {
            AttrKind::Flag if len != 0 => Err(Error::malformed(
                attr_type,
                format!("flag carries {len} bytes of payload"),
            )),
            AttrKind::Nested => validate_stream(payload),
            _ => Ok(()),
        }
    }
}

/// Check that every attribute header in `buf` is well-formed and in bounds.
pub fn validate_stream(buf: &[u8]) -> Result<()> {
    let mut rest = buf;
    while rest.len() >= NLA_HDRLEN {
        let hdr = NlAttr::from_bytes(rest)?;
        let len = hdr.nla_len as usize;
        if len < NLA_HDRLEN {
            return Err(Error::malformed(
                hdr.kind(),
                format!("length {len} shorter than header"),
            ));
        }
        if len > rest.len() {
            return Err(Error::malformed(
                hdr.kind(),
                format!("length {len} exceeds remaining {} bytes", rest.len()),
            ));
        }
        rest = &rest[nla_align(len).min(rest.len())..];
    }
    Ok(())
}

/// Static policy for attribute types `0..N`.
#[derive(Debug)]
pub struct PolicyTable<const N: usize> {
    name: &'static str,
    policies: [Policy; N],
}

impl<const N: usize> PolicyTable<N> {
    pub const fn new(name: &'static str, policies: [Policy; N]) -> Self {
        Self { name, policies }
    }

    /// Human readable name, used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Highest attribute type this table knows.
    pub const fn max_type(&self) -> u16 {
        N.saturating_sub(1) as u16
    }

    /// Validate `buf` and collect its attributes into slots.
    ///
    /// Types above [`max_type`](Self::max_type) are skipped. When a type
    /// repeats, the slot holds the first occurrence; [`Attrs::all`] yields
    /// every one.
    pub fn decode<'a>(&self, buf: &'a [u8]) -> Result<Attrs<'a, N>> {
        let mut slots = [None; N];
        let mut rest = buf;

        while rest.len() >= NLA_HDRLEN {
            let hdr = NlAttr::from_bytes(rest)?;
            let len = hdr.nla_len as usize;
            let kind = hdr.kind();
            if len < NLA_HDRLEN {
                return Err(Error::malformed(
                    kind,
                    format!("length {len} shorter than header"),
                ));
            }
            if len > rest.len() {
                return Err(Error::malformed(
                    kind,
                    format!("length {len} exceeds remaining {} bytes", rest.len()),
                ));
            }

            let payload = &rest[NLA_HDRLEN..len];
            match self.policies.get(kind as usize) {
                Some(policy) => {
                    policy.validate(kind, payload)?;
                    let slot = &mut slots[kind as usize];
                    if slot.is_none() {
                        *slot = Some(payload);
                    }
                }
                None => tracing::trace!(table = self.name, kind, "skipping unknown attribute"),
            }

            rest = &rest[nla_align(len).min(rest.len())..];
        }

        Ok(Attrs { slots, raw: buf })
    }
}

/// Decode the attributes that follow a fixed family header.
pub fn decode_message<'a, const N: usize>(
    payload: &'a [u8],
    hdr_size: usize,
    table: &PolicyTable<N>,
) -> Result<Attrs<'a, N>> {
    let offset = nlmsg_align(hdr_size);
    if payload.len() < hdr_size {
        return Err(Error::Truncated {
            expected: hdr_size,
            actual: payload.len(),
        });
    }
    table.decode(payload.get(offset..).unwrap_or(&[]))
}

/// Attributes decoded against a [`PolicyTable`].
#[derive(Debug, Clone)]
pub struct Attrs<'a, const N: usize> {
    slots: [Option<&'a [u8]>; N],
    raw: &'a [u8],
}

impl<'a, const N: usize> Attrs<'a, N> {
    /// Payload of the first attribute of this type.
    pub fn get(&self, attr_type: u16) -> Option<&'a [u8]> {
        self.slots.get(attr_type as usize).copied().flatten()
    }

    pub fn has(&self, attr_type: u16) -> bool {
        self.get(attr_type).is_some()
    }

    pub fn u8(&self, attr_type: u16) -> Option<u8> {
        self.get(attr_type).and_then(|p| get::u8(p).ok())
    }

    pub fn u16(&self, attr_type: u16) -> Option<u16> {
        self.get(attr_type).and_then(|p| get::u16_ne(p).ok())
    }

    pub fn u32(&self, attr_type: u16) -> Option<u32> {
        self.get(attr_type).and_then(|p| get::u32_ne(p).ok())
    }

    pub fn u64(&self, attr_type: u16) -> Option<u64> {
        self.get(attr_type).and_then(|p| get::u64_ne(p).ok())
    }

    /// Every occurrence of `attr_type`, in wire order.
    pub fn all(&self, attr_type: u16) -> impl Iterator<Item = &'a [u8]> + use<'a, N> {
        AttrIter::new(self.raw)
            .filter(move |(kind, _)| *kind == attr_type)
            .map(|(_, payload)| payload)
    }

    /// Decode the first occurrence of a nested container.
    pub fn nested<const M: usize>(
        &self,
        attr_type: u16,
        table: &PolicyTable<M>,
    ) -> Result<Option<Attrs<'a, M>>> {
        self.get(attr_type).map(|p| table.decode(p)).transpose()
    }

    /// The undecoded attribute stream.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::builder::MessageBuilder;
    use crate::netlink::message::NLMSG_HDRLEN;

    static TEST_POLICY: PolicyTable<6> = PolicyTable::new(
        "test",
        [
            Policy::UNSPEC,
            Policy::exact(AttrKind::Binary, 4),
            Policy::new(AttrKind::U16),
            Policy::new(AttrKind::U8),
            Policy::new(AttrKind::Nested),
            Policy::new(AttrKind::Flag),
        ],
    );

    fn attrs_of(build: impl FnOnce(&mut MessageBuilder)) -> Vec<u8> {
        let mut b = MessageBuilder::new(0, 0);
        build(&mut b);
        b.finish()[NLMSG_HDRLEN..].to_vec()
    }

    #[test]
    fn test_decode_slots() {
        let buf = attrs_of(|b| {
            b.append_attr(1, &[0, 0, 10, 0]);
            b.append_attr_u8(3, 1);
            b.append_attr_empty(5);
        });
        let attrs = TEST_POLICY.decode(&buf).unwrap();
        assert_eq!(attrs.get(1), Some(&[0, 0, 10, 0][..]));
        assert_eq!(attrs.u8(3), Some(1));
        assert!(attrs.has(5));
        assert!(!attrs.has(2));
        assert_eq!(attrs.u16(2), None);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let buf = attrs_of(|b| {
            b.append_attr_u16(2, 100);
            b.append_attr_u16(2, 200);
        });
        let attrs = TEST_POLICY.decode(&buf).unwrap();
        assert_eq!(attrs.u16(2), Some(100));
        assert_eq!(attrs.all(2).count(), 2);
    }

    #[test]
    fn test_unknown_types_skipped() {
        let buf = attrs_of(|b| {
            b.append_attr_u32(42, 7);
            b.append_attr_u8(3, 2);
        });
        let attrs = TEST_POLICY.decode(&buf).unwrap();
        assert_eq!(attrs.u8(3), Some(2));
        assert_eq!(TEST_POLICY.max_type(), 5);
    }

    #[test]
    fn test_binary_length_bounds() {
        let short = attrs_of(|b| b.append_attr(1, &[0, 0, 10]));
        let err = TEST_POLICY.decode(&short).unwrap_err();
        assert!(matches!(err, Error::MalformedAttribute { attr_type: 1, .. }));

        let long = attrs_of(|b| b.append_attr(1, &[0; 8]));
        assert!(TEST_POLICY.decode(&long).is_err());
    }

    #[test]
    fn test_fixed_width_too_short() {
        let buf = attrs_of(|b| b.append_attr(2, &[1]));
        assert!(TEST_POLICY.decode(&buf).is_err());

        let buf = attrs_of(|b| b.append_attr(3, &[]));
        assert!(TEST_POLICY.decode(&buf).is_err());
    }

    #[test]
    fn test_flag_must_be_empty() {
        let buf = attrs_of(|b| b.append_attr_u8(5, 1));
        assert!(TEST_POLICY.decode(&buf).is_err());
    }

    #[test]
    fn test_nested_must_be_well_formed() {
        let good = attrs_of(|b| {
            let nest = b.nest_start(4);
            b.append_attr_u8(3, 1);
            b.nest_end(nest);
        });
        let attrs = TEST_POLICY.decode(&good).unwrap();
        let inner = attrs.nested(4, &TEST_POLICY).unwrap().unwrap();
        assert_eq!(inner.u8(3), Some(1));

        // Inner header claims 32 bytes inside an 8-byte container.
        let bad = attrs_of(|b| b.append_attr(4, &[0x20, 0x00, 0x03, 0x00, 1, 0, 0, 0]));
        assert!(TEST_POLICY.decode(&bad).is_err());
    }

    #[test]
    fn test_outer_overrun() {
        let buf = [0x10, 0x00, 0x02, 0x00, 0x01, 0x00];
        let err = TEST_POLICY.decode(&buf).unwrap_err();
        assert!(err.is_malformed());

        let buf = [0x02, 0x00, 0x02, 0x00];
        assert!(TEST_POLICY.decode(&buf).is_err());
    }

    #[test]
    fn test_decode_message_header_too_short() {
        let err = decode_message(&[7, 0, 0], 8, &TEST_POLICY).unwrap_err();
        assert!(matches!(err, Error::Truncated { expected: 8, actual: 3 }));

        let attrs = decode_message(&[7, 0, 0, 0, 4, 0, 0, 0], 8, &TEST_POLICY).unwrap();
        assert!(attrs.raw().is_empty());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let buf = attrs_of(|b| {
            b.append_attr(1, &[1, 0, 20, 0]);
            b.append_attr_u16(2, 30);
        });
        let a = TEST_POLICY.decode(&buf).unwrap();
        let b = TEST_POLICY.decode(&buf).unwrap();
        for t in 0..=TEST_POLICY.max_type() {
            assert_eq!(a.get(t), b.get(t));
        }
    }
}
