//! Parser combinators for fixed-layout records.
//!
//! Variable TLV streams go through [`super::policy`]; the records that sit
//! inside attribute payloads (such as `br_mdb_entry`) are parsed here with
//! winnow so truncation surfaces as an error instead of a short read.

use winnow::binary::{be_u16, le_u8};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use super::error::{Error, Result};
use super::types::bridge::{BrMdbEntry, BridgeVlanInfo};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, winnow::error::ErrMode<ContextError>>;

/// Types that can be parsed from netlink wire format.
pub trait FromNetlink: Sized {
    /// Parse from a mutable byte slice reference.
    /// The slice is advanced past the consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from the start of a byte slice, ignoring trailing bytes.
    fn from_prefix(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut input = data;
        let value = Self::parse(&mut input).map_err(|e| Error::Parse(format!("{}", e)))?;
        Ok((value, input))
    }
}

// ============================================================================
// Primitive Parsers
// ============================================================================

/// Parse a u8.
pub fn parse_u8(input: &mut &[u8]) -> PResult<u8> {
    le_u8.parse_next(input)
}

/// Parse a u16 in native endian.
pub fn parse_u16_ne(input: &mut &[u8]) -> PResult<u16> {
    let bytes: &[u8] = take(2usize).parse_next(input)?;
    Ok(u16::from_ne_bytes([bytes[0], bytes[1]]))
}

/// Parse a u32 in native endian.
pub fn parse_u32_ne(input: &mut &[u8]) -> PResult<u32> {
    let bytes: &[u8] = take(4usize).parse_next(input)?;
    Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse a fixed-size byte array.
pub fn parse_array<const N: usize>(input: &mut &[u8]) -> PResult<[u8; N]> {
    let bytes: &[u8] = take(N).parse_next(input)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

// ============================================================================
// Records
// ============================================================================

impl FromNetlink for BridgeVlanInfo {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let flags = parse_u16_ne(input)?;
        let vid = parse_u16_ne(input)?;
        Ok(Self { flags, vid })
    }
}

impl FromNetlink for BrMdbEntry {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let ifindex = parse_u32_ne(input)?;
        let state = parse_u8(input)?;
        let flags = parse_u8(input)?;
        let vid = parse_u16_ne(input)?;
        let addr = parse_array::<16>(input)?;
        let proto = be_u16.parse_next(input)?;
        // Structure padding; attributes that follow start after it.
        let _pad = parse_array::<2>(input)?;

        Ok(Self {
            ifindex,
            state,
            flags,
            vid,
            addr,
            proto: proto.to_be_bytes(),
            pad: [0; 2],
        })
    }
}
