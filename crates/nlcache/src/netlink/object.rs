//! The entity model shared by every cached object type.
//!
//! Each attribute of an object is assigned one bit of a `u64`. The bitmask
//! of attributes that are set is the object's [`mask`](NlObject::mask);
//! comparisons report which attributes differ in the same encoding.
//!
//! Construction is [`Default`], copying is [`Clone`] and teardown is
//! [`Drop`]. Objects are shared as `Arc<T>`: a cache holds one handle,
//! every lookup hands out another, and the object is dropped once the last
//! handle goes away.

use std::fmt;

use super::dump::{DumpParams, DumpType};

/// Every attribute bit.
pub const ALL_ATTRS: u64 = u64::MAX;

/// How [`NlObject::compare`] treats the requested attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Compare every requested attribute exactly.
    Exact,
    /// Only the attributes that identify an object within its cache.
    Identity,
    /// Flag attributes are compared under the other object's flag mask.
    Loose,
}

/// Operations every cacheable object provides.
pub trait NlObject: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Attributes that identify this object within its cache.
    fn id_attrs(&self) -> u64;

    /// Attributes currently set.
    fn mask(&self) -> u64;

    /// Bitmask of the attributes in `attrs` that differ from `other`.
    ///
    /// `loose` requests the [`CompareMode::Loose`] treatment of flags.
    fn compare_attrs(&self, other: &Self, attrs: u64, loose: bool) -> u64;

    /// Merge a newer version of the same object into `self`.
    ///
    /// Returns `false` when the type does not merge, in which case `self`
    /// is left untouched and the caller replaces it with `new`.
    fn update(&mut self, _new: &Self) -> bool {
        false
    }

    /// Drop the sub-records a delete notification carries.
    ///
    /// Returns `true` when the object stays cached with what is left and
    /// `false` when it goes away as a whole, which is the default.
    fn subtract(&mut self, _gone: &Self) -> bool {
        false
    }

    /// Write a one-line summary.
    fn dump_line(&self, params: &mut DumpParams<'_>) -> fmt::Result;

    /// Write the summary plus sub-records. Defaults to the summary.
    fn dump_details(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        self.dump_line(params)
    }

    /// Bitmask of differing attributes.
    fn compare(&self, other: &Self, attrs: u64, mode: CompareMode) -> u64 {
        match mode {
            CompareMode::Exact => self.compare_attrs(other, attrs, false),
            CompareMode::Identity => self.compare_attrs(other, attrs & self.id_attrs(), false),
            CompareMode::Loose => self.compare_attrs(other, attrs, true),
        }
    }

    /// Whether `other` names the same object.
    fn identical(&self, other: &Self) -> bool {
        self.compare(other, ALL_ATTRS, CompareMode::Identity) == 0
    }

    /// Dispatch on the requested dump type.
    fn dump(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        match params.kind() {
            DumpType::Line => self.dump_line(params),
            DumpType::Details => self.dump_details(params),
        }
    }
}

/// Accumulates differing attribute bits between two objects.
///
/// An attribute differs when it is requested and either only one side has
/// it, or both have it with different values.
///
/// ```ignore
/// AttrDiff::new(self, other, attrs)
///     .field(ATTR_IFINDEX, |o| o.ifindex)
///     .field(ATTR_STATE, |o| o.state)
///     .finish()
/// ```
pub struct AttrDiff<'a, T: NlObject> {
    a: &'a T,
    b: &'a T,
    a_mask: u64,
    b_mask: u64,
    attrs: u64,
    diff: u64,
}

impl<'a, T: NlObject> AttrDiff<'a, T> {
    pub fn new(a: &'a T, b: &'a T, attrs: u64) -> Self {
        Self {
            a,
            b,
            a_mask: a.mask(),
            b_mask: b.mask(),
            attrs,
            diff: 0,
        }
    }

    /// Compare the value `get` extracts for attribute bit `attr`.
    pub fn field<V: PartialEq>(mut self, attr: u64, get: impl Fn(&T) -> V) -> Self {
        if self.attrs & attr == 0 {
            return self;
        }
        let in_a = self.a_mask & attr != 0;
        let in_b = self.b_mask & attr != 0;
        if in_a != in_b || (in_a && get(self.a) != get(self.b)) {
            self.diff |= attr;
        }
        self
    }

    /// Compare flags, looking only at the bits in `mask` when it is `Some`.
    pub fn flags(mut self, attr: u64, a: u16, b: u16, mask: Option<u16>) -> Self {
        if self.attrs & attr == 0 {
            return self;
        }
        let in_a = self.a_mask & attr != 0;
        let in_b = self.b_mask & attr != 0;
        let differ = match mask {
            Some(m) => (a ^ b) & m != 0,
            None => a != b,
        };
        if in_a != in_b || (in_a && differ) {
            self.diff |= attr;
        }
        self
    }

    pub fn finish(self) -> u64 {
        self.diff
    }
}
