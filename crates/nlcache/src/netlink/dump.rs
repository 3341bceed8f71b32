//! Text rendering of cached objects.

use std::collections::HashMap;
use std::fmt;

/// How much detail to print per object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpType {
    /// One line per object.
    #[default]
    Line,
    /// Object line followed by one indented line per sub-record.
    Details,
}

/// Output sink plus formatting options handed to
/// [`NlObject::dump_line`](super::object::NlObject::dump_line).
///
/// Implements [`fmt::Write`], so `write!(params, ...)` goes straight to the
/// underlying sink.
pub struct DumpParams<'a> {
    out: &'a mut dyn fmt::Write,
    dump_type: DumpType,
    names: Option<&'a HashMap<u32, String>>,
}

impl<'a> DumpParams<'a> {
    pub fn new(out: &'a mut dyn fmt::Write) -> Self {
        Self {
            out,
            dump_type: DumpType::Line,
            names: None,
        }
    }

    pub fn dump_type(mut self, dump_type: DumpType) -> Self {
        self.dump_type = dump_type;
        self
    }

    /// Resolve interface indexes through `names` when printing.
    pub fn names(mut self, names: &'a HashMap<u32, String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn kind(&self) -> DumpType {
        self.dump_type
    }

    /// Interface name for `ifindex`, or `if<N>` when unknown.
    pub fn ifname(&self, ifindex: u32) -> String {
        self.names
            .and_then(|n| n.get(&ifindex))
            .cloned()
            .unwrap_or_else(|| format!("if{}", ifindex))
    }
}

impl fmt::Write for DumpParams<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.out.write_str(s)
    }
}
