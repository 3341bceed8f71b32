//! Subcommands and the output helpers they share.

pub mod mdb;
pub mod monitor;
pub mod vlan;

use std::collections::HashMap;

use nlcache::netlink::{DumpParams, DumpType, Error, Result};

/// Global output flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub pretty: bool,
    pub details: bool,
    pub numeric: bool,
}

impl OutputOptions {
    pub fn dump_type(&self) -> DumpType {
        if self.details {
            DumpType::Details
        } else {
            DumpType::Line
        }
    }

    /// Index to name map for printing; empty with `-n`.
    pub fn names(&self) -> HashMap<u32, String> {
        if self.numeric {
            return HashMap::new();
        }
        // Names are cosmetic; fall back to if<N> when sysfs is unavailable.
        nlcache::util::interface_names().unwrap_or_default()
    }

    /// Text dump parameters writing into `out`.
    pub fn params<'a>(
        &self,
        out: &'a mut String,
        names: &'a HashMap<u32, String>,
    ) -> DumpParams<'a> {
        DumpParams::new(out).dump_type(self.dump_type()).names(names)
    }

    pub fn print_json(&self, value: &serde_json::Value) -> Result<()> {
        let output = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| Error::InvalidMessage(format!("json output: {e}")))?;
        println!("{}", output);
        Ok(())
    }
}

/// Name of `ifindex`, or its number when unknown.
pub fn dev_name(names: &HashMap<u32, String>, ifindex: u32) -> String {
    names
        .get(&ifindex)
        .cloned()
        .unwrap_or_else(|| ifindex.to_string())
}

/// Render an error from text formatting into the library's error type.
pub fn fmt_error(_: std::fmt::Error) -> Error {
    Error::InvalidMessage("formatting output".into())
}
