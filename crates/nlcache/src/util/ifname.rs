//! Interface name / index resolution through sysfs.
//!
//! Used to print `eth1` instead of `if4` in dumps and to accept names on the
//! command line. Indexes are read from `/sys/class/net/<name>/ifindex`, so
//! results reflect the network namespace sysfs was mounted in.

use std::collections::HashMap;
use std::fs;

use crate::netlink::{Error, Result};

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Check that `name` could be an interface name.
pub fn validate(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty name"
    } else if name.len() >= IFNAMSIZ {
        "name too long"
    } else if name.contains(['/', '\0']) || name.chars().any(char::is_whitespace) {
        "name contains invalid characters"
    } else {
        return Ok(());
    };
    Err(Error::InvalidMessage(format!("interface {name:?}: {reason}")))
}

/// Map of every interface index to its name.
pub fn interface_names() -> Result<HashMap<u32, String>> {
    let mut names = HashMap::new();
    for entry in fs::read_dir(SYS_CLASS_NET)?.flatten() {
        let Ok(content) = fs::read_to_string(entry.path().join("ifindex")) else {
            continue;
        };
        if let Ok(index) = content.trim().parse::<u32>() {
            names.insert(index, entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Name of interface `index`.
pub fn index_to_name(index: u32) -> Result<String> {
    interface_names()?
        .remove(&index)
        .ok_or_else(|| Error::NotFound(format!("interface index {index}")))
}

/// Index of interface `name`.
pub fn name_to_index(name: &str) -> Result<u32> {
    validate(name)?;

    let path = format!("{SYS_CLASS_NET}/{name}/ifindex");
    fs::read_to_string(&path)
        .ok()
        .and_then(|content| content.trim().parse().ok())
        .ok_or_else(|| Error::NotFound(format!("interface {name}")))
}

/// Accept either a name or a numeric index; returns the index.
pub fn resolve(s: &str) -> Result<u32> {
    match s.parse::<u32>() {
        Ok(index) => Ok(index),
        Err(_) => name_to_index(s),
    }
}
