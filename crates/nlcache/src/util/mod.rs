//! Shared utilities for nlcache.

pub mod ifname;

pub use ifname::{index_to_name, interface_names, name_to_index, resolve};
