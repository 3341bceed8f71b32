//! Cached rtnetlink objects for Linux bridges.
//!
//! This crate keeps userspace copies of kernel bridge state (per-port VLAN
//! membership and the multicast group database) and keeps them current from
//! netlink change notifications. It also builds the requests that change that
//! state.
//!
//! # Features
//!
//! - `tokio` - Async driver for the cache manager
//! - `output` - `serde::Serialize` for cached objects (JSON output)
//! - `full` - All features enabled
//! - `integration` - Tests against a live kernel (require root)
//!
//! # Example
//!
//! ```ignore
//! use nlcache::netlink::{BridgeVlan, Cache, NetlinkSocket};
//!
//! fn main() -> nlcache::Result<()> {
//!     let mut sock = NetlinkSocket::new()?;
//!     let vlans = Cache::<BridgeVlan>::alloc_and_fill(&mut sock)?;
//!     for vlan in &vlans {
//!         println!("{:?} pvid {:?}", vlan.ifindex(), vlan.vlan_id());
//!     }
//!     Ok(())
//! }
//! ```

// Core modules (always available)
pub mod netlink;
pub mod util;

// Re-export common types at crate root for convenience
pub use netlink::{Cache, CacheManager, CacheRegistry, Error, Result};
