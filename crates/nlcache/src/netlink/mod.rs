//! Client-side object caches for rtnetlink.
//!
//! This module decodes kernel messages into typed objects, keeps them in
//! caches filled from a dump, and keeps those caches current from multicast
//! change notifications.
//!
//! # Quick Start
//!
//! ```ignore
//! use nlcache::netlink::{BridgeVlan, Cache, NetlinkSocket};
//!
//! let mut sock = NetlinkSocket::new()?;
//! let vlans = Cache::<BridgeVlan>::alloc_and_fill(&mut sock)?;
//! for vlan in &vlans {
//!     println!("{:?}: pvid {:?}", vlan.ifindex(), vlan.vlan_id());
//! }
//! ```
//!
//! # Keeping caches live
//!
//! ```ignore
//! use nlcache::netlink::{CacheManager, CacheRegistry, Mdb};
//!
//! let registry = CacheRegistry::with_defaults();
//! let mut mngr = CacheManager::new()?;
//! mngr.add_by_name(&registry, "route/bridgevlan", |obj, action| {
//!     println!("{action} {obj:?}");
//! })?;
//! mngr.add::<Mdb, _>(|_, mdb, action| println!("{action} {:?}", mdb.ifindex()))?;
//!
//! loop {
//!     // poll(2) on mngr.as_raw_fd(), then:
//!     mngr.process_pending()?;
//! }
//! ```
//!
//! # Changing state
//!
//! ```ignore
//! use nlcache::netlink::{BridgeVlan, BridgeVlanEntry};
//!
//! let mut changes = BridgeVlan::new();
//! changes.add_entry(BridgeVlanEntry::new(100).with_range(110));
//! // Sent as RTM_NEWLINK, retried once as RTM_SETLINK on EOPNOTSUPP.
//! BridgeVlan::change(&mut sock, &orig, &changes, 0)?;
//! ```

pub mod attr;
mod builder;
pub mod bridge_vlan;
pub mod cache;
pub mod cache_ops;
pub mod change;
pub mod dump;
mod error;
#[cfg(test)]
mod fixtures;
pub mod manager;
pub mod mdb;
pub mod message;
pub mod object;
pub mod parse;
pub mod policy;
mod socket;
pub mod transport;
pub mod types;

#[cfg(feature = "tokio")]
pub mod async_manager;

pub use attr::{AttrIter, NlAttr};
pub use bridge_vlan::{BRIDGE_VLAN_OPS, BridgeVlan, BridgeVlanEntry};
pub use builder::{MessageBuilder, NestToken};
pub use cache::Cache;
pub use cache_ops::{
    Action, AfGroup, CacheDescriptor, CacheRegistry, CacheType, DumpObject, MsgTypeAction,
    TypeDescriptor,
};
pub use change::ChangeRequest;
pub use dump::{DumpParams, DumpType};
pub use error::{Error, Result};
pub use manager::{CacheManager, CacheState, ManagedCache, ManagerConfig};
pub use mdb::{GroupAddr, MDB_OPS, Mdb, MdbEntry};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use object::{ALL_ATTRS, CompareMode, NlObject};
pub use parse::FromNetlink;
pub use policy::{AttrKind, Attrs, Policy, PolicyTable};
pub use socket::{DEFAULT_RECV_BUF, NetlinkSocket, rtnetlink_groups};
pub use transport::Transport;

#[cfg(feature = "tokio")]
pub use async_manager::{AsyncCacheManager, Updates};
