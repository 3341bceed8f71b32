//! Keeps caches in sync with kernel change notifications.
//!
//! A [`CacheManager`] owns two transports: an event transport subscribed to
//! the multicast groups of every managed cache, and a synchronous one used
//! for the initial dumps. Each managed cache moves through
//! [`CacheState::Empty`] → [`CacheState::Filling`] → [`CacheState::Live`];
//! once live, queued events are applied by
//! [`process_pending`](CacheManager::process_pending) in the order the kernel
//! sent them, and the cache's change callback runs once per applied event.
//!
//! # Example
//!
//! ```ignore
//! use nlcache::netlink::{Action, BridgeVlan, CacheManager};
//!
//! let mut mngr = CacheManager::new()?;
//! mngr.add::<BridgeVlan, _>(|_cache, vlan, action| {
//!     println!("{action} ifindex {:?}", vlan.ifindex());
//! })?;
//!
//! loop {
//!     // poll(2) on mngr.as_raw_fd(), then:
//!     mngr.process_pending()?;
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::cache::Cache;
use super::cache_ops::{Action, AfGroup, CacheRegistry, CacheType, DumpObject};
use super::dump::DumpParams;
use super::error::{Error, Result};
use super::message::{MessageIter, NlMsgHdr, NlMsgType};
use super::socket::{DEFAULT_RECV_BUF, NetlinkSocket};
use super::transport::Transport;

/// Lifecycle of a managed cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Created, no data yet.
    Empty,
    /// Initial dump in progress.
    Filling,
    /// Filled and following events.
    Live,
}

/// Change callback for a typed managed cache.
pub type ChangeFn<C> = Box<dyn FnMut(&Cache<C>, &Arc<C>, Action)>;

/// A cache owned by a manager, with its type erased.
pub trait ManagedCache {
    fn name(&self) -> &'static str;

    fn state(&self) -> CacheState;

    fn set_state(&mut self, state: CacheState);

    fn groups(&self) -> &'static [AfGroup];

    /// Replace the contents with a kernel dump read from `transport`.
    fn fill(&mut self, transport: &mut dyn Transport) -> Result<()>;

    /// Parse and apply one message, invoking the change callback.
    ///
    /// Returns whether the message was an event for this cache.
    fn apply(&mut self, hdr: &NlMsgHdr, payload: &[u8]) -> Result<bool>;

    fn len(&self) -> usize;

    fn dump(&self, params: &mut DumpParams<'_>) -> fmt::Result;

    /// Visit every object through its type-erased view.
    fn for_each_object(&self, f: &mut dyn FnMut(&dyn DumpObject));

    fn as_any(&self) -> &dyn Any;
}

/// Typed cache plus callback and state, as stored by the manager.
pub struct ManagedEntry<C: CacheType> {
    cache: Cache<C>,
    state: CacheState,
    callback: ChangeFn<C>,
}

impl<C: CacheType> ManagedEntry<C> {
    pub fn new(callback: ChangeFn<C>) -> Self {
        Self {
            cache: Cache::new(),
            state: CacheState::Empty,
            callback,
        }
    }
}

impl<C: CacheType> ManagedCache for ManagedEntry<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    fn state(&self) -> CacheState {
        self.state
    }

    fn set_state(&mut self, state: CacheState) {
        debug!(cache = C::NAME, from = ?self.state, to = ?state, "cache state");
        self.state = state;
    }

    fn groups(&self) -> &'static [AfGroup] {
        C::GROUPS
    }

    fn fill(&mut self, transport: &mut dyn Transport) -> Result<()> {
        self.cache.fill(transport)
    }

    fn apply(&mut self, hdr: &NlMsgHdr, payload: &[u8]) -> Result<bool> {
        let action = match C::action_for(hdr.nlmsg_type) {
            Some(Action::Get) | None => return Ok(false),
            Some(action) => action,
        };
        let Some(obj) = C::parse(hdr, payload)? else {
            trace!(cache = C::NAME, "event not for this cache");
            return Ok(false);
        };
        if let Some((obj, reported)) = self.cache.include(obj, action) {
            trace!(cache = C::NAME, action = %reported, "applied event");
            (self.callback)(&self.cache, &obj, reported);
        }
        Ok(true)
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn dump(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        self.cache.dump(params)
    }

    fn for_each_object(&self, f: &mut dyn FnMut(&dyn DumpObject)) {
        for obj in &self.cache {
            f(obj.as_ref());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Options for [`CacheManager::with_config`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Userspace buffer per received datagram.
    pub recv_buf_len: usize,
    /// Kernel receive buffer for the event socket (SO_RCVBUF).
    pub rx_buf_size: Option<usize>,
    /// Dump the kernel's objects when a cache is added. When off, caches
    /// start empty and are built from events alone.
    pub fill_on_add: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            recv_buf_len: DEFAULT_RECV_BUF,
            rx_buf_size: None,
            fill_on_add: true,
        }
    }
}

/// Owns managed caches and the transports feeding them.
pub struct CacheManager<T: Transport = NetlinkSocket> {
    events: T,
    sync: T,
    caches: Vec<Box<dyn ManagedCache>>,
    fill_on_add: bool,
}

impl CacheManager<NetlinkSocket> {
    /// Open the event and sync sockets with default options.
    pub fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Result<Self> {
        let mut events = NetlinkSocket::new()?;
        events.set_non_blocking(true)?;
        events.set_recv_buf_len(config.recv_buf_len);
        if let Some(size) = config.rx_buf_size {
            events.set_rx_buf_size(size)?;
        }

        let mut sync = NetlinkSocket::new()?;
        sync.set_recv_buf_len(config.recv_buf_len);

        Ok(Self::from_transports(events, sync).fill_on_add(config.fill_on_add))
    }
}

impl<T: Transport> CacheManager<T> {
    /// Build a manager on existing transports. `events` should not block.
    pub fn from_transports(events: T, sync: T) -> Self {
        Self {
            events,
            sync,
            caches: Vec::new(),
            fill_on_add: true,
        }
    }

    /// Whether caches added from now on are filled from a dump first.
    pub fn fill_on_add(mut self, fill: bool) -> Self {
        self.fill_on_add = fill;
        self
    }

    /// Start managing a cache of `C`, filling it before returning.
    ///
    /// `callback` runs once for every event applied to the cache afterwards.
    pub fn add<C, F>(&mut self, callback: F) -> Result<()>
    where
        C: CacheType,
        F: FnMut(&Cache<C>, &Arc<C>, Action) + 'static,
    {
        self.add_managed(Box::new(ManagedEntry::<C>::new(Box::new(callback))))
    }

    /// Start managing the cache type registered as `name`.
    pub fn add_by_name<F>(&mut self, registry: &CacheRegistry, name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&dyn DumpObject, Action) + 'static,
    {
        let ops = registry
            .lookup(name)
            .ok_or_else(|| Error::UnknownCacheType(name.to_string()))?;
        self.add_managed(ops.new_managed(Box::new(callback)))
    }

    fn add_managed(&mut self, mut managed: Box<dyn ManagedCache>) -> Result<()> {
        let name = managed.name();
        if self.caches.iter().any(|c| c.name() == name) {
            return Err(Error::Exists(name.to_string()));
        }

        if let Err(e) = self.subscribe_and_fill(managed.as_mut()) {
            self.leave_groups(managed.groups());
            return Err(e);
        }
        managed.set_state(CacheState::Live);

        debug!(cache = name, objects = managed.len(), "cache managed");
        self.caches.push(managed);
        Ok(())
    }

    /// Groups are joined before the dump, so events racing it stay queued.
    fn subscribe_and_fill(&mut self, managed: &mut dyn ManagedCache) -> Result<()> {
        let name = managed.name();
        for group in managed.groups() {
            self.events.add_membership(group.group)?;
        }

        if self.fill_on_add {
            managed.set_state(CacheState::Filling);
            managed
                .fill(&mut self.sync)
                .map_err(|e| e.with_context(format!("filling {name}")))?;
        }
        Ok(())
    }

    /// Leave `groups`, except those another managed cache still listens on.
    fn leave_groups(&mut self, groups: &[AfGroup]) {
        for group in groups {
            let shared = self
                .caches
                .iter()
                .any(|c| c.groups().iter().any(|g| g.group == group.group));
            if shared {
                continue;
            }
            if let Err(e) = self.events.drop_membership(group.group) {
                warn!(group = group.group, error = %e, "failed to leave multicast group");
            }
        }
    }

    /// Typed access to a managed cache.
    pub fn cache<C: CacheType>(&self) -> Result<&Cache<C>> {
        let managed = self
            .caches
            .iter()
            .find(|c| c.name() == C::NAME)
            .ok_or_else(|| Error::NotFound(format!("cache {} is not managed", C::NAME)))?;
        managed
            .as_any()
            .downcast_ref::<ManagedEntry<C>>()
            .map(|m| &m.cache)
            .ok_or(Error::CacheMismatch {
                name: managed.name(),
                requested: std::any::type_name::<C>(),
            })
    }

    /// State of the managed cache called `name`.
    pub fn state(&self, name: &str) -> Option<CacheState> {
        self.caches.iter().find(|c| c.name() == name).map(|c| c.state())
    }

    /// Type-erased view of the managed cache called `name`.
    pub fn managed(&self, name: &str) -> Option<&dyn ManagedCache> {
        self.caches.iter().find(|c| c.name() == name).map(|c| c.as_ref())
    }

    /// Names of managed caches, in the order they were added.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.caches.iter().map(|c| c.name())
    }

    /// Apply every event already queued on the event transport.
    ///
    /// Never blocks. Returns the number of events applied.
    pub fn process_pending(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Some(data) = self.events.try_recv()? {
            applied += self.process_datagram(&data)?;
        }
        Ok(applied)
    }

    /// Apply the events contained in one received datagram.
    pub fn process_datagram(&mut self, data: &[u8]) -> Result<usize> {
        let mut applied = 0;
        for result in MessageIter::new(data) {
            let (hdr, payload) = result?;
            match hdr.nlmsg_type {
                NlMsgType::NOOP | NlMsgType::DONE => continue,
                NlMsgType::ERROR | NlMsgType::OVERRUN => {
                    warn!(msg_type = NlMsgType::name(hdr.nlmsg_type), "unexpected message on event socket");
                    continue;
                }
                _ => {}
            }

            let mut handled = false;
            for cache in self.caches.iter_mut().filter(|c| c.state() == CacheState::Live) {
                if cache.apply(hdr, payload)? {
                    handled = true;
                    applied += 1;
                }
            }
            if !handled {
                trace!(msg_type = hdr.nlmsg_type, "no cache consumed event");
            }
        }
        Ok(applied)
    }

    /// Dump every managed cache.
    pub fn dump(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        for cache in &self.caches {
            cache.dump(params)?;
        }
        Ok(())
    }

    pub fn events(&self) -> &T {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut T {
        &mut self.events
    }

    pub fn sync_transport(&mut self) -> &mut T {
        &mut self.sync
    }
}

impl<T: Transport + AsRawFd> AsRawFd for CacheManager<T> {
    /// The event transport's descriptor, for external poll loops.
    fn as_raw_fd(&self) -> RawFd {
        self.events.as_raw_fd()
    }
}
