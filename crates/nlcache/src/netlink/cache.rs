//! Typed, insertion-ordered object cache.
//!
//! # Example
//!
//! ```ignore
//! use nlcache::netlink::{BridgeVlan, Cache, NetlinkSocket};
//!
//! let mut sock = NetlinkSocket::new()?;
//! let cache = Cache::<BridgeVlan>::alloc_and_fill(&mut sock)?;
//! if let Some(port) = BridgeVlan::get(&cache, 4) {
//!     println!("port 4 pvid {:?}", port.vlan_id());
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::cache_ops::{Action, CacheType};
use super::dump::DumpParams;
use super::error::Result;
use super::object::NlObject;
use super::transport::{Transport, recv_dump, request_dump};

/// A homogeneous collection of shared objects.
///
/// Objects are unique by identity ([`NlObject::identical`]) and kept in the
/// order they were first inserted.
#[derive(Debug, Clone)]
pub struct Cache<T: CacheType> {
    objects: Vec<Arc<T>>,
}

impl<T: CacheType> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheType> Cache<T> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Allocate a cache and fill it from a kernel dump.
    pub fn alloc_and_fill<X: Transport + ?Sized>(transport: &mut X) -> Result<Self> {
        let mut cache = Self::new();
        cache.fill(transport)?;
        Ok(cache)
    }

    /// Replace the contents with a fresh kernel dump.
    ///
    /// Objects are staged while the dump is read and only published once it
    /// completed. On error the cache is left empty.
    pub fn fill<X: Transport + ?Sized>(&mut self, transport: &mut X) -> Result<()> {
        self.objects.clear();

        let seq = request_dump(transport, &T::dump_request())?;
        let mut staged = Self::new();
        recv_dump(transport, seq, |hdr, payload| {
            match T::parse(hdr, payload)? {
                Some(obj) => {
                    staged.include(obj, Action::New);
                }
                None => trace!(cache = T::NAME, msg_type = hdr.nlmsg_type, "ignoring dump message"),
            }
            Ok(())
        })?;

        debug!(cache = T::NAME, objects = staged.len(), "cache filled");
        self.objects = staged.objects;
        Ok(())
    }

    /// Drop every object and fill again; same all-or-nothing rule as [`fill`](Self::fill).
    pub fn refill<X: Transport + ?Sized>(&mut self, transport: &mut X) -> Result<()> {
        self.clear();
        self.fill(transport)
    }

    /// Name of the cache type.
    pub fn name(&self) -> &'static str {
        T::NAME
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over the cached handles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.objects.iter()
    }

    /// Object identical to `needle`, as a new handle.
    pub fn lookup(&self, needle: &T) -> Option<Arc<T>> {
        self.position(needle).map(|i| Arc::clone(&self.objects[i]))
    }

    /// First object matching `pred`, as a new handle.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.objects.iter().find(|o| pred(o)).cloned()
    }

    fn position(&self, needle: &T) -> Option<usize> {
        self.objects.iter().position(|o| o.identical(needle))
    }

    /// Insert `obj`, replacing an identical object if present.
    ///
    /// Returns the handle that was displaced, if any.
    pub fn add(&mut self, obj: T) -> Option<Arc<T>> {
        let obj = Arc::new(obj);
        match self.position(&obj) {
            Some(i) => Some(std::mem::replace(&mut self.objects[i], obj)),
            None => {
                self.objects.push(obj);
                None
            }
        }
    }

    /// Remove the object identical to `needle`.
    pub fn remove(&mut self, needle: &T) -> Option<Arc<T>> {
        self.position(needle).map(|i| self.objects.remove(i))
    }

    /// Drop every handle the cache holds.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Apply one parsed message with the given action.
    ///
    /// Returns the object to report and the action that actually happened,
    /// or `None` for actions that do not touch the cache:
    ///
    /// - `New`: inserted (`New`), or merged into / replacing the existing
    ///   object (`Change`).
    /// - `Change`: merged or replaced (`Change`), inserted if absent (`New`).
    /// - `Del`: the sub-records it carries are dropped from the cached
    ///   object (`Change`); the object is removed once none are left or
    ///   when the event names no sub-records (`Del`). An absent object is a
    ///   no-op that still reports `Del` with the parsed object.
    /// - `Get`: ignored.
    pub fn include(&mut self, obj: T, action: Action) -> Option<(Arc<T>, Action)> {
        match action {
            Action::New | Action::Change => match self.position(&obj) {
                Some(i) => {
                    let slot = &mut self.objects[i];
                    if !Arc::make_mut(slot).update(&obj) {
                        *slot = Arc::new(obj);
                    }
                    Some((Arc::clone(slot), Action::Change))
                }
                None => {
                    let obj = Arc::new(obj);
                    self.objects.push(Arc::clone(&obj));
                    Some((obj, Action::New))
                }
            },
            Action::Del => match self.position(&obj) {
                Some(i) => {
                    let mut rest = (*self.objects[i]).clone();
                    if rest.subtract(&obj) {
                        let rest = Arc::new(rest);
                        self.objects[i] = Arc::clone(&rest);
                        Some((rest, Action::Change))
                    } else {
                        Some((self.objects.remove(i), Action::Del))
                    }
                }
                None => {
                    trace!(cache = T::NAME, "delete of absent object");
                    Some((Arc::new(obj), Action::Del))
                }
            },
            Action::Get => None,
        }
    }

    /// Dump every object, one per line (or block, for details).
    pub fn dump(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        use std::fmt::Write;

        for obj in &self.objects {
            NlObject::dump(obj.as_ref(), params)?;
            params.write_char('\n')?;
        }
        Ok(())
    }
}

impl<'a, T: CacheType> IntoIterator for &'a Cache<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
