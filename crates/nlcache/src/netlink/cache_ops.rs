//! Cache type descriptors and the registry that names them.
//!
//! A cache type binds an object type to its wire protocol: the message types
//! it consumes and what each one means, the multicast groups that carry its
//! events, how to ask the kernel for a full dump and how to parse a message.
//! Statically this is the [`CacheType`] trait; [`CacheDescriptor`] is the
//! object-safe view of it that a [`CacheRegistry`] stores by name.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use super::builder::MessageBuilder;
use super::cache::Cache;
use super::dump::DumpParams;
use super::error::{Error, Result};
use super::manager::{ManagedCache, ManagedEntry};
use super::message::NlMsgHdr;
use super::object::NlObject;

/// What a message does to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(serde::Serialize))]
pub enum Action {
    New,
    Del,
    Get,
    Change,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Del => "DEL",
            Self::Get => "GET",
            Self::Change => "CHANGE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a cache type's message table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgTypeAction {
    pub msg_type: u16,
    pub action: Action,
    pub name: &'static str,
}

impl MsgTypeAction {
    pub const fn new(msg_type: u16, action: Action, name: &'static str) -> Self {
        Self {
            msg_type,
            action,
            name,
        }
    }
}

/// Multicast group carrying events for one address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfGroup {
    pub family: u8,
    pub group: u32,
}

/// An object type that can be kept in a [`Cache`].
pub trait CacheType: NlObject {
    /// Registry name, e.g. `route/bridgevlan`.
    const NAME: &'static str;
    /// Size of the family header following nlmsghdr.
    const HDR_SIZE: usize;
    /// Message types this cache consumes.
    const MSG_TYPES: &'static [MsgTypeAction];
    /// Multicast groups to join for live updates.
    const GROUPS: &'static [AfGroup];

    /// Request that makes the kernel dump every object of this type.
    fn dump_request() -> MessageBuilder;

    /// Parse one message.
    ///
    /// `Ok(None)` means the message is well-formed but not for this cache
    /// (for example a different address family).
    fn parse(hdr: &NlMsgHdr, payload: &[u8]) -> Result<Option<Self>>;

    /// Action associated with `msg_type`, if this cache consumes it.
    fn action_for(msg_type: u16) -> Option<Action> {
        Self::MSG_TYPES
            .iter()
            .find(|m| m.msg_type == msg_type)
            .map(|m| m.action)
    }
}

/// Object-safe view of any cached object, handed to type-erased callbacks.
pub trait DumpObject: fmt::Debug {
    /// Name of the cache type the object belongs to.
    fn type_name(&self) -> &'static str;

    /// Render through the object's own dump operations.
    fn dump_to(&self, params: &mut DumpParams<'_>) -> fmt::Result;

    fn as_any(&self) -> &dyn Any;
}

impl<T: CacheType> DumpObject for T {
    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn dump_to(&self, params: &mut DumpParams<'_>) -> fmt::Result {
        NlObject::dump(self, params)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Change callback that only sees the object through [`DumpObject`].
pub type DynChangeFn = Box<dyn FnMut(&dyn DumpObject, Action)>;

/// Object-safe descriptor of a cache type.
pub trait CacheDescriptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn hdr_size(&self) -> usize;

    fn msg_types(&self) -> &'static [MsgTypeAction];

    fn groups(&self) -> &'static [AfGroup];

    fn object_type(&self) -> TypeId;

    fn dump_request(&self) -> MessageBuilder;

    /// Parse one message into a type-erased object.
    fn parse_object(&self, hdr: &NlMsgHdr, payload: &[u8]) -> Result<Option<Box<dyn DumpObject>>>;

    /// Create an empty managed cache of this type reporting to `callback`.
    fn new_managed(&self, callback: DynChangeFn) -> Box<dyn ManagedCache>;

    /// Table row for `msg_type`.
    fn msg_type(&self, msg_type: u16) -> Option<&'static MsgTypeAction> {
        self.msg_types().iter().find(|m| m.msg_type == msg_type)
    }
}

/// [`CacheDescriptor`] for a statically known [`CacheType`].
pub struct TypeDescriptor<T>(PhantomData<fn() -> T>);

impl<T> TypeDescriptor<T> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypeDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheType> CacheDescriptor for TypeDescriptor<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn hdr_size(&self) -> usize {
        T::HDR_SIZE
    }

    fn msg_types(&self) -> &'static [MsgTypeAction] {
        T::MSG_TYPES
    }

    fn groups(&self) -> &'static [AfGroup] {
        T::GROUPS
    }

    fn object_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn dump_request(&self) -> MessageBuilder {
        T::dump_request()
    }

    fn parse_object(&self, hdr: &NlMsgHdr, payload: &[u8]) -> Result<Option<Box<dyn DumpObject>>> {
        Ok(T::parse(hdr, payload)?.map(|obj| Box::new(obj) as Box<dyn DumpObject>))
    }

    fn new_managed(&self, mut callback: DynChangeFn) -> Box<dyn ManagedCache> {
        Box::new(ManagedEntry::<T>::new(Box::new(
            move |_cache: &Cache<T>, obj: &Arc<T>, action| callback(obj.as_ref(), action),
        )))
    }
}

/// Named cache type descriptors.
///
/// Populated explicitly by the caller, usually through
/// [`with_defaults`](Self::with_defaults). Lookups by name or message type
/// see registrations in the order they were made.
#[derive(Default)]
pub struct CacheRegistry {
    entries: Vec<&'static dyn CacheDescriptor>,
}

impl CacheRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in cache types, bridge VLAN first, then MDB.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for ops in [
            &super::bridge_vlan::BRIDGE_VLAN_OPS as &'static dyn CacheDescriptor,
            &super::mdb::MDB_OPS as &'static dyn CacheDescriptor,
        ] {
            // Names are distinct; registration into an empty registry cannot clash.
            let _ = registry.register(ops);
        }
        registry
    }

    /// Add a descriptor; its name must not be registered yet.
    pub fn register(&mut self, ops: &'static dyn CacheDescriptor) -> Result<()> {
        if self.lookup(ops.name()).is_some() {
            return Err(Error::Exists(ops.name().to_string()));
        }
        debug!(name = ops.name(), "registered cache type");
        self.entries.push(ops);
        Ok(())
    }

    /// Remove a descriptor by name.
    pub fn unregister(&mut self, name: &str) -> Result<&'static dyn CacheDescriptor> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.name() == name)
            .ok_or_else(|| Error::UnknownCacheType(name.to_string()))?;
        debug!(name, "unregistered cache type");
        Ok(self.entries.remove(pos))
    }

    pub fn lookup(&self, name: &str) -> Option<&'static dyn CacheDescriptor> {
        self.entries.iter().copied().find(|e| e.name() == name)
    }

    /// First registered descriptor consuming `msg_type`.
    pub fn lookup_msg_type(
        &self,
        msg_type: u16,
    ) -> Option<(&'static dyn CacheDescriptor, &'static MsgTypeAction)> {
        self.entries
            .iter()
            .copied()
            .find_map(|e| e.msg_type(msg_type).map(|m| (e, m)))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
