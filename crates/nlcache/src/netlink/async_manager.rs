//! Tokio driver for a [`CacheManager`].
//!
//! Registers the manager's event socket with the reactor and applies queued
//! events whenever it becomes readable. Change callbacks still run
//! synchronously inside [`AsyncCacheManager::process`].
//!
//! The manager holds non-`Send` callbacks, so the futures here are meant for
//! a current-thread runtime or a `LocalSet`.
//!
//! # Example
//!
//! ```ignore
//! use nlcache::netlink::{AsyncCacheManager, BridgeVlan, CacheManager};
//! use tokio_stream::StreamExt;
//!
//! let mut mngr = CacheManager::new()?;
//! mngr.add::<BridgeVlan, _>(|_, vlan, action| println!("{action} {vlan:?}"))?;
//!
//! let mut mngr = AsyncCacheManager::new(mngr)?;
//! let mut updates = mngr.updates();
//! while let Some(applied) = updates.try_next().await? {
//!     tracing::debug!(applied, "events applied");
//! }
//! ```

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio_stream::Stream;

use super::error::Result;
use super::manager::CacheManager;
use super::socket::NetlinkSocket;

/// A [`CacheManager`] whose event socket is driven by tokio.
pub struct AsyncCacheManager {
    fd: AsyncFd<CacheManager<NetlinkSocket>>,
}

impl AsyncCacheManager {
    /// Register `manager` with the current runtime.
    ///
    /// The manager's event socket must be non-blocking, as it is when built
    /// through [`CacheManager::new`] or [`CacheManager::with_config`].
    ///
    /// Add caches before wrapping: while registered, the manager is only
    /// reachable through [`manager`](Self::manager), and
    /// [`into_inner`](Self::into_inner) gives it back.
    pub fn new(manager: CacheManager<NetlinkSocket>) -> Result<Self> {
        // SAFETY: the event socket is owned by `manager` for its whole
        // lifetime and no `&mut` to the manager leaves this type, so the fd
        // stays open and unchanged until `into_inner` or drop.
        let fd = unsafe { AsyncFd::register(manager) }.map_err(io::Error::from)?;
        Ok(Self { fd })
    }

    pub fn manager(&self) -> &CacheManager<NetlinkSocket> {
        self.fd.get_ref()
    }

    /// Deregister from the runtime and return the manager.
    pub fn into_inner(self) -> CacheManager<NetlinkSocket> {
        self.fd.into_inner()
    }

    /// Wait until at least one event was applied; returns how many.
    pub async fn process(&mut self) -> Result<usize> {
        loop {
            let mut guard = self.fd.readable_mut().await?;
            let applied = guard.get_inner_mut().process_pending()?;
            // process_pending drained the socket up to EAGAIN
            guard.clear_ready();
            if applied > 0 {
                return Ok(applied);
            }
        }
    }

    /// Stream of applied-event counts, one item per readable wakeup that
    /// changed at least one cache.
    pub fn updates(&mut self) -> Updates<'_> {
        Updates { mngr: self }
    }
}

/// Stream returned by [`AsyncCacheManager::updates`].
pub struct Updates<'a> {
    mngr: &'a mut AsyncCacheManager,
}

impl Stream for Updates<'_> {
    type Item = Result<usize>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let mut guard = match this.mngr.fd.poll_read_ready_mut(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                Poll::Pending => return Poll::Pending,
            };

            match guard.get_inner_mut().process_pending() {
                Ok(0) => {
                    guard.clear_ready();
                    continue;
                }
                Ok(applied) => {
                    guard.clear_ready();
                    return Poll::Ready(Some(Ok(applied)));
                }
                Err(e) => return Poll::Ready(Some(Err(e))),
            }
        }
    }
}
