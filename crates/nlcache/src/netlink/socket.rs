//! Blocking NETLINK_ROUTE socket.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use super::error::{Error, Result};
use super::transport::Transport;

/// Default receive buffer, large enough for one dump batch.
pub const DEFAULT_RECV_BUF: usize = 32768;

/// Blocking rtnetlink socket.
///
/// Reads block until a datagram arrives unless the socket was switched to
/// non-blocking mode or given a receive timeout.
pub struct NetlinkSocket {
    socket: Socket,
    seq: u32,
    pid: u32,
    recv_buf: usize,
}

impl NetlinkSocket {
    /// Open and bind a NETLINK_ROUTE socket.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_ROUTE)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Extended ACKs are optional
        socket.set_ext_ack(true).ok();

        tracing::debug!(pid, "netlink socket bound");

        Ok(Self {
            socket,
            seq: 1,
            pid,
            recv_buf: DEFAULT_RECV_BUF,
        })
    }

    /// Switch between blocking and non-blocking reads.
    pub fn set_non_blocking(&self, non_blocking: bool) -> Result<()> {
        self.socket.set_non_blocking(non_blocking)?;
        Ok(())
    }

    /// Fail blocking reads with `TimedOut` after `timeout`.
    pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let tv = match timeout {
            Some(t) => libc::timeval {
                tv_sec: t.as_secs() as libc::time_t,
                tv_usec: t.subsec_micros() as libc::suseconds_t,
            },
            None => libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };
        // SAFETY: the fd is owned by `self.socket` and `tv` outlives the call.
        let ret = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Kernel-side receive buffer size (SO_RCVBUF).
    pub fn set_rx_buf_size(&self, size: usize) -> Result<()> {
        let size = libc::c_int::try_from(size)
            .map_err(|_| Error::InvalidMessage(format!("receive buffer too large: {size}")))?;
        self.socket.set_rx_buf_sz(size)?;
        Ok(())
    }

    /// Kernel-side receive buffer size as reported by the kernel, which
    /// doubles the requested value.
    pub fn rx_buf_size(&self) -> Result<usize> {
        Ok(self.socket.get_rx_buf_sz()?)
    }

    /// Size of the userspace buffer each datagram is read into.
    pub fn set_recv_buf_len(&mut self, len: usize) {
        self.recv_buf = len;
    }

    fn recv_with(&self, flags: libc::c_int) -> io::Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.recv_buf);
        self.socket.recv(&mut buf, flags)?;
        Ok(buf.to_vec())
    }
}

impl Transport for NetlinkSocket {
    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1).max(1);
        seq
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.socket.send(msg, 0)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.recv_with(0) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return Ok(other?),
            }
        }
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
        match self.recv_with(libc::MSG_DONTWAIT) {
            Ok(data) => Ok(Some(data)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        self.socket.add_membership(group)?;
        Ok(())
    }

    fn drop_membership(&mut self, group: u32) -> Result<()> {
        self.socket.drop_membership(group)?;
        Ok(())
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// Multicast groups for NETLINK_ROUTE.
pub mod rtnetlink_groups {
    pub const RTNLGRP_MDB: u32 = 26;
    pub const RTNLGRP_BRVLAN: u32 = 33;
}
