//! Readiness notification.
//!
//! Connection sockets are registered edge-triggered and one-shot: after an
//! event fires the descriptor stays silent until it is explicitly re-armed.
//! This is what keeps two workers from ever touching the same connection.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, c_int};

/// Which readiness a connection waits for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// Register/re-arm/deregister contract consumed by connections.
pub trait Readiness: Send + Sync {
    /// Adds `fd`, armed once for `interest`.
    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()>;
    /// Arms `fd` again after its previous event fired.
    fn rearm(&self, fd: RawFd, interest: Interest) -> io::Result<()>;
    /// Removes `fd`. Removing an unknown descriptor is not an error.
    fn deregister(&self, fd: RawFd) -> io::Result<()>;
}

/// One readiness event, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// Peer hang-up, half-close or a socket error.
    pub hangup: bool,
}

/// Reusable buffer for [`Poller::wait`].
pub struct Events {
    raw: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.raw[..self.len].iter().map(|raw| {
            // copy out of the (possibly packed) kernel struct
            let flags = raw.events as c_int;
            let token = raw.u64;
            Event {
                fd: token as RawFd,
                readable: flags & EPOLLIN != 0,
                writable: flags & EPOLLOUT != 0,
                hangup: flags & (EPOLLRDHUP | EPOLLHUP | EPOLLERR) != 0,
            }
        })
    }
}

/// `epoll` instance shared by the event loop and every connection.
pub struct Poller {
    fd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Listening sockets stay level-triggered and permanently armed.
    pub fn add_listener(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, EPOLLIN)
    }

    /// Waits up to `timeout_ms` and returns the number of events stored.
    /// An interrupted wait reports zero events.
    pub fn wait(&self, events: &mut Events, timeout_ms: i32) -> io::Result<usize> {
        let res = unsafe {
            libc::epoll_wait(
                self.fd,
                events.raw.as_mut_ptr(),
                events.raw.len() as c_int,
                timeout_ms,
            )
        };

        if res < 0 {
            let err = io::Error::last_os_error();
            events.len = 0;
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        events.len = res as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: c_int, fd: RawFd, flags: c_int) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: flags as u32,
            u64: fd as u64,
        };
        if unsafe { libc::epoll_ctl(self.fd, op, fd, &mut event) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn connection_flags(interest: Interest) -> c_int {
    let base = match interest {
        Interest::Readable => EPOLLIN,
        Interest::Writable => EPOLLOUT,
    };
    base | EPOLLET | EPOLLONESHOT | EPOLLRDHUP
}

impl Readiness for Poller {
    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, connection_flags(interest))
    }

    fn rearm(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, connection_flags(interest))
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        if unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) } < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
