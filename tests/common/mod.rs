#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, IoSlice, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::{Arc, Mutex};

use lantern::config::Limits;
use lantern::http::connection::{Connection, Socket};
use lantern::server::{Interest, Readiness, ServerContext};

/// Scripted peer state shared between a test and its `MockSocket`.
#[derive(Default)]
pub struct Wire {
    pub inbound: VecDeque<Vec<u8>>,
    pub peer_closed: bool,
    pub outbound: Vec<u8>,
    /// Bytes the socket will still accept; `None` means unlimited.
    pub write_budget: Option<usize>,
    pub nonblocking: bool,
}

#[derive(Clone)]
pub struct MockSocket {
    fd: RawFd,
    pub wire: Arc<Mutex<Wire>>,
}

impl MockSocket {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            wire: Arc::new(Mutex::new(Wire::default())),
        }
    }

    pub fn push(&self, bytes: &[u8]) {
        self.wire.lock().unwrap().inbound.push_back(bytes.to_vec());
    }

    pub fn close_peer(&self) {
        self.wire.lock().unwrap().peer_closed = true;
    }

    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.wire.lock().unwrap().write_budget = budget;
    }

    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.wire.lock().unwrap().outbound)
    }
}

impl Read for MockSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        let Some(mut chunk) = wire.inbound.pop_front() else {
            if wire.peer_closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            wire.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for MockSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_vectored(&[IoSlice::new(buf)])
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        let wanted: usize = bufs.iter().map(|b| b.len()).sum();
        let allowed = wire.write_budget.map_or(wanted, |budget| budget.min(wanted));
        if allowed == 0 && wanted > 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let mut left = allowed;
        for buf in bufs {
            let n = buf.len().min(left);
            wire.outbound.extend_from_slice(&buf[..n]);
            left -= n;
        }
        if let Some(budget) = wire.write_budget.as_mut() {
            *budget -= allowed;
        }
        Ok(allowed)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for MockSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Socket for MockSocket {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.wire.lock().unwrap().nonblocking = nonblocking;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Register(Interest),
    Rearm(Interest),
    Deregister,
}

/// Records every readiness call instead of talking to the kernel.
#[derive(Default)]
pub struct RecordingReadiness {
    calls: Mutex<Vec<(RawFd, Call)>>,
}

impl RecordingReadiness {
    pub fn calls(&self) -> Vec<(RawFd, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Call> {
        self.calls.lock().unwrap().last().map(|(_, call)| *call)
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| *c == call)
            .count()
    }
}

impl Readiness for RecordingReadiness {
    fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.calls.lock().unwrap().push((fd, Call::Register(interest)));
        Ok(())
    }

    fn rearm(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.calls.lock().unwrap().push((fd, Call::Rearm(interest)));
        Ok(())
    }

    fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.calls.lock().unwrap().push((fd, Call::Deregister));
        Ok(())
    }
}

pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

pub fn context_with(root: &Path, limits: Limits) -> (Arc<ServerContext>, Arc<RecordingReadiness>) {
    let readiness = Arc::new(RecordingReadiness::default());
    let ctx = Arc::new(ServerContext::new(readiness.clone(), root, limits));
    (ctx, readiness)
}

pub fn context(root: &Path) -> (Arc<ServerContext>, Arc<RecordingReadiness>) {
    let limits = Limits {
        max_path_len: 4096,
        ..Limits::default()
    };
    context_with(root, limits)
}

pub fn connect(ctx: &Arc<ServerContext>, fd: RawFd) -> (Connection<MockSocket>, MockSocket) {
    let socket = MockSocket::new(fd);
    let conn = Connection::init(socket.clone(), peer(), ctx.clone()).unwrap();
    (conn, socket)
}

/// Writes `contents` under `root` with world-readable permissions.
pub fn write_file(root: &Path, name: &str, contents: &[u8]) {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join(name);
    std::fs::write(&path, contents).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
}
