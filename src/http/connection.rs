use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use crate::files;
use crate::http::parser::{ParseStage, Parser};
use crate::http::request::Request;
use crate::http::response::{BuildError, Outcome, StatusCode, build_response};
use crate::http::scanner::ReadBuffer;
use crate::http::writer::Outgoing;
use crate::server::context::ServerContext;
use crate::server::poller::Interest;

/// A non-blocking byte stream a connection can own.
pub trait Socket: Read + Write + AsRawFd + Send {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
}

/// Reasons a connection must be torn down.
#[derive(Debug)]
pub enum ConnectionError {
    /// The input buffer filled up before a request completed.
    BufferFull,
    /// The peer closed its end.
    PeerClosed,
    /// The connection was already closed.
    Closed,
    /// The response did not fit in the write buffer.
    Build(BuildError),
    Io(io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::BufferFull => write!(f, "read buffer is full"),
            ConnectionError::PeerClosed => write!(f, "peer closed the connection"),
            ConnectionError::Closed => write!(f, "connection already closed"),
            ConnectionError::Build(e) => write!(f, "failed to build response: {}", e),
            ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Build(e) => Some(e),
            ConnectionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<BuildError> for ConnectionError {
    fn from(e: BuildError) -> Self {
        ConnectionError::Build(e)
    }
}

/// What [`Connection::process`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The request is incomplete; re-armed for reading.
    NeedMoreData,
    /// A response is queued; re-armed for writing.
    ResponseReady(StatusCode),
}

/// What [`Connection::write`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The socket filled up; re-armed for writing, progress kept.
    Pending,
    /// Fully sent on a keep-alive connection; reset and re-armed for reading.
    KeepAlive,
    /// Fully sent and the client did not ask for keep-alive; close now.
    Close,
}

/// One accepted socket and everything needed to serve it.
///
/// Readiness is one-shot, so between re-arms exactly one worker can be
/// inside `read`/`process`/`write` for a given connection.
pub struct Connection<S: Socket> {
    stream: Option<S>,
    fd: RawFd,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    input: ReadBuffer,
    parser: Parser,
    output: Outgoing,
    keep_alive: bool,
}

impl<S: Socket> Connection<S> {
    /// Takes ownership of an accepted socket: non-blocking mode, one-shot
    /// read registration, and one more live connection on the counter.
    pub fn init(stream: S, peer: SocketAddr, ctx: Arc<ServerContext>) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let fd = stream.as_raw_fd();
        ctx.readiness().register(fd, Interest::Readable)?;
        let live = ctx.connection_opened();
        tracing::debug!(fd, %peer, live, "connection initialised");

        let limits = ctx.limits();
        let input = ReadBuffer::with_capacity(limits.read_buffer_size);
        let output = Outgoing::with_capacity(limits.write_buffer_size);

        Ok(Self {
            stream: Some(stream),
            fd,
            peer,
            ctx,
            input,
            parser: Parser::new(),
            output,
            keep_alive: false,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn stage(&self) -> ParseStage {
        self.parser.stage()
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Bytes sitting in the input buffer.
    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    /// Bytes of the queued response not yet accepted by the socket.
    pub fn pending_output(&self) -> usize {
        self.output.remaining()
    }

    pub fn has_file_mapping(&self) -> bool {
        self.output.has_file()
    }

    /// Deregisters, closes the socket and decrements the live counter.
    /// Only the first call does anything.
    pub fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        if let Err(e) = self.ctx.readiness().deregister(self.fd) {
            tracing::warn!(fd = self.fd, error = %e, "failed to deregister connection");
        }
        drop(stream);
        self.output.clear();

        let live = self.ctx.connection_closed();
        tracing::debug!(fd = self.fd, peer = %self.peer, live, "connection closed");
    }

    /// Clears buffers and parser state for the next request, keeping the socket.
    fn reset(&mut self) {
        self.input.reset();
        self.parser.reset();
        self.output.clear();
        self.keep_alive = false;
    }

    fn rearm(&self, interest: Interest) -> Result<(), ConnectionError> {
        self.ctx.readiness().rearm(self.fd, interest)?;
        Ok(())
    }

    /// Reads until the socket has nothing more right now.
    ///
    /// Returns the number of bytes added to the input buffer.
    pub fn read(&mut self) -> Result<usize, ConnectionError> {
        if self.input.is_full() {
            return Err(ConnectionError::BufferFull);
        }
        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;

        let mut total = 0;
        loop {
            let spare = self.input.spare_mut();
            if spare.is_empty() {
                break;
            }
            match stream.read(spare) {
                Ok(0) => return Err(ConnectionError::PeerClosed),
                Ok(n) => {
                    self.input.advance(n);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        tracing::trace!(fd = self.fd, bytes = total, buffered = self.input.len(), "read");
        Ok(total)
    }

    /// Parses what has been read and, once a request is complete, resolves
    /// it and queues the response.
    ///
    /// A build error leaves nothing queued; the caller must close.
    pub fn process(&mut self) -> Result<Progress, ConnectionError> {
        let outcome = match self.parser.parse(&mut self.input) {
            // A full buffer can never complete the head.
            Ok(None) if self.input.is_full() => {
                tracing::debug!(fd = self.fd, peer = %self.peer, "request head exceeds read buffer");
                self.keep_alive = false;
                Outcome::BadRequest
            }
            Ok(None) => {
                self.rearm(Interest::Readable)?;
                return Ok(Progress::NeedMoreData);
            }
            Ok(Some(request)) => {
                self.keep_alive = request.keep_alive;
                self.resolve(&request)
            }
            Err(e) => {
                tracing::debug!(fd = self.fd, peer = %self.peer, error = ?e, "bad request");
                self.keep_alive = self.parser.keep_alive();
                Outcome::BadRequest
            }
        };

        let limit = self.ctx.limits().write_buffer_size;
        let status = build_response(&mut self.output, outcome, self.keep_alive, limit)?;
        self.rearm(Interest::Writable)?;

        Ok(Progress::ResponseReady(status))
    }

    fn resolve(&self, request: &Request) -> Outcome {
        tracing::debug!(
            fd = self.fd,
            path = %request.path,
            host = request.host.as_deref().unwrap_or("-"),
            keep_alive = request.keep_alive,
            "request complete"
        );
        let max_path_len = self.ctx.limits().max_path_len;
        files::resolve(self.ctx.doc_root(), &request.path, max_path_len).into()
    }

    /// Sends the queued segments until done or until the socket is full.
    pub fn write(&mut self) -> Result<WriteStatus, ConnectionError> {
        if self.stream.is_none() {
            return Err(ConnectionError::Closed);
        }

        if self.output.is_empty() {
            self.reset();
            self.rearm(Interest::Readable)?;
            return Ok(WriteStatus::KeepAlive);
        }

        while !self.output.is_complete() {
            let Some(stream) = self.stream.as_mut() else {
                return Err(ConnectionError::Closed);
            };
            match self.output.send_to(stream) {
                Ok(0) => {
                    self.output.release_file();
                    return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.rearm(Interest::Writable)?;
                    return Ok(WriteStatus::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.output.release_file();
                    return Err(e.into());
                }
            }
        }

        self.output.release_file();
        if self.keep_alive {
            self.reset();
            self.rearm(Interest::Readable)?;
            Ok(WriteStatus::KeepAlive)
        } else {
            Ok(WriteStatus::Close)
        }
    }
}

impl<S: Socket> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}
