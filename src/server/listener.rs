use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::connection::{Connection, WriteStatus};
use crate::server::context::ServerContext;
use crate::server::poller::{Event, Events, Poller};

type SharedConnection = Arc<Mutex<Connection<TcpStream>>>;
type ConnectionTable = Arc<Mutex<HashMap<RawFd, SharedConnection>>>;

/// How long one wait may block before the shutdown flag is checked again.
const WAIT_TIMEOUT_MS: i32 = 500;

/// Stops a running [`Server::run`] loop.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Accept loop and readiness dispatcher.
///
/// The loop itself only accepts and routes events; reads, parsing and writes
/// run on the runtime's blocking pool.
pub struct Server {
    listener: TcpListener,
    poller: Arc<Poller>,
    ctx: Arc<ServerContext>,
    connections: ConnectionTable,
    max_connections: usize,
    max_events: usize,
    shutdown: Arc<AtomicBool>,
    workers: Handle,
}

impl Server {
    pub fn bind(cfg: &Config, workers: Handle) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.server.listen_addr)
            .with_context(|| format!("failed to bind {}", cfg.server.listen_addr))?;
        listener.set_nonblocking(true)?;

        let poller = Arc::new(Poller::new().context("failed to create epoll instance")?);
        poller.add_listener(listener.as_raw_fd())?;

        let ctx = Arc::new(ServerContext::new(
            poller.clone(),
            cfg.static_files.root.clone(),
            cfg.limits.clone(),
        ));

        info!(
            "Listening on {}, serving {}",
            listener.local_addr()?,
            cfg.static_files.root.display()
        );

        Ok(Self {
            listener,
            poller,
            ctx,
            connections: Arc::new(Mutex::new(HashMap::new())),
            max_connections: cfg.server.max_connections,
            max_events: cfg.server.max_events,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Runs until the shutdown handle fires. Blocks the calling thread.
    pub fn run(self) -> anyhow::Result<()> {
        let listen_fd = self.listener.as_raw_fd();
        let mut events = Events::with_capacity(self.max_events);

        while !self.shutdown.load(Ordering::Acquire) {
            self.poller
                .wait(&mut events, WAIT_TIMEOUT_MS)
                .context("epoll wait failed")?;

            for event in events.iter() {
                if event.fd == listen_fd {
                    self.accept_all();
                } else {
                    self.dispatch(event);
                }
            }
        }

        let remaining: Vec<SharedConnection> = lock(&self.connections)
            .drain()
            .map(|(_, conn)| conn)
            .collect();
        info!(connections = remaining.len(), "event loop stopped, closing connections");
        for conn in remaining {
            lock(&conn).close();
        }

        Ok(())
    }

    fn accept_all(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if self.ctx.live_connections() >= self.max_connections {
            warn!(%peer, limit = self.max_connections, "server busy, refusing connection");
            return;
        }

        match Connection::init(stream, peer, self.ctx.clone()) {
            Ok(conn) => {
                let fd = conn.fd();
                lock(&self.connections).insert(fd, Arc::new(Mutex::new(conn)));
                info!("Accepted connection from {}", peer);
            }
            Err(e) => warn!(%peer, error = %e, "failed to set up connection"),
        }
    }

    fn dispatch(&self, event: Event) {
        let Some(conn) = lock(&self.connections).get(&event.fd).cloned() else {
            debug!(fd = event.fd, "event for unknown descriptor");
            return;
        };
        let table = self.connections.clone();

        self.workers.spawn_blocking(move || {
            let mut conn = lock(&conn);
            let open = if event.hangup {
                debug!(fd = event.fd, "peer hung up");
                false
            } else if event.readable {
                on_readable(&mut conn)
            } else if event.writable {
                on_writable(&mut conn)
            } else {
                true
            };

            if !open {
                // Unlist before closing so the descriptor cannot be reused
                // while the table still points at this connection.
                lock(&table).remove(&event.fd);
                conn.close();
            }
        });
    }
}

fn on_readable(conn: &mut Connection<TcpStream>) -> bool {
    if let Err(e) = conn.read() {
        debug!(fd = conn.fd(), peer = %conn.peer(), error = %e, "closing after read");
        return false;
    }
    match conn.process() {
        Ok(progress) => {
            debug!(fd = conn.fd(), ?progress, "processed");
            true
        }
        Err(e) => {
            warn!(fd = conn.fd(), peer = %conn.peer(), error = %e, "closing after process");
            false
        }
    }
}

fn on_writable(conn: &mut Connection<TcpStream>) -> bool {
    match conn.write() {
        Ok(WriteStatus::Close) => false,
        Ok(_) => true,
        Err(e) => {
            warn!(fd = conn.fd(), peer = %conn.peer(), error = %e, "closing after write");
            false
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
