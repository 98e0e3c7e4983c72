use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Limits;
use crate::server::poller::Readiness;

/// State shared by every connection of one server instance.
pub struct ServerContext {
    readiness: Arc<dyn Readiness>,
    live_connections: AtomicUsize,
    doc_root: PathBuf,
    limits: Limits,
}

impl ServerContext {
    pub fn new(readiness: Arc<dyn Readiness>, doc_root: impl Into<PathBuf>, limits: Limits) -> Self {
        Self {
            readiness,
            live_connections: AtomicUsize::new(0),
            doc_root: doc_root.into(),
            limits,
        }
    }

    pub fn readiness(&self) -> &dyn Readiness {
        self.readiness.as_ref()
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn live_connections(&self) -> usize {
        self.live_connections.load(Ordering::Acquire)
    }

    /// Returns the count including the new connection.
    pub(crate) fn connection_opened(&self) -> usize {
        self.live_connections.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count after the close.
    pub(crate) fn connection_closed(&self) -> usize {
        self.live_connections.fetch_sub(1, Ordering::AcqRel) - 1
    }
}
