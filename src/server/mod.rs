//! Event-loop plumbing around the per-connection engine.

pub mod context;
pub mod listener;
pub mod poller;

pub use context::ServerContext;
pub use listener::{Server, ShutdownHandle};
pub use poller::{Interest, Poller, Readiness};
