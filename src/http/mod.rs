//! HTTP protocol implementation.
//!
//! This module implements the per-connection HTTP/1.1 engine: parsing
//! requests out of a fixed input buffer, resolving them to files, and
//! sending framed responses with scatter-gather writes.
//!
//! # Architecture
//!
//! - **`scanner`**: Finds CRLF/LF-terminated lines in place
//! - **`parser`**: Request-line / headers / body state machine
//! - **`request`**: Parsed request head
//! - **`response`**: Status codes, canned pages and the bounded response builder
//! - **`writer`**: Header + file-mapping segments and resumable vectored sends
//! - **`connection`**: Sequences read → parse → resolve → build → write
//!
//! # Connection Cycle
//!
//! ```text
//!        ┌─────────────┐
//!        │    read     │ ← readable event (one-shot)
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐  incomplete
//!        │   process   │ ───────────→ re-arm readable
//!        └──────┬──────┘
//!               │ response queued → re-arm writable
//!               ▼
//!        ┌─────────────┐  socket full
//!        │    write    │ ───────────→ re-arm writable
//!        └──────┬──────┘
//!               ├─ Keep-Alive → reset, re-arm readable
//!               └─ Close → teardown
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod scanner;
pub mod writer;
