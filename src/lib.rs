//! Lantern - event-driven static file server
//!
//! Core library for the per-connection HTTP engine and its event-loop driver.

pub mod config;
pub mod files;
pub mod http;
pub mod server;
