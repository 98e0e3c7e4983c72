//! Static file access
//!
//! Maps request paths onto the document root and exposes accepted files as
//! read-only memory mappings for zero-copy transmission.

pub mod mapping;
pub mod resolver;

pub use mapping::FileMapping;
pub use resolver::{Resolution, resolve};
