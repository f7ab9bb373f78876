#![cfg_attr(test, allow(clippy::disallowed_methods, clippy::expect_used))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! Embeddable B+tree string index.
//!
//! Maps string keys to string values in a B+tree whose nodes live as
//! fixed-size records in a pluggable byte store:
//!
//! - [`store`]: the byte store contract, with memory and file backends
//! - [`index`]: node records, the global header and the index manager
//! - [`shared`]: a thread-safe handle (many readers, one writer)
//! - [`config`]: settings for the command-line tool

pub mod config;
pub mod index;
pub mod shared;
pub mod store;

pub use index::{Index, IndexError, IndexOptions};
pub use shared::SharedIndex;
pub use store::{ByteStore, FileStore, MemoryStore, StoreError};
