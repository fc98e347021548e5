//! Data-access core of a Redis desktop browser.
//!
//! A [`RedisClient`] owns one lazily opened connection (through
//! [`ConnectionManager`]) and exposes cursor-paged views of the keyspace,
//! hashes, sets and sorted sets, offset-paged lists, and the per-type edits
//! a browser needs. Everything is async on tokio; [`runtime::block_on`]
//! bridges to a synchronous UI thread.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod page;
pub mod resp;
pub mod runtime;
pub mod scan;

#[cfg(test)]
pub(crate) mod fake;

pub use client::RedisClient;
pub use config::ConnectionConfig;
pub use error::{Error, RedisErrorKind, Result};
pub use manager::{ConnectionManager, ConnectionState, ConnectionStatus, Execute, Notifier};
pub use page::{KeyDescriptor, KeyType, ListPage, Page, PageRequest, DEFAULT_PAGE_SIZE};
