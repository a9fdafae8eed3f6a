//! # rods-client
//!
//! Client library for the iRODS catalog RPC protocol.
//!
//! This crate provides:
//! - Async TCP connection with startup negotiation and orderly disconnect
//! - Lazy challenge/response authentication
//! - A strictly sequential RPC invoker that maps server status codes to typed errors
//! - General queries, collection and data object lookup, descriptor I/O and AVU metadata
//!
//! A [`Session`] owns exactly one connection. Every operation holds the
//! session lock across its request/response exchange, so calls from several
//! tasks are serialized and never interleave on the wire.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod meta;
pub mod objects;
pub mod query;
pub mod rpc;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::AuthState;
pub use config::{ConfigError, SessionConfig};
pub use connection::Connection;
pub use error::ClientError;
pub use meta::{AvuEntry, MetaTarget};
pub use objects::{Collection, DataObject};
pub use query::{Query, QueryBuilder, ResultSet, Row};
pub use session::{Descriptor, OpenMode, Session, Whence};
