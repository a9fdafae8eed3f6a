//! # rods-protocol
//!
//! Wire protocol implementation for the iRODS catalog RPC protocol.
//!
//! This crate provides:
//! - Length-prefixed message framing (`MsgHeader_PI` + body, error and byte-stream sections)
//! - XML packing-instruction bodies and their typed counterparts
//! - API numbers and the status-code to error-kind table
//! - The catalog column registry used to build general queries

pub mod api;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod packing;

pub use api::ApiNumber;
pub use catalog::{Column, Entity};
pub use codec::{Decoder, Encoder};
pub use error::{ErrorKind, ProtocolError};
pub use frame::{Frame, MessageType, MsgHeader};
pub use message::{Message, Pack};
pub use packing::{PackedStruct, Value};

/// Default port for the catalog server.
pub const DEFAULT_PORT: u16 = 1247;

/// `irodsProt` value announcing the XML packing protocol.
pub const XML_PROTOCOL: i64 = 1;

/// Release version sent in the startup pack.
pub const RELEASE_VERSION: &str = "rods4.3.0";

/// API version sent in the startup pack.
pub const API_VERSION: &str = "d";

/// Fixed width of the password buffer fed into the challenge digest.
pub const MAX_PASSWORD_LENGTH: usize = 50;

/// Maximum size of the XML message header (1 KiB).
pub const MAX_HEADER_SIZE: u32 = 1024;

/// Maximum size of any single message section (64 MiB).
pub const MAX_SECTION_SIZE: u32 = 64 * 1024 * 1024;
