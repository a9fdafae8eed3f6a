//! Length-prefixed message framing.
//!
//! Frame layout:
//!
//! ```text
//! +------------+------------------+-----------+-----------+-----------+
//! | header_len | MsgHeader_PI XML | msg       | error     | bs        |
//! | u32 (BE)   | header_len bytes | msgLen    | errorLen  | bsLen     |
//! +------------+------------------+-----------+-----------+-----------+
//! ```
//!
//! The header announces the length of every section, so a reader can
//! consume exactly one frame from a shared stream.

use crate::error::ProtocolError;
use crate::packing::PackedStruct;
use crate::{MAX_HEADER_SIZE, MAX_SECTION_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the big-endian header length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Message type tag carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Connect,
    Disconnect,
    ApiRequest,
    ApiReply,
    Version,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Connect => "RODS_CONNECT",
            MessageType::Disconnect => "RODS_DISCONNECT",
            MessageType::ApiRequest => "RODS_API_REQ",
            MessageType::ApiReply => "RODS_API_REPLY",
            MessageType::Version => "RODS_VERSION",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            "RODS_CONNECT" => Ok(MessageType::Connect),
            "RODS_DISCONNECT" => Ok(MessageType::Disconnect),
            "RODS_API_REQ" => Ok(MessageType::ApiRequest),
            "RODS_API_REPLY" => Ok(MessageType::ApiReply),
            "RODS_VERSION" => Ok(MessageType::Version),
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `MsgHeader_PI` preceding every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub msg_type: MessageType,
    pub msg_len: u32,
    pub error_len: u32,
    pub bs_len: u32,
    /// API number on requests, status on replies.
    pub int_info: i32,
}

impl MsgHeader {
    pub const NAME: &'static str = "MsgHeader_PI";

    pub fn to_struct(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME)
            .with_str("type", self.msg_type.as_str())
            .with_int("msgLen", self.msg_len.into())
            .with_int("errorLen", self.error_len.into())
            .with_int("bsLen", self.bs_len.into())
            .with_int("intInfo", self.int_info.into())
    }

    pub fn from_struct(s: &PackedStruct) -> Result<Self, ProtocolError> {
        if s.name() != Self::NAME {
            return Err(ProtocolError::UnexpectedStruct {
                expected: Self::NAME,
                actual: s.name().to_string(),
            });
        }
        Ok(Self {
            msg_type: MessageType::parse(s.str("type")?.trim())?,
            msg_len: section_len(s, "msgLen")?,
            error_len: section_len(s, "errorLen")?,
            bs_len: section_len(s, "bsLen")?,
            int_info: int_field(s, "intInfo")?,
        })
    }
}

fn int_field(s: &PackedStruct, field: &str) -> Result<i32, ProtocolError> {
    let value = s.int(field)?;
    i32::try_from(value).map_err(|_| ProtocolError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn section_len(s: &PackedStruct, field: &'static str) -> Result<u32, ProtocolError> {
    let value = s.int(field)?;
    let len = u32::try_from(value).map_err(|_| ProtocolError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    })?;
    if len > MAX_SECTION_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            section: field,
            size: len,
            max: MAX_SECTION_SIZE,
        });
    }
    Ok(len)
}

/// A raw frame: header fields plus the undecoded sections.
///
/// `int_info` is available before any section is interpreted, so a
/// negative status can be acted on without touching the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub int_info: i32,
    /// Packed body (`msg` section).
    pub msg: Bytes,
    /// Packed `RError_PI` (`error` section).
    pub error: Bytes,
    /// Raw byte stream (`bs` section).
    pub bs: Bytes,
}

impl Frame {
    pub fn new(msg_type: MessageType, int_info: i32) -> Self {
        Self {
            msg_type,
            int_info,
            msg: Bytes::new(),
            error: Bytes::new(),
            bs: Bytes::new(),
        }
    }

    fn checked_len(section: &'static str, bytes: &Bytes) -> Result<u32, ProtocolError> {
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        if len > MAX_SECTION_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                section,
                size: len,
                max: MAX_SECTION_SIZE,
            });
        }
        Ok(len)
    }

    pub fn header(&self) -> Result<MsgHeader, ProtocolError> {
        Ok(MsgHeader {
            msg_type: self.msg_type,
            msg_len: Self::checked_len("msgLen", &self.msg)?,
            error_len: Self::checked_len("errorLen", &self.error)?,
            bs_len: Self::checked_len("bsLen", &self.bs)?,
            int_info: self.int_info,
        })
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let header = self.header()?.to_struct().to_xml();
        let header_len = header.len() as u32;
        if header_len > MAX_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                section: "header",
                size: header_len,
                max: MAX_HEADER_SIZE,
            });
        }

        let total =
            LENGTH_PREFIX_SIZE + header.len() + self.msg.len() + self.error.len() + self.bs.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32(header_len);
        buf.put_slice(header.as_bytes());
        buf.put_slice(&self.msg);
        buf.put_slice(&self.error);
        buf.put_slice(&self.bs);
        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Bytes past the end of the frame are left in `buf`.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let header_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if header_len > MAX_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                section: "header",
                size: header_len,
                max: MAX_HEADER_SIZE,
            });
        }
        let header_end = LENGTH_PREFIX_SIZE + header_len as usize;
        if buf.len() < header_end {
            return Ok(None);
        }

        // Peek at the header without consuming
        let header = MsgHeader::from_struct(&PackedStruct::from_xml(
            &buf[LENGTH_PREFIX_SIZE..header_end],
        )?)?;

        let msg_len = header.msg_len as usize;
        let error_len = header.error_len as usize;
        let bs_len = header.bs_len as usize;
        let total = header_end + msg_len + error_len + bs_len;
        if buf.len() < total {
            return Ok(None);
        }

        buf.advance(header_end);
        let msg = buf.split_to(msg_len).freeze();
        let error = buf.split_to(error_len).freeze();
        let bs = buf.split_to(bs_len).freeze();

        Ok(Some(Self {
            msg_type: header.msg_type,
            int_info: header.int_info,
            msg,
            error,
            bs,
        }))
    }
}
