//! Protocol error types and server status codes.

use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing or body handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{section} too large: {size} bytes (max {max})")]
    FrameTooLarge {
        section: &'static str,
        size: u32,
        max: u32,
    },

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("invalid UTF-8 in message section")]
    InvalidUtf8,

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for field {field}: {value:?}")]
    InvalidField { field: String, value: String },

    #[error("expected {expected}, got {actual}")]
    UnexpectedStruct {
        expected: &'static str,
        actual: String,
    },

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Error kinds reported by the server through a negative `intInfo`.
///
/// Server codes are multiples of 1000; the last three digits may carry a
/// Unix errno (`-310002` is `USER_FILE_DOES_NOT_EXIST` with `ENOENT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SysUnmatchedApiNum,
    SysInvalidInputParam,
    UserFileDoesNotExist,
    OverwriteWithoutForceFlag,
    SysFileDescOutOfRange,
    SysNoApiPriv,
    CatSqlErr,
    CatNoRowsFound,
    CatNameExistsAsCollection,
    CatNameExistsAsDataObj,
    CatUnknownCollection,
    CatInvalidArgument,
    CatUnknownFile,
    CatNoAccessPermission,
    CatCollectionNotEmpty,
    CatInvalidAuthentication,
    CatInvalidUser,
    /// A negative code missing from the table, kept verbatim.
    Unrecognized(i32),
}

impl ErrorKind {
    /// Maps a negative status code to its error kind.
    ///
    /// Tries the exact code first, then the code with its errno suffix
    /// stripped. Anything else is `Unrecognized` with the raw code.
    pub fn from_code(code: i32) -> Self {
        if let Some(kind) = Self::lookup(code) {
            return kind;
        }
        let base = code - code % 1000;
        Self::lookup(base).unwrap_or(ErrorKind::Unrecognized(code))
    }

    fn lookup(code: i32) -> Option<Self> {
        let kind = match code {
            -12000 => ErrorKind::SysUnmatchedApiNum,
            -130000 => ErrorKind::SysInvalidInputParam,
            -310000 => ErrorKind::UserFileDoesNotExist,
            -312000 => ErrorKind::OverwriteWithoutForceFlag,
            -345000 => ErrorKind::SysFileDescOutOfRange,
            -350000 => ErrorKind::SysNoApiPriv,
            -806000 => ErrorKind::CatSqlErr,
            -808000 => ErrorKind::CatNoRowsFound,
            -809000 => ErrorKind::CatNameExistsAsCollection,
            -812000 => ErrorKind::CatNameExistsAsDataObj,
            -814000 => ErrorKind::CatUnknownCollection,
            -816000 => ErrorKind::CatInvalidArgument,
            -817000 => ErrorKind::CatUnknownFile,
            -818000 => ErrorKind::CatNoAccessPermission,
            -821000 => ErrorKind::CatCollectionNotEmpty,
            -826000 => ErrorKind::CatInvalidAuthentication,
            -827000 => ErrorKind::CatInvalidUser,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the canonical (errno-free) status code of this kind.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::SysUnmatchedApiNum => -12000,
            ErrorKind::SysInvalidInputParam => -130000,
            ErrorKind::UserFileDoesNotExist => -310000,
            ErrorKind::OverwriteWithoutForceFlag => -312000,
            ErrorKind::SysFileDescOutOfRange => -345000,
            ErrorKind::SysNoApiPriv => -350000,
            ErrorKind::CatSqlErr => -806000,
            ErrorKind::CatNoRowsFound => -808000,
            ErrorKind::CatNameExistsAsCollection => -809000,
            ErrorKind::CatNameExistsAsDataObj => -812000,
            ErrorKind::CatUnknownCollection => -814000,
            ErrorKind::CatInvalidArgument => -816000,
            ErrorKind::CatUnknownFile => -817000,
            ErrorKind::CatNoAccessPermission => -818000,
            ErrorKind::CatCollectionNotEmpty => -821000,
            ErrorKind::CatInvalidAuthentication => -826000,
            ErrorKind::CatInvalidUser => -827000,
            ErrorKind::Unrecognized(code) => *code,
        }
    }

    /// Returns the server's symbolic name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::SysUnmatchedApiNum => "SYS_UNMATCHED_API_NUM",
            ErrorKind::SysInvalidInputParam => "SYS_INVALID_INPUT_PARAM",
            ErrorKind::UserFileDoesNotExist => "USER_FILE_DOES_NOT_EXIST",
            ErrorKind::OverwriteWithoutForceFlag => "OVERWRITE_WITHOUT_FORCE_FLAG",
            ErrorKind::SysFileDescOutOfRange => "SYS_FILE_DESC_OUT_OF_RANGE",
            ErrorKind::SysNoApiPriv => "SYS_NO_API_PRIV",
            ErrorKind::CatSqlErr => "CAT_SQL_ERR",
            ErrorKind::CatNoRowsFound => "CAT_NO_ROWS_FOUND",
            ErrorKind::CatNameExistsAsCollection => "CAT_NAME_EXISTS_AS_COLLECTION",
            ErrorKind::CatNameExistsAsDataObj => "CAT_NAME_EXISTS_AS_DATAOBJ",
            ErrorKind::CatUnknownCollection => "CAT_UNKNOWN_COLLECTION",
            ErrorKind::CatInvalidArgument => "CAT_INVALID_ARGUMENT",
            ErrorKind::CatUnknownFile => "CAT_UNKNOWN_FILE",
            ErrorKind::CatNoAccessPermission => "CAT_NO_ACCESS_PERMISSION",
            ErrorKind::CatCollectionNotEmpty => "CAT_COLLECTION_NOT_EMPTY",
            ErrorKind::CatInvalidAuthentication => "CAT_INVALID_AUTHENTICATION",
            ErrorKind::CatInvalidUser => "CAT_INVALID_USER",
            ErrorKind::Unrecognized(_) => "UNRECOGNIZED_SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unrecognized(code) => write!(f, "UNRECOGNIZED_SERVER_ERROR({})", code),
            kind => f.write_str(kind.name()),
        }
    }
}

/// Extracts the errno carried in the last three digits of a status code.
pub fn errno(code: i32) -> i32 {
    -(code % 1000)
}
