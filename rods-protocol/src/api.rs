//! API numbers carried in the `intInfo` of `RODS_API_REQ` messages.

use std::fmt;

/// Server procedures invoked by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiNumber {
    DataObjCreate,
    DataObjOpen,
    DataObjUnlink,
    DataObjClose,
    DataObjLseek,
    DataObjRead,
    DataObjWrite,
    GenQuery,
    AuthRequest,
    AuthResponse,
    ModAvuMetadata,
}

impl ApiNumber {
    pub fn code(&self) -> i32 {
        match self {
            ApiNumber::DataObjCreate => 601,
            ApiNumber::DataObjOpen => 602,
            ApiNumber::DataObjUnlink => 615,
            ApiNumber::DataObjClose => 673,
            ApiNumber::DataObjLseek => 674,
            ApiNumber::DataObjRead => 675,
            ApiNumber::DataObjWrite => 676,
            ApiNumber::GenQuery => 702,
            ApiNumber::AuthRequest => 703,
            ApiNumber::AuthResponse => 704,
            ApiNumber::ModAvuMetadata => 706,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let api = match code {
            601 => ApiNumber::DataObjCreate,
            602 => ApiNumber::DataObjOpen,
            615 => ApiNumber::DataObjUnlink,
            673 => ApiNumber::DataObjClose,
            674 => ApiNumber::DataObjLseek,
            675 => ApiNumber::DataObjRead,
            676 => ApiNumber::DataObjWrite,
            702 => ApiNumber::GenQuery,
            703 => ApiNumber::AuthRequest,
            704 => ApiNumber::AuthResponse,
            706 => ApiNumber::ModAvuMetadata,
            _ => return None,
        };
        Some(api)
    }
}

impl fmt::Display for ApiNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiNumber::DataObjCreate => "DATA_OBJ_CREATE_AN",
            ApiNumber::DataObjOpen => "DATA_OBJ_OPEN_AN",
            ApiNumber::DataObjUnlink => "DATA_OBJ_UNLINK_AN",
            ApiNumber::DataObjClose => "DATA_OBJ_CLOSE_AN",
            ApiNumber::DataObjLseek => "DATA_OBJ_LSEEK_AN",
            ApiNumber::DataObjRead => "DATA_OBJ_READ_AN",
            ApiNumber::DataObjWrite => "DATA_OBJ_WRITE_AN",
            ApiNumber::GenQuery => "GEN_QUERY_AN",
            ApiNumber::AuthRequest => "AUTH_REQUEST_AN",
            ApiNumber::AuthResponse => "AUTH_RESPONSE_AN",
            ApiNumber::ModAvuMetadata => "MOD_AVU_METADATA_AN",
        };
        write!(f, "{}({})", name, self.code())
    }
}
