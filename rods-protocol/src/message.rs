//! Message envelope and typed packing-instruction bodies.

use crate::error::ProtocolError;
use crate::frame::{Frame, MessageType};
use crate::packing::PackedStruct;
use crate::{API_VERSION, RELEASE_VERSION, XML_PROTOCOL};
use bytes::Bytes;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    /// API number on requests; status (or a result such as a descriptor)
    /// on replies.
    pub int_info: i32,
    pub body: Option<PackedStruct>,
    pub error: Option<PackedStruct>,
    pub bs: Bytes,
}

impl Message {
    pub fn new(msg_type: MessageType, int_info: i32) -> Self {
        Self {
            msg_type,
            int_info,
            body: None,
            error: None,
            bs: Bytes::new(),
        }
    }

    /// Creates an API request for the given procedure.
    pub fn api_request(api: crate::ApiNumber) -> Self {
        Self::new(MessageType::ApiRequest, api.code())
    }

    pub fn connect(startup: &StartupPack) -> Self {
        Self::new(MessageType::Connect, 0).with_body(startup.pack())
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect, 0)
    }

    pub fn with_body(mut self, body: PackedStruct) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_error(mut self, error: PackedStruct) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_bs(mut self, bs: impl Into<Bytes>) -> Self {
        self.bs = bs.into();
        self
    }

    /// Returns the body, or `MissingField` naming the expected struct.
    pub fn require_body(&self, expected: &'static str) -> Result<&PackedStruct, ProtocolError> {
        self.body
            .as_ref()
            .ok_or_else(|| ProtocolError::MissingField(expected.to_string()))
    }

    /// Unpacks the body into a typed struct.
    pub fn unpack_body<T: Pack>(&self) -> Result<T, ProtocolError> {
        T::unpack(self.require_body(T::NAME)?)
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            msg_type: self.msg_type,
            int_info: self.int_info,
            msg: self
                .body
                .as_ref()
                .map(|b| Bytes::from(b.to_xml()))
                .unwrap_or_default(),
            error: self
                .error
                .as_ref()
                .map(|e| Bytes::from(e.to_xml()))
                .unwrap_or_default(),
            bs: self.bs.clone(),
        }
    }
}

impl TryFrom<Frame> for Message {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let body = parse_section(&frame.msg)?;
        let error = parse_section(&frame.error)?;
        Ok(Self {
            msg_type: frame.msg_type,
            int_info: frame.int_info,
            body,
            error,
            bs: frame.bs,
        })
    }
}

fn parse_section(bytes: &[u8]) -> Result<Option<PackedStruct>, ProtocolError> {
    if bytes.iter().all(|b| *b == 0 || b.is_ascii_whitespace()) {
        return Ok(None);
    }
    PackedStruct::from_xml(bytes).map(Some)
}

/// Conversion between a typed body and its packing instruction.
pub trait Pack: Sized {
    /// Packing-instruction name, e.g. `DataObjInp_PI`.
    const NAME: &'static str;

    fn pack(&self) -> PackedStruct;

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError>;
}

fn expect_name<T: Pack>(s: &PackedStruct) -> Result<(), ProtocolError> {
    if s.name() == T::NAME {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedStruct {
            expected: T::NAME,
            actual: s.name().to_string(),
        })
    }
}

fn int32(s: &PackedStruct, field: &str) -> Result<i32, ProtocolError> {
    let value = s.int(field)?;
    i32::try_from(value).map_err(|_| ProtocolError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    })
}

// ============================================================================
// Connection setup
// ============================================================================

/// Startup announcement sent with `RODS_CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupPack {
    pub reconnect: bool,
    pub connect_count: i64,
    pub proxy_user: String,
    pub proxy_zone: String,
    pub client_user: String,
    pub client_zone: String,
    pub rel_version: String,
    pub api_version: String,
    pub option: String,
}

impl StartupPack {
    /// Announces `user#zone` acting on its own behalf.
    pub fn new(user: impl Into<String>, zone: impl Into<String>) -> Self {
        let user = user.into();
        let zone = zone.into();
        Self {
            reconnect: false,
            connect_count: 0,
            proxy_user: user.clone(),
            proxy_zone: zone.clone(),
            client_user: user,
            client_zone: zone,
            rel_version: RELEASE_VERSION.to_string(),
            api_version: API_VERSION.to_string(),
            option: String::new(),
        }
    }
}

impl Pack for StartupPack {
    const NAME: &'static str = "StartupPack_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME)
            .with_int("irodsProt", XML_PROTOCOL)
            .with_int("reconnFlag", i64::from(self.reconnect))
            .with_int("connectCnt", self.connect_count)
            .with_str("proxyUser", self.proxy_user.as_str())
            .with_str("proxyRcatZone", self.proxy_zone.as_str())
            .with_str("clientUser", self.client_user.as_str())
            .with_str("clientRcatZone", self.client_zone.as_str())
            .with_str("relVersion", self.rel_version.as_str())
            .with_str("apiVersion", self.api_version.as_str())
            .with_str("option", self.option.as_str())
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            reconnect: s.int("reconnFlag")? != 0,
            connect_count: s.int("connectCnt")?,
            proxy_user: s.str("proxyUser")?.to_string(),
            proxy_zone: s.str("proxyRcatZone")?.to_string(),
            client_user: s.str("clientUser")?.to_string(),
            client_zone: s.str("clientRcatZone")?.to_string(),
            rel_version: s.str("relVersion")?.to_string(),
            api_version: s.str("apiVersion")?.to_string(),
            option: s.str("option")?.to_string(),
        })
    }
}

/// Version acknowledgement returned for `RODS_CONNECT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub status: i32,
    pub rel_version: String,
    pub api_version: String,
    pub reconn_port: i32,
    pub reconn_addr: String,
    pub cookie: i32,
}

impl Pack for VersionInfo {
    const NAME: &'static str = "Version_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME)
            .with_int("status", self.status.into())
            .with_str("relVersion", self.rel_version.as_str())
            .with_str("apiVersion", self.api_version.as_str())
            .with_int("reconnPort", self.reconn_port.into())
            .with_str("reconnAddr", self.reconn_addr.as_str())
            .with_int("cookie", self.cookie.into())
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            status: int32(s, "status")?,
            rel_version: s.str("relVersion")?.to_string(),
            api_version: s.str("apiVersion")?.to_string(),
            reconn_port: int32(s, "reconnPort").unwrap_or(0),
            reconn_addr: s.str("reconnAddr").unwrap_or_default().to_string(),
            cookie: int32(s, "cookie").unwrap_or(0),
        })
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Challenge returned for `AUTH_REQUEST_AN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub challenge: Vec<u8>,
}

impl Pack for AuthChallenge {
    const NAME: &'static str = "authRequestOut_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME).with_bin("challenge", &self.challenge)
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            challenge: s.bin("challenge")?,
        })
    }
}

/// Digest and identity sent with `AUTH_RESPONSE_AN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub response: Vec<u8>,
    pub username: String,
}

impl Pack for AuthResponse {
    const NAME: &'static str = "authResponseInp_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME)
            .with_bin("response", &self.response)
            .with_str("username", self.username.as_str())
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            response: s.bin("response")?,
            username: s.str("username")?.to_string(),
        })
    }
}

// ============================================================================
// Data objects
// ============================================================================

/// Keyword/value list attached to most requests as `condInput`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValPair {
    pub pairs: Vec<(String, String)>,
}

impl KeyValPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Pack for KeyValPair {
    const NAME: &'static str = "KeyValPair_PI";

    fn pack(&self) -> PackedStruct {
        let mut s = PackedStruct::new(Self::NAME);
        s.push_int("ssLen", self.pairs.len() as i64);
        for (key, _) in &self.pairs {
            s.push_str("keyWord", key.as_str());
        }
        for (_, value) in &self.pairs {
            s.push_str("svalue", value.as_str());
        }
        s
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        let pairs = s
            .strs("keyWord")
            .zip(s.strs("svalue"))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(Self { pairs })
    }
}

/// Path-addressed data object request (create, open, unlink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjInp {
    pub obj_path: String,
    pub create_mode: i32,
    pub open_flags: i32,
    pub offset: i64,
    pub data_size: i64,
    pub num_threads: i32,
    pub opr_type: i32,
    pub cond_input: KeyValPair,
}

impl DataObjInp {
    pub fn new(obj_path: impl Into<String>) -> Self {
        Self {
            obj_path: obj_path.into(),
            create_mode: 0,
            open_flags: 0,
            offset: 0,
            data_size: -1,
            num_threads: 0,
            opr_type: 0,
            cond_input: KeyValPair::new(),
        }
    }
}

impl Pack for DataObjInp {
    const NAME: &'static str = "DataObjInp_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME)
            .with_str("objPath", self.obj_path.as_str())
            .with_int("createMode", self.create_mode.into())
            .with_int("openFlags", self.open_flags.into())
            .with_int("offset", self.offset)
            .with_int("dataSize", self.data_size)
            .with_int("numThreads", self.num_threads.into())
            .with_int("oprType", self.opr_type.into())
            .with_struct(self.cond_input.pack())
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            obj_path: s.str("objPath")?.to_string(),
            create_mode: int32(s, "createMode")?,
            open_flags: int32(s, "openFlags")?,
            offset: s.int("offset")?,
            data_size: s.int("dataSize")?,
            num_threads: int32(s, "numThreads")?,
            opr_type: int32(s, "oprType")?,
            cond_input: KeyValPair::unpack(s.child(KeyValPair::NAME)?)?,
        })
    }
}

/// Descriptor-addressed request (read, write, seek, close).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDataObjInp {
    pub l1_desc_inx: i32,
    pub len: i32,
    pub whence: i32,
    pub opr_type: i32,
    pub offset: i64,
    pub bytes_written: i64,
    pub cond_input: KeyValPair,
}

impl OpenedDataObjInp {
    pub fn new(l1_desc_inx: i32) -> Self {
        Self {
            l1_desc_inx,
            len: 0,
            whence: 0,
            opr_type: 0,
            offset: 0,
            bytes_written: 0,
            cond_input: KeyValPair::new(),
        }
    }
}

impl Pack for OpenedDataObjInp {
    const NAME: &'static str = "OpenedDataObjInp_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME)
            .with_int("l1descInx", self.l1_desc_inx.into())
            .with_int("len", self.len.into())
            .with_int("whence", self.whence.into())
            .with_int("oprType", self.opr_type.into())
            .with_int("offset", self.offset)
            .with_int("bytesWritten", self.bytes_written)
            .with_struct(self.cond_input.pack())
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            l1_desc_inx: int32(s, "l1descInx")?,
            len: int32(s, "len")?,
            whence: int32(s, "whence")?,
            opr_type: int32(s, "oprType")?,
            offset: s.int("offset")?,
            bytes_written: s.int("bytesWritten")?,
            cond_input: KeyValPair::unpack(s.child(KeyValPair::NAME)?)?,
        })
    }
}

/// Resulting offset of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLseekOut {
    pub offset: i64,
}

impl Pack for FileLseekOut {
    const NAME: &'static str = "fileLseekOut_PI";

    fn pack(&self) -> PackedStruct {
        PackedStruct::new(Self::NAME).with_int("offset", self.offset)
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            offset: s.int("offset")?,
        })
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Number of positional arguments in `ModAVUMetadataInp_PI`.
pub const MOD_AVU_ARGS: usize = 10;

/// Positional modify-AVU request: `verb, -type, target, name, value, units`
/// for add/rm, `cp, -srcType, -destType, src, dest` for copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModAvuMetadataInp {
    pub args: Vec<String>,
}

impl ModAvuMetadataInp {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Pack for ModAvuMetadataInp {
    const NAME: &'static str = "ModAVUMetadataInp_PI";

    fn pack(&self) -> PackedStruct {
        let mut s = PackedStruct::new(Self::NAME);
        for i in 0..MOD_AVU_ARGS {
            let value = self.args.get(i).map(String::as_str).unwrap_or("");
            s.push_str(&format!("arg{}", i), value);
        }
        s
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        let mut args: Vec<String> = (0..MOD_AVU_ARGS)
            .map(|i| s.str(&format!("arg{}", i)).unwrap_or_default().to_string())
            .collect();
        while args.last().is_some_and(|a| a.is_empty()) {
            args.pop();
        }
        Ok(Self { args })
    }
}

// ============================================================================
// General query
// ============================================================================

/// Select option for a plain (non-aggregated, unordered) column.
pub const SELECT_PLAIN: i32 = 1;

/// General query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenQueryInp {
    pub max_rows: i32,
    pub continue_inx: i32,
    pub partial_start_index: i32,
    pub options: i32,
    pub cond_input: KeyValPair,
    /// `(column index, select option)` pairs.
    pub selects: Vec<(i32, i32)>,
    /// `(column index, condition)` pairs, e.g. `(501, "= '/zone'")`.
    pub conditions: Vec<(i32, String)>,
}

impl Pack for GenQueryInp {
    const NAME: &'static str = "GenQueryInp_PI";

    fn pack(&self) -> PackedStruct {
        let mut selects = PackedStruct::new("InxIvalPair_PI");
        selects.push_int("iiLen", self.selects.len() as i64);
        for (inx, _) in &self.selects {
            selects.push_int("inx", (*inx).into());
        }
        for (_, option) in &self.selects {
            selects.push_int("ivalue", (*option).into());
        }

        let mut conditions = PackedStruct::new("InxValPair_PI");
        conditions.push_int("isLen", self.conditions.len() as i64);
        for (inx, _) in &self.conditions {
            conditions.push_int("inx", (*inx).into());
        }
        for (_, value) in &self.conditions {
            conditions.push_str("svalue", value.as_str());
        }

        PackedStruct::new(Self::NAME)
            .with_int("maxRows", self.max_rows.into())
            .with_int("continueInx", self.continue_inx.into())
            .with_int("partialStartIndex", self.partial_start_index.into())
            .with_int("options", self.options.into())
            .with_struct(self.cond_input.pack())
            .with_struct(selects)
            .with_struct(conditions)
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        let select_pi = s.child("InxIvalPair_PI")?;
        let selects = select_pi
            .ints("inx")?
            .into_iter()
            .zip(select_pi.ints("ivalue")?)
            .map(|(inx, opt)| (inx as i32, opt as i32))
            .collect();
        let cond_pi = s.child("InxValPair_PI")?;
        let conditions = cond_pi
            .ints("inx")?
            .into_iter()
            .zip(cond_pi.strs("svalue"))
            .map(|(inx, value)| (inx as i32, value.to_string()))
            .collect();
        Ok(Self {
            max_rows: int32(s, "maxRows")?,
            continue_inx: int32(s, "continueInx")?,
            partial_start_index: int32(s, "partialStartIndex")?,
            options: int32(s, "options")?,
            cond_input: KeyValPair::unpack(s.child(KeyValPair::NAME)?)?,
            selects,
            conditions,
        })
    }
}

/// One column of a general query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlResult {
    pub attri_inx: i32,
    pub res_len: i32,
    pub values: Vec<String>,
}

impl Pack for SqlResult {
    const NAME: &'static str = "SqlResult_PI";

    fn pack(&self) -> PackedStruct {
        let mut s = PackedStruct::new(Self::NAME);
        s.push_int("attriInx", self.attri_inx.into());
        s.push_int("reslen", self.res_len.into());
        for value in &self.values {
            s.push_str("value", value.as_str());
        }
        s
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        Ok(Self {
            attri_inx: int32(s, "attriInx")?,
            res_len: int32(s, "reslen")?,
            values: s.strs("value").map(str::to_string).collect(),
        })
    }
}

/// General query response: column-major result table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenQueryOut {
    pub row_count: i32,
    pub continue_inx: i32,
    pub total_row_count: i32,
    pub columns: Vec<SqlResult>,
}

impl Pack for GenQueryOut {
    const NAME: &'static str = "GenQueryOut_PI";

    fn pack(&self) -> PackedStruct {
        let mut s = PackedStruct::new(Self::NAME);
        s.push_int("rowCnt", self.row_count.into());
        s.push_int("attriCnt", self.columns.len() as i64);
        s.push_int("continueInx", self.continue_inx.into());
        s.push_int("totalRowCount", self.total_row_count.into());
        for column in &self.columns {
            s.push_struct(column.pack());
        }
        s
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        let attri_count = s.int("attriCnt")?.max(0) as usize;
        // Servers pad the result with unused SqlResult_PI slots.
        let columns = s
            .children(SqlResult::NAME)
            .take(attri_count)
            .map(SqlResult::unpack)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            row_count: int32(s, "rowCnt")?,
            continue_inx: int32(s, "continueInx")?,
            total_row_count: int32(s, "totalRowCount").unwrap_or(0),
            columns,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// One server-side error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub status: i32,
    pub msg: String,
}

/// Error stack carried in the `error` section of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RError {
    pub messages: Vec<ErrorMessage>,
}

impl Pack for RError {
    const NAME: &'static str = "RError_PI";

    fn pack(&self) -> PackedStruct {
        let mut s = PackedStruct::new(Self::NAME);
        s.push_int("count", self.messages.len() as i64);
        for message in &self.messages {
            s.push_struct(
                PackedStruct::new("RErrMsg_PI")
                    .with_int("status", message.status.into())
                    .with_str("msg", message.msg.as_str()),
            );
        }
        s
    }

    fn unpack(s: &PackedStruct) -> Result<Self, ProtocolError> {
        expect_name::<Self>(s)?;
        let messages = s
            .children("RErrMsg_PI")
            .map(|m| {
                Ok(ErrorMessage {
                    status: int32(m, "status")?,
                    msg: m.str("msg")?.to_string(),
                })
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        Ok(Self { messages })
    }
}
