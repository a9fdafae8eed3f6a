//! Authenticated session and its operations.
//!
//! A [`Session`] owns one connection. Each public operation takes the
//! session lock, logs in if needed and then issues its request/response
//! exchanges while still holding the lock, so concurrent callers are
//! serialized and never interleave frames on the socket.

use crate::auth::AuthState;
use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::meta::{AvuEntry, MetaTarget};
use crate::objects::{split_path, Collection, DataObject, COLLECTION_COLUMNS, DATA_OBJECT_COLUMNS};
use crate::query::{Query, QueryBuilder, ResultSet};
use bytes::Bytes;
use rods_protocol::catalog::{collection, data_object};
use rods_protocol::message::{
    DataObjInp, FileLseekOut, GenQueryOut, KeyValPair, ModAvuMetadataInp, OpenedDataObjInp,
    VersionInfo,
};
use rods_protocol::{ApiNumber, Column, ErrorKind, Pack};
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};

/// Permission bits for newly created data objects.
pub const DEFAULT_CREATE_MODE: i32 = 0o644;

/// Bytes moved per read or write request by [`Session::get_data`] and
/// [`Session::put_data`].
pub const TRANSFER_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Server-assigned handle of an open data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(i32);

impl Descriptor {
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access mode for [`Session::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    /// POSIX open flags (`O_RDONLY`, `O_WRONLY`, `O_RDWR`).
    pub fn flags(&self) -> i32 {
        match self {
            OpenMode::Read => 0,
            OpenMode::Write => 1,
            OpenMode::ReadWrite => 2,
        }
    }
}

/// Origin of a seek, as in `lseek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    pub fn code(&self) -> i32 {
        match self {
            Whence::Start => 0,
            Whence::Current => 1,
            Whence::End => 2,
        }
    }
}

struct SessionState {
    conn: Option<Connection>,
    auth: AuthState,
}

/// An authenticated session with a catalog server.
pub struct Session {
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl Session {
    /// Opens the connection. Authentication happens on the first call
    /// that needs it.
    pub async fn connect(config: SessionConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let conn = Connection::connect(&config).await?;
        Ok(Self {
            config,
            state: Mutex::new(SessionState {
                conn: Some(conn),
                auth: AuthState::Unauthenticated,
            }),
        })
    }

    /// Loads configuration from the environment and connects.
    pub async fn from_env() -> Result<Self, ClientError> {
        Self::connect(SessionConfig::load()?).await
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn auth_state(&self) -> AuthState {
        self.state.lock().await.auth
    }

    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .conn
            .as_ref()
            .is_some_and(Connection::is_connected)
    }

    /// Version acknowledgement received when the session connected.
    pub async fn server_version(&self) -> Result<VersionInfo, ClientError> {
        let state = self.state.lock().await;
        let conn = state.conn.as_ref().ok_or(ClientError::NotConnected)?;
        Ok(conn.server_version().clone())
    }

    /// Sends the disconnect notice and closes the socket.
    ///
    /// Later operations fail with [`ClientError::NotConnected`].
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.auth = AuthState::Unauthenticated;
        match state.conn.take() {
            Some(mut conn) => conn.disconnect().await,
            None => Ok(()),
        }
    }

    /// Locks the session and logs in unless already authenticated.
    async fn authenticated(&self) -> Result<MutexGuard<'_, SessionState>, ClientError> {
        let mut state = self.state.lock().await;
        if state.auth != AuthState::Authenticated {
            let conn = state.conn.as_mut().ok_or(ClientError::NotConnected)?;
            match conn.login(&self.config.user, &self.config.password).await {
                Ok(()) => state.auth = AuthState::Authenticated,
                Err(e) => {
                    state.auth = AuthState::Failed;
                    return Err(e);
                }
            }
        }
        Ok(state)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Starts a query over the given columns.
    pub fn query(&self, columns: impl IntoIterator<Item = Column>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, columns.into_iter().collect())
    }

    /// Runs a query. `CAT_NO_ROWS_FOUND` yields an empty result with the
    /// requested columns; every other failure propagates.
    pub async fn execute_query(&self, query: &Query) -> Result<ResultSet, ClientError> {
        self.authenticated().await?.execute_query(query).await
    }

    // =========================================================================
    // Catalog lookup
    // =========================================================================

    /// Resolves a collection by its exact path.
    pub async fn get_collection(&self, path: &str) -> Result<Collection, ClientError> {
        self.authenticated().await?.get_collection(path).await
    }

    /// Resolves a data object by path: parent collection first, then the
    /// object by name within it.
    pub async fn get_data_object(&self, path: &str) -> Result<DataObject, ClientError> {
        self.authenticated().await?.get_data_object(path).await
    }

    /// Lists the data objects directly inside a collection.
    pub async fn list_data_objects(&self, path: &str) -> Result<Vec<DataObject>, ClientError> {
        self.authenticated().await?.list_data_objects(path).await
    }

    /// Lists the collections directly inside a collection.
    pub async fn list_collections(&self, path: &str) -> Result<Vec<Collection>, ClientError> {
        self.authenticated().await?.list_collections(path).await
    }

    // =========================================================================
    // Data objects
    // =========================================================================

    /// Creates an empty data object and returns it as freshly resolved
    /// from the catalog.
    pub async fn create_data_object(&self, path: &str) -> Result<DataObject, ClientError> {
        self.authenticated().await?.create_data_object(path).await
    }

    pub async fn open(&self, path: &str, mode: OpenMode) -> Result<Descriptor, ClientError> {
        self.authenticated().await?.open(path, mode).await
    }

    /// Reads up to `size` bytes at the current offset. An empty result
    /// means end of data.
    pub async fn read(&self, desc: Descriptor, size: usize) -> Result<Bytes, ClientError> {
        self.authenticated().await?.read(desc, size).await
    }

    /// Writes `data` at the current offset and returns the number of bytes
    /// the server accepted.
    pub async fn write(&self, desc: Descriptor, data: &[u8]) -> Result<usize, ClientError> {
        self.authenticated().await?.write(desc, data).await
    }

    /// Like [`Session::write`], failing with [`ClientError::ShortWrite`]
    /// when the server accepts fewer bytes than sent.
    pub async fn write_all(&self, desc: Descriptor, data: &[u8]) -> Result<(), ClientError> {
        let written = self.write(desc, data).await?;
        if written != data.len() {
            return Err(ClientError::ShortWrite {
                expected: data.len(),
                written,
            });
        }
        Ok(())
    }

    /// Moves the offset and returns the resulting absolute offset.
    pub async fn seek(&self, desc: Descriptor, offset: i64, whence: Whence) -> Result<i64, ClientError> {
        self.authenticated().await?.seek(desc, offset, whence).await
    }

    /// Releases a descriptor. Reusing it afterwards fails server side.
    pub async fn close(&self, desc: Descriptor) -> Result<(), ClientError> {
        self.authenticated().await?.close(desc).await
    }

    pub async fn unlink(&self, path: &str) -> Result<(), ClientError> {
        self.authenticated().await?.unlink(path).await
    }

    /// Reads a whole data object.
    pub async fn get_data(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        self.download(path, TRANSFER_CHUNK_SIZE).await
    }

    /// Creates a data object holding `data`.
    pub async fn put_data(&self, path: &str, data: &[u8]) -> Result<DataObject, ClientError> {
        self.upload(path, data, TRANSFER_CHUNK_SIZE).await
    }

    /// The descriptor is closed whether or not the transfer succeeds.
    pub(crate) async fn download(&self, path: &str, chunk_size: usize) -> Result<Vec<u8>, ClientError> {
        let desc = self.open(path, OpenMode::Read).await?;
        let transfer = async {
            let mut data = Vec::new();
            loop {
                let chunk = self.read(desc, chunk_size).await?;
                if chunk.is_empty() {
                    return Ok::<_, ClientError>(data);
                }
                data.extend_from_slice(&chunk);
            }
        };
        let result = transfer.await;
        close_after(desc, result, self.close(desc).await)
    }

    pub(crate) async fn upload(
        &self,
        path: &str,
        data: &[u8],
        chunk_size: usize,
    ) -> Result<DataObject, ClientError> {
        self.create_data_object(path).await?;

        let desc = self.open(path, OpenMode::Write).await?;
        let transfer = async {
            for chunk in data.chunks(chunk_size.max(1)) {
                self.write_all(desc, chunk).await?;
            }
            Ok::<_, ClientError>(())
        };
        let result = transfer.await;
        close_after(desc, result, self.close(desc).await)?;

        self.get_data_object(path).await
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Lists the metadata attached to a data object, collection, resource
    /// or user.
    pub async fn get_meta(&self, target: MetaTarget, path: &str) -> Result<Vec<AvuEntry>, ClientError> {
        self.authenticated().await?.get_meta(target, path).await
    }

    pub async fn add_meta(&self, target: MetaTarget, path: &str, avu: &AvuEntry) -> Result<(), ClientError> {
        let args = avu_args("add", target, path, avu);
        self.authenticated().await?.modify_meta(args).await
    }

    pub async fn remove_meta(&self, target: MetaTarget, path: &str, avu: &AvuEntry) -> Result<(), ClientError> {
        let args = avu_args("rm", target, path, avu);
        self.authenticated().await?.modify_meta(args).await
    }

    /// Copies every AVU of `src` onto `dest`.
    pub async fn copy_meta(
        &self,
        src_target: MetaTarget,
        dest_target: MetaTarget,
        src: &str,
        dest: &str,
    ) -> Result<(), ClientError> {
        let args = ModAvuMetadataInp::new([
            "cp",
            src_target.discriminator(),
            dest_target.discriminator(),
            src,
            dest,
        ]);
        self.authenticated().await?.modify_meta(args).await
    }
}

/// Prefers the transfer's error; a failed close only surfaces on its own.
fn close_after<T>(
    desc: Descriptor,
    result: Result<T, ClientError>,
    closed: Result<(), ClientError>,
) -> Result<T, ClientError> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!("Failed to close descriptor {}: {}", desc, close_err);
            Err(e)
        }
    }
}

fn avu_args(verb: &str, target: MetaTarget, path: &str, avu: &AvuEntry) -> ModAvuMetadataInp {
    ModAvuMetadataInp::new([
        verb,
        target.discriminator(),
        path,
        avu.name.as_str(),
        avu.value.as_str(),
        avu.units.as_str(),
    ])
}

fn to_i32(value: usize, what: &str) -> Result<i32, ClientError> {
    i32::try_from(value)
        .map_err(|_| ClientError::InvalidArgument(format!("{} of {} bytes exceeds protocol limit", what, value)))
}

impl SessionState {
    fn conn(&mut self) -> Result<&mut Connection, ClientError> {
        self.conn.as_mut().ok_or(ClientError::NotConnected)
    }

    async fn execute_query(&mut self, query: &Query) -> Result<ResultSet, ClientError> {
        let mut result = ResultSet::empty(query.columns().to_vec());
        if query.max_rows() == Some(0) {
            return Ok(result);
        }

        let mut continue_inx = 0;
        loop {
            let inp = query.page_request(continue_inx, result.len());
            let out: GenQueryOut = match self.conn()?.request(ApiNumber::GenQuery, &inp).await {
                Ok(reply) => reply.unpack_body()?,
                // Also how a continuation reports that it ran dry.
                Err(e) if e.remote_kind() == Some(ErrorKind::CatNoRowsFound) => return Ok(result),
                Err(e) => return Err(e),
            };

            let page = ResultSet::from_gen_query_out(query.columns().to_vec(), &out)?;
            if page.is_empty() && out.continue_inx > 0 {
                return Err(ClientError::UnexpectedResponse(
                    "empty query page with a continuation".to_string(),
                ));
            }
            result.append(page);
            continue_inx = out.continue_inx;
            tracing::debug!(
                "Query page: {} of {} rows, continue_inx={}",
                result.len(),
                out.total_row_count,
                continue_inx
            );

            if continue_inx <= 0 {
                return Ok(result);
            }
            if let Some(limit) = query.max_rows().filter(|limit| result.len() >= *limit) {
                result.truncate(limit);
                self.close_query(query, continue_inx).await?;
                return Ok(result);
            }
        }
    }

    /// Releases the server-side statement of a query stopped before its
    /// last page.
    async fn close_query(&mut self, query: &Query, continue_inx: i32) -> Result<(), ClientError> {
        let inp = query.close_request(continue_inx);
        match self.conn()?.request(ApiNumber::GenQuery, &inp).await {
            Ok(_) => Ok(()),
            Err(e) if e.remote_kind() == Some(ErrorKind::CatNoRowsFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_collection(&mut self, path: &str) -> Result<Collection, ClientError> {
        let query = Query::new(COLLECTION_COLUMNS).filter(collection::NAME, path);
        let result = self.execute_query(&query).await?;
        match result.one() {
            Some(row) => Collection::from_row(row),
            None => {
                tracing::debug!("Collection {} matched {} rows", path, result.len());
                Err(ClientError::NotFound(path.to_string()))
            }
        }
    }

    async fn get_data_object(&mut self, path: &str) -> Result<DataObject, ClientError> {
        let (parent, name) = split_path(path);
        let parent = match self.get_collection(parent).await {
            Ok(parent) => parent,
            Err(ClientError::NotFound(_)) => return Err(ClientError::NotFound(path.to_string())),
            Err(e) => return Err(e),
        };

        let query = Query::new(DATA_OBJECT_COLUMNS)
            .filter(data_object::NAME, name)
            .filter(data_object::COLLECTION_ID, parent.id.to_string());
        let result = self.execute_query(&query).await?;
        match result.one() {
            Some(row) => DataObject::from_row(parent, row),
            None => {
                tracing::debug!("Data object {} matched {} rows", path, result.len());
                Err(ClientError::NotFound(path.to_string()))
            }
        }
    }

    async fn list_data_objects(&mut self, path: &str) -> Result<Vec<DataObject>, ClientError> {
        let parent = self.get_collection(path).await?;
        let query = Query::new(DATA_OBJECT_COLUMNS)
            .filter(data_object::COLLECTION_ID, parent.id.to_string());
        let result = self.execute_query(&query).await?;
        result
            .iter()
            .map(|row| DataObject::from_row(parent.clone(), row))
            .collect()
    }

    async fn list_collections(&mut self, path: &str) -> Result<Vec<Collection>, ClientError> {
        let query = Query::new(COLLECTION_COLUMNS).filter(collection::PARENT_NAME, path);
        let result = self.execute_query(&query).await?;
        result.iter().map(Collection::from_row).collect()
    }

    async fn create_data_object(&mut self, path: &str) -> Result<DataObject, ClientError> {
        let mut inp = DataObjInp::new(path);
        inp.create_mode = DEFAULT_CREATE_MODE;
        inp.cond_input = KeyValPair::new().with("dataType", "generic");

        let reply = self.conn()?.request(ApiNumber::DataObjCreate, &inp).await?;
        let desc = Descriptor(reply.int_info);
        tracing::debug!("Created {} (descriptor {})", path, desc);

        // Creation opens the object.
        self.close(desc).await?;
        self.get_data_object(path).await
    }

    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<Descriptor, ClientError> {
        let mut inp = DataObjInp::new(path);
        inp.open_flags = mode.flags();

        let reply = self.conn()?.request(ApiNumber::DataObjOpen, &inp).await?;
        tracing::debug!("Opened {} as descriptor {}", path, reply.int_info);
        Ok(Descriptor(reply.int_info))
    }

    async fn read(&mut self, desc: Descriptor, size: usize) -> Result<Bytes, ClientError> {
        let mut inp = OpenedDataObjInp::new(desc.0);
        inp.len = to_i32(size, "read")?;

        let reply = self.conn()?.request(ApiNumber::DataObjRead, &inp).await?;
        let mut data = reply.bs;
        data.truncate(size);
        Ok(data)
    }

    async fn write(&mut self, desc: Descriptor, data: &[u8]) -> Result<usize, ClientError> {
        let mut inp = OpenedDataObjInp::new(desc.0);
        inp.len = to_i32(data.len(), "write")?;

        let reply = self
            .conn()?
            .call(
                ApiNumber::DataObjWrite,
                Some(inp.pack()),
                Bytes::copy_from_slice(data),
            )
            .await?;
        // Non-negative once the status has been checked.
        Ok(usize::try_from(reply.int_info).unwrap_or(0))
    }

    async fn seek(&mut self, desc: Descriptor, offset: i64, whence: Whence) -> Result<i64, ClientError> {
        let mut inp = OpenedDataObjInp::new(desc.0);
        inp.offset = offset;
        inp.whence = whence.code();

        let reply = self.conn()?.request(ApiNumber::DataObjLseek, &inp).await?;
        let out: FileLseekOut = reply.unpack_body()?;
        Ok(out.offset)
    }

    async fn close(&mut self, desc: Descriptor) -> Result<(), ClientError> {
        let inp = OpenedDataObjInp::new(desc.0);
        self.conn()?.request(ApiNumber::DataObjClose, &inp).await?;
        Ok(())
    }

    async fn unlink(&mut self, path: &str) -> Result<(), ClientError> {
        let inp = DataObjInp::new(path);
        self.conn()?.request(ApiNumber::DataObjUnlink, &inp).await?;
        tracing::debug!("Unlinked {}", path);
        Ok(())
    }

    async fn get_meta(&mut self, target: MetaTarget, path: &str) -> Result<Vec<AvuEntry>, ClientError> {
        let mut query = Query::new(target.columns());
        for (column, value) in target.owner_conditions(path) {
            query = query.filter(column, value);
        }
        let result = self.execute_query(&query).await?;
        Ok(result.iter().map(|row| AvuEntry::from_row(target, row)).collect())
    }

    async fn modify_meta(&mut self, args: ModAvuMetadataInp) -> Result<(), ClientError> {
        tracing::debug!("Modifying metadata: {:?}", args.args);
        self.conn()?.request(ApiNumber::ModAvuMetadata, &args).await?;
        Ok(())
    }
}
