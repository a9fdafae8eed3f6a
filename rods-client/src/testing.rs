//! In-process catalog server for tests.
//!
//! Speaks the real framing over a loopback socket and keeps a tiny
//! in-memory catalog: four collections, one data object, one resource and
//! one user. Only the requests this crate issues are understood.

use crate::auth::challenge_response;
use crate::config::SessionConfig;
use crate::meta::{AvuEntry, MetaTarget};
use crate::objects::{join_path, split_path};
use bytes::Bytes;
use rods_protocol::message::{
    AuthChallenge, AuthResponse, DataObjInp, ErrorMessage, FileLseekOut, GenQueryInp,
    GenQueryOut, ModAvuMetadataInp, OpenedDataObjInp, RError, SqlResult, VersionInfo,
};
use rods_protocol::{
    ApiNumber, Decoder, Encoder, ErrorKind, Message, MessageType, Pack, API_VERSION,
    RELEASE_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub(crate) const USER: &str = "alice";
pub(crate) const ZONE: &str = "zoneA";
pub(crate) const PASSWORD: &str = "secret";
pub(crate) const RESOURCE: &str = "demoResc";

/// Contents of the seeded `/zoneA/home/alice/data.bin`.
pub(crate) const DATA: &[u8] = b"0123456789abcdefghij";

const FIRST_DESCRIPTOR: i32 = 3;

/// Largest page the server hands out, whatever the client asks for.
const MAX_SQL_ROWS: usize = 256;

#[derive(Default)]
struct Stats {
    auth_requests: AtomicUsize,
    privileged_requests: AtomicUsize,
    disconnects: AtomicUsize,
    connections: AtomicUsize,
}

struct CollectionRow {
    id: i64,
    name: String,
    parent: String,
}

struct ObjectRow {
    id: i64,
    collection_id: i64,
    name: String,
    data_type: String,
    data: Vec<u8>,
}

struct MetaRow {
    target: MetaTarget,
    owner: String,
    avu: AvuEntry,
}

struct OpenDescriptor {
    object_id: i64,
    offset: i64,
}

struct Catalog {
    next_id: i64,
    collections: Vec<CollectionRow>,
    objects: Vec<ObjectRow>,
    meta: Vec<MetaRow>,
    /// Keyed by (connection, descriptor).
    descriptors: HashMap<(usize, i32), OpenDescriptor>,
    write_limit: Option<usize>,
    /// Unfinished queries: continuation index to next row offset.
    statements: HashMap<i32, usize>,
    next_statement: i32,
    /// Fails reads and writes once this many bytes have moved.
    transfer_budget: Option<usize>,
}

impl Catalog {
    fn seeded() -> Self {
        let mut catalog = Self {
            next_id: 10000,
            collections: Vec::new(),
            objects: Vec::new(),
            meta: Vec::new(),
            descriptors: HashMap::new(),
            write_limit: None,
            statements: HashMap::new(),
            next_statement: 1,
            transfer_budget: None,
        };
        for path in ["/zoneA", "/zoneA/home", "/zoneA/home/alice", "/zoneA/trash"] {
            let (parent, _) = split_path(path);
            let id = catalog.allocate_id();
            catalog.collections.push(CollectionRow {
                id,
                name: path.to_string(),
                parent: parent.to_string(),
            });
        }
        let collection_id = catalog.collection("/zoneA/home/alice").map(|c| c.id).unwrap_or(0);
        let id = catalog.allocate_id();
        catalog.objects.push(ObjectRow {
            id,
            collection_id,
            name: "data.bin".to_string(),
            data_type: "generic".to_string(),
            data: DATA.to_vec(),
        });
        catalog
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn collection(&self, path: &str) -> Option<&CollectionRow> {
        self.collections.iter().find(|c| c.name == path)
    }

    fn collection_by_id(&self, id: i64) -> Option<&CollectionRow> {
        self.collections.iter().find(|c| c.id == id)
    }

    fn object_path(&self, object: &ObjectRow) -> String {
        let parent = self
            .collection_by_id(object.collection_id)
            .map(|c| c.name.as_str())
            .unwrap_or("");
        join_path(parent, &object.name)
    }

    fn object_index(&self, path: &str) -> Option<usize> {
        self.objects.iter().position(|o| self.object_path(o) == path)
    }

    fn owner_exists(&self, target: MetaTarget, owner: &str) -> bool {
        match target {
            MetaTarget::DataObject => self.object_index(owner).is_some(),
            MetaTarget::Collection => self.collection(owner).is_some(),
            MetaTarget::Resource => owner == RESOURCE,
            MetaTarget::User => owner == USER,
        }
    }
}

/// A running fake server; stops when dropped.
pub(crate) struct FakeServer {
    addr: SocketAddr,
    catalog: Arc<Mutex<Catalog>>,
    stats: Arc<Stats>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let catalog = Arc::new(Mutex::new(Catalog::seeded()));
        let stats = Arc::new(Stats::default());

        let task = {
            let catalog = catalog.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let conn_id = stats.connections.fetch_add(1, Ordering::SeqCst);
                    let handler = ConnectionHandler {
                        conn_id,
                        catalog: catalog.clone(),
                        stats: stats.clone(),
                        challenge: Vec::new(),
                        authenticated: false,
                        next_descriptor: FIRST_DESCRIPTOR,
                    };
                    tokio::spawn(handler.run(socket));
                }
            })
        };

        Self {
            addr,
            catalog,
            stats,
            task,
        }
    }

    pub(crate) fn config(&self) -> SessionConfig {
        self.config_with_password(PASSWORD)
    }

    pub(crate) fn config_with_password(&self, password: &str) -> SessionConfig {
        SessionConfig::new("127.0.0.1", USER, ZONE, password)
            .with_port(self.addr.port())
            .with_read_timeout(Some(Duration::from_secs(5)))
    }

    pub(crate) fn auth_requests(&self) -> usize {
        self.stats.auth_requests.load(Ordering::SeqCst)
    }

    /// API requests other than the two authentication steps.
    pub(crate) fn privileged_requests(&self) -> usize {
        self.stats.privileged_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_count(&self) -> usize {
        self.stats.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_disconnects(&self, count: usize) {
        for _ in 0..200 {
            if self.disconnect_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub(crate) fn open_descriptors(&self) -> usize {
        self.catalog.lock().unwrap().descriptors.len()
    }

    pub(crate) fn meta_count(&self, target: MetaTarget) -> usize {
        self.catalog
            .lock()
            .unwrap()
            .meta
            .iter()
            .filter(|m| m.target == target)
            .count()
    }

    /// Makes every write accept at most `max` bytes.
    pub(crate) fn limit_writes(&self, max: usize) {
        self.catalog.lock().unwrap().write_limit = Some(max);
    }

    /// Makes reads and writes fail with `SYS_INVALID_INPUT_PARAM` once
    /// `bytes` have been transferred.
    pub(crate) fn fail_transfers_after(&self, bytes: usize) {
        self.catalog.lock().unwrap().transfer_budget = Some(bytes);
    }

    /// Queries left open on the server by a client that stopped paging.
    pub(crate) fn open_statements(&self) -> usize {
        self.catalog.lock().unwrap().statements.len()
    }

    /// Adds `count` empty data objects named `obj-0000`... to a collection.
    pub(crate) fn add_data_objects(&self, collection: &str, count: usize) {
        let mut catalog = self.catalog.lock().unwrap();
        let collection_id = catalog.collection(collection).map(|c| c.id).unwrap();
        for i in 0..count {
            let id = catalog.allocate_id();
            catalog.objects.push(ObjectRow {
                id,
                collection_id,
                name: format!("obj-{:04}", i),
                data_type: "generic".to_string(),
                data: Vec::new(),
            });
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn ok(int_info: i32) -> Message {
    Message::new(MessageType::ApiReply, int_info)
}

fn failure(kind: ErrorKind) -> Message {
    let code = kind.code();
    Message::new(MessageType::ApiReply, code).with_error(
        RError {
            messages: vec![ErrorMessage {
                status: code,
                msg: kind.name().to_string(),
            }],
        }
        .pack(),
    )
}

struct ConnectionHandler {
    conn_id: usize,
    catalog: Arc<Mutex<Catalog>>,
    stats: Arc<Stats>,
    challenge: Vec<u8>,
    authenticated: bool,
    next_descriptor: i32,
}

impl ConnectionHandler {
    async fn run(mut self, mut socket: TcpStream) {
        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let message = loop {
                match decoder.decode_message() {
                    Ok(Some(message)) => break message,
                    Ok(None) => {}
                    Err(_) => return,
                }
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        self.release_descriptors();
                        return;
                    }
                    Ok(n) => decoder.extend(&buf[..n]),
                }
            };

            let reply = match message.msg_type {
                MessageType::Connect => Message::new(MessageType::Version, 0).with_body(
                    VersionInfo {
                        status: 0,
                        rel_version: RELEASE_VERSION.to_string(),
                        api_version: API_VERSION.to_string(),
                        ..VersionInfo::default()
                    }
                    .pack(),
                ),
                MessageType::Disconnect => {
                    self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
                    self.release_descriptors();
                    return;
                }
                MessageType::ApiRequest => self.handle_api(&message),
                _ => return,
            };

            let Ok(encoded) = Encoder::encode(&reply) else {
                return;
            };
            if socket.write_all(&encoded).await.is_err() {
                return;
            }
        }
    }

    fn release_descriptors(&self) {
        let conn_id = self.conn_id;
        self.catalog
            .lock()
            .unwrap()
            .descriptors
            .retain(|(owner, _), _| *owner != conn_id);
    }

    fn handle_api(&mut self, message: &Message) -> Message {
        let Some(api) = ApiNumber::from_code(message.int_info) else {
            return failure(ErrorKind::SysUnmatchedApiNum);
        };

        match api {
            ApiNumber::AuthRequest => {
                self.stats.auth_requests.fetch_add(1, Ordering::SeqCst);
                self.authenticated = false;
                self.challenge = (0u8..64).map(|b| b.wrapping_mul(7) ^ 0x5a).collect();
                return ok(0).with_body(
                    AuthChallenge {
                        challenge: self.challenge.clone(),
                    }
                    .pack(),
                );
            }
            ApiNumber::AuthResponse => {
                let Ok(response) = message.unpack_body::<AuthResponse>() else {
                    return failure(ErrorKind::SysInvalidInputParam);
                };
                let expected = challenge_response(&self.challenge, PASSWORD);
                if self.challenge.is_empty()
                    || response.username != USER
                    || response.response != expected
                {
                    return failure(ErrorKind::CatInvalidAuthentication);
                }
                self.authenticated = true;
                return ok(0);
            }
            _ => {}
        }

        if !self.authenticated {
            return failure(ErrorKind::SysNoApiPriv);
        }
        self.stats.privileged_requests.fetch_add(1, Ordering::SeqCst);

        let shared = self.catalog.clone();
        let mut catalog = shared.lock().unwrap();
        let result = match api {
            ApiNumber::GenQuery => message
                .unpack_body::<GenQueryInp>()
                .map_err(|_| ErrorKind::SysInvalidInputParam)
                .and_then(|inp| gen_query(&mut catalog, &inp)),
            ApiNumber::DataObjCreate => message
                .unpack_body::<DataObjInp>()
                .map_err(|_| ErrorKind::SysInvalidInputParam)
                .and_then(|inp| self.create(&mut catalog, &inp)),
            ApiNumber::DataObjOpen => message
                .unpack_body::<DataObjInp>()
                .map_err(|_| ErrorKind::SysInvalidInputParam)
                .and_then(|inp| self.open(&mut catalog, &inp)),
            ApiNumber::DataObjUnlink => message
                .unpack_body::<DataObjInp>()
                .map_err(|_| ErrorKind::SysInvalidInputParam)
                .and_then(|inp| unlink(&mut catalog, &inp)),
            ApiNumber::DataObjRead
            | ApiNumber::DataObjWrite
            | ApiNumber::DataObjLseek
            | ApiNumber::DataObjClose => message
                .unpack_body::<OpenedDataObjInp>()
                .map_err(|_| ErrorKind::SysInvalidInputParam)
                .and_then(|inp| self.descriptor_call(&mut catalog, api, &inp, &message.bs)),
            ApiNumber::ModAvuMetadata => message
                .unpack_body::<ModAvuMetadataInp>()
                .map_err(|_| ErrorKind::SysInvalidInputParam)
                .and_then(|inp| modify_meta(&mut catalog, &inp)),
            ApiNumber::AuthRequest | ApiNumber::AuthResponse => Ok(ok(0)),
        };
        result.unwrap_or_else(failure)
    }

    fn create(&mut self, catalog: &mut Catalog, inp: &DataObjInp) -> Result<Message, ErrorKind> {
        let (parent, name) = split_path(&inp.obj_path);
        let collection_id = catalog
            .collection(parent)
            .map(|c| c.id)
            .ok_or(ErrorKind::CatUnknownCollection)?;
        if catalog.collection(&inp.obj_path).is_some() {
            return Err(ErrorKind::CatNameExistsAsCollection);
        }
        if catalog.object_index(&inp.obj_path).is_some() {
            return Err(ErrorKind::OverwriteWithoutForceFlag);
        }

        let id = catalog.allocate_id();
        catalog.objects.push(ObjectRow {
            id,
            collection_id,
            name: name.to_string(),
            data_type: inp.cond_input.get("dataType").unwrap_or("").to_string(),
            data: Vec::new(),
        });
        Ok(ok(self.register_descriptor(catalog, id)))
    }

    fn open(&mut self, catalog: &mut Catalog, inp: &DataObjInp) -> Result<Message, ErrorKind> {
        let index = catalog
            .object_index(&inp.obj_path)
            .ok_or(ErrorKind::UserFileDoesNotExist)?;
        let id = catalog.objects[index].id;
        Ok(ok(self.register_descriptor(catalog, id)))
    }

    fn register_descriptor(&mut self, catalog: &mut Catalog, object_id: i64) -> i32 {
        let desc = self.next_descriptor;
        self.next_descriptor += 1;
        catalog.descriptors.insert(
            (self.conn_id, desc),
            OpenDescriptor {
                object_id,
                offset: 0,
            },
        );
        desc
    }

    fn descriptor_call(
        &self,
        catalog: &mut Catalog,
        api: ApiNumber,
        inp: &OpenedDataObjInp,
        payload: &Bytes,
    ) -> Result<Message, ErrorKind> {
        let key = (self.conn_id, inp.l1_desc_inx);
        if api == ApiNumber::DataObjClose {
            return catalog
                .descriptors
                .remove(&key)
                .map(|_| ok(0))
                .ok_or(ErrorKind::SysFileDescOutOfRange);
        }

        let write_limit = catalog.write_limit;
        let budget = catalog.transfer_budget;
        let moving = matches!(api, ApiNumber::DataObjRead | ApiNumber::DataObjWrite);
        if moving && budget == Some(0) {
            return Err(ErrorKind::SysInvalidInputParam);
        }
        let (object_id, offset) = catalog
            .descriptors
            .get(&key)
            .map(|d| (d.object_id, d.offset))
            .ok_or(ErrorKind::SysFileDescOutOfRange)?;
        let object = catalog
            .objects
            .iter_mut()
            .find(|o| o.id == object_id)
            .ok_or(ErrorKind::CatUnknownFile)?;

        let (reply, new_offset) = match api {
            ApiNumber::DataObjRead => {
                let start = (offset as usize).min(object.data.len());
                let len = usize::try_from(inp.len).unwrap_or(0);
                let len = budget.map_or(len, |b| len.min(b));
                let end = (start + len).min(object.data.len());
                let chunk = object.data[start..end].to_vec();
                (ok(chunk.len() as i32).with_bs(chunk), end as i64)
            }
            ApiNumber::DataObjWrite => {
                let accepted = write_limit.map_or(payload.len(), |max| payload.len().min(max));
                let accepted = budget.map_or(accepted, |b| accepted.min(b));
                let start = offset as usize;
                let end = start + accepted;
                if object.data.len() < end {
                    object.data.resize(end, 0);
                }
                object.data[start..end].copy_from_slice(&payload[..accepted]);
                (ok(accepted as i32), end as i64)
            }
            ApiNumber::DataObjLseek => {
                let base = match inp.whence {
                    0 => 0,
                    1 => offset,
                    2 => object.data.len() as i64,
                    _ => return Err(ErrorKind::SysInvalidInputParam),
                };
                let target = base + inp.offset;
                if target < 0 {
                    return Err(ErrorKind::SysInvalidInputParam);
                }
                (ok(0).with_body(FileLseekOut { offset: target }.pack()), target)
            }
            _ => return Err(ErrorKind::SysUnmatchedApiNum),
        };

        if moving {
            let moved = usize::try_from(reply.int_info).unwrap_or(0);
            catalog.transfer_budget = budget.map(|b| b.saturating_sub(moved));
        }
        if let Some(desc) = catalog.descriptors.get_mut(&key) {
            desc.offset = new_offset;
        }
        Ok(reply)
    }
}

fn unlink(catalog: &mut Catalog, inp: &DataObjInp) -> Result<Message, ErrorKind> {
    let index = catalog
        .object_index(&inp.obj_path)
        .ok_or(ErrorKind::CatUnknownFile)?;
    catalog.objects.remove(index);
    catalog
        .meta
        .retain(|m| !(m.target == MetaTarget::DataObject && m.owner == inp.obj_path));
    Ok(ok(0))
}

fn modify_meta(catalog: &mut Catalog, inp: &ModAvuMetadataInp) -> Result<Message, ErrorKind> {
    let arg = |i: usize| inp.args.get(i).map(String::as_str).unwrap_or("");
    let target = |i: usize| MetaTarget::from_flag(arg(i)).ok_or(ErrorKind::CatInvalidArgument);

    match arg(0) {
        "add" | "rm" => {
            let kind = target(1)?;
            let owner = arg(2);
            if !catalog.owner_exists(kind, owner) {
                return Err(missing_owner(kind));
            }
            let avu = AvuEntry::new(arg(3), arg(4)).with_units(arg(5));
            let position = catalog.meta.iter().position(|m| {
                m.target == kind
                    && m.owner == owner
                    && m.avu.name == avu.name
                    && m.avu.value == avu.value
                    && m.avu.units == avu.units
            });

            if arg(0) == "add" {
                if position.is_none() {
                    let mut avu = avu;
                    avu.id = Some(catalog.allocate_id());
                    catalog.meta.push(MetaRow {
                        target: kind,
                        owner: owner.to_string(),
                        avu,
                    });
                }
            } else {
                let index = position.ok_or(ErrorKind::CatNoRowsFound)?;
                catalog.meta.remove(index);
            }
            Ok(ok(0))
        }
        "cp" => {
            let (src_kind, dest_kind) = (target(1)?, target(2)?);
            let (src, dest) = (arg(3), arg(4));
            if !catalog.owner_exists(src_kind, src) {
                return Err(missing_owner(src_kind));
            }
            if !catalog.owner_exists(dest_kind, dest) {
                return Err(missing_owner(dest_kind));
            }
            let copies: Vec<AvuEntry> = catalog
                .meta
                .iter()
                .filter(|m| m.target == src_kind && m.owner == src)
                .map(|m| m.avu.clone())
                .collect();
            for mut avu in copies {
                avu.id = Some(catalog.allocate_id());
                catalog.meta.push(MetaRow {
                    target: dest_kind,
                    owner: dest.to_string(),
                    avu,
                });
            }
            Ok(ok(0))
        }
        _ => Err(ErrorKind::CatInvalidArgument),
    }
}

fn missing_owner(kind: MetaTarget) -> ErrorKind {
    match kind {
        MetaTarget::DataObject => ErrorKind::CatUnknownFile,
        MetaTarget::Collection => ErrorKind::CatUnknownCollection,
        MetaTarget::Resource | MetaTarget::User => ErrorKind::CatInvalidArgument,
    }
}

type Values = HashMap<i32, String>;

fn collection_values(c: &CollectionRow) -> Values {
    HashMap::from([
        (500, c.id.to_string()),
        (501, c.name.clone()),
        (502, c.parent.clone()),
        (503, USER.to_string()),
    ])
}

fn object_values(catalog: &Catalog, o: &ObjectRow) -> Values {
    let mut values = catalog
        .collection_by_id(o.collection_id)
        .map(collection_values)
        .unwrap_or_default();
    values.extend([
        (401, o.id.to_string()),
        (402, o.collection_id.to_string()),
        (403, o.name.clone()),
        (404, "0".to_string()),
        (405, String::new()),
        (406, o.data_type.clone()),
        (407, o.data.len().to_string()),
        (409, RESOURCE.to_string()),
        (411, USER.to_string()),
    ]);
    values
}

fn meta_values(target: MetaTarget, avu: &AvuEntry) -> Values {
    let [name, value, units, id] = target.columns();
    HashMap::from([
        (name.index, avu.name.clone()),
        (value.index, avu.value.clone()),
        (units.index, avu.units.clone()),
        (id.index, avu.id.unwrap_or(0).to_string()),
    ])
}

/// Candidate rows for a query, picked by the most specific selected table.
fn candidate_rows(catalog: &Catalog, selects: &[i32]) -> Result<Vec<Values>, ErrorKind> {
    let selects_any = |range: std::ops::RangeInclusive<i32>| selects.iter().any(|i| range.contains(i));

    let meta_target = [
        (600..=603, MetaTarget::DataObject),
        (610..=613, MetaTarget::Collection),
        (630..=633, MetaTarget::Resource),
        (640..=643, MetaTarget::User),
    ]
    .into_iter()
    .find(|(range, _)| selects_any(range.clone()))
    .map(|(_, target)| target);

    if let Some(target) = meta_target {
        let rows = catalog
            .meta
            .iter()
            .filter(|m| m.target == target)
            .filter_map(|m| {
                let mut values = match target {
                    MetaTarget::DataObject => {
                        let index = catalog.object_index(&m.owner)?;
                        object_values(catalog, &catalog.objects[index])
                    }
                    MetaTarget::Collection => collection_values(catalog.collection(&m.owner)?),
                    MetaTarget::Resource => HashMap::from([(302, m.owner.clone())]),
                    MetaTarget::User => HashMap::from([(202, m.owner.clone())]),
                };
                values.extend(meta_values(target, &m.avu));
                Some(values)
            })
            .collect();
        return Ok(rows);
    }

    if selects_any(401..=420) {
        return Ok(catalog
            .objects
            .iter()
            .map(|o| object_values(catalog, o))
            .collect());
    }

    if selects_any(500..=503) {
        return Ok(catalog.collections.iter().map(collection_values).collect());
    }

    Err(ErrorKind::CatSqlErr)
}

/// Parses `= 'value'` with doubled quotes.
fn condition_value(condition: &str) -> Option<String> {
    let quoted = condition.trim().strip_prefix('=')?.trim();
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

fn gen_query(catalog: &mut Catalog, inp: &GenQueryInp) -> Result<Message, ErrorKind> {
    let offset = match inp.continue_inx {
        0 => 0,
        inx => catalog
            .statements
            .remove(&inx)
            .ok_or(ErrorKind::CatSqlErr)?,
    };
    let max_rows = usize::try_from(inp.max_rows).unwrap_or(0).min(MAX_SQL_ROWS);
    if max_rows == 0 {
        // Closes the statement, if any.
        let out = GenQueryOut {
            row_count: 0,
            continue_inx: 0,
            total_row_count: 0,
            columns: Vec::new(),
        };
        return Ok(ok(0).with_body(out.pack()));
    }

    let selects: Vec<i32> = inp.selects.iter().map(|(inx, _)| *inx).collect();
    let conditions = inp
        .conditions
        .iter()
        .map(|(inx, cond)| condition_value(cond).map(|v| (*inx, v)))
        .collect::<Option<Vec<_>>>()
        .ok_or(ErrorKind::CatSqlErr)?;

    let matching: Vec<Values> = candidate_rows(catalog, &selects)?
        .into_iter()
        .filter(|row| {
            conditions
                .iter()
                .all(|(inx, value)| row.get(inx) == Some(value))
        })
        .collect();
    let total = matching.len();
    let rows: Vec<Values> = matching.into_iter().skip(offset).take(max_rows).collect();

    if rows.is_empty() {
        return Err(ErrorKind::CatNoRowsFound);
    }

    let next_offset = offset + rows.len();
    let continue_inx = if next_offset < total {
        let inx = catalog.next_statement;
        catalog.next_statement += 1;
        catalog.statements.insert(inx, next_offset);
        inx
    } else {
        0
    };

    let columns = selects
        .iter()
        .map(|inx| SqlResult {
            attri_inx: *inx,
            res_len: 256,
            values: rows
                .iter()
                .map(|row| row.get(inx).cloned().unwrap_or_default())
                .collect(),
        })
        .collect();

    let out = GenQueryOut {
        row_count: rows.len() as i32,
        continue_inx,
        total_row_count: total as i32,
        columns,
    };
    Ok(ok(0).with_body(out.pack()))
}
