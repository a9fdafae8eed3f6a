//! Collections and data objects resolved from the catalog.

use crate::error::ClientError;
use crate::query::Row;
use rods_protocol::catalog::{collection, data_object};
use rods_protocol::Column;

/// Columns selected when resolving a collection.
pub const COLLECTION_COLUMNS: [Column; 4] = [
    collection::ID,
    collection::NAME,
    collection::PARENT_NAME,
    collection::OWNER_NAME,
];

/// Columns selected when resolving a data object.
pub const DATA_OBJECT_COLUMNS: [Column; 8] = [
    data_object::ID,
    data_object::COLLECTION_ID,
    data_object::NAME,
    data_object::REPLICA_NUMBER,
    data_object::TYPE,
    data_object::SIZE,
    data_object::RESOURCE_NAME,
    data_object::OWNER_NAME,
];

/// A collection row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub parent_name: String,
    pub owner: String,
}

impl Collection {
    pub(crate) fn from_row(row: &Row) -> Result<Self, ClientError> {
        Ok(Self {
            id: row.require_int(collection::ID)?,
            name: row.require(collection::NAME)?.to_string(),
            parent_name: row.get(collection::PARENT_NAME).unwrap_or_default().to_string(),
            owner: row.get(collection::OWNER_NAME).unwrap_or_default().to_string(),
        })
    }

    /// Last path component; the zone root is its own base name.
    pub fn base_name(&self) -> &str {
        split_path(&self.name).1
    }
}

/// A data object row together with its parent collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    pub id: i64,
    pub name: String,
    pub collection: Collection,
    pub replica_number: i64,
    pub data_type: String,
    pub size: u64,
    pub resource: String,
    pub owner: String,
}

impl DataObject {
    pub(crate) fn from_row(collection: Collection, row: &Row) -> Result<Self, ClientError> {
        let size = row.require_int(data_object::SIZE)?;
        Ok(Self {
            id: row.require_int(data_object::ID)?,
            name: row.require(data_object::NAME)?.to_string(),
            collection,
            replica_number: row.get_int(data_object::REPLICA_NUMBER).unwrap_or(0),
            data_type: row.get(data_object::TYPE).unwrap_or_default().to_string(),
            size: u64::try_from(size).unwrap_or(0),
            resource: row.get(data_object::RESOURCE_NAME).unwrap_or_default().to_string(),
            owner: row.get(data_object::OWNER_NAME).unwrap_or_default().to_string(),
        })
    }

    /// Name of the parent collection.
    pub fn collection_name(&self) -> &str {
        &self.collection.name
    }

    /// Full logical path.
    pub fn path(&self) -> String {
        join_path(&self.collection.name, &self.name)
    }
}

/// Splits a logical path into parent collection and base name.
///
/// `/zoneA/home/alice/report.txt` yields (`/zoneA/home/alice`, `report.txt`);
/// a top-level entry's parent is `/`.
pub fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    }
}

/// Joins a collection path and a base name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}
