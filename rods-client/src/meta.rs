//! Attribute-value-unit metadata.

use crate::objects::split_path;
use crate::query::Row;
use rods_protocol::catalog::{
    collection, collection_meta, data_object, data_object_meta, resource, resource_meta, user,
    user_meta,
};
use rods_protocol::Column;
use std::fmt;

/// One metadata triple attached to a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvuEntry {
    pub name: String,
    pub value: String,
    /// Empty when the triple has no units.
    pub units: String,
    /// Catalog id; only set on entries read back from the server.
    pub id: Option<i64>,
}

impl AvuEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            units: String::new(),
            id: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub(crate) fn from_row(target: MetaTarget, row: &Row) -> Self {
        let [name, value, units, id] = target.columns();
        Self {
            name: row.get(name).unwrap_or_default().to_string(),
            value: row.get(value).unwrap_or_default().to_string(),
            units: row.get(units).unwrap_or_default().to_string(),
            id: row.get_int(id),
        }
    }
}

impl fmt::Display for AvuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)?;
        if !self.units.is_empty() {
            write!(f, " [{}]", self.units)?;
        }
        Ok(())
    }
}

/// Kind of entity a metadata operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaTarget {
    DataObject,
    Collection,
    Resource,
    User,
}

impl MetaTarget {
    /// Type flag sent in the modify-AVU request.
    pub fn discriminator(&self) -> &'static str {
        match self {
            MetaTarget::DataObject => "-d",
            MetaTarget::Collection => "-c",
            MetaTarget::Resource => "-r",
            MetaTarget::User => "-u",
        }
    }

    /// Parses `-d`, `d`, `-C` and similar flags.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim_start_matches('-').to_ascii_lowercase().as_str() {
            "d" => Some(MetaTarget::DataObject),
            "c" => Some(MetaTarget::Collection),
            "r" => Some(MetaTarget::Resource),
            "u" => Some(MetaTarget::User),
            _ => None,
        }
    }

    /// Name, value, units and id columns of this kind's metadata.
    pub fn columns(&self) -> [Column; 4] {
        match self {
            MetaTarget::DataObject => [
                data_object_meta::NAME,
                data_object_meta::VALUE,
                data_object_meta::UNITS,
                data_object_meta::ID,
            ],
            MetaTarget::Collection => [
                collection_meta::NAME,
                collection_meta::VALUE,
                collection_meta::UNITS,
                collection_meta::ID,
            ],
            MetaTarget::Resource => [
                resource_meta::NAME,
                resource_meta::VALUE,
                resource_meta::UNITS,
                resource_meta::ID,
            ],
            MetaTarget::User => [
                user_meta::NAME,
                user_meta::VALUE,
                user_meta::UNITS,
                user_meta::ID,
            ],
        }
    }

    /// Conditions selecting the entity that owns the metadata.
    pub fn owner_conditions(&self, target: &str) -> Vec<(Column, String)> {
        match self {
            MetaTarget::DataObject => {
                let (parent, name) = split_path(target);
                vec![
                    (collection::NAME, parent.to_string()),
                    (data_object::NAME, name.to_string()),
                ]
            }
            MetaTarget::Collection => vec![(collection::NAME, target.to_string())],
            MetaTarget::Resource => vec![(resource::NAME, target.to_string())],
            MetaTarget::User => vec![(user::NAME, target.to_string())],
        }
    }
}

impl fmt::Display for MetaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetaTarget::DataObject => "data object",
            MetaTarget::Collection => "collection",
            MetaTarget::Resource => "resource",
            MetaTarget::User => "user",
        };
        f.write_str(name)
    }
}
