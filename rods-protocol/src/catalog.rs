//! Catalog column registry.
//!
//! Maps each queryable (entity, column) pair to the numeric index the
//! general query API expects. The registry is a pure lookup table.

use std::fmt;

/// Catalog entity a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    User,
    Resource,
    DataObject,
    Collection,
    DataObjectMeta,
    CollectionMeta,
    ResourceMeta,
    UserMeta,
}

/// A queryable catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub entity: Entity,
    pub name: &'static str,
    pub index: i32,
}

impl Column {
    pub const fn new(entity: Entity, name: &'static str, index: i32) -> Self {
        Self {
            entity,
            name,
            index,
        }
    }

    /// Looks up a column by its wire index.
    pub fn from_index(index: i32) -> Option<Column> {
        ALL_COLUMNS.iter().copied().find(|c| c.index == index)
    }

    /// Looks up a column by its symbolic name, e.g. `COLL_NAME`.
    pub fn from_name(name: &str) -> Option<Column> {
        ALL_COLUMNS
            .iter()
            .copied()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub mod user {
    use super::{Column, Entity::User};

    pub const ID: Column = Column::new(User, "USER_ID", 201);
    pub const NAME: Column = Column::new(User, "USER_NAME", 202);
    pub const TYPE: Column = Column::new(User, "USER_TYPE", 203);
    pub const ZONE: Column = Column::new(User, "USER_ZONE", 204);
}

pub mod resource {
    use super::{Column, Entity::Resource};

    pub const ID: Column = Column::new(Resource, "R_RESC_ID", 301);
    pub const NAME: Column = Column::new(Resource, "R_RESC_NAME", 302);
    pub const ZONE_NAME: Column = Column::new(Resource, "R_ZONE_NAME", 303);
    pub const TYPE_NAME: Column = Column::new(Resource, "R_TYPE_NAME", 304);
}

pub mod data_object {
    use super::{Column, Entity::DataObject};

    pub const ID: Column = Column::new(DataObject, "D_DATA_ID", 401);
    pub const COLLECTION_ID: Column = Column::new(DataObject, "D_COLL_ID", 402);
    pub const NAME: Column = Column::new(DataObject, "DATA_NAME", 403);
    pub const REPLICA_NUMBER: Column = Column::new(DataObject, "DATA_REPL_NUM", 404);
    pub const VERSION: Column = Column::new(DataObject, "DATA_VERSION", 405);
    pub const TYPE: Column = Column::new(DataObject, "DATA_TYPE_NAME", 406);
    pub const SIZE: Column = Column::new(DataObject, "DATA_SIZE", 407);
    pub const RESOURCE_NAME: Column = Column::new(DataObject, "D_RESC_NAME", 409);
    pub const OWNER_NAME: Column = Column::new(DataObject, "D_OWNER_NAME", 411);
    pub const CREATE_TIME: Column = Column::new(DataObject, "D_CREATE_TIME", 419);
    pub const MODIFY_TIME: Column = Column::new(DataObject, "D_MODIFY_TIME", 420);
}

pub mod collection {
    use super::{Column, Entity::Collection};

    pub const ID: Column = Column::new(Collection, "COLL_ID", 500);
    pub const NAME: Column = Column::new(Collection, "COLL_NAME", 501);
    pub const PARENT_NAME: Column = Column::new(Collection, "COLL_PARENT_NAME", 502);
    pub const OWNER_NAME: Column = Column::new(Collection, "COLL_OWNER_NAME", 503);
}

pub mod data_object_meta {
    use super::{Column, Entity::DataObjectMeta};

    pub const NAME: Column = Column::new(DataObjectMeta, "META_DATA_ATTR_NAME", 600);
    pub const VALUE: Column = Column::new(DataObjectMeta, "META_DATA_ATTR_VALUE", 601);
    pub const UNITS: Column = Column::new(DataObjectMeta, "META_DATA_ATTR_UNITS", 602);
    pub const ID: Column = Column::new(DataObjectMeta, "META_DATA_ATTR_ID", 603);
}

pub mod collection_meta {
    use super::{Column, Entity::CollectionMeta};

    pub const NAME: Column = Column::new(CollectionMeta, "META_COLL_ATTR_NAME", 610);
    pub const VALUE: Column = Column::new(CollectionMeta, "META_COLL_ATTR_VALUE", 611);
    pub const UNITS: Column = Column::new(CollectionMeta, "META_COLL_ATTR_UNITS", 612);
    pub const ID: Column = Column::new(CollectionMeta, "META_COLL_ATTR_ID", 613);
}

pub mod resource_meta {
    use super::{Column, Entity::ResourceMeta};

    pub const NAME: Column = Column::new(ResourceMeta, "META_RESC_ATTR_NAME", 630);
    pub const VALUE: Column = Column::new(ResourceMeta, "META_RESC_ATTR_VALUE", 631);
    pub const UNITS: Column = Column::new(ResourceMeta, "META_RESC_ATTR_UNITS", 632);
    pub const ID: Column = Column::new(ResourceMeta, "META_RESC_ATTR_ID", 633);
}

pub mod user_meta {
    use super::{Column, Entity::UserMeta};

    pub const NAME: Column = Column::new(UserMeta, "META_USER_ATTR_NAME", 640);
    pub const VALUE: Column = Column::new(UserMeta, "META_USER_ATTR_VALUE", 641);
    pub const UNITS: Column = Column::new(UserMeta, "META_USER_ATTR_UNITS", 642);
    pub const ID: Column = Column::new(UserMeta, "META_USER_ATTR_ID", 643);
}

const ALL_COLUMNS: &[Column] = &[
    user::ID,
    user::NAME,
    user::TYPE,
    user::ZONE,
    resource::ID,
    resource::NAME,
    resource::ZONE_NAME,
    resource::TYPE_NAME,
    data_object::ID,
    data_object::COLLECTION_ID,
    data_object::NAME,
    data_object::REPLICA_NUMBER,
    data_object::VERSION,
    data_object::TYPE,
    data_object::SIZE,
    data_object::RESOURCE_NAME,
    data_object::OWNER_NAME,
    data_object::CREATE_TIME,
    data_object::MODIFY_TIME,
    collection::ID,
    collection::NAME,
    collection::PARENT_NAME,
    collection::OWNER_NAME,
    data_object_meta::NAME,
    data_object_meta::VALUE,
    data_object_meta::UNITS,
    data_object_meta::ID,
    collection_meta::NAME,
    collection_meta::VALUE,
    collection_meta::UNITS,
    collection_meta::ID,
    resource_meta::NAME,
    resource_meta::VALUE,
    resource_meta::UNITS,
    resource_meta::ID,
    user_meta::NAME,
    user_meta::VALUE,
    user_meta::UNITS,
    user_meta::ID,
];
