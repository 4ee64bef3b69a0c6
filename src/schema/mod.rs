//! Schema model
//!
//! An ordered set of type descriptors, each a named set of typed
//! properties with at most one primary key. Descriptors are immutable
//! after construction except for the column bindings performed by the
//! aligner and primary-key designation rewritten by a migration.
//!
//! # Invariants
//!
//! - Type names are unique within a schema
//! - Property names are unique within a type
//! - Primary keys are string or int properties
//! - Object and list properties name a target type present in the schema

mod loader;
mod object_schema;
mod types;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{RealmError, RealmResult};

pub use loader::{load_schema, parse_schema};
pub use object_schema::ObjectSchema;
pub use types::{Property, PropertyType};

/// Persisted version of a store that has never been versioned.
pub const NOT_VERSIONED: u64 = u64::MAX;

/// Tables backing record types carry this prefix; other tables are metadata.
pub const TABLE_PREFIX: &str = "class_";

/// Returns the table name backing a record type.
pub fn table_name_for_type(type_name: &str) -> String {
    format!("{}{}", TABLE_PREFIX, type_name)
}

/// Returns the record type backed by a table, if it backs one.
pub fn type_for_table_name(table_name: &str) -> Option<&str> {
    table_name.strip_prefix(TABLE_PREFIX)
}

/// Structural hash of a schema, blind to column bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaHash([u8; 32]);

impl SchemaHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// The full schema model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub object_schemas: Vec<ObjectSchema>,
}

impl Schema {
    pub fn new(object_schemas: Vec<ObjectSchema>) -> Self {
        Self { object_schemas }
    }

    pub fn object_schema(&self, type_name: &str) -> Option<&ObjectSchema> {
        self.object_schemas.iter().find(|o| o.name == type_name)
    }

    pub fn object_schema_mut(&mut self, type_name: &str) -> Option<&mut ObjectSchema> {
        self.object_schemas.iter_mut().find(|o| o.name == type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.object_schemas.iter().map(|o| o.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.object_schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_schemas.is_empty()
    }

    /// Validates every schema-level invariant.
    pub fn validate(&self) -> RealmResult<()> {
        let mut names = HashSet::new();
        for object_schema in &self.object_schemas {
            if !names.insert(object_schema.name.as_str()) {
                return Err(RealmError::InvalidSchema(format!(
                    "type '{}' is declared more than once",
                    object_schema.name
                )));
            }
            object_schema
                .validate_structure()
                .map_err(RealmError::InvalidSchema)?;
        }

        for object_schema in &self.object_schemas {
            for prop in &object_schema.properties {
                if let Some(target) = &prop.object_type {
                    if !names.contains(target.as_str()) {
                        return Err(RealmError::InvalidSchema(format!(
                            "'{}.{}' links to unknown type '{}'",
                            object_schema.name, prop.name, target
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Computes the structural hash used to key accessor classes.
    pub fn structural_hash(&self) -> SchemaHash {
        let mut hasher = Sha256::new();
        for object_schema in &self.object_schemas {
            hasher.update(object_schema.name.as_bytes());
            hasher.update([0u8]);
            if let Some(pk) = &object_schema.primary_key {
                hasher.update(pk.as_bytes());
            }
            hasher.update([0u8]);
            for prop in &object_schema.properties {
                hasher.update(prop.name.as_bytes());
                hasher.update([0u8]);
                hasher.update(prop.property_type.type_name().as_bytes());
                hasher.update([prop.optional as u8, prop.indexed as u8]);
                if let Some(target) = &prop.object_type {
                    hasher.update(target.as_bytes());
                }
                hasher.update([0xffu8]);
            }
        }
        SchemaHash(hasher.finalize().into())
    }

    /// Drops every column binding in every type.
    pub fn unbind(&mut self) {
        for object_schema in &mut self.object_schemas {
            object_schema.unbind();
        }
    }
}
