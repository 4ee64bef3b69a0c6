//! Table store interface
//!
//! The reconciliation and lifecycle layers consume storage only through
//! the `TableStore` trait: tables of typed columns, link columns, search
//! indexes, primary-key equality search, row add / move-last-over / clear,
//! and single-writer transactions. `MemoryStore` is the bundled engine.
//!
//! # Invariants
//!
//! - Every mutating call requires an open write transaction
//! - At most one write transaction is open at a time
//! - Every call is atomic at single-call granularity
//! - A table's epoch moves on every structural mutation (row removal,
//!   clear, column add/remove, rollback); row indices obtained at an older
//!   epoch must be re-derived

mod cell;
mod checksum;
mod errors;
mod index;
mod memory;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::PropertyType;

pub use cell::Cell;
pub use errors::{StoreError, StoreResult};
pub use index::{IndexKey, SearchIndex};
pub use memory::MemoryStore;

/// Position of a column within its table.
pub type ColumnIndex = usize;

/// Physical description of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: PropertyType,
    #[serde(default)]
    pub nullable: bool,
    /// Target table for link and link-list columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    #[serde(default)]
    pub indexed: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: PropertyType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
            link_target: None,
            indexed: false,
        }
    }

    pub fn link(
        name: impl Into<String>,
        column_type: PropertyType,
        target_table: impl Into<String>,
    ) -> Self {
        Self {
            link_target: Some(target_table.into()),
            ..Self::new(name, column_type, column_type == PropertyType::Object)
        }
    }
}

/// A row identified by table and index, stamped with the table epoch it
/// was obtained at. The index alone is not a stable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub table: String,
    pub index: usize,
    pub epoch: u64,
}

impl RowRef {
    pub fn new(table: impl Into<String>, index: usize, epoch: u64) -> Self {
        Self {
            table: table.into(),
            index,
            epoch,
        }
    }

    /// Checks the epoch token against the store before trusting the index.
    pub fn is_valid<S: TableStore + ?Sized>(&self, store: &S) -> bool {
        match (store.epoch(&self.table), store.row_count(&self.table)) {
            (Ok(epoch), Ok(count)) => epoch == self.epoch && self.index < count,
            _ => false,
        }
    }
}

/// The storage capability consumed by reconciliation and row lifecycle.
pub trait TableStore {
    /// Identity of this store instance
    fn store_id(&self) -> Uuid;

    fn begin_write(&mut self) -> StoreResult<()>;
    fn commit(&mut self) -> StoreResult<()>;
    /// Restores the state captured by `begin_write`. No-op without a transaction.
    fn rollback(&mut self);
    fn is_in_write_transaction(&self) -> bool;

    /// Persisted schema version, `NOT_VERSIONED` if never set
    fn schema_version(&self) -> u64;
    fn set_schema_version(&mut self, version: u64) -> StoreResult<()>;

    fn table_names(&self) -> Vec<String>;
    fn has_table(&self, table: &str) -> bool;
    fn create_table(&mut self, table: &str) -> StoreResult<()>;
    fn primary_key(&self, table: &str) -> StoreResult<Option<String>>;
    fn set_primary_key(&mut self, table: &str, property: Option<&str>) -> StoreResult<()>;

    fn columns(&self, table: &str) -> StoreResult<Vec<ColumnSpec>>;
    fn add_column(&mut self, table: &str, spec: ColumnSpec) -> StoreResult<ColumnIndex>;
    fn remove_column(&mut self, table: &str, column: ColumnIndex) -> StoreResult<()>;
    fn has_search_index(&self, table: &str, column: ColumnIndex) -> StoreResult<bool>;
    fn add_search_index(&mut self, table: &str, column: ColumnIndex) -> StoreResult<()>;
    fn remove_search_index(&mut self, table: &str, column: ColumnIndex) -> StoreResult<()>;

    fn row_count(&self, table: &str) -> StoreResult<usize>;
    fn epoch(&self, table: &str) -> StoreResult<u64>;
    fn add_empty_row(&mut self, table: &str) -> StoreResult<usize>;
    /// Moves the last row into `row` and shrinks the table by one.
    fn move_last_over(&mut self, table: &str, row: usize) -> StoreResult<()>;
    fn clear(&mut self, table: &str) -> StoreResult<()>;

    fn get_cell(&self, table: &str, column: ColumnIndex, row: usize) -> StoreResult<Cell>;
    fn set_cell(&mut self, table: &str, column: ColumnIndex, row: usize, cell: Cell)
        -> StoreResult<()>;

    fn find_first_int(&self, table: &str, column: ColumnIndex, value: i64)
        -> StoreResult<Option<usize>>;
    fn find_first_string(&self, table: &str, column: ColumnIndex, value: &str)
        -> StoreResult<Option<usize>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_spec_nullability() {
        let object = ColumnSpec::link("owner", PropertyType::Object, "class_Person");
        assert!(object.nullable);
        let list = ColumnSpec::link("dogs", PropertyType::List, "class_Dog");
        assert!(!list.nullable);
        assert_eq!(list.link_target.as_deref(), Some("class_Dog"));
    }

    #[test]
    fn test_row_ref_epoch_check() {
        let mut store = MemoryStore::in_memory();
        store.begin_write().unwrap();
        store.create_table("class_Dog").unwrap();
        store.add_empty_row("class_Dog").unwrap();
        store.add_empty_row("class_Dog").unwrap();

        let epoch = store.epoch("class_Dog").unwrap();
        let first = RowRef::new("class_Dog", 0, epoch);
        assert!(first.is_valid(&store));

        store.move_last_over("class_Dog", 1).unwrap();
        assert!(!first.is_valid(&store));
        store.commit().unwrap();
    }
}
