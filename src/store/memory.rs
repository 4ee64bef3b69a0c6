//! In-memory table store with optional JSON persistence
//!
//! # Transactions
//!
//! `begin_write` snapshots the whole state; `rollback` restores it and
//! `commit` discards it. When a path is configured, `commit` persists the
//! state before returning (temp file, then rename), so a failed commit
//! leaves the previous file intact.
//!
//! # File format
//!
//! The first line holds `crc32:XXXXXXXX` computed over the rest of the
//! file, which is the JSON state. A file whose checksum does not match is
//! refused as corrupt.
//!
//! # Swap-with-last
//!
//! `move_last_over` relocates the last row into the freed slot and then
//! rewrites every link cell that targets the table: links to the removed
//! row become null (or leave their list), links to the moved row follow it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{PropertyType, NOT_VERSIONED};

use super::cell::Cell;
use super::checksum::{compute_checksum, format_checksum, parse_checksum};
use super::errors::{StoreError, StoreResult};
use super::index::{IndexKey, SearchIndex};
use super::{ColumnIndex, ColumnSpec, TableStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredColumn {
    spec: ColumnSpec,
    cells: Vec<Cell>,
    #[serde(skip)]
    index: Option<SearchIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTable {
    name: String,
    #[serde(default)]
    primary_key: Option<String>,
    columns: Vec<StoredColumn>,
    row_count: usize,
    #[serde(skip)]
    epoch: u64,
}

impl StoredTable {
    fn column(&self, column: ColumnIndex) -> StoreResult<&StoredColumn> {
        self.columns.get(column).ok_or_else(|| StoreError::NoSuchColumn {
            table: self.name.clone(),
            column,
        })
    }

    fn column_mut(&mut self, column: ColumnIndex) -> StoreResult<&mut StoredColumn> {
        let table = self.name.clone();
        self.columns
            .get_mut(column)
            .ok_or(StoreError::NoSuchColumn { table, column })
    }

    fn check_row(&self, row: usize) -> StoreResult<()> {
        if row >= self.row_count {
            return Err(StoreError::RowOutOfBounds {
                table: self.name.clone(),
                row,
                row_count: self.row_count,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    schema_version: u64,
    tables: Vec<StoredTable>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            schema_version: NOT_VERSIONED,
            tables: Vec::new(),
        }
    }
}

/// Splits a store file into its `crc32:` header line and the state text.
fn split_store_file(content: &str) -> Option<(u32, &str)> {
    let (header, body) = content.split_once('\n')?;
    Some((parse_checksum(header)?, body))
}

/// In-memory, single-writer table store.
#[derive(Debug)]
pub struct MemoryStore {
    id: Uuid,
    path: Option<PathBuf>,
    state: StoreState,
    snapshot: Option<StoreState>,
    epoch_counter: u64,
}

impl MemoryStore {
    /// Creates an empty, unversioned store that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            id: Uuid::new_v4(),
            path: None,
            state: StoreState::default(),
            snapshot: None,
            epoch_counter: 0,
        }
    }

    /// Opens the store persisted at `path`, or an empty one if the file
    /// does not exist yet. The file is only written on commit.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut store = Self::in_memory();
        store.path = Some(path.to_path_buf());

        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| StoreError::Io(format!("failed to read '{}': {}", path.display(), e)))?;
            let (expected, body) = split_store_file(&content).ok_or_else(|| {
                StoreError::Corrupt(format!("'{}': missing checksum header", path.display()))
            })?;
            let actual = compute_checksum(body.as_bytes());
            if actual != expected {
                return Err(StoreError::Corrupt(format!(
                    "'{}': checksum mismatch, expected {} but computed {}",
                    path.display(),
                    format_checksum(expected),
                    format_checksum(actual)
                )));
            }
            store.state = serde_json::from_str(body)
                .map_err(|e| StoreError::Corrupt(format!("'{}': {}", path.display(), e)))?;
            store.restore_derived_state()?;
        }

        Ok(store)
    }

    /// Returns the persistence path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Checks cell counts and rebuilds search indexes after a load.
    fn restore_derived_state(&mut self) -> StoreResult<()> {
        for table in &mut self.state.tables {
            for column in &mut table.columns {
                if column.cells.len() != table.row_count {
                    return Err(StoreError::Corrupt(format!(
                        "column '{}.{}' holds {} cells for {} rows",
                        table.name,
                        column.spec.name,
                        column.cells.len(),
                        table.row_count
                    )));
                }
                if column.spec.indexed {
                    column.index = Some(SearchIndex::build(&column.cells));
                }
            }
        }
        self.refresh_all_epochs();
        Ok(())
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch_counter += 1;
        self.epoch_counter
    }

    fn refresh_all_epochs(&mut self) {
        for i in 0..self.state.tables.len() {
            let epoch = self.next_epoch();
            self.state.tables[i].epoch = epoch;
        }
    }

    fn bump_epoch(&mut self, table: &str) -> StoreResult<()> {
        let epoch = self.next_epoch();
        self.table_mut(table)?.epoch = epoch;
        Ok(())
    }

    fn require_write(&self, operation: &str) -> StoreResult<()> {
        if self.snapshot.is_none() {
            return Err(StoreError::not_in_write(operation));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> StoreResult<&StoredTable> {
        self.state
            .tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| StoreError::NoSuchTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut StoredTable> {
        self.state
            .tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| StoreError::NoSuchTable(name.to_string()))
    }

    fn persist(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_string(&self.state)
            .map_err(|e| StoreError::Io(format!("failed to serialize store: {}", e)))?;
        let content = format!("{}\n{}", format_checksum(compute_checksum(body.as_bytes())), body);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)
            .map_err(|e| StoreError::Io(format!("failed to write '{}': {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| StoreError::Io(format!("failed to replace '{}': {}", path.display(), e)))?;
        Ok(())
    }

    /// Checks that link cells point at existing rows of the target table.
    fn check_link_cell(&self, spec: &ColumnSpec, cell: &Cell) -> StoreResult<()> {
        let targets: &[usize] = match cell {
            Cell::Link(row) => std::slice::from_ref(row),
            Cell::LinkList(rows) => rows,
            _ => return Ok(()),
        };
        let target = spec.link_target.as_deref().unwrap_or_default();
        let target_table = self.table(target)?;
        for row in targets {
            target_table.check_row(*row)?;
        }
        Ok(())
    }

    /// Rewrites links into `table` after `removed` was deleted and, when
    /// `moved_from` is set, the row at `moved_from` now lives at `removed`.
    fn fix_up_links(&mut self, table: &str, removed: usize, moved_from: Option<usize>) {
        let remap = |row: usize| -> Option<usize> {
            if row == removed {
                None
            } else if Some(row) == moved_from {
                Some(removed)
            } else {
                Some(row)
            }
        };

        for stored in &mut self.state.tables {
            for column in &mut stored.columns {
                if column.spec.link_target.as_deref() != Some(table) {
                    continue;
                }
                for cell in &mut column.cells {
                    match cell {
                        Cell::Link(row) => match remap(*row) {
                            Some(new_row) => *row = new_row,
                            None => *cell = Cell::Null,
                        },
                        Cell::LinkList(rows) => {
                            *rows = rows.iter().filter_map(|r| remap(*r)).collect();
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Nulls every link into `table` and empties every list targeting it.
    fn drop_links_into(&mut self, table: &str) {
        for stored in &mut self.state.tables {
            for column in &mut stored.columns {
                if column.spec.link_target.as_deref() != Some(table) {
                    continue;
                }
                for cell in &mut column.cells {
                    match cell {
                        Cell::Link(_) => *cell = Cell::Null,
                        Cell::LinkList(rows) => rows.clear(),
                        _ => {}
                    }
                }
            }
        }
    }

    fn find_first(
        &self,
        table: &str,
        column: ColumnIndex,
        expected: PropertyType,
        key: IndexKey,
        cell: Cell,
    ) -> StoreResult<Option<usize>> {
        let stored = self.table(table)?;
        let col = stored.column(column)?;
        if col.spec.column_type != expected {
            return Err(StoreError::CellTypeMismatch {
                table: table.to_string(),
                column: col.spec.name.clone(),
                expected: col.spec.column_type,
                actual: cell.kind_name(),
            });
        }
        if let Some(index) = &col.index {
            return Ok(index.find_first(&key));
        }
        Ok(col.cells.iter().position(|c| *c == cell))
    }
}

impl TableStore for MemoryStore {
    fn store_id(&self) -> Uuid {
        self.id
    }

    fn begin_write(&mut self) -> StoreResult<()> {
        if self.snapshot.is_some() {
            return Err(StoreError::WriteTransactionOpen);
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.require_write("commit")?;
        self.persist()?;
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.state = snapshot;
            self.refresh_all_epochs();
        }
    }

    fn is_in_write_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn schema_version(&self) -> u64 {
        self.state.schema_version
    }

    fn set_schema_version(&mut self, version: u64) -> StoreResult<()> {
        self.require_write("set_schema_version")?;
        self.state.schema_version = version;
        Ok(())
    }

    fn table_names(&self) -> Vec<String> {
        self.state.tables.iter().map(|t| t.name.clone()).collect()
    }

    fn has_table(&self, table: &str) -> bool {
        self.state.tables.iter().any(|t| t.name == table)
    }

    fn create_table(&mut self, table: &str) -> StoreResult<()> {
        self.require_write("create_table")?;
        if self.has_table(table) {
            return Err(StoreError::TableExists(table.to_string()));
        }
        let epoch = self.next_epoch();
        self.state.tables.push(StoredTable {
            name: table.to_string(),
            primary_key: None,
            columns: Vec::new(),
            row_count: 0,
            epoch,
        });
        Ok(())
    }

    fn primary_key(&self, table: &str) -> StoreResult<Option<String>> {
        Ok(self.table(table)?.primary_key.clone())
    }

    fn set_primary_key(&mut self, table: &str, property: Option<&str>) -> StoreResult<()> {
        self.require_write("set_primary_key")?;
        self.table_mut(table)?.primary_key = property.map(str::to_string);
        Ok(())
    }

    fn columns(&self, table: &str) -> StoreResult<Vec<ColumnSpec>> {
        Ok(self
            .table(table)?
            .columns
            .iter()
            .map(|c| c.spec.clone())
            .collect())
    }

    fn add_column(&mut self, table: &str, spec: ColumnSpec) -> StoreResult<ColumnIndex> {
        self.require_write("add_column")?;
        if spec.indexed && !spec.column_type.is_indexable() {
            return Err(StoreError::Unindexable {
                table: table.to_string(),
                column: spec.name.clone(),
                column_type: spec.column_type,
            });
        }

        let stored = self.table_mut(table)?;
        let cells = vec![Cell::default_for(spec.column_type, spec.nullable); stored.row_count];
        let index = spec.indexed.then(|| SearchIndex::build(&cells));
        stored.columns.push(StoredColumn { spec, cells, index });
        let column = stored.columns.len() - 1;

        self.bump_epoch(table)?;
        Ok(column)
    }

    fn remove_column(&mut self, table: &str, column: ColumnIndex) -> StoreResult<()> {
        self.require_write("remove_column")?;
        let stored = self.table_mut(table)?;
        stored.column(column)?;
        stored.columns.remove(column);
        self.bump_epoch(table)
    }

    fn has_search_index(&self, table: &str, column: ColumnIndex) -> StoreResult<bool> {
        Ok(self.table(table)?.column(column)?.index.is_some())
    }

    fn add_search_index(&mut self, table: &str, column: ColumnIndex) -> StoreResult<()> {
        self.require_write("add_search_index")?;
        let col = self.table_mut(table)?.column_mut(column)?;
        if !col.spec.column_type.is_indexable() {
            return Err(StoreError::Unindexable {
                table: table.to_string(),
                column: col.spec.name.clone(),
                column_type: col.spec.column_type,
            });
        }
        col.index = Some(SearchIndex::build(&col.cells));
        col.spec.indexed = true;
        Ok(())
    }

    fn remove_search_index(&mut self, table: &str, column: ColumnIndex) -> StoreResult<()> {
        self.require_write("remove_search_index")?;
        let col = self.table_mut(table)?.column_mut(column)?;
        col.index = None;
        col.spec.indexed = false;
        Ok(())
    }

    fn row_count(&self, table: &str) -> StoreResult<usize> {
        Ok(self.table(table)?.row_count)
    }

    fn epoch(&self, table: &str) -> StoreResult<u64> {
        Ok(self.table(table)?.epoch)
    }

    fn add_empty_row(&mut self, table: &str) -> StoreResult<usize> {
        self.require_write("add_empty_row")?;
        let stored = self.table_mut(table)?;
        let row = stored.row_count;
        for column in &mut stored.columns {
            let cell = Cell::default_for(column.spec.column_type, column.spec.nullable);
            if let Some(index) = &mut column.index {
                index.insert(&cell, row);
            }
            column.cells.push(cell);
        }
        stored.row_count += 1;
        Ok(row)
    }

    fn move_last_over(&mut self, table: &str, row: usize) -> StoreResult<()> {
        self.require_write("move_last_over")?;
        let stored = self.table_mut(table)?;
        stored.check_row(row)?;
        let last = stored.row_count - 1;

        for column in &mut stored.columns {
            if let Some(index) = &mut column.index {
                index.remove(&column.cells[row], row);
                if row != last {
                    index.remove(&column.cells[last], last);
                    index.insert(&column.cells[last], row);
                }
            }
            column.cells.swap_remove(row);
        }
        stored.row_count -= 1;

        let moved_from = (row != last).then_some(last);
        self.fix_up_links(table, row, moved_from);
        self.bump_epoch(table)
    }

    fn clear(&mut self, table: &str) -> StoreResult<()> {
        self.require_write("clear")?;
        let stored = self.table_mut(table)?;
        for column in &mut stored.columns {
            column.cells.clear();
            if let Some(index) = &mut column.index {
                index.clear();
            }
        }
        stored.row_count = 0;
        self.drop_links_into(table);
        self.bump_epoch(table)
    }

    fn get_cell(&self, table: &str, column: ColumnIndex, row: usize) -> StoreResult<Cell> {
        let stored = self.table(table)?;
        stored.check_row(row)?;
        Ok(stored.column(column)?.cells[row].clone())
    }

    fn set_cell(
        &mut self,
        table: &str,
        column: ColumnIndex,
        row: usize,
        cell: Cell,
    ) -> StoreResult<()> {
        self.require_write("set_cell")?;
        let spec = {
            let stored = self.table(table)?;
            stored.check_row(row)?;
            stored.column(column)?.spec.clone()
        };
        if !cell.fits(spec.column_type, spec.nullable) {
            return Err(StoreError::CellTypeMismatch {
                table: table.to_string(),
                column: spec.name,
                expected: spec.column_type,
                actual: cell.kind_name(),
            });
        }
        self.check_link_cell(&spec, &cell)?;

        let col = self.table_mut(table)?.column_mut(column)?;
        if let Some(index) = &mut col.index {
            index.remove(&col.cells[row], row);
            index.insert(&cell, row);
        }
        col.cells[row] = cell;
        Ok(())
    }

    fn find_first_int(
        &self,
        table: &str,
        column: ColumnIndex,
        value: i64,
    ) -> StoreResult<Option<usize>> {
        self.find_first(table, column, PropertyType::Int, IndexKey::Int(value), Cell::Int(value))
    }

    fn find_first_string(
        &self,
        table: &str,
        column: ColumnIndex,
        value: &str,
    ) -> StoreResult<Option<usize>> {
        self.find_first(
            table,
            column,
            PropertyType::String,
            IndexKey::String(value.to_string()),
            Cell::String(value.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dog_store() -> MemoryStore {
        let mut store = MemoryStore::in_memory();
        store.begin_write().unwrap();
        store.create_table("class_Dog").unwrap();
        store
            .add_column("class_Dog", ColumnSpec::new("name", PropertyType::String, false))
            .unwrap();
        for name in ["A", "B", "C", "D"] {
            let row = store.add_empty_row("class_Dog").unwrap();
            store
                .set_cell("class_Dog", 0, row, Cell::String(name.into()))
                .unwrap();
        }
        store.commit().unwrap();
        store
    }

    fn names(store: &MemoryStore) -> Vec<String> {
        (0..store.row_count("class_Dog").unwrap())
            .map(|row| match store.get_cell("class_Dog", 0, row).unwrap() {
                Cell::String(s) => s,
                other => panic!("unexpected cell {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_mutation_requires_write_transaction() {
        let mut store = MemoryStore::in_memory();
        let err = store.create_table("class_Dog").unwrap_err();
        assert!(matches!(err, StoreError::NotInWriteTransaction { .. }));
    }

    #[test]
    fn test_single_writer() {
        let mut store = MemoryStore::in_memory();
        store.begin_write().unwrap();
        assert_eq!(store.begin_write().unwrap_err(), StoreError::WriteTransactionOpen);
    }

    #[test]
    fn test_move_last_over() {
        let mut store = dog_store();
        store.begin_write().unwrap();
        store.move_last_over("class_Dog", 1).unwrap();
        store.commit().unwrap();
        assert_eq!(names(&store), vec!["A", "D", "C"]);
    }

    #[test]
    fn test_move_last_over_on_last_row_truncates() {
        let mut store = dog_store();
        store.begin_write().unwrap();
        store.move_last_over("class_Dog", 3).unwrap();
        store.commit().unwrap();
        assert_eq!(names(&store), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_rollback_restores_state_and_moves_epoch() {
        let mut store = dog_store();
        let epoch = store.epoch("class_Dog").unwrap();
        store.begin_write().unwrap();
        store.clear("class_Dog").unwrap();
        store.set_schema_version(9).unwrap();
        store.rollback();

        assert_eq!(names(&store), vec!["A", "B", "C", "D"]);
        assert_eq!(store.schema_version(), NOT_VERSIONED);
        assert_ne!(store.epoch("class_Dog").unwrap(), epoch);
    }

    #[test]
    fn test_search_index_follows_swap() {
        let mut store = dog_store();
        store.begin_write().unwrap();
        store.add_search_index("class_Dog", 0).unwrap();
        store.move_last_over("class_Dog", 0).unwrap();
        assert_eq!(store.find_first_string("class_Dog", 0, "D").unwrap(), Some(0));
        assert_eq!(store.find_first_string("class_Dog", 0, "A").unwrap(), None);
        store.commit().unwrap();
    }

    #[test]
    fn test_links_follow_moved_row() {
        let mut store = dog_store();
        store.begin_write().unwrap();
        store.create_table("class_Person").unwrap();
        store
            .add_column("class_Person", ColumnSpec::link("dog", PropertyType::Object, "class_Dog"))
            .unwrap();
        store
            .add_column("class_Person", ColumnSpec::link("dogs", PropertyType::List, "class_Dog"))
            .unwrap();
        let person = store.add_empty_row("class_Person").unwrap();
        store.set_cell("class_Person", 0, person, Cell::Link(3)).unwrap();
        store
            .set_cell("class_Person", 1, person, Cell::LinkList(vec![1, 3, 0]))
            .unwrap();

        store.move_last_over("class_Dog", 1).unwrap();

        assert_eq!(store.get_cell("class_Person", 0, person).unwrap(), Cell::Link(1));
        assert_eq!(
            store.get_cell("class_Person", 1, person).unwrap(),
            Cell::LinkList(vec![1, 0])
        );
        store.commit().unwrap();
    }

    #[test]
    fn test_set_cell_rejects_wrong_type() {
        let mut store = dog_store();
        store.begin_write().unwrap();
        let err = store.set_cell("class_Dog", 0, 0, Cell::Int(1)).unwrap_err();
        assert!(matches!(err, StoreError::CellTypeMismatch { .. }));
    }

    #[test]
    fn test_unindexable_column() {
        let mut store = MemoryStore::in_memory();
        store.begin_write().unwrap();
        store.create_table("class_Reading").unwrap();
        let col = store
            .add_column("class_Reading", ColumnSpec::new("value", PropertyType::Double, false))
            .unwrap();
        let err = store.add_search_index("class_Reading", col).unwrap_err();
        assert!(matches!(err, StoreError::Unindexable { .. }));
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default.realm");

        let mut store = MemoryStore::open(&path).unwrap();
        store.begin_write().unwrap();
        store.create_table("class_Dog").unwrap();
        let col = store
            .add_column("class_Dog", ColumnSpec::new("name", PropertyType::String, false))
            .unwrap();
        store.add_search_index("class_Dog", col).unwrap();
        let row = store.add_empty_row("class_Dog").unwrap();
        store.set_cell("class_Dog", col, row, Cell::String("Rex".into())).unwrap();
        store.set_schema_version(2).unwrap();
        store.commit().unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.schema_version(), 2);
        assert!(reopened.has_search_index("class_Dog", col).unwrap());
        assert_eq!(reopened.find_first_string("class_Dog", col, "Rex").unwrap(), Some(0));
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default.realm");
        fs::write(&path, "not json").unwrap();
        let err = MemoryStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_tampered_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default.realm");

        let mut store = MemoryStore::open(&path).unwrap();
        store.begin_write().unwrap();
        store.set_schema_version(3).unwrap();
        store.commit().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("crc32:"));
        fs::write(&path, content.replace("\"schema_version\":3", "\"schema_version\":4")).unwrap();

        let err = MemoryStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("checksum mismatch")));
    }
}
