//! Schema reconciliation
//!
//! - `aligner`: compares and rewrites the layout of one table
//! - `coordinator`: drives a whole reconciliation pass, version checks
//!   and the write transaction around it
//! - `Migration`: what a migration callback sees while it runs

pub mod aligner;
pub mod coordinator;

use std::collections::BTreeMap;

use crate::errors::{RealmError, RealmResult};
use crate::lifecycle::ObjectAccessor;
use crate::observer::{EventLog, RowEvent};
use crate::realm::Realm;
use crate::schema::{table_name_for_type, Schema};
use crate::store::{MemoryStore, RowRef, TableStore};
use crate::value::Value;

pub use coordinator::ReconcileOutcome;

/// Scalar property values of a row as they were before the layout changed.
///
/// Link properties are not captured; surviving link columns are read from
/// the new row.
#[derive(Debug, Clone, PartialEq)]
pub struct OldObject {
    type_name: String,
    values: BTreeMap<String, Value>,
}

impl OldObject {
    pub(crate) fn new(type_name: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            type_name: type_name.into(),
            values,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

impl ObjectAccessor for OldObject {
    fn get_value(&self, property: &str) -> Option<Value> {
        self.values.get(property).cloned()
    }
}

/// Context handed to a migration callback.
///
/// The realm is already aligned to the new schema and inside the
/// migration's write transaction. Returning an error aborts the whole
/// reconciliation and rolls every change back.
pub struct Migration<'a, S: TableStore = MemoryStore> {
    realm: &'a mut Realm<S>,
    old_schema: Schema,
    old_version: u64,
    old_objects: BTreeMap<String, Vec<OldObject>>,
}

impl<'a, S: TableStore> Migration<'a, S> {
    pub(crate) fn new(
        realm: &'a mut Realm<S>,
        old_schema: Schema,
        old_version: u64,
        old_objects: BTreeMap<String, Vec<OldObject>>,
    ) -> Self {
        Self {
            realm,
            old_schema,
            old_version,
            old_objects,
        }
    }

    /// Layout recorded in storage before this reconciliation.
    pub fn old_schema(&self) -> &Schema {
        &self.old_schema
    }

    pub fn new_schema(&self) -> &Schema {
        self.realm.schema()
    }

    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    pub fn realm(&self) -> &Realm<S> {
        &*self.realm
    }

    pub fn realm_mut(&mut self) -> &mut Realm<S> {
        &mut *self.realm
    }

    /// Calls `f` for every row that existed before the migration, from the
    /// last row to the first, with its old values and its current row.
    ///
    /// `f` may delete the row it is given, or rows it already visited;
    /// rows not yet visited keep their index because only rows after them
    /// are moved. Deleting a row not yet visited fails the enumeration,
    /// since a different row would then sit in its slot.
    pub fn enumerate_objects<F>(&mut self, type_name: &str, mut f: F) -> RealmResult<()>
    where
        F: FnMut(&mut Realm<S>, &OldObject, RowRef) -> RealmResult<()>,
    {
        let Some(objects) = self.old_objects.get(type_name) else {
            return Ok(());
        };
        let realm = &mut *self.realm;

        let deletions = EventLog::new();
        let slot = realm.observers.len();
        realm.observers.push(Box::new(deletions.clone()));
        let result = visit_rows(realm, type_name, objects, &deletions, &mut f);
        realm.observers.remove(slot);
        result
    }

    pub fn create_object(
        &mut self,
        type_name: &str,
        object: &dyn ObjectAccessor,
        update: bool,
    ) -> RealmResult<RowRef> {
        self.realm.create_object(type_name, object, update)
    }

    pub fn delete_row(&mut self, row: &RowRef) -> RealmResult<()> {
        self.realm.delete_row(row)
    }

    /// Removes every row of a type, whether or not it is still declared.
    pub fn delete_data(&mut self, type_name: &str) -> RealmResult<()> {
        if !self.realm.store.has_table(&table_name_for_type(type_name)) {
            return Ok(());
        }
        self.realm.delete_all_rows(type_name)
    }
}

/// Rows of `type_name` deleted below `index` since the log was cleared.
fn deleted_below(log: &EventLog, type_name: &str, index: usize) -> Option<usize> {
    log.events().into_iter().find_map(|event| match event {
        RowEvent::Deleted { type_name: t, row, .. } if t == type_name && row < index => Some(row),
        _ => None,
    })
}

fn visit_rows<S, F>(
    realm: &mut Realm<S>,
    type_name: &str,
    objects: &[OldObject],
    deletions: &EventLog,
    f: &mut F,
) -> RealmResult<()>
where
    S: TableStore,
    F: FnMut(&mut Realm<S>, &OldObject, RowRef) -> RealmResult<()>,
{
    let table = table_name_for_type(type_name);
    for (index, old) in objects.iter().enumerate().rev() {
        if index >= realm.store.row_count(&table)? {
            continue;
        }
        let row = RowRef::new(&table, index, realm.store.epoch(&table)?);
        deletions.clear();
        f(realm, old, row)?;

        if let Some(deleted) = deleted_below(deletions, type_name, index) {
            return Err(RealmError::invalid_reference(
                type_name,
                format!("#{}", deleted),
                "deleted during enumeration before it was visited",
            ));
        }
    }
    Ok(())
}
