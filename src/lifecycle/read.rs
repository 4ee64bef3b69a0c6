//! Reading stored cells back as candidate values

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::errors::{RealmError, RealmResult};
use crate::schema::{table_name_for_type, ObjectSchema, Property};
use crate::store::{Cell, RowRef, TableStore};
use crate::value::{ObjectRef, Value};

fn link_ref<S: TableStore + ?Sized>(
    store: &S,
    realm_id: Uuid,
    target: &str,
    row: usize,
) -> RealmResult<Value> {
    let table = table_name_for_type(target);
    Ok(Value::Object(ObjectRef {
        realm_id,
        type_name: target.to_string(),
        row: RowRef::new(&table, row, store.epoch(&table)?),
    }))
}

/// Converts one cell of `prop` into a value. Links become object
/// references stamped with the target table's current epoch.
pub(crate) fn cell_value<S: TableStore + ?Sized>(
    store: &S,
    realm_id: Uuid,
    prop: &Property,
    cell: Cell,
) -> RealmResult<Value> {
    let target = prop.object_type.as_deref().unwrap_or_default();
    match cell {
        Cell::Link(row) => link_ref(store, realm_id, target, row),
        Cell::LinkList(rows) => rows
            .into_iter()
            .map(|row| link_ref(store, realm_id, target, row))
            .collect::<RealmResult<Vec<_>>>()
            .map(Value::List),
        scalar => scalar.to_scalar().ok_or_else(|| {
            RealmError::InvalidSchema(format!("'{}' holds an unreadable cell", prop.name))
        }),
    }
}

/// Reads `owner.prop` at `row`.
pub(crate) fn read_value<S: TableStore + ?Sized>(
    store: &S,
    realm_id: Uuid,
    owner: &ObjectSchema,
    prop: &Property,
    row: usize,
) -> RealmResult<Value> {
    let column = prop.require_column(&owner.name)?;
    let cell = store.get_cell(&table_name_for_type(&owner.name), column, row)?;
    cell_value(store, realm_id, prop, cell)
}

/// Reads every property of a row, skipping link properties when
/// `with_links` is false.
pub(crate) fn read_object<S: TableStore + ?Sized>(
    store: &S,
    realm_id: Uuid,
    owner: &ObjectSchema,
    row: usize,
    with_links: bool,
) -> RealmResult<BTreeMap<String, Value>> {
    let mut values = BTreeMap::new();
    for prop in &owner.properties {
        if !with_links && prop.property_type.is_link() {
            continue;
        }
        values.insert(prop.name.clone(), read_value(store, realm_id, owner, prop, row)?);
    }
    Ok(values)
}
