//! Column aligner
//!
//! Compares the layout recorded in storage for one type with the declared
//! type descriptor. Verification collects every discrepancy without
//! touching storage; alignment rewrites the table so that it matches.
//!
//! Alignment order for one table:
//! 1. Append a column for every added, retyped or re-nulled property
//! 2. Copy values into relaxed (required to optional) columns
//! 3. Remove stale columns, highest index first
//! 4. Rewrite the primary-key marker
//! 5. Rebind every declared property to its column

use crate::config::RelaxationCopy;
use crate::errors::{DiscrepancyKind, RealmError, RealmResult, SchemaDiscrepancy};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{
    table_name_for_type, type_for_table_name, ObjectSchema, Property, Schema,
};
use crate::store::{ColumnIndex, ColumnSpec, TableStore};

/// Reads the layout of the table backing `type_name` as a bound type
/// descriptor.
pub fn table_schema<S: TableStore + ?Sized>(
    store: &S,
    type_name: &str,
) -> RealmResult<ObjectSchema> {
    let table = table_name_for_type(type_name);
    let mut properties = Vec::new();

    for (column, spec) in store.columns(&table)?.into_iter().enumerate() {
        let mut prop = Property::new(spec.name, spec.column_type);
        prop.optional = spec.nullable;
        prop.indexed = spec.indexed;
        prop.object_type = spec
            .link_target
            .as_deref()
            .and_then(type_for_table_name)
            .map(str::to_string);
        prop.bind_column(column);
        properties.push(prop);
    }

    let mut object_schema = ObjectSchema::new(type_name, properties);
    object_schema.primary_key = store.primary_key(&table)?;
    Ok(object_schema)
}

/// Reads every type recorded in storage.
pub fn stored_schema<S: TableStore + ?Sized>(store: &S) -> RealmResult<Schema> {
    let mut object_schemas = Vec::new();
    for table in store.table_names() {
        if let Some(type_name) = type_for_table_name(&table) {
            object_schemas.push(table_schema(store, type_name)?);
        }
    }
    Ok(Schema::new(object_schemas))
}

/// Lists every difference between the stored and the declared layout.
///
/// Search indexes are not compared; they are refreshed separately.
pub fn verify(stored: &ObjectSchema, declared: &ObjectSchema) -> Vec<SchemaDiscrepancy> {
    let type_name = declared.name.as_str();
    let mut found = Vec::new();

    for old in &stored.properties {
        let Some(new) = declared.property(&old.name) else {
            found.push(SchemaDiscrepancy::new(type_name, &old.name, DiscrepancyKind::Removed));
            continue;
        };

        if old.property_type != new.property_type {
            found.push(SchemaDiscrepancy::new(
                type_name,
                &old.name,
                DiscrepancyKind::TypeChanged {
                    stored: old.property_type,
                    declared: new.property_type,
                },
            ));
            continue;
        }
        if old.object_type != new.object_type {
            found.push(SchemaDiscrepancy::new(
                type_name,
                &old.name,
                DiscrepancyKind::LinkTargetChanged {
                    stored: old.object_type.clone(),
                    declared: new.object_type.clone(),
                },
            ));
        }
        if old.is_nullable() != new.is_nullable() {
            found.push(SchemaDiscrepancy::new(
                type_name,
                &old.name,
                DiscrepancyKind::NullabilityChanged {
                    stored_optional: old.is_nullable(),
                    declared_optional: new.is_nullable(),
                },
            ));
        }
        let stored_primary = stored.is_primary(&old.name);
        let declared_primary = declared.is_primary(&new.name);
        if stored_primary != declared_primary {
            found.push(SchemaDiscrepancy::new(
                type_name,
                &old.name,
                DiscrepancyKind::PrimaryKeyChanged {
                    stored_primary,
                    declared_primary,
                },
            ));
        }
    }

    for new in &declared.properties {
        if stored.property(&new.name).is_none() {
            found.push(SchemaDiscrepancy::new(type_name, &new.name, DiscrepancyKind::Added));
        }
    }

    found
}

/// Binds every declared property to the column of the same name.
pub fn bind(declared: &mut ObjectSchema, stored: &ObjectSchema) -> RealmResult<()> {
    let type_name = declared.name.clone();
    for prop in &mut declared.properties {
        let column = stored
            .property(&prop.name)
            .and_then(Property::column)
            .ok_or_else(|| {
                RealmError::InvalidSchema(format!(
                    "'{}.{}' has no column in storage",
                    type_name, prop.name
                ))
            })?;
        prop.bind_column(column);
    }
    Ok(())
}

/// Rebinds `declared` against the current layout of its table.
pub fn rebind<S: TableStore + ?Sized>(store: &S, declared: &mut ObjectSchema) -> RealmResult<()> {
    let stored = table_schema(store, &declared.name)?;
    bind(declared, &stored)
}

fn column_spec(prop: &Property) -> ColumnSpec {
    match &prop.object_type {
        Some(target) if prop.property_type.is_link() => {
            ColumnSpec::link(&prop.name, prop.property_type, table_name_for_type(target))
        }
        _ => ColumnSpec::new(&prop.name, prop.property_type, prop.is_nullable()),
    }
}

fn add_column<S: TableStore + ?Sized>(
    store: &mut S,
    table: &str,
    prop: &Property,
) -> RealmResult<ColumnIndex> {
    let column = store.add_column(table, column_spec(prop))?;
    log_event_with_fields(
        Event::ColumnAdded,
        &[
            ("table", table),
            ("column", prop.name.as_str()),
            ("type", prop.property_type.type_name()),
        ],
    );
    Ok(column)
}

/// Creates the empty table for a declared type. Columns are added in a
/// second pass so that link columns may target tables created later in
/// the same pass.
pub fn create_table<S: TableStore + ?Sized>(store: &mut S, declared: &ObjectSchema) -> RealmResult<()> {
    let table = table_name_for_type(&declared.name);
    store.create_table(&table)?;
    log_event_with_fields(Event::TableCreated, &[("table", table.as_str())]);
    Ok(())
}

/// Lays out the columns of a freshly created table in declared order.
pub fn populate_table<S: TableStore + ?Sized>(
    store: &mut S,
    declared: &mut ObjectSchema,
) -> RealmResult<()> {
    let table = table_name_for_type(&declared.name);
    for prop in &mut declared.properties {
        let column = add_column(store, &table, prop)?;
        prop.bind_column(column);
    }
    if let Some(pk) = &declared.primary_key {
        store.set_primary_key(&table, Some(pk))?;
        log_event_with_fields(Event::PrimaryKeyChanged, &[("table", table.as_str()), ("primary_key", pk.as_str())]);
    }
    Ok(())
}

/// Rewrites an existing table to match `declared`, returning whether
/// anything changed.
pub fn align<S: TableStore + ?Sized>(
    store: &mut S,
    stored: &ObjectSchema,
    declared: &mut ObjectSchema,
    policy: RelaxationCopy,
) -> RealmResult<bool> {
    let table = table_name_for_type(&declared.name);
    let mut changed = false;
    let mut stale = Vec::new();

    for old in &stored.properties {
        if declared.property(&old.name).is_none() {
            stale.push(old.require_column(&stored.name)?);
        }
    }

    for prop in &declared.properties {
        let Some(old) = stored.property(&prop.name) else {
            add_column(store, &table, prop)?;
            changed = true;
            continue;
        };

        let same_shape =
            old.property_type == prop.property_type && old.object_type == prop.object_type;
        if same_shape && old.is_nullable() == prop.is_nullable() {
            continue;
        }

        let old_column = old.require_column(&stored.name)?;
        let relaxed = same_shape && !old.is_nullable() && prop.is_nullable();
        if relaxed && !policy.copies(prop.property_type) {
            return Err(RealmError::UnsupportedColumnRetype {
                type_name: declared.name.clone(),
                property: prop.name.clone(),
                column_type: prop.property_type,
                reason: format!(
                    "values of {} columns cannot be copied when the property becomes optional",
                    prop.property_type
                ),
            });
        }

        let new_column = add_column(store, &table, prop)?;
        if relaxed {
            copy_column(store, &table, old_column, new_column)?;
            log_event_with_fields(Event::ColumnCopied, &[("table", table.as_str()), ("column", prop.name.as_str())]);
        }
        stale.push(old_column);
        changed = true;
    }

    stale.sort_unstable_by(|a, b| b.cmp(a));
    for column in stale {
        let name = stored
            .properties
            .iter()
            .find(|p| p.column() == Some(column))
            .map(|p| p.name.clone())
            .unwrap_or_default();
        store.remove_column(&table, column)?;
        log_event_with_fields(Event::ColumnRemoved, &[("table", table.as_str()), ("column", name.as_str())]);
        changed = true;
    }

    if stored.primary_key != declared.primary_key {
        store.set_primary_key(&table, declared.primary_key.as_deref())?;
        log_event_with_fields(
            Event::PrimaryKeyChanged,
            &[
                ("table", table.as_str()),
                ("primary_key", declared.primary_key.as_deref().unwrap_or("<none>")),
            ],
        );
        changed = true;
    }

    rebind(store, declared)?;
    Ok(changed)
}

fn copy_column<S: TableStore + ?Sized>(
    store: &mut S,
    table: &str,
    from: ColumnIndex,
    to: ColumnIndex,
) -> RealmResult<()> {
    for row in 0..store.row_count(table)? {
        let cell = store.get_cell(table, from, row)?;
        store.set_cell(table, to, row, cell)?;
    }
    Ok(())
}

/// Search-index changes needed to match `declared`: `(column, add)` pairs.
pub fn index_changes<S: TableStore + ?Sized>(
    store: &S,
    declared: &ObjectSchema,
) -> RealmResult<Vec<(ColumnIndex, bool)>> {
    let table = table_name_for_type(&declared.name);
    let mut changes = Vec::new();

    for prop in &declared.properties {
        let column = prop.require_column(&declared.name)?;
        let wanted = declared.wants_index(prop);
        let present = store.has_search_index(&table, column)?;
        if wanted && !present {
            if !prop.property_type.is_indexable() {
                return Err(RealmError::UnindexableType {
                    type_name: declared.name.clone(),
                    property: prop.name.clone(),
                    property_type: prop.property_type,
                });
            }
            changes.push((column, true));
        } else if !wanted && present {
            changes.push((column, false));
        }
    }

    Ok(changes)
}

/// Adds and removes search indexes so that exactly the indexed and
/// primary-key properties carry one. Returns whether anything changed.
pub fn update_indexes<S: TableStore + ?Sized>(
    store: &mut S,
    declared: &ObjectSchema,
) -> RealmResult<bool> {
    let table = table_name_for_type(&declared.name);
    let changes = index_changes(store, declared)?;

    for (column, add) in &changes {
        let name = declared
            .properties
            .iter()
            .find(|p| p.column() == Some(*column))
            .map(|p| p.name.as_str())
            .unwrap_or_default();
        if *add {
            store.add_search_index(&table, *column)?;
            log_event_with_fields(Event::SearchIndexAdded, &[("table", table.as_str()), ("column", name)]);
        } else {
            store.remove_search_index(&table, *column)?;
            log_event_with_fields(Event::SearchIndexRemoved, &[("table", table.as_str()), ("column", name)]);
        }
    }

    Ok(!changes.is_empty())
}
