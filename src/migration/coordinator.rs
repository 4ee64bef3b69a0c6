//! Migration coordinator
//!
//! One reconciliation pass per open:
//!
//! 1. VersionCheck: a store persisted at a newer version is refused
//!    before anything else happens.
//! 2. FastPath: same version and every table present. Verify every type,
//!    bind column handles, refresh stale search indexes. No write
//!    transaction unless an index is stale.
//! 3. SlowPath: open a write transaction, re-read the version, create
//!    missing tables, align existing ones when migrating, run the
//!    migration callback, write the version, refresh indexes. Commit only
//!    if something changed; roll back on any error.
//!
//! The realm's schema is replaced only when the pass succeeds.

use std::collections::BTreeMap;

use crate::errors::{RealmError, RealmResult};
use crate::lifecycle::read::read_object;
use crate::observability::{log_event_with_fields, Event};
use crate::realm::Realm;
use crate::schema::{table_name_for_type, Schema, NOT_VERSIONED};
use crate::store::TableStore;

use super::aligner;
use super::{Migration, OldObject};

/// How a successful reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Layout verified in place; nothing besides stale indexes was written
    Verified,
    /// The write phase changed storage and committed
    Committed,
    /// The write phase found nothing to change and committed nothing
    Unchanged,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Verified => "verified",
            ReconcileOutcome::Committed => "committed",
            ReconcileOutcome::Unchanged => "unchanged",
        }
    }
}

fn version_label(version: u64) -> String {
    if version == NOT_VERSIONED {
        "unversioned".to_string()
    } else {
        version.to_string()
    }
}

fn check_version(persisted: u64, requested: u64) -> RealmResult<()> {
    if persisted != NOT_VERSIONED && persisted > requested {
        let persisted_field = persisted.to_string();
        let requested_field = requested.to_string();
        log_event_with_fields(
            Event::VersionRegression,
            &[
                ("persisted", persisted_field.as_str()),
                ("requested", requested_field.as_str()),
            ],
        );
        return Err(RealmError::VersionRegression {
            persisted,
            requested,
        });
    }
    Ok(())
}

/// Reconciles the realm's store with `schema` at `version`.
///
/// `callback` runs only when existing, versioned data is upgraded.
pub fn reconcile<S, F>(
    realm: &mut Realm<S>,
    schema: Schema,
    version: u64,
    callback: Option<F>,
) -> RealmResult<ReconcileOutcome>
where
    S: TableStore,
    F: FnOnce(&mut Migration<'_, S>) -> RealmResult<()>,
{
    if version == NOT_VERSIONED {
        return Err(RealmError::InvalidSchema(format!(
            "schema version {} is reserved for unversioned stores",
            NOT_VERSIONED
        )));
    }
    schema.validate()?;

    let mut declared = schema;
    declared.unbind();

    let persisted = realm.store.schema_version();
    check_version(persisted, version)?;

    let tables_exist = declared
        .object_schemas
        .iter()
        .all(|o| realm.store.has_table(&table_name_for_type(&o.name)));

    if persisted == version && tables_exist {
        fast_path(realm, declared)
    } else {
        slow_path(realm, declared, version, callback)
    }
}

fn fast_path<S: TableStore>(realm: &mut Realm<S>, mut declared: Schema) -> RealmResult<ReconcileOutcome> {
    let mut discrepancies = Vec::new();
    for object_schema in &mut declared.object_schemas {
        let stored = aligner::table_schema(&realm.store, &object_schema.name)?;
        let found = aligner::verify(&stored, object_schema);
        if found.is_empty() {
            aligner::bind(object_schema, &stored)?;
        } else {
            discrepancies.extend(found);
        }
    }
    if !discrepancies.is_empty() {
        return Err(RealmError::SchemaMismatch(discrepancies));
    }

    let mut stale = false;
    for object_schema in &declared.object_schemas {
        stale |= !aligner::index_changes(&realm.store, object_schema)?.is_empty();
    }

    if stale {
        realm.store.begin_write()?;
        let store = &mut realm.store;
        let refreshed = declared
            .object_schemas
            .iter()
            .try_for_each(|o| aligner::update_indexes(&mut *store, o).map(|_| ()));
        if let Err(e) = refreshed {
            realm.store.rollback();
            return Err(e);
        }
        if let Err(e) = realm.store.commit() {
            realm.store.rollback();
            return Err(e.into());
        }
    }

    let types = declared.len().to_string();
    let version = version_label(realm.store.schema_version());
    realm.schema = declared;
    log_event_with_fields(
        Event::SchemaVerified,
        &[("types", types.as_str()), ("version", version.as_str())],
    );
    Ok(ReconcileOutcome::Verified)
}

fn slow_path<S, F>(
    realm: &mut Realm<S>,
    declared: Schema,
    version: u64,
    callback: Option<F>,
) -> RealmResult<ReconcileOutcome>
where
    S: TableStore,
    F: FnOnce(&mut Migration<'_, S>) -> RealmResult<()>,
{
    realm.store.begin_write()?;

    let from = version_label(realm.store.schema_version());
    let to = version.to_string();
    log_event_with_fields(Event::MigrationBegin, &[("from", from.as_str()), ("to", to.as_str())]);

    let previous = std::mem::replace(&mut realm.schema, declared);

    let result = write_phase(realm, version, callback).and_then(|dirty| {
        if dirty {
            realm.store.commit()?;
        }
        Ok(dirty)
    });

    match result {
        Ok(true) => {
            log_event_with_fields(Event::MigrationCommitted, &[("from", from.as_str()), ("to", to.as_str())]);
            Ok(ReconcileOutcome::Committed)
        }
        Ok(false) => {
            realm.store.rollback();
            log_event_with_fields(Event::MigrationSkipped, &[("version", to.as_str())]);
            Ok(ReconcileOutcome::Unchanged)
        }
        Err(e) => {
            realm.store.rollback();
            realm.schema = previous;
            log_event_with_fields(
                Event::MigrationRolledBack,
                &[("code", e.code().code()), ("reason", e.to_string().as_str())],
            );
            Err(e)
        }
    }
}

/// Runs inside the write transaction with the declared schema installed
/// on the realm. Returns whether anything changed.
fn write_phase<S, F>(realm: &mut Realm<S>, version: u64, callback: Option<F>) -> RealmResult<bool>
where
    S: TableStore,
    F: FnOnce(&mut Migration<'_, S>) -> RealmResult<()>,
{
    // Another writer may have migrated since the fast-path check.
    let persisted = realm.store.schema_version();
    check_version(persisted, version)?;

    let migrating = persisted != version;
    let run_callback = migrating && persisted != NOT_VERSIONED && callback.is_some();
    let policy = realm.relaxation_copy();

    let old_schema = aligner::stored_schema(&realm.store)?;
    let old_objects = if run_callback {
        capture_old_objects(realm, &old_schema)?
    } else {
        BTreeMap::new()
    };

    let mut dirty = false;
    {
        let store = &mut realm.store;
        let schema = &mut realm.schema;

        let mut created = Vec::new();
        for object_schema in &schema.object_schemas {
            if !store.has_table(&table_name_for_type(&object_schema.name)) {
                aligner::create_table(&mut *store, object_schema)?;
                created.push(object_schema.name.clone());
            }
        }
        dirty |= !created.is_empty();

        let mut discrepancies = Vec::new();
        for object_schema in &mut schema.object_schemas {
            if created.contains(&object_schema.name) {
                aligner::populate_table(&mut *store, object_schema)?;
                continue;
            }

            let stored = match old_schema.object_schema(&object_schema.name) {
                Some(stored) => stored.clone(),
                None => aligner::table_schema(&*store, &object_schema.name)?,
            };
            if migrating {
                dirty |= aligner::align(&mut *store, &stored, object_schema, policy)?;
            } else {
                let found = aligner::verify(&stored, object_schema);
                if found.is_empty() {
                    aligner::bind(object_schema, &stored)?;
                } else {
                    discrepancies.extend(found);
                }
            }
        }
        if !discrepancies.is_empty() {
            return Err(RealmError::SchemaMismatch(discrepancies));
        }
    }

    if run_callback {
        if let Some(callback) = callback {
            let from = persisted.to_string();
            log_event_with_fields(Event::MigrationCallbackInvoked, &[("from", from.as_str())]);
            let mut migration = Migration::new(realm, old_schema, persisted, old_objects);
            callback(&mut migration)?;
            dirty = true;
        }
    }

    if persisted != version {
        realm.store.set_schema_version(version)?;
        dirty = true;
    }

    let store = &mut realm.store;
    for object_schema in &realm.schema.object_schemas {
        dirty |= aligner::update_indexes(&mut *store, object_schema)?;
    }

    Ok(dirty)
}

/// Snapshots the scalar values of every stored row before alignment drops
/// or rewrites columns.
fn capture_old_objects<S: TableStore>(
    realm: &Realm<S>,
    old_schema: &Schema,
) -> RealmResult<BTreeMap<String, Vec<OldObject>>> {
    let mut captured = BTreeMap::new();
    for object_schema in &old_schema.object_schemas {
        let table = table_name_for_type(&object_schema.name);
        let count = realm.store.row_count(&table)?;
        let mut objects = Vec::with_capacity(count);
        for row in 0..count {
            let values = read_object(&realm.store, realm.id(), object_schema, row, false)?;
            objects.push(OldObject::new(&object_schema.name, values));
        }
        captured.insert(object_schema.name.clone(), objects);
    }
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ObjectSchema, Property, PropertyType};
    use crate::store::MemoryStore;

    fn dog_schema() -> Schema {
        Schema::new(vec![ObjectSchema::new(
            "Dog",
            vec![Property::new("name", PropertyType::String)],
        )])
    }

    #[test]
    fn test_fresh_store_is_created_and_committed() {
        let mut realm = Realm::new(MemoryStore::in_memory());
        let outcome = realm.reconcile(dog_schema(), 0).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Committed);
        assert_eq!(realm.schema_version(), 0);
        assert!(realm.schema().object_schema("Dog").unwrap().is_bound());
    }

    #[test]
    fn test_second_pass_takes_fast_path() {
        let mut realm = Realm::new(MemoryStore::in_memory());
        realm.reconcile(dog_schema(), 1).unwrap();
        let outcome = realm.reconcile(dog_schema(), 1).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Verified);
        assert!(!realm.is_in_write_transaction());
    }

    #[test]
    fn test_reserved_version_rejected() {
        let mut realm = Realm::new(MemoryStore::in_memory());
        let err = realm.reconcile(dog_schema(), NOT_VERSIONED).unwrap_err();
        assert!(matches!(err, RealmError::InvalidSchema(_)));
    }

    #[test]
    fn test_failed_pass_keeps_previous_schema() {
        let mut realm = Realm::new(MemoryStore::in_memory());
        realm.reconcile(dog_schema(), 1).unwrap();

        let mut changed = dog_schema();
        changed.object_schemas[0]
            .properties
            .push(Property::new("weight", PropertyType::Double).indexed());
        let err = realm.reconcile(changed, 2).unwrap_err();

        assert!(matches!(err, RealmError::UnindexableType { .. }));
        assert_eq!(realm.schema_version(), 1);
        assert_eq!(realm.schema().object_schema("Dog").unwrap().properties.len(), 1);
        assert_eq!(realm.store().columns("class_Dog").unwrap().len(), 1);
    }
}
