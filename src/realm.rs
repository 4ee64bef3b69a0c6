//! An open realm: one table store, its bound schema and its observers
//!
//! All inbound operations go through `Realm`:
//! - reconciliation (`reconcile`, `reconcile_with_migration`)
//! - write transactions (`begin_write`, `commit_write`, `cancel_write`, `write`)
//! - row lifecycle (see `lifecycle`)
//! - standalone validation (`validate_value`, `validate_record`)

use uuid::Uuid;

use crate::config::{RealmConfig, RelaxationCopy};
use crate::errors::{RealmError, RealmResult};
use crate::migration::{coordinator, Migration, ReconcileOutcome};
use crate::observability::{log_event_with_fields, Event};
use crate::observer::{LifecycleObserver, RowEvent};
use crate::schema::{type_for_table_name, ObjectSchema, Schema};
use crate::store::{MemoryStore, RowRef, TableStore};
use crate::validate::{ValidateOptions, Validator};
use crate::value::{ObjectRef, Record, Value};

/// Callback type used when no migration callback is supplied.
type NoMigration<S> = fn(&mut Migration<'_, S>) -> RealmResult<()>;

/// One open store with its reconciled schema.
pub struct Realm<S: TableStore = MemoryStore> {
    pub(crate) store: S,
    pub(crate) schema: Schema,
    id: Uuid,
    pub(crate) observers: Vec<Box<dyn LifecycleObserver>>,
    relaxation_copy: RelaxationCopy,
}

impl Realm<MemoryStore> {
    /// Opens the configured store and reconciles it with `schema`.
    pub fn open(config: &RealmConfig, schema: Schema) -> RealmResult<Self> {
        Self::open_inner(config, schema, None::<NoMigration<MemoryStore>>)
    }

    /// Like `open`, running `callback` when existing data is upgraded.
    pub fn open_with_migration<F>(config: &RealmConfig, schema: Schema, callback: F) -> RealmResult<Self>
    where
        F: FnOnce(&mut Migration<'_, MemoryStore>) -> RealmResult<()>,
    {
        Self::open_inner(config, schema, Some(callback))
    }

    fn open_inner<F>(config: &RealmConfig, schema: Schema, callback: Option<F>) -> RealmResult<Self>
    where
        F: FnOnce(&mut Migration<'_, MemoryStore>) -> RealmResult<()>,
    {
        config.validate()?;
        let store = match &config.path {
            Some(path) => MemoryStore::open(path)?,
            None => MemoryStore::in_memory(),
        };

        let mut realm = Realm::new(store).with_relaxation_copy(config.relaxation_copy);
        let id = realm.id.to_string();
        let path = config
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        log_event_with_fields(Event::StoreOpened, &[("realm", id.as_str()), ("path", path.as_str())]);

        coordinator::reconcile(&mut realm, schema, config.schema_version, callback)?;
        Ok(realm)
    }
}

impl<S: TableStore> Realm<S> {
    /// Wraps a store. The schema stays empty until the first reconcile.
    pub fn new(store: S) -> Self {
        Self {
            id: store.store_id(),
            store,
            schema: Schema::default(),
            observers: Vec::new(),
            relaxation_copy: RelaxationCopy::default(),
        }
    }

    pub fn with_relaxation_copy(mut self, policy: RelaxationCopy) -> Self {
        self.relaxation_copy = policy;
        self
    }

    /// Identity of the underlying store; carried by every `ObjectRef`.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The reconciled schema with every property bound to its column.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn schema_version(&self) -> u64 {
        self.store.schema_version()
    }

    pub fn relaxation_copy(&self) -> RelaxationCopy {
        self.relaxation_copy
    }

    pub fn add_observer(&mut self, observer: impl LifecycleObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Reconciles storage with `schema` at `version` without a migration
    /// callback.
    pub fn reconcile(&mut self, schema: Schema, version: u64) -> RealmResult<ReconcileOutcome> {
        coordinator::reconcile(self, schema, version, None::<NoMigration<S>>)
    }

    pub fn reconcile_with_migration<F>(
        &mut self,
        schema: Schema,
        version: u64,
        callback: F,
    ) -> RealmResult<ReconcileOutcome>
    where
        F: FnOnce(&mut Migration<'_, S>) -> RealmResult<()>,
    {
        coordinator::reconcile(self, schema, version, Some(callback))
    }

    pub fn begin_write(&mut self) -> RealmResult<()> {
        self.store.begin_write()?;
        Ok(())
    }

    /// Commits the open write transaction. A failed commit rolls back.
    pub fn commit_write(&mut self) -> RealmResult<()> {
        if let Err(e) = self.store.commit() {
            self.store.rollback();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn cancel_write(&mut self) {
        self.store.rollback();
    }

    pub fn is_in_write_transaction(&self) -> bool {
        self.store.is_in_write_transaction()
    }

    /// Runs `f` inside a write transaction: commits on success, rolls
    /// back on error.
    pub fn write<T, F>(&mut self, f: F) -> RealmResult<T>
    where
        F: FnOnce(&mut Self) -> RealmResult<T>,
    {
        self.begin_write()?;
        match f(self) {
            Ok(value) => {
                self.commit_write()?;
                Ok(value)
            }
            Err(e) => {
                self.cancel_write();
                Err(e)
            }
        }
    }

    pub(crate) fn require_write(&self, operation: &str) -> RealmResult<()> {
        if !self.store.is_in_write_transaction() {
            return Err(RealmError::not_in_write(operation));
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event: RowEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    pub(crate) fn object_schema(&self, type_name: &str) -> RealmResult<&ObjectSchema> {
        self.schema.object_schema(type_name).ok_or_else(|| {
            RealmError::InvalidSchema(format!("type '{}' is not part of the schema", type_name))
        })
    }

    pub fn validator(&self) -> Validator<'_, S> {
        Validator::new(&self.schema, &self.store, self.id)
    }

    /// Checks one candidate value against `type_name.property` without
    /// writing anything.
    pub fn validate_value(&self, type_name: &str, property: &str, value: &Value) -> RealmResult<()> {
        let object_schema = self.object_schema(type_name)?;
        let prop = object_schema.property(property).ok_or_else(|| {
            RealmError::InvalidSchema(format!(
                "'{}' has no property '{}'",
                type_name, property
            ))
        })?;
        self.validator()
            .validate(value, object_schema, prop, ValidateOptions::default())
    }

    /// Checks a whole record literal against `type_name`.
    pub fn validate_record(&self, type_name: &str, record: &Record, allow_missing: bool) -> RealmResult<()> {
        let object_schema = self.object_schema(type_name)?;
        let options = ValidateOptions {
            allow_missing,
            ..ValidateOptions::default()
        };
        self.validator().validate_record(record, object_schema, options)
    }

    /// Whether `row` still designates the row it was obtained for.
    pub fn is_valid(&self, row: &RowRef) -> bool {
        row.is_valid(&self.store)
    }

    /// Wraps a row of this realm as an object reference.
    pub fn object_ref(&self, row: &RowRef) -> RealmResult<ObjectRef> {
        let type_name = type_for_table_name(&row.table).ok_or_else(|| {
            RealmError::invalid_reference(&row.table, format!("#{}", row.index), "not a record table")
        })?;
        if !self.is_valid(row) {
            return Err(RealmError::stale_row(type_name, row.index));
        }
        Ok(ObjectRef {
            realm_id: self.id,
            type_name: type_name.to_string(),
            row: row.clone(),
        })
    }

    /// Attaches an object to this realm. Objects already bound here are
    /// returned as is; objects bound to another realm are rejected.
    pub fn add_object(&self, object: &ObjectRef) -> RealmResult<RowRef> {
        if object.realm_id != self.id {
            return Err(RealmError::ForeignRealmObject {
                type_name: object.type_name.clone(),
            });
        }
        if !self.is_valid(&object.row) {
            return Err(RealmError::stale_row(&object.type_name, object.row.index));
        }
        Ok(object.row.clone())
    }
}
