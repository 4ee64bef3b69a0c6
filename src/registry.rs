//! Store registry and accessor-class cache
//!
//! Accessor classes are built once per (schema hash, type) and shared by
//! every realm opened with a structurally equal schema. The registry counts
//! open realms per hash and evicts that hash's classes when the last
//! `RealmHandle` for it is dropped.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::config::RealmConfig;
use crate::errors::{RealmError, RealmResult};
use crate::observability::{log_event_with_fields, Event};
use crate::realm::Realm;
use crate::schema::{ObjectSchema, PropertyType, Schema, SchemaHash};
use crate::store::{MemoryStore, RowRef, TableStore};
use crate::value::{Record, Value};

/// Builds the per-type accessor class for a type descriptor.
pub trait AccessorFactory {
    type Class: Clone;

    fn build(&self, object_schema: &ObjectSchema) -> RealmResult<Self::Class>;
}

/// Reads properties of one type's rows by name.
///
/// Holds property names and types only. Columns are resolved through the
/// realm's bound schema on every read, so a class stays usable across
/// stores whose physical column order differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAccessorClass {
    type_name: String,
    properties: Vec<(String, PropertyType)>,
}

impl RowAccessorClass {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    /// Declared position of a property.
    pub fn position(&self, property: &str) -> Option<usize> {
        self.properties.iter().position(|(name, _)| name == property)
    }

    pub fn property_type(&self, property: &str) -> Option<PropertyType> {
        self.properties
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, property_type)| *property_type)
    }

    pub fn get<S: TableStore>(&self, realm: &Realm<S>, row: &RowRef, property: &str) -> RealmResult<Value> {
        if self.position(property).is_none() {
            return Err(RealmError::InvalidSchema(format!(
                "'{}' has no property '{}'",
                self.type_name, property
            )));
        }
        realm.get_value(row, property)
    }

    /// All properties of a row in declared order.
    pub fn snapshot<S: TableStore>(&self, realm: &Realm<S>, row: &RowRef) -> RealmResult<Record> {
        let mut values = Vec::with_capacity(self.properties.len());
        for (name, _) in &self.properties {
            values.push(realm.get_value(row, name)?);
        }
        Ok(Record::positional(values))
    }
}

/// Default factory: one `RowAccessorClass` per type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnMapFactory;

impl AccessorFactory for ColumnMapFactory {
    type Class = RowAccessorClass;

    fn build(&self, object_schema: &ObjectSchema) -> RealmResult<RowAccessorClass> {
        Ok(RowAccessorClass {
            type_name: object_schema.name.clone(),
            properties: object_schema
                .properties
                .iter()
                .map(|p| (p.name.clone(), p.property_type))
                .collect(),
        })
    }
}

/// Accessor classes keyed by schema hash and type name.
#[derive(Debug)]
pub struct AccessorCache<C> {
    classes: HashMap<(SchemaHash, String), C>,
}

impl<C> Default for AccessorCache<C> {
    fn default() -> Self {
        Self {
            classes: HashMap::new(),
        }
    }
}

impl<C: Clone> AccessorCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: SchemaHash, type_name: &str) -> Option<&C> {
        self.classes.get(&(hash, type_name.to_string()))
    }

    pub fn get_or_build<F>(&mut self, hash: SchemaHash, object_schema: &ObjectSchema, factory: &F) -> RealmResult<C>
    where
        F: AccessorFactory<Class = C>,
    {
        let key = (hash, object_schema.name.clone());
        if let Some(class) = self.classes.get(&key) {
            return Ok(class.clone());
        }
        let class = factory.build(object_schema)?;
        self.classes.insert(key, class.clone());
        Ok(class)
    }

    /// Drops every class built for `hash`. Returns how many were dropped.
    pub fn evict(&mut self, hash: SchemaHash) -> usize {
        let before = self.classes.len();
        self.classes.retain(|(h, _), _| *h != hash);
        before - self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Open counts and cached classes, shared between the registry and the
/// handles it gives out.
#[derive(Debug)]
struct RegistryState<C> {
    cache: AccessorCache<C>,
    open: HashMap<SchemaHash, usize>,
    realms: HashMap<Uuid, SchemaHash>,
}

impl<C: Clone> RegistryState<C> {
    fn register(&mut self, id: Uuid, hash: SchemaHash) {
        if self.realms.insert(id, hash).is_none() {
            *self.open.entry(hash).or_insert(0) += 1;
        }
    }

    /// The last release for a schema hash evicts its classes.
    fn release(&mut self, id: Uuid) {
        let Some(hash) = self.realms.remove(&id) else {
            return;
        };

        let remaining = match self.open.get_mut(&hash) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        let evicted = if remaining == 0 {
            self.open.remove(&hash);
            self.cache.evict(hash)
        } else {
            0
        };

        let id_field = id.to_string();
        let hash_field = hash.to_string();
        let evicted_field = evicted.to_string();
        log_event_with_fields(
            Event::StoreClosed,
            &[
                ("evicted", evicted_field.as_str()),
                ("realm", id_field.as_str()),
                ("schema_hash", hash_field.as_str()),
            ],
        );
    }
}

type SharedState<C> = Arc<Mutex<RegistryState<C>>>;

fn lock<C>(state: &SharedState<C>) -> MutexGuard<'_, RegistryState<C>> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A realm registered with a `RealmRegistry`.
///
/// Dereferences to the realm. Dropping the handle closes the realm and
/// releases its registration.
pub struct RealmHandle<C: Clone, S: TableStore = MemoryStore> {
    realm: Realm<S>,
    state: SharedState<C>,
}

impl<C: Clone, S: TableStore> RealmHandle<C, S> {
    /// Closes the realm now.
    pub fn close(self) {
        drop(self);
    }
}

impl<C: Clone, S: TableStore> Deref for RealmHandle<C, S> {
    type Target = Realm<S>;

    fn deref(&self) -> &Realm<S> {
        &self.realm
    }
}

impl<C: Clone, S: TableStore> DerefMut for RealmHandle<C, S> {
    fn deref_mut(&mut self) -> &mut Realm<S> {
        &mut self.realm
    }
}

impl<C: Clone, S: TableStore> Drop for RealmHandle<C, S> {
    fn drop(&mut self) {
        lock(&self.state).release(self.realm.id());
    }
}

/// Tracks open realms and owns the accessor-class cache they share.
pub struct RealmRegistry<F: AccessorFactory = ColumnMapFactory> {
    factory: F,
    state: SharedState<F::Class>,
}

impl RealmRegistry<ColumnMapFactory> {
    pub fn new() -> Self {
        Self::with_factory(ColumnMapFactory)
    }
}

impl Default for RealmRegistry<ColumnMapFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: AccessorFactory> RealmRegistry<F> {
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory,
            state: Arc::new(Mutex::new(RegistryState {
                cache: AccessorCache::default(),
                open: HashMap::new(),
                realms: HashMap::new(),
            })),
        }
    }

    /// Opens and reconciles a realm, then registers it.
    pub fn open(
        &self,
        config: &RealmConfig,
        schema: Schema,
    ) -> RealmResult<RealmHandle<F::Class, MemoryStore>> {
        let realm = Realm::open(config, schema)?;
        Ok(self.register(realm))
    }

    /// Registers an already reconciled realm under its schema hash.
    pub fn register<S: TableStore>(&self, realm: Realm<S>) -> RealmHandle<F::Class, S> {
        let hash = realm.schema().structural_hash();
        lock(&self.state).register(realm.id(), hash);
        RealmHandle {
            realm,
            state: Arc::clone(&self.state),
        }
    }

    /// Returns the cached accessor class for `type_name`, building it on
    /// first use.
    pub fn accessor_class<S: TableStore>(&self, realm: &Realm<S>, type_name: &str) -> RealmResult<F::Class> {
        let mut state = lock(&self.state);
        let hash = *state.realms.get(&realm.id()).ok_or_else(|| {
            RealmError::Config(format!("realm {} is not registered", realm.id()))
        })?;
        let object_schema = realm.object_schema(type_name)?;
        state.cache.get_or_build(hash, object_schema, &self.factory)
    }

    /// Realms currently open with a schema of this hash.
    pub fn open_count(&self, hash: SchemaHash) -> usize {
        lock(&self.state).open.get(&hash).copied().unwrap_or(0)
    }

    pub fn cache_len(&self) -> usize {
        lock(&self.state).cache.len()
    }
}
