//! Row operations on a realm

use std::collections::BTreeMap;

use crate::errors::{RealmError, RealmResult};
use crate::observability::{log_event_with_fields, Event};
use crate::observer::RowEvent;
use crate::realm::Realm;
use crate::schema::{table_name_for_type, type_for_table_name, ObjectSchema, Property, PropertyType};
use crate::store::{Cell, RowRef, TableStore};
use crate::validate::ValidateOptions;
use crate::value::Value;

use super::accessor::ObjectAccessor;
use super::read::{read_object, read_value};

/// Outcome of `create_or_find_row`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLookup {
    pub row: RowRef,
    /// False when an existing row was found by primary key
    pub created: bool,
}

/// How `populate` treats absent values and the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulateOptions {
    /// The row was just appended: absent values fall back to defaults and
    /// required values must be present.
    pub created: bool,
    /// Nested literals update existing rows with the same primary key.
    pub update: bool,
}

fn primary_key_slot(object_schema: &ObjectSchema) -> Option<(usize, &Property)> {
    object_schema
        .properties
        .iter()
        .enumerate()
        .find(|(_, p)| object_schema.is_primary(&p.name))
}

fn row_type(row: &RowRef) -> RealmResult<&str> {
    type_for_table_name(&row.table).ok_or_else(|| {
        RealmError::invalid_reference(&row.table, format!("#{}", row.index), "not a record table")
    })
}

impl<S: TableStore> Realm<S> {
    fn find_row_by_key(
        &self,
        object_schema: &ObjectSchema,
        pk: &Property,
        key: &Value,
    ) -> RealmResult<Option<RowRef>> {
        let table = table_name_for_type(&object_schema.name);
        let column = pk.require_column(&object_schema.name)?;
        let found = match (pk.property_type, key) {
            (PropertyType::String, Value::String(s)) => self.store.find_first_string(&table, column, s)?,
            (PropertyType::Int, Value::Int(i)) => self.store.find_first_int(&table, column, *i)?,
            (_, Value::Null) => None,
            (_, other) => {
                return Err(RealmError::type_mismatch(
                    &object_schema.name,
                    &pk.name,
                    pk.property_type.type_name(),
                    other.describe(),
                ))
            }
        };
        match found {
            Some(index) => Ok(Some(RowRef::new(&table, index, self.store.epoch(&table)?))),
            None => Ok(None),
        }
    }

    /// Looks a row up by primary key. Absence is `Ok(None)`.
    pub fn find_by_primary_key(&self, type_name: &str, key: &Value) -> RealmResult<Option<RowRef>> {
        let object_schema = self.object_schema(type_name)?;
        let pk = object_schema.primary_key_property().ok_or_else(|| {
            RealmError::InvalidSchema(format!("type '{}' has no primary key", type_name))
        })?;
        self.find_row_by_key(object_schema, pk, key)
    }

    /// Finds the row whose primary key matches the object's when `update`
    /// is set, otherwise appends an empty row.
    pub fn create_or_find_row(
        &mut self,
        type_name: &str,
        object: &dyn ObjectAccessor,
        update: bool,
    ) -> RealmResult<RowLookup> {
        self.require_write("create_or_find_row")?;
        let object_schema = self.object_schema(type_name)?.clone();

        if let Some((index, pk)) = primary_key_slot(&object_schema) {
            if let Some(key) = object.value_at(index, &pk.name) {
                if let Some(row) = self.find_row_by_key(&object_schema, pk, &key)? {
                    if update {
                        return Ok(RowLookup {
                            row,
                            created: false,
                        });
                    }
                    return Err(RealmError::DuplicatePrimaryKey {
                        type_name: type_name.to_string(),
                        value: key.to_string(),
                    });
                }
            }
        }

        let table = table_name_for_type(type_name);
        let index = self.store.add_empty_row(&table)?;
        let row = RowRef::new(&table, index, self.store.epoch(&table)?);

        let row_field = index.to_string();
        log_event_with_fields(
            Event::RowCreated,
            &[("table", table.as_str()), ("row", row_field.as_str())],
        );
        self.emit(RowEvent::Created {
            type_name: type_name.to_string(),
            row: index,
        });

        Ok(RowLookup { row, created: true })
    }

    /// Writes the object's values into `row`.
    ///
    /// Every value, including nested literals, is validated before the
    /// first write; a rejected value leaves the row untouched. Nested
    /// literals are checked against the rows they will create or update,
    /// so a colliding key fails here and not halfway through the writes. The primary
    /// key of an existing row is never rewritten.
    pub fn populate(
        &mut self,
        row: &RowRef,
        object: &dyn ObjectAccessor,
        options: PopulateOptions,
    ) -> RealmResult<()> {
        self.require_write("populate")?;
        let object_schema = self.object_schema(row_type(row)?)?.clone();
        if !self.is_valid(row) {
            return Err(RealmError::stale_row(&object_schema.name, row.index));
        }

        let mut plan = Vec::new();
        for (index, prop) in object_schema.properties.iter().enumerate() {
            if !options.created && object_schema.is_primary(&prop.name) {
                continue;
            }
            let value = match object.value_at(index, &prop.name) {
                Some(value) => value,
                None if !options.created => continue,
                None => match &prop.default {
                    Some(default) => default.clone(),
                    None if prop.is_nullable() || prop.property_type == PropertyType::List => continue,
                    None => return Err(RealmError::missing_value(&object_schema.name, &prop.name)),
                },
            };
            plan.push((index, value));
        }

        let validator = self.validator().for_write(options.update);
        for (index, value) in &plan {
            validator.validate(
                value,
                &object_schema,
                &object_schema.properties[*index],
                ValidateOptions::default(),
            )?;
        }

        for (index, value) in plan {
            let prop = &object_schema.properties[index];
            self.write_property(&object_schema, row.index, prop, value, options.update)?;
        }
        Ok(())
    }

    /// Validates the whole object graph, then creates or finds its row and
    /// populates it. Nested literals are created and linked.
    pub fn create_object(
        &mut self,
        type_name: &str,
        object: &dyn ObjectAccessor,
        update: bool,
    ) -> RealmResult<RowRef> {
        self.require_write("create_object")?;
        let object_schema = self.object_schema(type_name)?.clone();

        self.validator()
            .for_write(update)
            .validate_graph(object, &object_schema)?;

        let lookup = self.create_or_find_row(type_name, object, update)?;
        self.populate(
            &lookup.row,
            object,
            PopulateOptions {
                created: lookup.created,
                update,
            },
        )?;
        Ok(lookup.row)
    }

    /// Validates and writes a single property. Primary keys may be
    /// rewritten as long as the new key is unique.
    pub fn set_value(&mut self, row: &RowRef, property: &str, value: impl Into<Value>) -> RealmResult<()> {
        self.require_write("set_value")?;
        let value = value.into();
        let object_schema = self.object_schema(row_type(row)?)?.clone();
        if !self.is_valid(row) {
            return Err(RealmError::stale_row(&object_schema.name, row.index));
        }
        let prop = object_schema.property(property).ok_or_else(|| {
            RealmError::InvalidSchema(format!(
                "'{}' has no property '{}'",
                object_schema.name, property
            ))
        })?;

        self.validator()
            .validate(&value, &object_schema, prop, ValidateOptions::default())?;

        if object_schema.is_primary(property) {
            if let Some(other) = self.find_row_by_key(&object_schema, prop, &value)? {
                if other.index != row.index {
                    return Err(RealmError::DuplicatePrimaryKey {
                        type_name: object_schema.name.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }

        self.write_property(&object_schema, row.index, prop, value, true)
    }

    fn write_property(
        &mut self,
        owner: &ObjectSchema,
        row: usize,
        prop: &Property,
        value: Value,
        update: bool,
    ) -> RealmResult<()> {
        let table = table_name_for_type(&owner.name);
        let column = prop.require_column(&owner.name)?;
        let old = read_value(&self.store, self.id(), owner, prop, row)?;

        let cell = match (prop.property_type, value) {
            (PropertyType::Object, Value::Null) => Cell::Null,
            (PropertyType::Object, linked) => Cell::Link(self.resolve_link(owner, prop, linked, update)?),
            (PropertyType::List, Value::Null) => Cell::LinkList(Vec::new()),
            (PropertyType::List, Value::List(items)) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    rows.push(self.resolve_link(owner, prop, item, update)?);
                }
                Cell::LinkList(rows)
            }
            (column_type, scalar) => Cell::from_scalar(&scalar, column_type).ok_or_else(|| {
                RealmError::type_mismatch(&owner.name, &prop.name, column_type.type_name(), scalar.describe())
            })?,
        };

        self.store.set_cell(&table, column, row, cell)?;

        let new = read_value(&self.store, self.id(), owner, prop, row)?;
        self.emit(RowEvent::Populated {
            type_name: owner.name.clone(),
            row,
            property: prop.name.clone(),
            old,
            new,
        });
        Ok(())
    }

    /// Turns a link value into a row index of the target table, creating
    /// the target row for literals.
    fn resolve_link(
        &mut self,
        owner: &ObjectSchema,
        prop: &Property,
        value: Value,
        update: bool,
    ) -> RealmResult<usize> {
        let target = prop.object_type.clone().unwrap_or_default();
        match value {
            Value::Object(object) if object.type_name == target => Ok(self.add_object(&object)?.index),
            Value::Object(object) => {
                let row = self.add_object(&object)?;
                let source = self.object_schema(&object.type_name)?.clone();
                let values = read_object(&self.store, self.id(), &source, row.index, true)?;
                Ok(self.create_object(&target, &values, update)?.index)
            }
            Value::Record(record) => Ok(self.create_object(&target, &record, update)?.index),
            other => Err(RealmError::invalid_reference(
                &owner.name,
                &prop.name,
                format!("expected '{}' object, got {}", target, other.describe()),
            )),
        }
    }

    /// Reads one property of a row.
    pub fn get_value(&self, row: &RowRef, property: &str) -> RealmResult<Value> {
        let object_schema = self.object_schema(row_type(row)?)?;
        if !self.is_valid(row) {
            return Err(RealmError::stale_row(&object_schema.name, row.index));
        }
        let prop = object_schema.property(property).ok_or_else(|| {
            RealmError::InvalidSchema(format!(
                "'{}' has no property '{}'",
                object_schema.name, property
            ))
        })?;
        read_value(&self.store, self.id(), object_schema, prop, row.index)
    }

    /// Reads every property of a row by name.
    pub fn get_object(&self, row: &RowRef) -> RealmResult<BTreeMap<String, Value>> {
        let object_schema = self.object_schema(row_type(row)?)?;
        if !self.is_valid(row) {
            return Err(RealmError::stale_row(&object_schema.name, row.index));
        }
        read_object(&self.store, self.id(), object_schema, row.index, true)
    }

    /// Deletes a row by moving the table's last row into its slot. The
    /// moved row's index changes and every outstanding `RowRef` into the
    /// table goes stale.
    pub fn delete_row(&mut self, row: &RowRef) -> RealmResult<()> {
        self.require_write("delete_row")?;
        let type_name = row_type(row)?.to_string();
        if !self.is_valid(row) {
            return Err(RealmError::stale_row(&type_name, row.index));
        }

        let last = self.store.row_count(&row.table)?.saturating_sub(1);
        self.emit(RowEvent::WillDelete {
            type_name: type_name.clone(),
            row: row.index,
        });

        self.store.move_last_over(&row.table, row.index)?;

        let moved_from = (row.index != last).then_some(last);
        let row_field = row.index.to_string();
        log_event_with_fields(
            Event::RowDeleted,
            &[("table", row.table.as_str()), ("row", row_field.as_str())],
        );
        self.emit(RowEvent::Deleted {
            type_name,
            row: row.index,
            moved_from,
        });
        Ok(())
    }

    /// Removes every row of a type.
    pub fn delete_all_rows(&mut self, type_name: &str) -> RealmResult<()> {
        self.require_write("delete_all_rows")?;
        let table = table_name_for_type(type_name);
        self.store.clear(&table)?;

        log_event_with_fields(Event::TableCleared, &[("table", table.as_str())]);
        self.emit(RowEvent::Cleared {
            type_name: type_name.to_string(),
        });
        Ok(())
    }

    pub fn row_count(&self, type_name: &str) -> RealmResult<usize> {
        Ok(self.store.row_count(&table_name_for_type(type_name))?)
    }

    /// References to every row of a type, in table order.
    pub fn all_rows(&self, type_name: &str) -> RealmResult<Vec<RowRef>> {
        let table = table_name_for_type(type_name);
        let epoch = self.store.epoch(&table)?;
        let count = self.store.row_count(&table)?;
        Ok((0..count).map(|index| RowRef::new(&table, index, epoch)).collect())
    }

    /// Returns `row` while it is still valid, otherwise re-derives it from
    /// the object's primary key.
    pub fn resolve(&self, row: &RowRef, key: &Value) -> RealmResult<Option<RowRef>> {
        if self.is_valid(row) {
            return Ok(Some(row.clone()));
        }
        self.find_by_primary_key(row_type(row)?, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealmConfig;
    use crate::schema::Schema;
    use crate::value::Record;

    fn schema() -> Schema {
        Schema::new(vec![
            ObjectSchema::new(
                "Person",
                vec![
                    Property::new("name", PropertyType::String),
                    Property::new("age", PropertyType::Int).with_default(18),
                    Property::object("dog", "Dog"),
                ],
            )
            .with_primary_key("name"),
            ObjectSchema::new("Dog", vec![Property::new("name", PropertyType::String)]),
        ])
    }

    fn realm() -> Realm {
        Realm::open(&RealmConfig::in_memory(1), schema()).unwrap()
    }

    #[test]
    fn test_mutation_outside_write_rejected() {
        let mut realm = realm();
        let err = realm
            .create_or_find_row("Dog", &Record::named([("name", "Rex")]), false)
            .unwrap_err();
        assert!(matches!(err, RealmError::NotInWriteContext { .. }));
    }

    #[test]
    fn test_defaults_applied_on_create() {
        let mut realm = realm();
        realm.begin_write().unwrap();
        let row = realm
            .create_object("Person", &Record::named([("name", "Ann")]), false)
            .unwrap();
        assert_eq!(realm.get_value(&row, "age").unwrap(), Value::Int(18));
        assert_eq!(realm.get_value(&row, "dog").unwrap(), Value::Null);
    }

    #[test]
    fn test_missing_required_value_on_create() {
        let mut realm = realm();
        realm.begin_write().unwrap();
        let lookup = realm
            .create_or_find_row("Dog", &BTreeMap::<String, Value>::new(), false)
            .unwrap();
        let err = realm
            .populate(
                &lookup.row,
                &BTreeMap::<String, Value>::new(),
                PopulateOptions {
                    created: true,
                    update: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RealmError::MissingRequiredValue { .. }));
    }

    #[test]
    fn test_duplicate_primary_key_without_update() {
        let mut realm = realm();
        realm.begin_write().unwrap();
        realm
            .create_object("Person", &Record::named([("name", "Ann")]), false)
            .unwrap();
        let err = realm
            .create_object("Person", &Record::named([("name", "Ann")]), false)
            .unwrap_err();
        assert!(matches!(err, RealmError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn test_nested_literal_creates_linked_row() {
        let mut realm = realm();
        realm.begin_write().unwrap();
        let person = Record::named([
            ("name", Value::from("Ann")),
            ("dog", Record::named([("name", "Rex")]).into()),
        ]);
        let row = realm.create_object("Person", &person, false).unwrap();

        assert_eq!(realm.row_count("Dog").unwrap(), 1);
        let dog = realm.get_value(&row, "dog").unwrap();
        let dog = dog.as_object().unwrap();
        assert_eq!(realm.get_value(&dog.row, "name").unwrap(), Value::from("Rex"));
    }

    #[test]
    fn test_primary_key_lookup_absent_is_none() {
        let realm = realm();
        assert_eq!(
            realm.find_by_primary_key("Person", &Value::from("Nobody")).unwrap(),
            None
        );
        let err = realm
            .find_by_primary_key("Person", &Value::Int(3))
            .unwrap_err();
        assert!(matches!(err, RealmError::TypeMismatch { .. }));
    }

    #[test]
    fn test_resolve_after_swap() {
        let mut realm = realm();
        realm.begin_write().unwrap();
        let ann = realm
            .create_object("Person", &Record::named([("name", "Ann")]), false)
            .unwrap();
        let bob = realm
            .create_object("Person", &Record::named([("name", "Bob")]), false)
            .unwrap();

        realm.delete_row(&ann).unwrap();
        assert!(!realm.is_valid(&bob));

        let bob = realm.resolve(&bob, &Value::from("Bob")).unwrap().unwrap();
        assert_eq!(bob.index, 0);
        assert_eq!(realm.get_value(&bob, "name").unwrap(), Value::from("Bob"));
    }

    #[test]
    fn test_set_primary_key_must_stay_unique() {
        let mut realm = realm();
        realm.begin_write().unwrap();
        realm
            .create_object("Person", &Record::named([("name", "Ann")]), false)
            .unwrap();
        let bob = realm
            .create_object("Person", &Record::named([("name", "Bob")]), false)
            .unwrap();
        let err = realm.set_value(&bob, "name", "Ann").unwrap_err();
        assert!(matches!(err, RealmError::DuplicatePrimaryKey { .. }));
        realm.set_value(&bob, "name", "Bo").unwrap();
        assert!(realm.find_by_primary_key("Person", &Value::from("Bo")).unwrap().is_some());
    }
}
