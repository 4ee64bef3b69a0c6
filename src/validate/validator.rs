//! Candidate value validation
//!
//! Runs before any write so that a rejected value never leaves a
//! half-populated row behind.

use std::cell::RefCell;
use std::collections::HashSet;

use uuid::Uuid;

use crate::errors::{RealmError, RealmResult};
use crate::lifecycle::read::read_object;
use crate::lifecycle::ObjectAccessor;
use crate::schema::{table_name_for_type, ObjectSchema, Property, PropertyType, Schema};
use crate::store::TableStore;
use crate::value::{Record, Value};

use super::ValidateOptions;

/// Literals nested deeper than this are rejected.
const MAX_LITERAL_DEPTH: usize = 64;

/// How a write will treat nested literals.
///
/// A literal whose primary key is already stored, or claimed by an earlier
/// literal of the same graph, lands on an existing row: it is a duplicate
/// without `update` and may leave values out with it.
struct WritePlan {
    update: bool,
    claimed: RefCell<HashSet<(String, String)>>,
}

/// Validates values against a bound schema and the rows of one store.
pub struct Validator<'a, S: TableStore + ?Sized> {
    schema: &'a Schema,
    store: &'a S,
    realm_id: Uuid,
    plan: Option<WritePlan>,
}

impl<'a, S: TableStore + ?Sized> Validator<'a, S> {
    pub fn new(schema: &'a Schema, store: &'a S, realm_id: Uuid) -> Self {
        Self {
            schema,
            store,
            realm_id,
            plan: None,
        }
    }

    /// Checks literals the way a write with this `update` flag will store
    /// them, including primary-key collisions.
    pub fn for_write(mut self, update: bool) -> Self {
        self.plan = Some(WritePlan {
            update,
            claimed: RefCell::new(HashSet::new()),
        });
        self
    }

    /// Checks `value` for `owner.property`.
    pub fn validate(
        &self,
        value: &Value,
        owner: &ObjectSchema,
        property: &Property,
        options: ValidateOptions,
    ) -> RealmResult<()> {
        self.check_value(value, owner, property, options, 0)
    }

    /// Checks a positional or named record literal against a whole type.
    pub fn validate_record(
        &self,
        record: &Record,
        object_schema: &ObjectSchema,
        options: ValidateOptions,
    ) -> RealmResult<()> {
        self.check_object(record, object_schema, options, 0)
    }

    /// Checks an object graph before `create_object` writes it.
    pub fn validate_graph(&self, object: &dyn ObjectAccessor, object_schema: &ObjectSchema) -> RealmResult<()> {
        let options = self.literal_options(object, object_schema, ValidateOptions::default())?;
        self.check_object(object, object_schema, options, 0)
    }

    /// Options for a literal of `target`. Outside a write plan they are
    /// inherited unchanged.
    fn literal_options(
        &self,
        object: &dyn ObjectAccessor,
        target: &ObjectSchema,
        options: ValidateOptions,
    ) -> RealmResult<ValidateOptions> {
        let Some(plan) = &self.plan else {
            return Ok(options);
        };
        let mut options = ValidateOptions {
            allow_missing: false,
            ..options
        };

        let slot = target
            .properties
            .iter()
            .enumerate()
            .find(|(_, p)| target.is_primary(&p.name));
        let Some((index, pk)) = slot else {
            return Ok(options);
        };
        let Some(key) = object.value_at(index, &pk.name).filter(|key| !key.is_null()) else {
            return Ok(options);
        };

        let claim = (target.name.clone(), key.to_string());
        let taken = self.key_exists(target, pk, &key)? || plan.claimed.borrow().contains(&claim);
        if taken {
            if !plan.update {
                return Err(RealmError::DuplicatePrimaryKey {
                    type_name: target.name.clone(),
                    value: key.to_string(),
                });
            }
            options.allow_missing = true;
        } else {
            plan.claimed.borrow_mut().insert(claim);
        }
        Ok(options)
    }

    fn key_exists(&self, target: &ObjectSchema, pk: &Property, key: &Value) -> RealmResult<bool> {
        let table = table_name_for_type(&target.name);
        let column = pk.require_column(&target.name)?;
        let found = match (pk.property_type, key) {
            (PropertyType::String, Value::String(s)) => self.store.find_first_string(&table, column, s)?,
            (PropertyType::Int, Value::Int(i)) => self.store.find_first_int(&table, column, *i)?,
            // wrong kinds are reported by the property check
            _ => None,
        };
        Ok(found.is_some())
    }

    fn check_object(
        &self,
        object: &dyn ObjectAccessor,
        object_schema: &ObjectSchema,
        options: ValidateOptions,
        depth: usize,
    ) -> RealmResult<()> {
        let expected = object_schema.properties.len();
        if let Some(len) = positional_mismatch(object, expected) {
            return Err(RealmError::type_mismatch(
                &object_schema.name,
                "*",
                format!("{} values", expected),
                format!("{} values", len),
            ));
        }

        for (index, prop) in object_schema.properties.iter().enumerate() {
            let value = match object.value_at(index, &prop.name) {
                Some(value) => value,
                None if options.allow_missing => continue,
                None => prop.default.clone().unwrap_or(Value::Null),
            };
            self.check_value(&value, object_schema, prop, options, depth)?;
        }
        Ok(())
    }

    fn check_value(
        &self,
        value: &Value,
        owner: &ObjectSchema,
        property: &Property,
        options: ValidateOptions,
        depth: usize,
    ) -> RealmResult<()> {
        match property.property_type {
            PropertyType::Object => self.check_link(value, owner, property, options, depth),
            PropertyType::List => match value {
                Value::Null => Ok(()),
                Value::List(items) => {
                    for item in items {
                        if item.is_null() {
                            return Err(RealmError::invalid_reference(
                                &owner.name,
                                &property.name,
                                "lists cannot contain null",
                            ));
                        }
                        self.check_link(item, owner, property, options, depth)?;
                    }
                    Ok(())
                }
                other => Err(RealmError::type_mismatch(
                    &owner.name,
                    &property.name,
                    format!(
                        "list of '{}'",
                        property.object_type.as_deref().unwrap_or_default()
                    ),
                    other.describe(),
                )),
            },
            _ => check_scalar(value, owner, property),
        }
    }

    fn check_link(
        &self,
        value: &Value,
        owner: &ObjectSchema,
        property: &Property,
        options: ValidateOptions,
        depth: usize,
    ) -> RealmResult<()> {
        let target_name = property.object_type.as_deref().unwrap_or_default();
        let target = self.schema.object_schema(target_name).ok_or_else(|| {
            RealmError::InvalidSchema(format!(
                "'{}.{}' links to unknown type '{}'",
                owner.name, property.name, target_name
            ))
        })?;

        match value {
            Value::Null => Ok(()),
            Value::Object(_) | Value::Record(_) if !options.recurse_into_links => Ok(()),
            Value::Object(object) => {
                if object.realm_id != self.realm_id {
                    return Err(RealmError::ForeignRealmObject {
                        type_name: object.type_name.clone(),
                    });
                }
                if !object.row.is_valid(self.store) {
                    return Err(RealmError::invalid_reference(
                        &owner.name,
                        &property.name,
                        format!(
                            "linked '{}' object has been deleted or invalidated",
                            object.type_name
                        ),
                    ));
                }
                if object.type_name == target.name {
                    return Ok(());
                }

                // Bound object of another type: treat its values as a literal.
                let source = self.schema.object_schema(&object.type_name).ok_or_else(|| {
                    RealmError::invalid_reference(
                        &owner.name,
                        &property.name,
                        format!("'{}' is not part of the schema", object.type_name),
                    )
                })?;
                self.check_nesting(owner, property, depth)?;
                let values = read_object(self.store, self.realm_id, source, object.row.index, true)?;
                let nested = self.literal_options(&values, target, options)?;
                self.check_object(&values, target, nested, depth + 1)
            }
            Value::Record(record) => {
                self.check_nesting(owner, property, depth)?;
                let nested = self.literal_options(record, target, options)?;
                self.check_object(record, target, nested, depth + 1)
            }
            other => Err(RealmError::invalid_reference(
                &owner.name,
                &property.name,
                format!("expected '{}' object, got {}", target.name, other.describe()),
            )),
        }
    }

    fn check_nesting(&self, owner: &ObjectSchema, property: &Property, depth: usize) -> RealmResult<()> {
        if depth >= MAX_LITERAL_DEPTH {
            return Err(RealmError::invalid_reference(
                &owner.name,
                &property.name,
                format!("literals nested more than {} levels deep", MAX_LITERAL_DEPTH),
            ));
        }
        Ok(())
    }
}

fn positional_mismatch(object: &dyn ObjectAccessor, expected: usize) -> Option<usize> {
    object.positional_len().filter(|len| *len != expected)
}

fn check_scalar(value: &Value, owner: &ObjectSchema, property: &Property) -> RealmResult<()> {
    if value.is_null() {
        if property.is_nullable() {
            return Ok(());
        }
        return Err(RealmError::missing_value(&owner.name, &property.name));
    }

    let accepted = match (property.property_type, value) {
        (PropertyType::Bool, Value::Bool(_))
        | (PropertyType::Int, Value::Int(_))
        | (PropertyType::Float, Value::Float(_))
        | (PropertyType::Double, Value::Float(_) | Value::Double(_))
        | (PropertyType::String, Value::String(_))
        | (PropertyType::Binary, Value::Binary(_))
        | (PropertyType::Date, Value::Date(_)) => true,
        (PropertyType::Any, other) => !matches!(
            other,
            Value::Object(_) | Value::Record(_) | Value::List(_)
        ),
        _ => false,
    };

    if !accepted {
        return Err(RealmError::type_mismatch(
            &owner.name,
            &property.name,
            property.property_type.type_name(),
            value.describe(),
        ));
    }
    Ok(())
}
