//! Validation Invariant Tests
//!
//! Tests for value validation invariants:
//! - Validation runs to completion before the first write; one rejected
//!   property means nothing is written, including nested literals that
//!   would collide with a stored key or miss a value on a new row
//! - Type matching is exact apart from float widening to double
//! - Required properties reject null and missing values
//! - Links accept only objects of this realm that are still valid

use realmkit::{
    EventLog, ObjectSchema, PopulateOptions, Property, PropertyType, Realm, RealmConfig, RealmError,
    Record, Schema, ValidateOptions, Value,
};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Schema {
    realmkit::schema::parse_schema(
        &json!({
            "object_schemas": [
                {
                    "name": "Reading",
                    "properties": [
                        {"name": "sensor", "type": "string"},
                        {"name": "count", "type": "int"},
                        {"name": "value", "type": "double"},
                        {"name": "ok", "type": "bool"},
                        {"name": "note", "type": "string", "optional": true}
                    ]
                },
                {
                    "name": "Owner",
                    "primary_key": "name",
                    "properties": [
                        {"name": "name", "type": "string"},
                        {"name": "extra", "type": "any", "optional": true},
                        {"name": "reading", "type": "object", "object_type": "Reading"}
                    ]
                }
            ]
        })
        .to_string(),
    )
    .unwrap()
}

fn open() -> Realm {
    Realm::open(&RealmConfig::in_memory(1), schema()).unwrap()
}

/// Person and Dog, both keyed by name.
fn kennel() -> Realm {
    let schema = Schema::new(vec![
        ObjectSchema::new(
            "Person",
            vec![
                Property::new("name", PropertyType::String),
                Property::new("age", PropertyType::Int),
                Property::object("dog", "Dog"),
            ],
        )
        .with_primary_key("name"),
        ObjectSchema::new(
            "Dog",
            vec![
                Property::new("name", PropertyType::String),
                Property::new("age", PropertyType::Int),
            ],
        )
        .with_primary_key("name"),
    ]);
    Realm::open(&RealmConfig::in_memory(1), schema).unwrap()
}

fn reading(sensor: &str, count: Value) -> Record {
    Record::named([
        ("sensor", Value::from(sensor)),
        ("count", count),
        ("value", Value::Double(1.5)),
        ("ok", Value::Bool(true)),
        ("note", Value::from("fine")),
    ])
}

// =============================================================================
// Short-Circuit Tests
// =============================================================================

/// One bad property out of five: no row, no write, no event.
#[test]
fn test_one_bad_property_writes_nothing() {
    let mut realm = open();
    let log = EventLog::new();
    realm.add_observer(log.clone());

    let err = realm
        .write(|realm| realm.create_object("Reading", &reading("s1", Value::from("three")), false))
        .unwrap_err();

    match err {
        RealmError::TypeMismatch { property, expected, .. } => {
            assert_eq!(property, "count");
            assert_eq!(expected, "int");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(realm.row_count("Reading").unwrap(), 0);
    assert!(log.events().is_empty());
}

/// Populating an existing row validates every value before writing any.
#[test]
fn test_populate_existing_row_is_all_or_nothing() {
    let mut realm = open();
    let row = realm
        .write(|realm| realm.create_object("Reading", &reading("s1", Value::Int(3)), false))
        .unwrap();
    let log = EventLog::new();
    realm.add_observer(log.clone());

    let mut bad = reading("s2", Value::Int(4));
    if let Record::Named(values) = &mut bad {
        values.insert("ok".into(), Value::from("yes"));
    }

    realm
        .write(|realm| {
            let err = realm
                .populate(
                    &row,
                    &bad,
                    PopulateOptions {
                        created: false,
                        update: true,
                    },
                )
                .unwrap_err();
            assert!(matches!(err, RealmError::TypeMismatch { .. }));
            Ok(())
        })
        .unwrap();

    assert!(log.events().is_empty());
    assert_eq!(realm.get_value(&row, "sensor").unwrap(), Value::from("s1"));
    assert_eq!(realm.get_value(&row, "count").unwrap(), Value::Int(3));
}

/// A bad value nested inside a link literal stops the outer object too.
#[test]
fn test_bad_nested_literal_writes_nothing() {
    let mut realm = open();
    let owner = Record::named([
        ("name", Value::from("Ann")),
        ("reading", reading("s1", Value::Null).into()),
    ]);

    let err = realm
        .write(|realm| realm.create_object("Owner", &owner, false))
        .unwrap_err();

    match err {
        RealmError::MissingRequiredValue { type_name, property } => {
            assert_eq!(type_name, "Reading");
            assert_eq!(property, "count");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(realm.row_count("Owner").unwrap(), 0);
    assert_eq!(realm.row_count("Reading").unwrap(), 0);
}

/// An upsert whose nested literal would create a row without a required
/// value fails before the parent's values are touched.
#[test]
fn test_upsert_with_incomplete_nested_literal_writes_nothing() {
    let mut realm = kennel();
    let ann = realm
        .write(|realm| {
            realm.create_object(
                "Person",
                &Record::named([("name", Value::from("Ann")), ("age", Value::Int(1))]),
                false,
            )
        })
        .unwrap();
    let log = EventLog::new();
    realm.add_observer(log.clone());

    let update = Record::named([
        ("name", Value::from("Ann")),
        ("age", Value::Int(99)),
        ("dog", Record::named([("name", "Rex")]).into()),
    ]);
    realm
        .write(|realm| {
            let err = realm.create_object("Person", &update, true).unwrap_err();
            match err {
                RealmError::MissingRequiredValue { type_name, property } => {
                    assert_eq!(type_name, "Dog");
                    assert_eq!(property, "age");
                }
                other => panic!("unexpected error: {}", other),
            }
            Ok(())
        })
        .unwrap();

    assert!(log.events().is_empty());
    assert_eq!(realm.get_value(&ann, "age").unwrap(), Value::Int(1));
    assert_eq!(realm.get_value(&ann, "dog").unwrap(), Value::Null);
    assert_eq!(realm.row_count("Person").unwrap(), 1);
    assert_eq!(realm.row_count("Dog").unwrap(), 0);
}

/// A nested literal reusing a stored key without `update` is a duplicate,
/// and the parent row is never appended.
#[test]
fn test_duplicate_nested_key_writes_nothing() {
    let mut realm = kennel();
    let rex = realm
        .write(|realm| {
            realm.create_object(
                "Dog",
                &Record::named([("name", Value::from("Rex")), ("age", Value::Int(3))]),
                false,
            )
        })
        .unwrap();
    let log = EventLog::new();
    realm.add_observer(log.clone());

    let bob = Record::named([
        ("name", Value::from("Bob")),
        ("age", Value::Int(40)),
        (
            "dog",
            Record::named([("name", Value::from("Rex")), ("age", Value::Int(4))]).into(),
        ),
    ]);
    realm
        .write(|realm| {
            let err = realm.create_object("Person", &bob, false).unwrap_err();
            assert!(matches!(err, RealmError::DuplicatePrimaryKey { ref type_name, .. } if type_name == "Dog"));
            Ok(())
        })
        .unwrap();

    assert!(log.events().is_empty());
    assert_eq!(realm.row_count("Person").unwrap(), 0);
    assert_eq!(realm.row_count("Dog").unwrap(), 1);
    assert_eq!(realm.get_value(&rex, "age").unwrap(), Value::Int(3));
}

/// The same graph is accepted as an upsert and updates the stored row.
#[test]
fn test_nested_upsert_updates_stored_row() {
    let mut realm = kennel();
    realm
        .write(|realm| {
            realm.create_object(
                "Dog",
                &Record::named([("name", Value::from("Rex")), ("age", Value::Int(3))]),
                false,
            )
        })
        .unwrap();

    let bob = Record::named([
        ("name", Value::from("Bob")),
        ("age", Value::Int(40)),
        (
            "dog",
            Record::named([("name", Value::from("Rex")), ("age", Value::Int(4))]).into(),
        ),
    ]);
    let row = realm
        .write(|realm| realm.create_object("Person", &bob, true))
        .unwrap();

    assert_eq!(realm.row_count("Dog").unwrap(), 1);
    let dog = realm.get_value(&row, "dog").unwrap();
    let dog = dog.as_object().unwrap();
    assert_eq!(realm.get_value(&dog.row, "age").unwrap(), Value::Int(4));
}

/// `populate` on an existing row applies the same checks to nested
/// literals.
#[test]
fn test_populate_with_duplicate_nested_key_is_all_or_nothing() {
    let mut realm = kennel();
    let ann = realm
        .write(|realm| {
            realm.create_object(
                "Dog",
                &Record::named([("name", Value::from("Rex")), ("age", Value::Int(3))]),
                false,
            )?;
            realm.create_object(
                "Person",
                &Record::named([("name", Value::from("Ann")), ("age", Value::Int(1))]),
                false,
            )
        })
        .unwrap();

    let values = Record::named([
        ("age", Value::Int(2)),
        (
            "dog",
            Record::named([("name", Value::from("Rex")), ("age", Value::Int(9))]).into(),
        ),
    ]);
    realm
        .write(|realm| {
            let err = realm
                .populate(
                    &ann,
                    &values,
                    PopulateOptions {
                        created: false,
                        update: false,
                    },
                )
                .unwrap_err();
            assert!(matches!(err, RealmError::DuplicatePrimaryKey { .. }));
            Ok(())
        })
        .unwrap();

    assert_eq!(realm.get_value(&ann, "age").unwrap(), Value::Int(1));
    assert_eq!(realm.get_value(&ann, "dog").unwrap(), Value::Null);
}

// =============================================================================
// Type Matching Tests
// =============================================================================

#[test]
fn test_float_widens_to_double_only() {
    let realm = open();
    assert!(realm.validate_value("Reading", "value", &Value::Float(2.5)).is_ok());
    assert!(realm.validate_value("Reading", "value", &Value::Int(2)).is_err());
    assert!(realm.validate_value("Reading", "count", &Value::Double(2.0)).is_err());
}

#[test]
fn test_any_accepts_scalars_only() {
    let realm = open();
    assert!(realm.validate_value("Owner", "extra", &Value::Int(1)).is_ok());
    assert!(realm.validate_value("Owner", "extra", &Value::from("x")).is_ok());
    let err = realm
        .validate_value("Owner", "extra", &Value::List(Vec::new()))
        .unwrap_err();
    assert!(matches!(err, RealmError::TypeMismatch { .. }));
}

#[test]
fn test_required_rejects_null() {
    let realm = open();
    assert!(realm.validate_value("Reading", "note", &Value::Null).is_ok());
    let err = realm
        .validate_value("Reading", "sensor", &Value::Null)
        .unwrap_err();
    assert!(matches!(err, RealmError::MissingRequiredValue { .. }));
}

/// Standalone record validation honours `allow_missing`.
#[test]
fn test_validate_record_missing_values() {
    let realm = open();
    let partial = Record::named([("sensor", "s1")]);

    let err = realm.validate_record("Reading", &partial, false).unwrap_err();
    assert!(matches!(err, RealmError::MissingRequiredValue { .. }));
    assert!(realm.validate_record("Reading", &partial, true).is_ok());
}

#[test]
fn test_positional_record_must_match_arity() {
    let realm = open();
    let full = Record::positional([
        Value::from("s1"),
        Value::Int(1),
        Value::Double(0.5),
        Value::Bool(false),
        Value::Null,
    ]);
    assert!(realm.validate_record("Reading", &full, false).is_ok());

    let short = Record::positional([Value::from("s1"), Value::Int(1)]);
    let err = realm.validate_record("Reading", &short, false).unwrap_err();
    assert!(matches!(err, RealmError::TypeMismatch { .. }));
}

// =============================================================================
// Reference Tests
// =============================================================================

/// An object of another realm cannot be linked.
#[test]
fn test_foreign_object_rejected() {
    let mut a = open();
    let mut b = open();
    let row = a
        .write(|realm| realm.create_object("Reading", &reading("s1", Value::Int(1)), false))
        .unwrap();
    let foreign = a.object_ref(&row).unwrap();

    let err = b
        .validate_value("Owner", "reading", &Value::Object(foreign.clone()))
        .unwrap_err();
    assert!(matches!(err, RealmError::ForeignRealmObject { .. }));

    let owner = Record::named([("name", Value::from("Ann")), ("reading", Value::Object(foreign))]);
    let err = b
        .write(|realm| realm.create_object("Owner", &owner, false))
        .unwrap_err();
    assert!(matches!(err, RealmError::ForeignRealmObject { .. }));
    assert_eq!(b.row_count("Owner").unwrap(), 0);
}

/// A reference to a deleted row is not a valid link.
#[test]
fn test_stale_object_rejected() {
    let mut realm = open();
    let rows = realm
        .write(|realm| {
            let first = realm.create_object("Reading", &reading("s1", Value::Int(1)), false)?;
            realm.create_object("Reading", &reading("s2", Value::Int(2)), false)?;
            Ok(first)
        })
        .unwrap();
    let stale = realm.object_ref(&rows).unwrap();
    realm.write(|realm| realm.delete_row(&rows)).unwrap();

    let err = realm
        .validate_value("Owner", "reading", &Value::Object(stale))
        .unwrap_err();
    assert!(matches!(err, RealmError::InvalidReference { .. }));
}

/// A scalar where a link belongs is an invalid reference.
#[test]
fn test_scalar_for_link_rejected() {
    let realm = open();
    let err = realm
        .validate_value("Owner", "reading", &Value::Int(3))
        .unwrap_err();
    assert!(matches!(err, RealmError::InvalidReference { .. }));
}

/// Links are checked shallowly when recursion is turned off.
#[test]
fn test_shallow_link_validation() {
    let realm = open();
    let owner_schema = realm.schema().object_schema("Owner").unwrap();
    let property = owner_schema.property("reading").unwrap();
    let bad_literal: Value = Record::named([("sensor", 5)]).into();

    let deep = realm
        .validator()
        .validate(&bad_literal, owner_schema, property, ValidateOptions::default());
    assert!(deep.is_err());

    let shallow = realm.validator().validate(
        &bad_literal,
        owner_schema,
        property,
        ValidateOptions {
            recurse_into_links: false,
            allow_missing: false,
        },
    );
    assert!(shallow.is_ok());
}
