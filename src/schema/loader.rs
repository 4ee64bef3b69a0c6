//! Loads declared schemas from JSON
//!
//! File format: `{"object_schemas": [{"name": ..., "properties": [...],
//! "primary_key": ...}]}`. Loaded schemas are validated before they are
//! returned; a malformed file never yields a half-usable schema.

use std::fs;
use std::path::Path;

use crate::errors::{RealmError, RealmResult};

use super::Schema;

/// Parses and validates a schema from a JSON string.
pub fn parse_schema(content: &str) -> RealmResult<Schema> {
    let schema: Schema = serde_json::from_str(content)
        .map_err(|e| RealmError::InvalidSchema(format!("invalid schema JSON: {}", e)))?;
    schema.validate()?;
    Ok(schema)
}

/// Reads, parses and validates a schema file.
pub fn load_schema(path: &Path) -> RealmResult<Schema> {
    let content = fs::read_to_string(path).map_err(|e| {
        RealmError::Config(format!(
            "failed to read schema file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_schema(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertyType;
    use tempfile::TempDir;

    const PERSON: &str = r#"{
        "object_schemas": [
            {
                "name": "Person",
                "primary_key": "id",
                "properties": [
                    {"name": "id", "type": "int"},
                    {"name": "name", "type": "string", "indexed": true},
                    {"name": "dog", "type": "object", "object_type": "Dog"}
                ]
            },
            {
                "name": "Dog",
                "properties": [{"name": "name", "type": "string"}]
            }
        ]
    }"#;

    #[test]
    fn test_parse_schema() {
        let schema = parse_schema(PERSON).unwrap();
        assert_eq!(schema.len(), 2);
        let person = schema.object_schema("Person").unwrap();
        assert_eq!(person.primary_key.as_deref(), Some("id"));
        assert_eq!(person.properties[2].property_type, PropertyType::Object);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = parse_schema("{ not json").unwrap_err();
        assert!(err.to_string().contains("invalid schema JSON"));
    }

    #[test]
    fn test_parse_rejects_invalid_schema() {
        let content = PERSON.replace(r#""object_type": "Dog""#, r#""object_type": "Cat""#);
        let err = parse_schema(&content).unwrap_err();
        assert!(err.to_string().contains("unknown type 'Cat'"));
    }

    #[test]
    fn test_load_schema_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, PERSON).unwrap();
        let schema = load_schema(&path).unwrap();
        assert!(schema.object_schema("Dog").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_schema(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.is_fatal());
    }
}
