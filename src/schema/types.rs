//! Property type definitions
//!
//! Supported types:
//! - bool, int (64-bit), float (32-bit), double (64-bit)
//! - string (UTF-8), binary, date
//! - object: link to a row of another type
//! - list: ordered list of links to rows of another type
//! - any: mixed scalar value

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{RealmError, RealmResult};
use crate::store::ColumnIndex;
use crate::value::Value;

/// Semantic type of a property, also the physical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    Double,
    String,
    Binary,
    Date,
    /// Link to a single row of the target type
    Object,
    /// Ordered list of links to rows of the target type
    List,
    /// Mixed scalar
    Any,
}

impl PropertyType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::Double => "double",
            PropertyType::String => "string",
            PropertyType::Binary => "binary",
            PropertyType::Date => "date",
            PropertyType::Object => "object",
            PropertyType::List => "list",
            PropertyType::Any => "any",
        }
    }

    /// Object and list properties reference rows of another type.
    pub fn is_link(&self) -> bool {
        matches!(self, PropertyType::Object | PropertyType::List)
    }

    /// Only string and int properties may be primary keys.
    pub fn can_be_primary_key(&self) -> bool {
        matches!(self, PropertyType::String | PropertyType::Int)
    }

    /// Column types the bundled engine can build a search index for.
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            PropertyType::Bool | PropertyType::Int | PropertyType::String | PropertyType::Date
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One declared property of a record type.
///
/// The column handle is bound by the aligner once the property has been
/// mapped onto a physical column; it is never serialized and never takes
/// part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub indexed: bool,
    /// Target type for object and list properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Value used when a newly created object does not supply one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip)]
    column: Option<ColumnIndex>,
}

impl Property {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            optional: false,
            indexed: false,
            object_type: None,
            default: None,
            column: None,
        }
    }

    /// Link to a single row of `target`. Links are always nullable.
    pub fn object(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            optional: true,
            object_type: Some(target.into()),
            ..Self::new(name, PropertyType::Object)
        }
    }

    /// Ordered list of links to rows of `target`.
    pub fn list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            object_type: Some(target.into()),
            ..Self::new(name, PropertyType::List)
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Column handle, absent until the aligner binds it.
    pub fn column(&self) -> Option<ColumnIndex> {
        self.column
    }

    /// Column handle of a bound property; `owner` names the type in errors.
    pub fn require_column(&self, owner: &str) -> RealmResult<ColumnIndex> {
        self.column.ok_or_else(|| {
            RealmError::InvalidSchema(format!(
                "'{}.{}' is not bound to a storage column",
                owner, self.name
            ))
        })
    }

    pub(crate) fn bind_column(&mut self, column: ColumnIndex) {
        self.column = Some(column);
    }

    pub(crate) fn unbind_column(&mut self) {
        self.column = None;
    }

    /// Whether storage must accept nulls for this property.
    pub fn is_nullable(&self) -> bool {
        self.optional || matches!(self.property_type, PropertyType::Object | PropertyType::Any)
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.property_type == other.property_type
            && self.optional == other.optional
            && self.indexed == other.indexed
            && self.object_type == other.object_type
            && self.default == other.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_types() {
        assert!(PropertyType::String.can_be_primary_key());
        assert!(PropertyType::Int.can_be_primary_key());
        assert!(!PropertyType::Double.can_be_primary_key());
        assert!(!PropertyType::Object.can_be_primary_key());
    }

    #[test]
    fn test_links_are_nullable() {
        let prop = Property::object("owner", "Person");
        assert!(prop.is_nullable());
        assert_eq!(prop.object_type.as_deref(), Some("Person"));

        let list = Property::list("dogs", "Dog");
        assert!(!list.is_nullable());
    }

    #[test]
    fn test_column_binding_ignored_by_equality() {
        let mut a = Property::new("name", PropertyType::String);
        let b = Property::new("name", PropertyType::String);
        a.bind_column(3);
        assert_eq!(a, b);
        assert_eq!(a.column(), Some(3));
        a.unbind_column();
        assert_eq!(a.column(), None);
    }

    #[test]
    fn test_property_deserializes_from_json() {
        let prop: Property = serde_json::from_str(
            r#"{"name": "age", "type": "int", "optional": true, "indexed": true}"#,
        )
        .unwrap();
        assert_eq!(prop.property_type, PropertyType::Int);
        assert!(prop.optional);
        assert!(prop.indexed);
        assert!(prop.column().is_none());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(PropertyType::List.to_string(), "list");
        assert_eq!(PropertyType::Binary.type_name(), "binary");
    }
}
