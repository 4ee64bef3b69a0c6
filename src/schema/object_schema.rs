//! Type descriptors: one named record type and its ordered properties

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::{Property, PropertyType};

/// Schema-level description of one record type.
///
/// Property order is the canonical column order for newly created tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            name: name.into(),
            properties,
            primary_key: None,
        }
    }

    pub fn with_primary_key(mut self, property: impl Into<String>) -> Self {
        self.primary_key = Some(property.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    pub fn primary_key_property(&self) -> Option<&Property> {
        self.primary_key.as_deref().and_then(|pk| self.property(pk))
    }

    pub fn is_primary(&self, property: &str) -> bool {
        self.primary_key.as_deref() == Some(property)
    }

    /// A property needs a search index when declared indexed or primary.
    pub fn wants_index(&self, property: &Property) -> bool {
        property.indexed || self.is_primary(&property.name)
    }

    /// Drops every column binding.
    pub fn unbind(&mut self) {
        for prop in &mut self.properties {
            prop.unbind_column();
        }
    }

    /// True once every property is mapped onto a physical column.
    pub fn is_bound(&self) -> bool {
        self.properties.iter().all(|p| p.column().is_some())
    }

    /// Validates the type descriptor on its own (not against other types).
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("type name must not be empty".into());
        }

        let mut seen = HashSet::new();
        for prop in &self.properties {
            if prop.name.is_empty() {
                return Err(format!("type '{}' has a property with an empty name", self.name));
            }
            if !seen.insert(prop.name.as_str()) {
                return Err(format!(
                    "property '{}' appears more than once in type '{}'",
                    prop.name, self.name
                ));
            }
            if prop.property_type.is_link() && prop.object_type.is_none() {
                return Err(format!(
                    "'{}.{}' is a {} property without a target type",
                    self.name, prop.name, prop.property_type
                ));
            }
            if prop.property_type == PropertyType::List && prop.optional {
                return Err(format!(
                    "'{}.{}': list properties cannot be optional",
                    self.name, prop.name
                ));
            }
        }

        if let Some(pk) = &self.primary_key {
            let prop = self.property(pk).ok_or_else(|| {
                format!(
                    "primary key '{}' is not a property of type '{}'",
                    pk, self.name
                )
            })?;
            if !prop.property_type.can_be_primary_key() {
                return Err(format!(
                    "'{}.{}' cannot be the primary key: only string and int properties can",
                    self.name, pk
                ));
            }
            if prop.optional {
                return Err(format!(
                    "'{}.{}' cannot be the primary key: primary keys cannot be optional",
                    self.name, pk
                ));
            }
        }

        Ok(())
    }
}
