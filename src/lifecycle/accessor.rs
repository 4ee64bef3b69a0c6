//! Property access on application objects

use std::collections::{BTreeMap, HashMap};

use crate::value::{Record, Value};

/// Read access to the property values of an application object.
///
/// The lifecycle manager depends only on this capability. `None` means the
/// object does not supply the property, which is different from supplying
/// `Value::Null`.
pub trait ObjectAccessor {
    fn get_value(&self, property: &str) -> Option<Value>;

    /// Value of the property declared at `index`. Positional sources
    /// override this; named sources look the property up by name.
    fn value_at(&self, index: usize, property: &str) -> Option<Value> {
        let _ = index;
        self.get_value(property)
    }

    /// Number of values of a positional source.
    fn positional_len(&self) -> Option<usize> {
        None
    }
}

impl ObjectAccessor for BTreeMap<String, Value> {
    fn get_value(&self, property: &str) -> Option<Value> {
        self.get(property).cloned()
    }
}

impl ObjectAccessor for HashMap<String, Value> {
    fn get_value(&self, property: &str) -> Option<Value> {
        self.get(property).cloned()
    }
}

impl ObjectAccessor for Record {
    fn get_value(&self, property: &str) -> Option<Value> {
        match self {
            Record::Named(values) => values.get(property).cloned(),
            Record::Positional(_) => None,
        }
    }

    fn value_at(&self, index: usize, property: &str) -> Option<Value> {
        match self {
            Record::Named(values) => values.get(property).cloned(),
            Record::Positional(values) => values.get(index).cloned(),
        }
    }

    fn positional_len(&self) -> Option<usize> {
        match self {
            Record::Named(_) => None,
            Record::Positional(values) => Some(values.len()),
        }
    }
}
