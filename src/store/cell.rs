//! Physical cell values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::PropertyType;
use crate::value::Value;

/// One stored cell. Link cells hold row indices in the target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Date(DateTime<Utc>),
    Link(usize),
    LinkList(Vec<usize>),
    /// Scalar held by an `any` column
    Mixed(Box<Value>),
}

impl Cell {
    /// Value stored in fresh rows of a column.
    pub fn default_for(column_type: PropertyType, nullable: bool) -> Self {
        if nullable && column_type != PropertyType::List {
            return Cell::Null;
        }
        match column_type {
            PropertyType::Bool => Cell::Bool(false),
            PropertyType::Int => Cell::Int(0),
            PropertyType::Float => Cell::Float(0.0),
            PropertyType::Double => Cell::Double(0.0),
            PropertyType::String => Cell::String(String::new()),
            PropertyType::Binary => Cell::Binary(Vec::new()),
            PropertyType::Date => Cell::Date(DateTime::<Utc>::default()),
            PropertyType::Object | PropertyType::Any => Cell::Null,
            PropertyType::List => Cell::LinkList(Vec::new()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Int(_) => "int",
            Cell::Float(_) => "float",
            Cell::Double(_) => "double",
            Cell::String(_) => "string",
            Cell::Binary(_) => "binary",
            Cell::Date(_) => "date",
            Cell::Link(_) => "link",
            Cell::LinkList(_) => "link list",
            Cell::Mixed(_) => "mixed",
        }
    }

    /// Whether this cell may live in a column of the given type.
    pub fn fits(&self, column_type: PropertyType, nullable: bool) -> bool {
        match (self, column_type) {
            (Cell::Null, PropertyType::Object | PropertyType::Any) => true,
            (Cell::Null, PropertyType::List) => false,
            (Cell::Null, _) => nullable,
            (Cell::Bool(_), PropertyType::Bool)
            | (Cell::Int(_), PropertyType::Int)
            | (Cell::Float(_), PropertyType::Float)
            | (Cell::Double(_), PropertyType::Double)
            | (Cell::String(_), PropertyType::String)
            | (Cell::Binary(_), PropertyType::Binary)
            | (Cell::Date(_), PropertyType::Date)
            | (Cell::Link(_), PropertyType::Object)
            | (Cell::LinkList(_), PropertyType::List)
            | (Cell::Mixed(_), PropertyType::Any) => true,
            _ => false,
        }
    }

    /// Converts a plain scalar value into a cell for a column of the given
    /// type. Links are resolved by the caller; they have no scalar form.
    pub fn from_scalar(value: &Value, column_type: PropertyType) -> Option<Self> {
        let cell = match (value, column_type) {
            (Value::Null, _) => Cell::Null,
            (other, PropertyType::Any) => Cell::Mixed(Box::new(other.clone())),
            (Value::Bool(b), _) => Cell::Bool(*b),
            (Value::Int(i), _) => Cell::Int(*i),
            (Value::Float(x), PropertyType::Double) => Cell::Double(f64::from(*x)),
            (Value::Float(x), _) => Cell::Float(*x),
            (Value::Double(x), _) => Cell::Double(*x),
            (Value::String(s), _) => Cell::String(s.clone()),
            (Value::Binary(b), _) => Cell::Binary(b.clone()),
            (Value::Date(d), _) => Cell::Date(*d),
            _ => return None,
        };
        Some(cell)
    }

    /// Reads a scalar cell back as a value. Link cells have no scalar form.
    pub fn to_scalar(&self) -> Option<Value> {
        let value = match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::Int(*i),
            Cell::Float(x) => Value::Float(*x),
            Cell::Double(x) => Value::Double(*x),
            Cell::String(s) => Value::String(s.clone()),
            Cell::Binary(b) => Value::Binary(b.clone()),
            Cell::Date(d) => Value::Date(*d),
            Cell::Mixed(v) => (**v).clone(),
            Cell::Link(_) | Cell::LinkList(_) => return None,
        };
        Some(value)
    }
}
