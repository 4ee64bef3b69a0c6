//! Table store errors

use thiserror::Error;

use crate::schema::PropertyType;

/// Result type for table store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Table store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("'{operation}' must be called inside a write transaction")]
    NotInWriteTransaction { operation: String },

    #[error("a write transaction is already open")]
    WriteTransactionOpen,

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("no column {column} in table '{table}'")]
    NoSuchColumn { table: String, column: usize },

    #[error("row {row} out of bounds for table '{table}' with {row_count} rows")]
    RowOutOfBounds {
        table: String,
        row: usize,
        row_count: usize,
    },

    #[error("cannot store {actual} in column '{table}.{column}' of type {expected}")]
    CellTypeMismatch {
        table: String,
        column: String,
        expected: PropertyType,
        actual: &'static str,
    },

    #[error("column '{table}.{column}' of type {column_type} cannot be indexed")]
    Unindexable {
        table: String,
        column: String,
        column_type: PropertyType,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("corrupt store file: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_in_write(operation: impl Into<String>) -> Self {
        StoreError::NotInWriteTransaction {
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::RowOutOfBounds {
            table: "class_Dog".into(),
            row: 4,
            row_count: 2,
        };
        assert!(err.to_string().contains("row 4"));
        assert!(StoreError::not_in_write("clear").to_string().contains("clear"));
    }
}
