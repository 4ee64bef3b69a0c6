//! Error types for realmkit
//!
//! Error codes:
//! - REALM_VERSION_REGRESSION (FATAL)
//! - REALM_SCHEMA_MISMATCH (REJECT, retryable)
//! - REALM_UNSUPPORTED_COLUMN_RETYPE (REJECT)
//! - REALM_UNINDEXABLE_TYPE (REJECT)
//! - REALM_MISSING_REQUIRED_VALUE (REJECT)
//! - REALM_TYPE_MISMATCH (REJECT)
//! - REALM_INVALID_REFERENCE (REJECT)
//! - REALM_NOT_IN_WRITE_CONTEXT (REJECT, programmer error)
//! - REALM_FOREIGN_REALM_OBJECT (REJECT, programmer error)
//! - REALM_DUPLICATE_PRIMARY_KEY (REJECT)
//! - REALM_INVALID_SCHEMA (REJECT)
//! - REALM_MIGRATION_FAILED (REJECT)
//! - REALM_STORAGE_FAILED (FATAL)
//! - REALM_CONFIG_ERROR (FATAL)

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::schema::PropertyType;
use crate::store::StoreError;

/// Severity levels for realm errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The request is rejected; the store is untouched
    Reject,
    /// The store cannot be used by this caller
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Stable error codes, one per error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmErrorCode {
    VersionRegression,
    SchemaMismatch,
    UnsupportedColumnRetype,
    UnindexableType,
    MissingRequiredValue,
    TypeMismatch,
    InvalidReference,
    NotInWriteContext,
    ForeignRealmObject,
    DuplicatePrimaryKey,
    InvalidSchema,
    MigrationFailed,
    StorageFailed,
    ConfigError,
}

impl RealmErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            Self::VersionRegression => "REALM_VERSION_REGRESSION",
            Self::SchemaMismatch => "REALM_SCHEMA_MISMATCH",
            Self::UnsupportedColumnRetype => "REALM_UNSUPPORTED_COLUMN_RETYPE",
            Self::UnindexableType => "REALM_UNINDEXABLE_TYPE",
            Self::MissingRequiredValue => "REALM_MISSING_REQUIRED_VALUE",
            Self::TypeMismatch => "REALM_TYPE_MISMATCH",
            Self::InvalidReference => "REALM_INVALID_REFERENCE",
            Self::NotInWriteContext => "REALM_NOT_IN_WRITE_CONTEXT",
            Self::ForeignRealmObject => "REALM_FOREIGN_REALM_OBJECT",
            Self::DuplicatePrimaryKey => "REALM_DUPLICATE_PRIMARY_KEY",
            Self::InvalidSchema => "REALM_INVALID_SCHEMA",
            Self::MigrationFailed => "REALM_MIGRATION_FAILED",
            Self::StorageFailed => "REALM_STORAGE_FAILED",
            Self::ConfigError => "REALM_CONFIG_ERROR",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            Self::VersionRegression | Self::StorageFailed | Self::ConfigError => Severity::Fatal,
            _ => Severity::Reject,
        }
    }

    /// Programmer errors are surfaced immediately and never retried.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Self::NotInWriteContext | Self::ForeignRealmObject)
    }
}

impl fmt::Display for RealmErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What differs between the stored and the declared layout of one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Declared but not present in storage
    Added,
    /// Present in storage but no longer declared
    Removed,
    TypeChanged {
        stored: PropertyType,
        declared: PropertyType,
    },
    NullabilityChanged {
        stored_optional: bool,
        declared_optional: bool,
    },
    PrimaryKeyChanged {
        stored_primary: bool,
        declared_primary: bool,
    },
    LinkTargetChanged {
        stored: Option<String>,
        declared: Option<String>,
    },
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyKind::Added => write!(f, "property has been added"),
            DiscrepancyKind::Removed => write!(f, "property has been removed"),
            DiscrepancyKind::TypeChanged { stored, declared } => {
                write!(f, "type changed from '{}' to '{}'", stored, declared)
            }
            DiscrepancyKind::NullabilityChanged {
                declared_optional, ..
            } => {
                if *declared_optional {
                    write!(f, "property has been made optional")
                } else {
                    write!(f, "property has been made required")
                }
            }
            DiscrepancyKind::PrimaryKeyChanged {
                declared_primary, ..
            } => {
                if *declared_primary {
                    write!(f, "property has been made the primary key")
                } else {
                    write!(f, "property is no longer the primary key")
                }
            }
            DiscrepancyKind::LinkTargetChanged { stored, declared } => write!(
                f,
                "link target changed from '{}' to '{}'",
                stored.as_deref().unwrap_or("<none>"),
                declared.as_deref().unwrap_or("<none>")
            ),
        }
    }
}

/// One entry of an aggregate schema mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDiscrepancy {
    pub type_name: String,
    pub property: String,
    #[serde(flatten)]
    pub kind: DiscrepancyKind,
}

impl SchemaDiscrepancy {
    pub fn new(
        type_name: impl Into<String>,
        property: impl Into<String>,
        kind: DiscrepancyKind,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            property: property.into(),
            kind,
        }
    }
}

impl fmt::Display for SchemaDiscrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}.{}': {}", self.type_name, self.property, self.kind)
    }
}

fn format_discrepancies(discrepancies: &[SchemaDiscrepancy]) -> String {
    discrepancies
        .iter()
        .map(|d| format!("\n- {}", d))
        .collect()
}

/// Realm error type
#[derive(Debug, Error)]
pub enum RealmError {
    #[error("store is at schema version {persisted}, which is newer than requested version {requested}")]
    VersionRegression { persisted: u64, requested: u64 },

    #[error("migration is required due to the following errors:{}", format_discrepancies(.0))]
    SchemaMismatch(Vec<SchemaDiscrepancy>),

    #[error("cannot migrate '{type_name}.{property}' ({column_type}): {reason}")]
    UnsupportedColumnRetype {
        type_name: String,
        property: String,
        column_type: PropertyType,
        reason: String,
    },

    #[error("'{type_name}.{property}' is declared indexed but '{property_type}' properties cannot be indexed")]
    UnindexableType {
        type_name: String,
        property: String,
        property_type: PropertyType,
    },

    #[error("missing value for required property '{property}' of type '{type_name}'")]
    MissingRequiredValue { type_name: String, property: String },

    #[error("invalid value for '{type_name}.{property}': expected {expected}, got {actual}")]
    TypeMismatch {
        type_name: String,
        property: String,
        expected: String,
        actual: String,
    },

    #[error("invalid reference for '{type_name}.{property}': {reason}")]
    InvalidReference {
        type_name: String,
        property: String,
        reason: String,
    },

    #[error("'{operation}' requires an open write transaction")]
    NotInWriteContext { operation: String },

    #[error("object of type '{type_name}' is already bound to a different realm")]
    ForeignRealmObject { type_name: String },

    #[error("primary key value {value} already exists for type '{type_name}'")]
    DuplicatePrimaryKey { type_name: String, value: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("storage failure: {0}")]
    Storage(StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RealmError {
    pub fn not_in_write(operation: impl Into<String>) -> Self {
        RealmError::NotInWriteContext {
            operation: operation.into(),
        }
    }

    pub fn type_mismatch(
        type_name: impl Into<String>,
        property: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        RealmError::TypeMismatch {
            type_name: type_name.into(),
            property: property.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_reference(
        type_name: impl Into<String>,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        RealmError::InvalidReference {
            type_name: type_name.into(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// A row reference whose epoch no longer matches its table.
    pub fn stale_row(type_name: impl Into<String>, row: usize) -> Self {
        RealmError::InvalidReference {
            type_name: type_name.into(),
            property: format!("#{}", row),
            reason: "row reference is stale; re-derive it after deletions or layout changes"
                .to_string(),
        }
    }

    pub fn missing_value(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        RealmError::MissingRequiredValue {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> RealmErrorCode {
        match self {
            RealmError::VersionRegression { .. } => RealmErrorCode::VersionRegression,
            RealmError::SchemaMismatch(_) => RealmErrorCode::SchemaMismatch,
            RealmError::UnsupportedColumnRetype { .. } => RealmErrorCode::UnsupportedColumnRetype,
            RealmError::UnindexableType { .. } => RealmErrorCode::UnindexableType,
            RealmError::MissingRequiredValue { .. } => RealmErrorCode::MissingRequiredValue,
            RealmError::TypeMismatch { .. } => RealmErrorCode::TypeMismatch,
            RealmError::InvalidReference { .. } => RealmErrorCode::InvalidReference,
            RealmError::NotInWriteContext { .. } => RealmErrorCode::NotInWriteContext,
            RealmError::ForeignRealmObject { .. } => RealmErrorCode::ForeignRealmObject,
            RealmError::DuplicatePrimaryKey { .. } => RealmErrorCode::DuplicatePrimaryKey,
            RealmError::InvalidSchema(_) => RealmErrorCode::InvalidSchema,
            RealmError::MigrationFailed(_) => RealmErrorCode::MigrationFailed,
            RealmError::Storage(_) => RealmErrorCode::StorageFailed,
            RealmError::Config(_) => RealmErrorCode::ConfigError,
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code().severity()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Verification failures never mutate anything and may be retried once
    /// the caller fixes the schema or asks for a migration.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code(), RealmErrorCode::SchemaMismatch)
    }

    /// Returns the discrepancy list of a schema mismatch
    pub fn discrepancies(&self) -> &[SchemaDiscrepancy] {
        match self {
            RealmError::SchemaMismatch(list) => list,
            _ => &[],
        }
    }
}

impl From<StoreError> for RealmError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotInWriteTransaction { operation } => {
                RealmError::NotInWriteContext { operation }
            }
            other => RealmError::Storage(other),
        }
    }
}

/// Result type for realm operations
pub type RealmResult<T> = Result<T, RealmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(RealmErrorCode::VersionRegression.code(), "REALM_VERSION_REGRESSION");
        assert_eq!(RealmErrorCode::SchemaMismatch.code(), "REALM_SCHEMA_MISMATCH");
        assert_eq!(RealmErrorCode::NotInWriteContext.code(), "REALM_NOT_IN_WRITE_CONTEXT");
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(RealmErrorCode::VersionRegression.severity(), Severity::Fatal);
        assert_eq!(RealmErrorCode::TypeMismatch.severity(), Severity::Reject);
        assert!(RealmErrorCode::ForeignRealmObject.is_programmer_error());
        assert!(!RealmErrorCode::SchemaMismatch.is_programmer_error());
    }

    #[test]
    fn test_schema_mismatch_lists_every_discrepancy() {
        let err = RealmError::SchemaMismatch(vec![
            SchemaDiscrepancy::new(
                "Person",
                "age",
                DiscrepancyKind::TypeChanged {
                    stored: PropertyType::Int,
                    declared: PropertyType::String,
                },
            ),
            SchemaDiscrepancy::new("Person", "nickname", DiscrepancyKind::Removed),
        ]);
        let display = err.to_string();
        assert!(display.contains("'Person.age'"));
        assert!(display.contains("'Person.nickname'"));
        assert_eq!(err.discrepancies().len(), 2);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_store_write_error_becomes_not_in_write_context() {
        let err: RealmError = StoreError::NotInWriteTransaction {
            operation: "add_empty_row".into(),
        }
        .into();
        assert_eq!(err.code(), RealmErrorCode::NotInWriteContext);
        assert!(err.to_string().contains("add_empty_row"));
    }

    #[test]
    fn test_other_store_errors_are_storage_failures() {
        let err: RealmError = StoreError::NoSuchTable("class_Dog".into()).into();
        assert_eq!(err.code(), RealmErrorCode::StorageFailed);
        assert!(err.is_fatal());
    }
}
