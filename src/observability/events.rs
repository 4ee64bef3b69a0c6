//! Observable log events
//!
//! Events are explicit and typed; each carries a fixed severity.

use std::fmt;

use super::logger::Severity;

/// Events logged by reconciliation and row lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    StoreOpened,
    StoreClosed,
    ConfigLoaded,

    // Reconciliation
    SchemaVerified,
    MigrationBegin,
    MigrationCallbackInvoked,
    MigrationCommitted,
    /// Write phase finished without changes; nothing committed
    MigrationSkipped,
    MigrationRolledBack,
    VersionRegression,

    // Layout changes
    TableCreated,
    ColumnAdded,
    ColumnRemoved,
    ColumnCopied,
    PrimaryKeyChanged,
    SearchIndexAdded,
    SearchIndexRemoved,

    // Rows
    RowCreated,
    RowDeleted,
    TableCleared,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::SchemaVerified => "SCHEMA_VERIFIED",
            Event::MigrationBegin => "MIGRATION_BEGIN",
            Event::MigrationCallbackInvoked => "MIGRATION_CALLBACK_INVOKED",
            Event::MigrationCommitted => "MIGRATION_COMMITTED",
            Event::MigrationSkipped => "MIGRATION_SKIPPED",
            Event::MigrationRolledBack => "MIGRATION_ROLLED_BACK",
            Event::VersionRegression => "VERSION_REGRESSION",

            Event::TableCreated => "TABLE_CREATED",
            Event::ColumnAdded => "COLUMN_ADDED",
            Event::ColumnRemoved => "COLUMN_REMOVED",
            Event::ColumnCopied => "COLUMN_COPIED",
            Event::PrimaryKeyChanged => "PRIMARY_KEY_CHANGED",
            Event::SearchIndexAdded => "SEARCH_INDEX_ADDED",
            Event::SearchIndexRemoved => "SEARCH_INDEX_REMOVED",

            Event::RowCreated => "ROW_CREATED",
            Event::RowDeleted => "ROW_DELETED",
            Event::TableCleared => "TABLE_CLEARED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::RowCreated | Event::RowDeleted => Severity::Trace,
            Event::MigrationRolledBack | Event::MigrationSkipped => Severity::Warn,
            Event::VersionRegression => Severity::Fatal,
            _ => Severity::Info,
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
