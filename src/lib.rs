//! realmkit - schema reconciliation and row lifecycle management
//!
//! Sits on top of a transactional, column-oriented table store and keeps
//! two things honest: the physical table layout matches the schema the
//! application declares, and rows for application objects are created,
//! found, updated and removed without corrupting other holders' views.

pub mod cli;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod migration;
pub mod observability;
pub mod observer;
pub mod realm;
pub mod registry;
pub mod schema;
pub mod store;
pub mod validate;
pub mod value;

pub use config::{RealmConfig, RelaxationCopy};
pub use errors::{DiscrepancyKind, RealmError, RealmErrorCode, RealmResult, SchemaDiscrepancy};
pub use lifecycle::{ObjectAccessor, PopulateOptions, RowLookup};
pub use migration::{Migration, OldObject, ReconcileOutcome};
pub use observer::{EventLog, LifecycleObserver, RowEvent};
pub use registry::{
    AccessorCache, AccessorFactory, ColumnMapFactory, RealmHandle, RealmRegistry, RowAccessorClass,
};
pub use realm::Realm;
pub use schema::{ObjectSchema, Property, PropertyType, Schema, SchemaHash, NOT_VERSIONED};
pub use store::{MemoryStore, RowRef, TableStore};
pub use validate::{ValidateOptions, Validator};
pub use value::{ObjectRef, Record, Value};
