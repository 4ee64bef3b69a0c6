//! Row lifecycle
//!
//! Creating, finding, populating and deleting the rows that back
//! application objects. Every mutating operation requires an open write
//! transaction.
//!
//! # Row identity
//!
//! Deletion moves the table's last row into the freed slot, so the index
//! of that other row changes. `RowRef`s carry the table epoch they were
//! obtained at and are rejected once it moves; re-derive them with
//! `Realm::resolve` or a primary-key lookup.

mod accessor;
pub(crate) mod read;
mod rows;

pub use accessor::ObjectAccessor;
pub use rows::{PopulateOptions, RowLookup};
