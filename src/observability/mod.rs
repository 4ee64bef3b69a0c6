//! Observability for realmkit
//!
//! Structured JSON logging of typed events. Observability is read-only:
//! it never fails or alters the operation being logged.
//!
//! # Usage
//!
//! ```ignore
//! use realmkit::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::TableCreated, &[("table", "class_Dog")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Only verifies no panic
        log_event(Event::StoreOpened);
        log_event(Event::RowCreated);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::ColumnAdded, &[("table", "class_Dog"), ("column", "name")]);
    }
}
