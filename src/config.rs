//! Realm configuration
//!
//! Loaded from a JSON file:
//!
//! ```json
//! {
//!   "path": "./default.realm",
//!   "schema_path": "./schema.json",
//!   "schema_version": 3,
//!   "relaxation_copy": "scalars",
//!   "log_level": "INFO"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{RealmError, RealmResult};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::schema::{PropertyType, NOT_VERSIONED};

/// Which columns keep their data when a migration relaxes a required
/// property to optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelaxationCopy {
    /// Only string columns are copied; other relaxations fail
    Strings,
    /// Every scalar column is copied
    #[default]
    Scalars,
}

impl RelaxationCopy {
    pub fn copies(&self, column_type: PropertyType) -> bool {
        match self {
            RelaxationCopy::Strings => column_type == PropertyType::String,
            RelaxationCopy::Scalars => matches!(
                column_type,
                PropertyType::Bool
                    | PropertyType::Int
                    | PropertyType::Float
                    | PropertyType::Double
                    | PropertyType::String
                    | PropertyType::Binary
                    | PropertyType::Date
            ),
        }
    }
}

/// Configuration of one realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmConfig {
    /// Persisted store file; in-memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Declared schema file, used by the CLI
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    /// Requested schema version
    pub schema_version: u64,

    #[serde(default)]
    pub relaxation_copy: RelaxationCopy,

    #[serde(default)]
    pub log_level: Severity,
}

impl RealmConfig {
    /// In-memory realm at the given version.
    pub fn in_memory(schema_version: u64) -> Self {
        Self {
            path: None,
            schema_path: None,
            schema_version,
            relaxation_copy: RelaxationCopy::default(),
            log_level: Severity::default(),
        }
    }

    /// Realm persisted at `path`.
    pub fn persisted(path: impl Into<PathBuf>, schema_version: u64) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory(schema_version)
        }
    }

    pub fn with_relaxation_copy(mut self, policy: RelaxationCopy) -> Self {
        self.relaxation_copy = policy;
        self
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> RealmResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| RealmError::Config(format!("failed to read config: {}", e)))?;

        let config: RealmConfig = serde_json::from_str(&content)
            .map_err(|e| RealmError::Config(format!("invalid config JSON: {}", e)))?;

        config.validate()?;

        let path_field = path.display().to_string();
        let version_field = config.schema_version.to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", path_field.as_str()), ("schema_version", version_field.as_str())],
        );

        Ok(config)
    }

    pub fn validate(&self) -> RealmResult<()> {
        if self.schema_version == NOT_VERSIONED {
            return Err(RealmError::Config(format!(
                "schema_version {} is reserved for unversioned stores",
                NOT_VERSIONED
            )));
        }

        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(RealmError::Config("path must not be empty".into()));
            }
        }

        Ok(())
    }

    /// Applies `log_level` to the process-wide logger.
    pub fn apply_logging(&self) {
        Logger::set_min_severity(self.log_level);
    }
}
