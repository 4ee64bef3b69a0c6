//! CLI-specific error types

use std::fmt;
use std::io;

use crate::errors::RealmError;
use crate::store::StoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration or schema file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// Verification found discrepancies
    SchemaMismatch,
    /// A realm operation failed
    OperationFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "REALM_CLI_CONFIG_ERROR",
            Self::IoError => "REALM_CLI_IO_ERROR",
            Self::SchemaMismatch => "REALM_CLI_SCHEMA_MISMATCH",
            Self::OperationFailed => "REALM_CLI_OPERATION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn schema_mismatch(count: usize) -> Self {
        Self::new(
            CliErrorCode::SchemaMismatch,
            format!("{} discrepancies between store and declared schema", count),
        )
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<RealmError> for CliError {
    fn from(e: RealmError) -> Self {
        match e {
            RealmError::Config(msg) => Self::config_error(msg),
            other => Self::new(
                CliErrorCode::OperationFailed,
                format!("{}: {}", other.code(), other),
            ),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        RealmError::from(e).into()
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
