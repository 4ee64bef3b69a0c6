//! Value validation
//!
//! Scalars must convert losslessly (float widens to double); string,
//! binary and date require an exact match. Links accept null, a live
//! object of the target type, or a literal (a record, or a bound object of
//! another type) that validates against the target type itself.

mod validator;

pub use validator::Validator;

/// Validation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Validate linked literals and references, not just their shape
    pub recurse_into_links: bool,
    /// Skip properties the source does not supply
    pub allow_missing: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            recurse_into_links: true,
            allow_missing: false,
        }
    }
}
