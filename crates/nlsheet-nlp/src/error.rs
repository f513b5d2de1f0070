//! Error types for catalog construction

use crate::intent::IntentType;
use thiserror::Error;

/// Result type for nlsheet-nlp operations
pub type Result<T> = std::result::Result<T, NlpError>;

/// Errors raised while compiling the built-in catalogs or parsing templates
///
/// Runtime translation never fails with these: a text that cannot be
/// understood is reported as a low-confidence intent instead.
#[derive(Debug, Error)]
pub enum NlpError {
    /// A catalog regex failed to compile
    #[error("invalid pattern for {intent}: {source}")]
    Pattern {
        intent: IntentType,
        #[source]
        source: regex::Error,
    },

    /// A formula template has a malformed `${...}` placeholder
    #[error("malformed template '{template}': {message}")]
    Template { template: String, message: String },
}
