//! Cache errors.
use displaydoc::Display;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;

/// Error types for the merge, read and planning passes.
///
/// Every variant aborts the whole call: no partial cache or result is produced.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum CacheError {
    /// variable '{name}' is used but not declared by the operation
    UndefinedVariable {
        /// Name of the variable.
        name: String,
    },

    /// no value was provided for variable '{name}' and it has no default value
    MissingVariableValue {
        /// Name of the variable.
        name: String,
    },

    /// could not resolve variable '{name}' while computing a cache key
    UnresolvedVariable {
        /// Name of the variable.
        name: String,
    },

    /// invalid value for variable '{name}': {reason}
    InvalidVariableValue {
        /// Name of the variable.
        name: String,

        /// Why the value cannot be used.
        reason: String,
    },
}
