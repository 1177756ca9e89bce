use thiserror::Error;

use crate::location::SourceLocation;

/// Canonical compiler error taxonomy used across crates.
///
/// Classification guidance:
/// - [`PqlError::Argument`]: an argument has the wrong node/object kind, or a
///   call supplied unknown/missing arguments
/// - [`PqlError::Cardinality`]: an argument has the wrong number of elements
/// - [`PqlError::Semantic`]: well-shaped arguments with invalid meaning
///   (unknown join type, unknown column, type mismatch)
/// - [`PqlError::Graph`]: IR graph invariant violations; these are handler
///   bugs, never user errors
/// - [`PqlError::Lowering`]: the finished graph cannot be turned into a plan
///
/// Every user-facing variant carries the script location it is attributed to.
#[derive(Debug, Error)]
pub enum PqlError {
    /// Wrong argument kind.
    ///
    /// Examples:
    /// - `'right' must be an operator, got String`
    /// - `merge() got an unexpected keyword argument 'on'`
    #[error("{location}: {message}")]
    Argument {
        /// Location of the offending argument.
        location: SourceLocation,
        /// Human readable description.
        message: String,
    },

    /// Wrong element count.
    ///
    /// Examples:
    /// - `'suffixes' must be a tuple with 2 elements. Received 3`
    /// - mismatched `left_on`/`right_on` lengths
    #[error("{location}: {message}")]
    Cardinality {
        /// Location of the offending argument.
        location: SourceLocation,
        /// Human readable description.
        message: String,
    },

    /// Invalid value or type for an otherwise well-shaped argument.
    ///
    /// Examples:
    /// - unknown join type / OTel span kind
    /// - unknown table or column
    /// - column type outside the accepted set of an export role
    #[error("{location}: {message}")]
    Semantic {
        /// Location of the offending node.
        location: SourceLocation,
        /// Human readable description.
        message: String,
    },

    /// Graph invariant violated (missing node id, deleting a referenced node,
    /// cyclic operator graph).
    #[error("graph invariant violated: {0}")]
    Graph(String),

    /// Fatal plan lowering failure.
    #[error("lowering error: {0}")]
    Lowering(String),

    /// Invalid compiler configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Valid request for a shape this compiler does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl PqlError {
    /// Build an [`PqlError::Argument`] error.
    pub fn argument(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Argument {
            location,
            message: message.into(),
        }
    }

    /// Build an [`PqlError::Cardinality`] error.
    pub fn cardinality(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Cardinality {
            location,
            message: message.into(),
        }
    }

    /// Build an [`PqlError::Semantic`] error.
    pub fn semantic(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Semantic {
            location,
            message: message.into(),
        }
    }

    /// Location the error is attributed to, if any.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Self::Argument { location, .. }
            | Self::Cardinality { location, .. }
            | Self::Semantic { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// Message without the location prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Argument { message, .. }
            | Self::Cardinality { message, .. }
            | Self::Semantic { message, .. } => message.clone(),
            Self::Graph(m)
            | Self::Lowering(m)
            | Self::InvalidConfig(m)
            | Self::Unsupported(m) => m.clone(),
        }
    }
}

/// Standard compiler result alias.
pub type Result<T> = std::result::Result<T, PqlError>;
