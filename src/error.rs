use thiserror::Error;

/// Errors raised by the projection core before any simulation step runs.
///
/// There is no partial-success mode: when one of these comes back, no rows
/// were produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("malformed input at row {row}: {reason}")]
    MalformedInput { row: usize, reason: String },
}

impl ProjectionError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ProjectionError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(row: usize, reason: impl Into<String>) -> Self {
        ProjectionError::MalformedInput {
            row,
            reason: reason.into(),
        }
    }

    /// Field name for `InvalidParameter`, `None` otherwise.
    pub fn field(&self) -> Option<&str> {
        match self {
            ProjectionError::InvalidParameter { field, .. } => Some(field),
            ProjectionError::MalformedInput { .. } => None,
        }
    }
}
