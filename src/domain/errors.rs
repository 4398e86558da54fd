// ============================================================================
// Domain Validation Errors
// ============================================================================
//
// Every variant here means "the payload describes an order that can never be
// valid". The ingestion pipeline routes all of them to the dead-letter topic.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("invalid state: {0} is missing")]
    MissingRequiredField(&'static str),

    #[error("invalid state: {field} {reason}")]
    InvalidState {
        field: &'static str,
        reason: &'static str,
    },

    #[error("invalid state: items[{index}].{field} {reason}")]
    InvalidItem {
        index: usize,
        field: &'static str,
        reason: &'static str,
    },
}

impl DomainError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidState { field, reason }
    }

    /// Name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingRequiredField(field) => field,
            Self::InvalidState { field, .. } => field,
            Self::InvalidItem { field, .. } => field,
        }
    }
}
