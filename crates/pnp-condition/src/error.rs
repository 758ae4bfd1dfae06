//! Error types for the condition registry.

/// Errors from condition registration and lookup.
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("Condition not implemented: {0}")]
    NotFound(String),
    #[error("Condition {0} does not accept update listeners")]
    ListenerRejected(String),
    #[error("Condition {name} could not be loaded: {reason}")]
    LoadFailed { name: String, reason: String },
}

impl From<ConditionError> for pnp_core::PnpError {
    fn from(err: ConditionError) -> Self {
        pnp_core::PnpError::Condition(err.to_string())
    }
}
