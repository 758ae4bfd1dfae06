//! Error types for the action registry and server.

use pnp_core::{GoalId, PnpError};

/// Errors from action registration, instantiation and execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action not implemented: {0}")]
    NotFound(String),
    #[error("Goal {0} already has a live instance")]
    DuplicateGoal(GoalId),
    #[error("Action {0} is already running")]
    AlreadyRunning(String),
    #[error("Action {name} could not be loaded: {reason}")]
    LoadFailed { name: String, reason: String },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Action failed: {0}")]
    Failed(String),
}

impl From<ActionError> for PnpError {
    fn from(err: ActionError) -> Self {
        PnpError::Action(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::NotFound("Fly".to_string());
        assert_eq!(err.to_string(), "Action not implemented: Fly");

        let err = ActionError::DuplicateGoal(GoalId::from("g-7"));
        assert_eq!(err.to_string(), "Goal g-7 already has a live instance");

        let err = ActionError::AlreadyRunning("Move".to_string());
        assert_eq!(err.to_string(), "Action Move is already running");

        let err = ActionError::LoadFailed {
            name: "Move".to_string(),
            reason: "duplicate name".to_string(),
        };
        assert_eq!(err.to_string(), "Action Move could not be loaded: duplicate name");

        let err = ActionError::InvalidParams("not a number: abc".to_string());
        assert_eq!(err.to_string(), "Invalid parameters: not a number: abc");
    }

    #[test]
    fn test_action_error_into_pnp_error() {
        let err: PnpError = ActionError::Failed("blocked".to_string()).into();
        assert!(matches!(err, PnpError::Action(_)));
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn test_action_error_failed_empty_message() {
        let err = ActionError::Failed(String::new());
        assert_eq!(err.to_string(), "Action failed: ");
    }
}
