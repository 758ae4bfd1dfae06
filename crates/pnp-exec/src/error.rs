//! Error types for the execution controller.

use pnp_action::ActionError;
use pnp_core::PnpError;

use crate::state_machine::SlotState;

/// Errors from command dispatch, rule parsing and plan execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Action {0} is already running")]
    DuplicateStart(String),
    #[error("Unknown recovery directive: {0}")]
    UnknownRecovery(String),
    #[error("Invalid interrupt trigger: {0}")]
    InvalidTrigger(String),
    #[error("Invalid slot transition for {action}: {from} -> {to}")]
    InvalidTransition {
        action: String,
        from: SlotState,
        to: SlotState,
    },
    #[error("Command dispatch failed: {0}")]
    Transport(String),
    #[error("Action error: {0}")]
    Action(#[from] ActionError),
    #[error("Plan execution cancelled")]
    Cancelled,
}

impl From<ExecError> for PnpError {
    fn from(err: ExecError) -> Self {
        PnpError::Execution(err.to_string())
    }
}
