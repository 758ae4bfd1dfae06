//! Action capability trait and built-in actions.
//!
//! Every action the executor can run implements `ActionCapability`. Actions
//! are registered explicitly at startup; the built-ins below let the binary
//! run plans without external plugins.

pub mod say;
pub mod wait;

use std::sync::Arc;

use async_trait::async_trait;
use pnp_core::Params;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::instance::GoalContext;

pub use say::Say;
pub use wait::Wait;

/// Outcome of one action body run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A pluggable unit of work that can be started, interrupted and ended.
#[async_trait]
pub trait ActionCapability: Send + Sync {
    /// Registry name of the action.
    fn name(&self) -> &str;

    /// Whether the world already satisfies this action's goal.
    ///
    /// Queried before starting; a `true` answer short-circuits to success.
    fn is_goal_reached(&self, _params: &Params) -> bool {
        false
    }

    /// Run the action body to completion.
    ///
    /// The body runs on its own task and is aborted when the goal is
    /// interrupted, so it must not rely on running past an `.await`.
    async fn execute(&self, params: &Params, ctx: &GoalContext) -> Result<ActionResult, ActionError>;

    /// Human-readable description of what the action would do.
    fn describe(&self, params: &Params) -> String {
        if params.is_empty() {
            self.name().to_string()
        } else {
            format!("{} {}", self.name(), params)
        }
    }
}

/// The actions that ship with the executor.
pub fn builtins() -> Vec<Arc<dyn ActionCapability>> {
    vec![Arc::new(Say), Arc::new(Wait)]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ActionCapability for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        async fn execute(
            &self,
            _params: &Params,
            _ctx: &GoalContext,
        ) -> Result<ActionResult, ActionError> {
            Ok(ActionResult::success("done"))
        }
    }

    #[test]
    fn test_default_goal_not_reached() {
        assert!(!Noop.is_goal_reached(&Params::from_joined("A_B")));
    }

    #[test]
    fn test_default_describe() {
        assert_eq!(Noop.describe(&Params::new()), "Noop");
        assert_eq!(Noop.describe(&Params::from_joined("A_B")), "Noop A_B");
    }

    #[test]
    fn test_builtins_names() {
        let names: Vec<String> = builtins().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["Say".to_string(), "Wait".to_string()]);
    }

    #[test]
    fn test_action_result_constructors() {
        assert!(ActionResult::success("ok").success);
        let failed = ActionResult::failure("blocked");
        assert!(!failed.success);
        assert_eq!(failed.message, "blocked");
    }
}
