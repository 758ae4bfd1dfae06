//! Built-in `Say` action.
//!
//! Logs its parameters as a sentence (`Say_hello_world` says "hello world").

use async_trait::async_trait;
use pnp_core::Params;

use crate::error::ActionError;
use crate::handler::{ActionCapability, ActionResult};
use crate::instance::GoalContext;

pub struct Say;

impl Say {
    fn sentence(params: &Params) -> String {
        params.as_slice().join(" ")
    }
}

#[async_trait]
impl ActionCapability for Say {
    fn name(&self) -> &str {
        "Say"
    }

    async fn execute(&self, params: &Params, ctx: &GoalContext) -> Result<ActionResult, ActionError> {
        let sentence = Self::sentence(params);
        if sentence.is_empty() {
            return Err(ActionError::InvalidParams("nothing to say".to_string()));
        }
        tracing::info!(goal_id = %ctx.goal_id(), text = %sentence, "Say");
        Ok(ActionResult::success(format!("Said: {}", sentence)))
    }

    fn describe(&self, params: &Params) -> String {
        format!("Say \"{}\"", Self::sentence(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::InMemoryStatusStore;
    use pnp_core::GoalId;
    use std::sync::Arc;

    fn ctx() -> GoalContext {
        GoalContext::new(GoalId::from("g-1"), "Say", Arc::new(InMemoryStatusStore::new()))
    }

    #[tokio::test]
    async fn test_say_joins_params() {
        let result = Say
            .execute(&Params::from_joined("hello_world"), &ctx())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Said: hello world");
    }

    #[tokio::test]
    async fn test_say_without_params_fails() {
        let err = Say.execute(&Params::new(), &ctx()).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[test]
    fn test_say_describe() {
        assert_eq!(Say.describe(&Params::from_joined("hi_there")), "Say \"hi there\"");
    }
}
