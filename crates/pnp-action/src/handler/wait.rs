//! Built-in `Wait` action.
//!
//! Sleeps for `params[0]` seconds (fractional allowed, default 1).

use std::time::Duration;

use async_trait::async_trait;
use pnp_core::Params;

use crate::error::ActionError;
use crate::handler::{ActionCapability, ActionResult};
use crate::instance::GoalContext;

const DEFAULT_SECONDS: f64 = 1.0;

pub struct Wait;

impl Wait {
    fn duration(params: &Params) -> Result<Duration, ActionError> {
        let secs = match params.get(0) {
            None => DEFAULT_SECONDS,
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| ActionError::InvalidParams(format!("not a number: {}", raw)))?,
        };
        Duration::try_from_secs_f64(secs)
            .map_err(|_| ActionError::InvalidParams(format!("invalid wait duration: {}", secs)))
    }
}

#[async_trait]
impl ActionCapability for Wait {
    fn name(&self) -> &str {
        "Wait"
    }

    async fn execute(&self, params: &Params, ctx: &GoalContext) -> Result<ActionResult, ActionError> {
        let duration = Self::duration(params)?;
        tracing::debug!(goal_id = %ctx.goal_id(), secs = duration.as_secs_f64(), "Waiting");
        tokio::time::sleep(duration).await;
        Ok(ActionResult::success(format!(
            "Waited {} s",
            duration.as_secs_f64()
        )))
    }

    fn describe(&self, params: &Params) -> String {
        format!("Wait {} s", params.get(0).unwrap_or("1"))
    }
}
