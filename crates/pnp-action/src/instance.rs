//! Running action instances.
//!
//! An `ActionInstance` owns the task running one action body for one goal.
//! Its `GoalContext` reports `running` when the instance starts and the
//! outcome when the body finishes. A body that panics reports `failure`.
//! Once a goal is interrupted, late reports from the aborted body are
//! dropped so the interrupt's `failure` sticks.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use pnp_core::{ActionStatus, Goal, GoalId};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, warn};

use crate::handler::ActionCapability;
use crate::status::StatusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    Finished,
    Interrupted,
}

/// Handle given to a running action body for status reporting.
#[derive(Clone)]
pub struct GoalContext {
    goal_id: GoalId,
    action: String,
    status: Arc<dyn StatusStore>,
    phase: Arc<Mutex<Phase>>,
}

impl GoalContext {
    pub fn new(goal_id: GoalId, action: impl Into<String>, status: Arc<dyn StatusStore>) -> Self {
        Self {
            goal_id,
            action: action.into(),
            status,
            phase: Arc::new(Mutex::new(Phase::Live)),
        }
    }

    pub fn goal_id(&self) -> &GoalId {
        &self.goal_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Report a status for this goal.
    ///
    /// Returns `false` when the report was dropped because the goal already
    /// finished or was interrupted. A terminal status finishes the goal.
    pub fn report(&self, status: ActionStatus) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != Phase::Live {
            return false;
        }
        if status.is_terminal() {
            *phase = Phase::Finished;
        }
        self.status.set(&self.action, status);
        true
    }

    pub fn is_interrupted(&self) -> bool {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) == Phase::Interrupted
    }

    /// Mark the goal interrupted and report `failure` if it was still live.
    fn interrupt(&self) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != Phase::Live {
            return false;
        }
        *phase = Phase::Interrupted;
        self.status.set(&self.action, ActionStatus::Failure);
        true
    }
}

impl fmt::Debug for GoalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalContext")
            .field("goal_id", &self.goal_id)
            .field("action", &self.action)
            .finish()
    }
}

/// The running state of one action execution.
pub struct ActionInstance {
    goal: Goal,
    ctx: GoalContext,
    body: AbortHandle,
    handle: JoinHandle<()>,
}

impl ActionInstance {
    /// Start the action body for `goal` on a new task.
    ///
    /// `running` is reported before this returns. Must be called from within
    /// a Tokio runtime.
    pub fn spawn(action: Arc<dyn ActionCapability>, goal: Goal, status: Arc<dyn StatusStore>) -> Self {
        let ctx = GoalContext::new(goal.id.clone(), goal.name.clone(), status);
        ctx.report(ActionStatus::Running);

        let body_ctx = ctx.clone();
        let params = goal.params.clone();
        let body = tokio::spawn(async move { action.execute(&params, &body_ctx).await });
        let body_abort = body.abort_handle();

        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let outcome = match body.await {
                Ok(Ok(result)) if result.success => {
                    info!(action = %task_ctx.action(), goal_id = %task_ctx.goal_id(), message = %result.message, "Action succeeded");
                    ActionStatus::Success
                }
                Ok(Ok(result)) => {
                    warn!(action = %task_ctx.action(), goal_id = %task_ctx.goal_id(), message = %result.message, "Action failed");
                    ActionStatus::Failure
                }
                Ok(Err(e)) => {
                    warn!(action = %task_ctx.action(), goal_id = %task_ctx.goal_id(), error = %e, "Action failed");
                    ActionStatus::Failure
                }
                Err(e) if e.is_panic() => {
                    error!(action = %task_ctx.action(), goal_id = %task_ctx.goal_id(), "Action panicked");
                    ActionStatus::Failure
                }
                // Aborted by interrupt, which already reported.
                Err(_) => return,
            };
            task_ctx.report(outcome);
        });

        Self {
            goal,
            ctx,
            body: body_abort,
            handle,
        }
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn context(&self) -> &GoalContext {
        &self.ctx
    }

    /// Whether the action body has returned on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the action body. A still-live goal reports `failure`.
    pub fn interrupt(self) -> Goal {
        if self.ctx.interrupt() {
            info!(action = %self.goal.name, goal_id = %self.goal.id, "Action interrupted");
        }
        self.body.abort();
        self.handle.abort();
        self.goal
    }
}

impl fmt::Debug for ActionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionInstance")
            .field("goal", &self.goal)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::handler::{ActionResult, Wait};
    use crate::status::InMemoryStatusStore;
    use async_trait::async_trait;
    use pnp_core::{GoalFunction, Params};
    use std::time::Duration;

    struct Refuse;

    #[async_trait]
    impl ActionCapability for Refuse {
        fn name(&self) -> &str {
            "Refuse"
        }

        async fn execute(
            &self,
            _params: &Params,
            _ctx: &GoalContext,
        ) -> Result<ActionResult, ActionError> {
            Ok(ActionResult::failure("refused"))
        }
    }

    struct Crash;

    #[async_trait]
    impl ActionCapability for Crash {
        fn name(&self) -> &str {
            "Crash"
        }

        async fn execute(
            &self,
            _params: &Params,
            _ctx: &GoalContext,
        ) -> Result<ActionResult, ActionError> {
            panic!("sensor driver crashed");
        }
    }

    fn goal(name: &str, params: &str) -> Goal {
        Goal::new(GoalId::new(), name, Params::from_joined(params), GoalFunction::Start)
    }

    async fn wait_for_terminal(store: &InMemoryStatusStore, action: &str) -> ActionStatus {
        for _ in 0..200 {
            if let Some(status) = store.get(action).filter(ActionStatus::is_terminal) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} never reached a terminal status", action);
    }

    #[tokio::test]
    async fn test_spawn_reports_running_then_success() {
        let store = Arc::new(InMemoryStatusStore::new());
        let instance = ActionInstance::spawn(Arc::new(Wait), goal("Wait", "0.05"), store.clone());
        assert_eq!(store.get("Wait"), Some(ActionStatus::Running));
        assert_eq!(wait_for_terminal(&store, "Wait").await, ActionStatus::Success);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(instance.is_finished());
    }

    #[tokio::test]
    async fn test_unsuccessful_result_reports_failure() {
        let store = Arc::new(InMemoryStatusStore::new());
        let _instance = ActionInstance::spawn(Arc::new(Refuse), goal("Refuse", ""), store.clone());
        assert_eq!(wait_for_terminal(&store, "Refuse").await, ActionStatus::Failure);
    }

    #[tokio::test]
    async fn test_panicking_body_reports_failure() {
        let store = Arc::new(InMemoryStatusStore::new());
        let instance = ActionInstance::spawn(Arc::new(Crash), goal("Crash", ""), store.clone());
        assert_eq!(wait_for_terminal(&store, "Crash").await, ActionStatus::Failure);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(instance.is_finished());
    }

    #[tokio::test]
    async fn test_invalid_wait_reports_failure() {
        let store = Arc::new(InMemoryStatusStore::new());
        let _instance = ActionInstance::spawn(Arc::new(Wait), goal("Wait", "1e30"), store.clone());
        assert_eq!(wait_for_terminal(&store, "Wait").await, ActionStatus::Failure);
    }

    #[tokio::test]
    async fn test_interrupt_reports_failure_and_sticks() {
        let store = Arc::new(InMemoryStatusStore::new());
        let instance = ActionInstance::spawn(Arc::new(Wait), goal("Wait", "0.05"), store.clone());
        let ctx = instance.context().clone();
        let goal = instance.interrupt();
        assert_eq!(goal.name, "Wait");
        assert!(ctx.is_interrupted());
        assert_eq!(store.get("Wait"), Some(ActionStatus::Failure));

        // The aborted body never overwrites the interrupt outcome.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.get("Wait"), Some(ActionStatus::Failure));
        assert!(!ctx.report(ActionStatus::Success));
    }

    #[tokio::test]
    async fn test_interrupt_after_finish_keeps_outcome() {
        let store = Arc::new(InMemoryStatusStore::new());
        let instance = ActionInstance::spawn(Arc::new(Wait), goal("Wait", "0"), store.clone());
        assert_eq!(wait_for_terminal(&store, "Wait").await, ActionStatus::Success);
        instance.interrupt();
        assert_eq!(store.get("Wait"), Some(ActionStatus::Success));
    }
}
