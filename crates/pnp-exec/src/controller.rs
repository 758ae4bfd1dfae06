//! Execution controller.
//!
//! `execute` drives one action through start, monitoring and completion.
//! While the action runs, its rules are checked on every polling tick; when
//! a trigger fires the action is interrupted and the trigger's recovery is
//! resolved one level deeper. Recovery may restart the action in place,
//! hand a plan-level directive back to the caller, terminate the plan, or
//! run compensating actions through this same controller.
//!
//! Waits poll the status store at a fixed cadence and have no timeout of
//! their own: an action that never leaves `running` keeps the controller
//! waiting until a trigger fires or the plan is cancelled.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pnp_action::StatusStore;
use pnp_condition::ConditionRegistry;
use pnp_core::config::ExecutorConfig;
use pnp_core::{ActionCommand, ActionStatus, EventSender, ExecutionEvent, Params, Timestamp};
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::debug::DispatchGate;
use crate::dispatcher::CommandDispatcher;
use crate::error::ExecError;
use crate::rules::{Recovery, RecoveryDirective, RecoveryStep, RuleTable, Trigger};
use crate::state_machine::{SlotState, SlotTable};

/// Truth queries for condition triggers.
pub trait ConditionQuery: Send + Sync {
    /// Whether a `Name[_params]` expression holds.
    fn holds(&self, expr: &str) -> bool;
}

impl ConditionQuery for ConditionRegistry {
    fn holds(&self, expr: &str) -> bool {
        self.evaluate_expression(expr)
    }
}

/// How one `execute` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    Failure,
    NotImplemented,
    /// Vetoed by the debug policy; nothing was dispatched.
    Disabled,
    /// Recovery asked the caller to skip this action.
    Skipped,
    /// Recovery asked the caller to restart the plan.
    RestartPlan,
    /// Recovery terminated the plan.
    PlanFailed,
    /// A trigger fired and recovery resolved to no directive.
    Interrupted,
}

impl ExecOutcome {
    /// Whether the outcome should fail the owning process.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExecOutcome::Failure | ExecOutcome::NotImplemented | ExecOutcome::PlanFailed
        )
    }
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Success => write!(f, "success"),
            ExecOutcome::Failure => write!(f, "failure"),
            ExecOutcome::NotImplemented => write!(f, "not-implemented"),
            ExecOutcome::Disabled => write!(f, "disabled"),
            ExecOutcome::Skipped => write!(f, "skip_action"),
            ExecOutcome::RestartPlan => write!(f, "restart_plan"),
            ExecOutcome::PlanFailed => write!(f, "fail_plan"),
            ExecOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Collaborators the controller works against.
#[derive(Clone)]
pub struct ExecContext {
    pub rules: Arc<RuleTable>,
    pub conditions: Arc<dyn ConditionQuery>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub status: Arc<dyn StatusStore>,
    pub gate: Arc<dyn DispatchGate>,
    pub events: EventSender,
}

enum Monitor {
    /// The status left `running` on its own.
    Finished(ActionStatus),
    /// A trigger fired while the action was running.
    Fired(Trigger, Recovery),
}

type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<ExecOutcome, ExecError>> + Send + 'a>>;

pub struct ExecutionController {
    ctx: ExecContext,
    slots: SlotTable,
    poll_interval: Duration,
    terminate_grace: Duration,
    cancel: watch::Sender<bool>,
}

impl ExecutionController {
    pub fn new(ctx: ExecContext, config: &ExecutorConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            ctx,
            slots: SlotTable::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            terminate_grace: Duration::from_millis(config.terminate_grace_ms),
            cancel,
        }
    }

    pub fn rules(&self) -> &Arc<RuleTable> {
        &self.ctx.rules
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.ctx.dispatcher
    }

    pub fn slot(&self, action: &str) -> SlotState {
        self.slots.get(action)
    }

    /// Stop the plan: every pending or later wait returns `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Clear a previous cancellation so a new plan can run.
    pub fn reset(&self) {
        self.cancel.send_replace(false);
    }

    /// Run `action` to an outcome, optionally registering one more rule for it.
    pub async fn execute(
        &self,
        action: &str,
        params: &Params,
        rule: Option<(Trigger, Recovery)>,
    ) -> Result<ExecOutcome, ExecError> {
        self.execute_at(action, params, rule, 0).await
    }

    fn execute_at<'a>(
        &'a self,
        action: &'a str,
        params: &'a Params,
        rule: Option<(Trigger, Recovery)>,
        depth: usize,
    ) -> ExecFuture<'a> {
        let span = info_span!("execute", action = %action, depth);
        Box::pin(
            async move {
                if self.is_cancelled() {
                    return Err(ExecError::Cancelled);
                }
                if self.ctx.gate.is_disabled(action) {
                    return Ok(ExecOutcome::Disabled);
                }
                if let Some((trigger, recovery)) = rule {
                    self.ctx.rules.add(action, trigger, recovery);
                }

                info!(params = %params, "Exec");
                match self.drive(action, params, depth).await {
                    Ok(outcome) => {
                        self.advance(action, SlotState::Idle);
                        info!(outcome = %outcome, "Exec finished");
                        Ok(outcome)
                    }
                    // The live run that caused the rejection owns the slot.
                    Err(e @ ExecError::DuplicateStart(_)) => Err(e),
                    Err(e) => {
                        self.slots.reset(action);
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }

    /// The start / monitor / recover loop.
    async fn drive(&self, action: &str, params: &Params, depth: usize) -> Result<ExecOutcome, ExecError> {
        loop {
            self.ctx.dispatcher.issue(action, params, ActionCommand::Start)?;
            self.advance(action, SlotState::Started);
            self.wait_while(action, |s| s == Some(ActionStatus::Started)).await?;

            match self.monitor(action).await? {
                Monitor::Finished(status) => {
                    debug!(status = %status, "Action left running");
                    self.ctx
                        .dispatcher
                        .issue(action, params, ActionCommand::for_outcome(status))?;
                    return Ok(match status {
                        ActionStatus::Success => {
                            self.advance(action, SlotState::Succeeded);
                            ExecOutcome::Success
                        }
                        ActionStatus::NotImplemented => {
                            self.advance(action, SlotState::Failed);
                            ExecOutcome::NotImplemented
                        }
                        _ => {
                            self.advance(action, SlotState::Failed);
                            ExecOutcome::Failure
                        }
                    });
                }
                Monitor::Fired(trigger, recovery) => {
                    warn!(trigger = %trigger, recovery = %recovery, "Interrupt condition fired");
                    let _ = self.ctx.events.send(ExecutionEvent::RecoveryTriggered {
                        action: action.to_string(),
                        trigger: trigger.to_string(),
                        recovery: recovery.to_string(),
                        timestamp: Timestamp::now(),
                    });
                    self.ctx
                        .dispatcher
                        .issue(action, params, ActionCommand::Interrupt)?;
                    self.advance(action, SlotState::Interrupted);
                    self.wait_while(action, |s| s == Some(ActionStatus::Running)).await?;

                    match self.resolve_recovery(&recovery, depth + 1).await? {
                        Some(RecoveryDirective::RestartAction) => {
                            info!("Restarting action");
                        }
                        Some(RecoveryDirective::FailPlan) => {
                            self.terminate_plan(action).await;
                            return Ok(ExecOutcome::PlanFailed);
                        }
                        Some(RecoveryDirective::SkipAction) => return Ok(ExecOutcome::Skipped),
                        Some(RecoveryDirective::RestartPlan) => return Ok(ExecOutcome::RestartPlan),
                        None => {
                            // Compensating steps ran; the original action is
                            // neither restarted nor re-checked.
                            error!(
                                recovery = %recovery,
                                "Recovery resolved to no directive; stopping the current action and continuing with the plan"
                            );
                            return Ok(ExecOutcome::Interrupted);
                        }
                    }
                }
            }
        }
    }

    /// Poll while the action is running, checking its triggers each tick.
    async fn monitor(&self, action: &str) -> Result<Monitor, ExecError> {
        let mut ticker = self.ticker();
        let mut cancel = self.cancel.subscribe();
        let mut seen_running = false;
        loop {
            let status = self.ctx.status.get(action);
            if status != Some(ActionStatus::Running) {
                return Ok(Monitor::Finished(status.unwrap_or(ActionStatus::NotStarted)));
            }
            if !seen_running {
                self.advance(action, SlotState::Running);
                seen_running = true;
            }
            if let Some((trigger, recovery)) = self.first_firing(action) {
                return Ok(Monitor::Fired(trigger, recovery));
            }
            self.tick(&mut ticker, &mut cancel).await?;
        }
    }

    /// First rule for `action` whose trigger fires now.
    fn first_firing(&self, action: &str) -> Option<(Trigger, Recovery)> {
        let elapsed = self.ctx.dispatcher.elapsed(action);
        self.ctx.rules.first_firing(action, |trigger| match trigger {
            Trigger::Timeout(limit) => elapsed.is_some_and(|e| e > *limit),
            Trigger::Condition(expr) => self.ctx.conditions.holds(expr),
        })
    }

    /// Resolve recovery steps in order.
    ///
    /// Compensating actions run to completion and their outcome is ignored.
    /// The first directive ends resolution; unknown tokens are logged and
    /// skipped.
    async fn resolve_recovery(
        &self,
        recovery: &Recovery,
        depth: usize,
    ) -> Result<Option<RecoveryDirective>, ExecError> {
        for step in recovery.steps() {
            info!(depth, step = %step, "-- recovery");
            match step {
                RecoveryStep::Directive(directive) => return Ok(Some(*directive)),
                RecoveryStep::Action { name, params } => {
                    match self.execute_at(name, params, None, depth).await {
                        Ok(outcome) => debug!(action = %name, outcome = %outcome, "Recovery action finished"),
                        Err(ExecError::Cancelled) => return Err(ExecError::Cancelled),
                        Err(e) => error!(action = %name, error = %e, "Recovery action failed"),
                    }
                    if self.is_cancelled() {
                        return Err(ExecError::Cancelled);
                    }
                }
                RecoveryStep::Unknown(token) => {
                    let e = ExecError::UnknownRecovery(token.clone());
                    error!(error = %e, "Recovery step skipped");
                }
            }
        }
        Ok(None)
    }

    /// Interrupt every live action, give them the grace period, then cancel.
    async fn terminate_plan(&self, action: &str) {
        error!(action = %action, "Plan failed, terminating");
        let interrupted = self.ctx.dispatcher.interrupt_all();
        debug!(interrupted, "Live actions interrupted");
        tokio::time::sleep(self.terminate_grace).await;
        let _ = self.ctx.events.send(ExecutionEvent::PlanFailed {
            action: action.to_string(),
            timestamp: Timestamp::now(),
        });
        self.cancel();
    }

    async fn wait_while<F>(&self, action: &str, pred: F) -> Result<Option<ActionStatus>, ExecError>
    where
        F: Fn(Option<ActionStatus>) -> bool,
    {
        let mut ticker = self.ticker();
        let mut cancel = self.cancel.subscribe();
        loop {
            let status = self.ctx.status.get(action);
            if !pred(status) {
                return Ok(status);
            }
            self.tick(&mut ticker, &mut cancel).await?;
        }
    }

    fn ticker(&self) -> Interval {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn tick(&self, ticker: &mut Interval, cancel: &mut watch::Receiver<bool>) -> Result<(), ExecError> {
        if *cancel.borrow() {
            return Err(ExecError::Cancelled);
        }
        tokio::select! {
            _ = ticker.tick() => Ok(()),
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    Err(ExecError::Cancelled)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn advance(&self, action: &str, to: SlotState) {
        if let Err(e) = self.slots.transition(action, to) {
            warn!(error = %e, "Slot transition rejected");
        }
    }
}
