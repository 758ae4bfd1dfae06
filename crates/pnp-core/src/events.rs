use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Goal, GoalId, Timestamp};

/// Sending half of the execution event channel.
pub type EventSender = broadcast::Sender<ExecutionEvent>;

/// Create the broadcast channel that carries execution events.
///
/// The receiver is dropped; consumers call `subscribe()` on the sender.
pub fn event_channel(capacity: usize) -> EventSender {
    let (tx, _) = broadcast::channel(capacity.max(1));
    tx
}

/// Events emitted while goals, conditions and commands flow through the system.
///
/// Consumed by the binary's event log and by tests observing fan-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ExecutionEvent {
    /// An action instance was created and started for a goal.
    GoalStarted {
        goal_id: GoalId,
        action: String,
        timestamp: Timestamp,
    },

    /// A start was short-circuited because the goal was already reached.
    GoalAlreadyReached {
        goal_id: GoalId,
        action: String,
        timestamp: Timestamp,
    },

    /// A running instance was interrupted and removed.
    GoalInterrupted { goal: Goal, timestamp: Timestamp },

    /// A finished instance was removed from the instance table.
    GoalEnded {
        goal_id: GoalId,
        action: String,
        timestamp: Timestamp,
    },

    /// No registered action matches the requested name.
    ActionNotImplemented { action: String, timestamp: Timestamp },

    /// A pushed condition changed its cached value. `line` is `name_value`.
    ConditionChanged {
        condition: String,
        line: String,
        timestamp: Timestamp,
    },

    /// A command line was sent toward the transport boundary.
    CommandIssued { line: String, timestamp: Timestamp },

    /// An interrupt trigger fired for a running action.
    RecoveryTriggered {
        action: String,
        trigger: String,
        recovery: String,
        timestamp: Timestamp,
    },

    /// The plan was terminated by a `fail_plan` recovery.
    PlanFailed { action: String, timestamp: Timestamp },
}

impl ExecutionEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ExecutionEvent::GoalStarted { timestamp, .. }
            | ExecutionEvent::GoalAlreadyReached { timestamp, .. }
            | ExecutionEvent::GoalInterrupted { timestamp, .. }
            | ExecutionEvent::GoalEnded { timestamp, .. }
            | ExecutionEvent::ActionNotImplemented { timestamp, .. }
            | ExecutionEvent::ConditionChanged { timestamp, .. }
            | ExecutionEvent::CommandIssued { timestamp, .. }
            | ExecutionEvent::RecoveryTriggered { timestamp, .. }
            | ExecutionEvent::PlanFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ExecutionEvent::GoalStarted { .. } => "goal_started",
            ExecutionEvent::GoalAlreadyReached { .. } => "goal_already_reached",
            ExecutionEvent::GoalInterrupted { .. } => "goal_interrupted",
            ExecutionEvent::GoalEnded { .. } => "goal_ended",
            ExecutionEvent::ActionNotImplemented { .. } => "action_not_implemented",
            ExecutionEvent::ConditionChanged { .. } => "condition_changed",
            ExecutionEvent::CommandIssued { .. } => "command_issued",
            ExecutionEvent::RecoveryTriggered { .. } => "recovery_triggered",
            ExecutionEvent::PlanFailed { .. } => "plan_failed",
        }
    }
}
