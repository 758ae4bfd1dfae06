//! Action execution and recovery controller.
//!
//! Drives one action at a time through start, monitoring and completion,
//! watches the interrupt triggers registered for it, and resolves the
//! recovery attached to the first trigger that fires.

pub mod controller;
pub mod debug;
pub mod dispatcher;
pub mod error;
pub mod rules;
pub mod state_machine;

pub use controller::{ConditionQuery, ExecContext, ExecOutcome, ExecutionController};
pub use debug::{AllowAll, DebugPolicy, DispatchGate, FileDebugPolicy};
pub use dispatcher::{CommandDispatcher, CommandSink, RunRecord};
pub use error::ExecError;
pub use rules::{ExecutionRule, Recovery, RecoveryDirective, RecoveryStep, RuleTable, Trigger};
pub use state_machine::{SlotState, SlotTable};
