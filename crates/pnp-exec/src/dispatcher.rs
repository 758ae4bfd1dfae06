//! Command dispatch toward the transport boundary.
//!
//! Tracks one `RunRecord` per action name between its `start` and the next
//! `interrupt` or end-class command. Starting a name that already has a
//! record is rejected: the elapsed-time timeout and later command routing
//! both key on the name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use pnp_action::{ActionServer, StatusStore};
use pnp_core::{ActionCommand, ActionStatus, CommandLine, EventSender, ExecutionEvent, Params, Timestamp};
use tracing::{error, info, warn};

use crate::error::ExecError;

/// Destination of encoded command lines.
pub trait CommandSink: Send + Sync {
    fn send(&self, line: &CommandLine) -> Result<(), ExecError>;
}

/// In-process transport: commands go straight to the action server.
///
/// Action-level rejections are logged here; they surface to the controller
/// through the status store, not as transport failures.
impl CommandSink for ActionServer {
    fn send(&self, line: &CommandLine) -> Result<(), ExecError> {
        if let Err(e) = self.handle_command(line) {
            warn!(line = %line, error = %e, "Command rejected by action server");
        }
        Ok(())
    }
}

/// One currently dispatched action.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub action: String,
    pub params: Params,
    pub started: Instant,
    pub started_at: Timestamp,
}

impl RunRecord {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

pub struct CommandDispatcher {
    sink: Arc<dyn CommandSink>,
    status: Arc<dyn StatusStore>,
    runs: Mutex<HashMap<String, RunRecord>>,
    events: EventSender,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn CommandSink>, status: Arc<dyn StatusStore>, events: EventSender) -> Self {
        Self {
            sink,
            status,
            runs: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Send one command for `action`.
    ///
    /// `start` records a run and sets the status to `started` before the line
    /// is sent; every other command closes the run.
    pub fn issue(&self, action: &str, params: &Params, command: ActionCommand) -> Result<(), ExecError> {
        let line = CommandLine::new(action, params.clone(), command);
        if command == ActionCommand::Start {
            let mut runs = self.lock_runs();
            if runs.contains_key(action) {
                error!(action = %action, "Action is already running, start rejected");
                return Err(ExecError::DuplicateStart(action.to_string()));
            }
            runs.insert(
                action.to_string(),
                RunRecord {
                    action: action.to_string(),
                    params: params.clone(),
                    started: Instant::now(),
                    started_at: Timestamp::now(),
                },
            );
            drop(runs);
            self.status.set(action, ActionStatus::Started);
        } else {
            self.lock_runs().remove(action);
        }

        info!(line = %line, "Command");
        let _ = self.events.send(ExecutionEvent::CommandIssued {
            line: line.encode(),
            timestamp: Timestamp::now(),
        });
        let sent = self.sink.send(&line);
        if sent.is_err() && command == ActionCommand::Start {
            self.lock_runs().remove(action);
        }
        sent
    }

    /// Time since the live run of `action` started.
    pub fn elapsed(&self, action: &str) -> Option<Duration> {
        self.lock_runs().get(action).map(RunRecord::elapsed)
    }

    pub fn start_time(&self, action: &str) -> Option<Timestamp> {
        self.lock_runs().get(action).map(|r| r.started_at)
    }

    pub fn is_running(&self, action: &str) -> bool {
        self.lock_runs().contains_key(action)
    }

    pub fn live_runs(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.lock_runs().values().cloned().collect();
        runs.sort_by_key(|r| r.started);
        runs
    }

    /// Interrupt every live run. Returns how many were interrupted.
    pub fn interrupt_all(&self) -> usize {
        let runs = self.live_runs();
        for run in &runs {
            info!(action = %run.action, "Terminating action");
            if let Err(e) = self.issue(&run.action, &run.params, ActionCommand::Interrupt) {
                warn!(action = %run.action, error = %e, "Interrupt failed");
            }
        }
        runs.len()
    }

    fn lock_runs(&self) -> MutexGuard<'_, HashMap<String, RunRecord>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
