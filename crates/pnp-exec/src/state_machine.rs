//! Per-action slot state machine.
//!
//! Valid transitions:
//! - Idle -> Started
//! - Started -> Running
//! - Started -> Succeeded / Failed (finished before it was seen running)
//! - Running -> Succeeded / Failed / Interrupted
//! - Interrupted -> Started (restart)
//! - Succeeded / Failed / Interrupted -> Idle

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    Idle,
    Started,
    Running,
    Succeeded,
    Failed,
    Interrupted,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Idle => write!(f, "idle"),
            SlotState::Started => write!(f, "started"),
            SlotState::Running => write!(f, "running"),
            SlotState::Succeeded => write!(f, "succeeded"),
            SlotState::Failed => write!(f, "failed"),
            SlotState::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl SlotState {
    pub fn can_transition_to(&self, target: &SlotState) -> bool {
        matches!(
            (self, target),
            (SlotState::Idle, SlotState::Started)
                | (SlotState::Started, SlotState::Running)
                | (SlotState::Started, SlotState::Succeeded)
                | (SlotState::Started, SlotState::Failed)
                | (SlotState::Running, SlotState::Succeeded)
                | (SlotState::Running, SlotState::Failed)
                | (SlotState::Running, SlotState::Interrupted)
                | (SlotState::Interrupted, SlotState::Started)
                | (SlotState::Succeeded, SlotState::Idle)
                | (SlotState::Failed, SlotState::Idle)
                | (SlotState::Interrupted, SlotState::Idle)
        )
    }
}

/// Slot state for every action name the controller has driven.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: Mutex<HashMap<String, SlotState>>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; actions never driven are `Idle`.
    pub fn get(&self, action: &str) -> SlotState {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action)
            .copied()
            .unwrap_or(SlotState::Idle)
    }

    /// Apply a validated transition.
    pub fn transition(&self, action: &str, to: SlotState) -> Result<(), ExecError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let from = slots.get(action).copied().unwrap_or(SlotState::Idle);
        if !from.can_transition_to(&to) {
            return Err(ExecError::InvalidTransition {
                action: action.to_string(),
                from,
                to,
            });
        }
        slots.insert(action.to_string(), to);
        Ok(())
    }

    /// Force the slot back to `Idle` after an aborted run.
    pub fn reset(&self, action: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(action);
    }
}
