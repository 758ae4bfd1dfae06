//! Execution rules: interrupt triggers paired with recoveries.
//!
//! Rules accumulate per action name in registration order. When several
//! triggers would fire on the same tick, the first registered one wins and
//! the rest are not evaluated.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use pnp_core::{split_name_params, Params};

use crate::error::ExecError;

const TIMEOUT_PREFIX: &str = "timeout";

/// What interrupts a running action.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fires once the action has run longer than the duration.
    Timeout(Duration),
    /// Fires when the condition expression (`Name[_params]`) holds.
    Condition(String),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Timeout(limit) => write!(f, "timeout_{}", limit.as_secs_f64()),
            Trigger::Condition(expr) => f.write_str(expr),
        }
    }
}

impl FromStr for Trigger {
    type Err = ExecError;

    /// `timeout_<seconds>` (prefix matched case-insensitively) or a
    /// condition expression.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ExecError::InvalidTrigger(s.to_string()));
        }
        let is_timeout = s
            .get(..TIMEOUT_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(TIMEOUT_PREFIX));
        if !is_timeout {
            return Ok(Trigger::Condition(s.to_string()));
        }
        let limit = s
            .split('_')
            .nth(1)
            .and_then(|v| v.parse::<f64>().ok())
            .and_then(|v| Duration::try_from_secs_f64(v).ok())
            .ok_or_else(|| ExecError::InvalidTrigger(s.to_string()))?;
        Ok(Trigger::Timeout(limit))
    }
}

/// Plan-level control directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryDirective {
    RestartAction,
    SkipAction,
    RestartPlan,
    FailPlan,
}

impl fmt::Display for RecoveryDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryDirective::RestartAction => write!(f, "restart_action"),
            RecoveryDirective::SkipAction => write!(f, "skip_action"),
            RecoveryDirective::RestartPlan => write!(f, "restart_plan"),
            RecoveryDirective::FailPlan => write!(f, "fail_plan"),
        }
    }
}

impl FromStr for RecoveryDirective {
    type Err = ExecError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "restart_action" => Ok(RecoveryDirective::RestartAction),
            "skip_action" => Ok(RecoveryDirective::SkipAction),
            "restart_plan" => Ok(RecoveryDirective::RestartPlan),
            "fail_plan" => Ok(RecoveryDirective::FailPlan),
            other => Err(ExecError::UnknownRecovery(other.to_string())),
        }
    }
}

/// One `;`-separated step of a recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStep {
    Directive(RecoveryDirective),
    /// A compensating action run synchronously to completion.
    Action { name: String, params: Params },
    /// A lowercase token that names no directive.
    Unknown(String),
}

impl RecoveryStep {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Ok(directive) = token.parse::<RecoveryDirective>() {
            return Some(RecoveryStep::Directive(directive));
        }
        if token.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Some(RecoveryStep::Unknown(token.to_string()));
        }
        let (name, params) = split_name_params(token);
        Some(RecoveryStep::Action { name, params })
    }
}

impl fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStep::Directive(d) => write!(f, "{}", d),
            RecoveryStep::Action { name, params } if params.is_empty() => f.write_str(name),
            RecoveryStep::Action { name, params } => write!(f, "{}_{}", name, params),
            RecoveryStep::Unknown(token) => f.write_str(token),
        }
    }
}

/// Ordered recovery steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recovery(Vec<RecoveryStep>);

impl Recovery {
    /// Parse a `;`-separated recovery string. Empty steps are dropped.
    pub fn parse(s: &str) -> Self {
        Self(s.split(';').filter_map(RecoveryStep::parse).collect())
    }

    pub fn steps(&self) -> &[RecoveryStep] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<RecoveryDirective> for Recovery {
    fn from(directive: RecoveryDirective) -> Self {
        Self(vec![RecoveryStep::Directive(directive)])
    }
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&steps.join(";"))
    }
}

/// A trigger and recovery bound to an action name.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRule {
    pub action: String,
    pub trigger: Trigger,
    pub recovery: Recovery,
}

impl ExecutionRule {
    pub fn parse(action: &str, trigger: &str, recovery: &str) -> Result<Self, ExecError> {
        Ok(Self {
            action: action.to_string(),
            trigger: trigger.parse()?,
            recovery: Recovery::parse(recovery),
        })
    }
}

/// Per-action ordered rule lists.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: RwLock<HashMap<String, Vec<(Trigger, Recovery)>>>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Registering the same pair again adds another entry.
    pub fn add(&self, action: &str, trigger: Trigger, recovery: Recovery) {
        tracing::debug!(action = %action, trigger = %trigger, recovery = %recovery, "Rule added");
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(action.to_string())
            .or_default()
            .push((trigger, recovery));
    }

    pub fn add_rule(&self, rule: ExecutionRule) {
        self.add(&rule.action, rule.trigger, rule.recovery);
    }

    /// Rules for `action` in registration order.
    pub fn rules_for(&self, action: &str) -> Vec<(Trigger, Recovery)> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action)
            .cloned()
            .unwrap_or_default()
    }

    /// The first rule whose trigger fires, in registration order.
    ///
    /// `fires` is not called for rules after the first match. The table lock
    /// is not held while `fires` runs.
    pub fn first_firing<F>(&self, action: &str, mut fires: F) -> Option<(Trigger, Recovery)>
    where
        F: FnMut(&Trigger) -> bool,
    {
        self.rules_for(action)
            .into_iter()
            .find(|(trigger, _)| fires(trigger))
    }

    pub fn len(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
