use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PnpError;

/// Separator between an action name and its parameters, and between parameters.
pub const PARAM_SEPARATOR: char = '_';

// =============================================================================
// Enums
// =============================================================================

/// What a goal asks the action server to do with an action instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalFunction {
    Start,
    Interrupt,
    End,
}

impl fmt::Display for GoalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalFunction::Start => write!(f, "start"),
            GoalFunction::Interrupt => write!(f, "interrupt"),
            GoalFunction::End => write!(f, "end"),
        }
    }
}

impl FromStr for GoalFunction {
    type Err = PnpError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(GoalFunction::Start),
            "interrupt" => Ok(GoalFunction::Interrupt),
            "end" => Ok(GoalFunction::End),
            _ => Err(PnpError::Parse(format!("Unknown goal function: {}", s))),
        }
    }
}

/// Externally observed status of an action, stored under `status:<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    NotStarted,
    Started,
    Running,
    Success,
    Failure,
    /// No registered action matches the requested name.
    NotImplemented,
}

impl ActionStatus {
    /// Whether the action has reached an outcome on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Success | ActionStatus::Failure | ActionStatus::NotImplemented
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::NotStarted => write!(f, "not-started"),
            ActionStatus::Started => write!(f, "started"),
            ActionStatus::Running => write!(f, "running"),
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Failure => write!(f, "failure"),
            ActionStatus::NotImplemented => write!(f, "not-implemented"),
        }
    }
}

impl FromStr for ActionStatus {
    type Err = PnpError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(ActionStatus::NotStarted),
            "started" => Ok(ActionStatus::Started),
            "running" => Ok(ActionStatus::Running),
            "success" => Ok(ActionStatus::Success),
            "failure" => Ok(ActionStatus::Failure),
            "not-implemented" => Ok(ActionStatus::NotImplemented),
            _ => Err(PnpError::Parse(format!("Unknown action status: {}", s))),
        }
    }
}

/// Command sent toward the transport boundary for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCommand {
    Start,
    Interrupt,
    End,
    Success,
    Failure,
}

impl ActionCommand {
    /// The end-class command matching an observed terminal status.
    pub fn for_outcome(status: ActionStatus) -> ActionCommand {
        match status {
            ActionStatus::Success => ActionCommand::Success,
            ActionStatus::Failure => ActionCommand::Failure,
            _ => ActionCommand::End,
        }
    }

    /// The goal function the action server applies for this command.
    pub fn goal_function(&self) -> GoalFunction {
        match self {
            ActionCommand::Start => GoalFunction::Start,
            ActionCommand::Interrupt => GoalFunction::Interrupt,
            ActionCommand::End | ActionCommand::Success | ActionCommand::Failure => {
                GoalFunction::End
            }
        }
    }
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCommand::Start => write!(f, "start"),
            ActionCommand::Interrupt => write!(f, "interrupt"),
            ActionCommand::End => write!(f, "end"),
            ActionCommand::Success => write!(f, "success"),
            ActionCommand::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for ActionCommand {
    type Err = PnpError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ActionCommand::Start),
            "interrupt" => Ok(ActionCommand::Interrupt),
            "end" => Ok(ActionCommand::End),
            "success" => Ok(ActionCommand::Success),
            "failure" => Ok(ActionCommand::Failure),
            _ => Err(PnpError::Parse(format!("Unknown action command: {}", s))),
        }
    }
}

// =============================================================================
// Value Objects
// =============================================================================

/// Unix timestamp in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

/// Opaque goal identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub String);

impl GoalId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GoalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ordered action or condition parameters.
///
/// On the wire parameters travel as a single `_`-joined string; an empty
/// string means no parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Params(pub Vec<String>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Split a `_`-joined parameter string.
    pub fn from_joined(joined: &str) -> Self {
        if joined.is_empty() {
            return Self::new();
        }
        Self(joined.split(PARAM_SEPARATOR).map(str::to_string).collect())
    }

    pub fn joined(&self) -> String {
        self.0.join("_")
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl<S: Into<String>> FromIterator<S> for Params {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Split `Name_p1_p2` at the first separator into a name and its parameters.
pub fn split_name_params(expr: &str) -> (String, Params) {
    let expr = expr.trim();
    match expr.find(PARAM_SEPARATOR) {
        Some(pos) => (expr[..pos].to_string(), Params::from_joined(&expr[pos + 1..])),
        None => (expr.to_string(), Params::new()),
    }
}

/// One request to start, interrupt or end an action instance.
///
/// Produced by the upstream interpreter; immutable once received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub name: String,
    pub params: Params,
    pub function: GoalFunction,
}

impl Goal {
    pub fn new(id: GoalId, name: impl Into<String>, params: Params, function: GoalFunction) -> Self {
        Self {
            id,
            name: name.into(),
            params,
            function,
        }
    }
}

/// A command line in its wire form: `<action>[_<params>] <cmd>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub action: String,
    pub params: Params,
    pub command: ActionCommand,
}

impl CommandLine {
    pub fn new(action: impl Into<String>, params: Params, command: ActionCommand) -> Self {
        Self {
            action: action.into(),
            params,
            command,
        }
    }

    /// Encode to the wire form. Empty params drop the separator.
    pub fn encode(&self) -> String {
        if self.params.is_empty() {
            format!("{} {}", self.action, self.command)
        } else {
            format!("{}_{} {}", self.action, self.params, self.command)
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for CommandLine {
    type Err = PnpError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, cmd) = s
            .rsplit_once(' ')
            .ok_or_else(|| PnpError::Parse(format!("Missing command in: {:?}", s)))?;
        let command: ActionCommand = cmd.trim().parse()?;
        let (action, params) = split_name_params(head);
        if action.is_empty() {
            return Err(PnpError::Parse(format!("Missing action name in: {:?}", s)));
        }
        Ok(Self {
            action,
            params,
            command,
        })
    }
}

/// Cached value of a condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ConditionValue {
    /// Truth reading of the value: `false`, `0` and empty text are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            ConditionValue::Bool(b) => *b,
            ConditionValue::Number(n) => *n != 0.0,
            ConditionValue::Text(t) => !t.is_empty() && t != "false",
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Bool(b) => write!(f, "{}", b),
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<bool> for ConditionValue {
    fn from(b: bool) -> Self {
        ConditionValue::Bool(b)
    }
}

impl From<f64> for ConditionValue {
    fn from(n: f64) -> Self {
        ConditionValue::Number(n)
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        ConditionValue::Text(s.to_string())
    }
}
