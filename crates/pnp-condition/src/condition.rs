//! Condition capability contract.
//!
//! A condition is a named boolean (or valued) predicate over world state.
//! Conditions backed by a push source keep a cached value and notify
//! listeners when it changes; polled conditions answer on demand and carry
//! no value.

use std::fmt;
use std::sync::Arc;

use pnp_core::ConditionValue;

use crate::error::ConditionError;

/// Capability every registered condition provides.
pub trait ConditionCapability: Send + Sync {
    /// Registry name of the condition.
    fn name(&self) -> &str;

    /// Evaluate the condition for the given parameters.
    fn evaluate(&self, params: &[String]) -> bool;

    /// Current cached value, if the condition keeps one.
    fn value(&self) -> Option<ConditionValue>;

    /// Whether the condition publishes value changes to listeners.
    fn accepts_listeners(&self) -> bool {
        false
    }

    /// Attach a listener to this condition's update fan-out.
    fn register_listener(&self, listener: Arc<dyn ConditionListener>) -> Result<(), ConditionError> {
        drop(listener);
        Err(ConditionError::ListenerRejected(self.name().to_string()))
    }
}

/// Receives a condition after its cached value changed.
pub trait ConditionListener: Send + Sync {
    fn receive_update(&self, condition: &dyn ConditionCapability);
}

impl<F> ConditionListener for F
where
    F: Fn(&dyn ConditionCapability) + Send + Sync,
{
    fn receive_update(&self, condition: &dyn ConditionCapability) {
        self(condition)
    }
}

/// Predicate answering a polled condition.
pub type PollFn = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// A condition answered by a request/response query each time it is evaluated.
///
/// It has no cached value and no push source, so it rejects listeners.
pub struct PolledCondition {
    name: String,
    query: PollFn,
}

impl PolledCondition {
    pub fn new(name: impl Into<String>, query: PollFn) -> Self {
        Self {
            name: name.into(),
            query,
        }
    }
}

impl fmt::Debug for PolledCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolledCondition")
            .field("name", &self.name)
            .finish()
    }
}

impl ConditionCapability for PolledCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, params: &[String]) -> bool {
        (self.query)(params)
    }

    fn value(&self) -> Option<ConditionValue> {
        None
    }
}
