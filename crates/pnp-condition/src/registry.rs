//! Registry of named conditions.
//!
//! Evaluation of an unknown condition is fail-open (`true`) so that plans
//! referencing conditions that are not implemented yet do not block on a
//! gate that can never open. The registry registers its own change feed on
//! every pushed condition and republishes each change as a `name_value` line
//! on the execution event channel.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use pnp_core::config::ConditionsConfig;
use pnp_core::{split_name_params, ConditionValue, EventSender, ExecutionEvent, Timestamp};
use tracing::{debug, info, warn};

use crate::condition::{ConditionCapability, ConditionListener};
use crate::error::ConditionError;
use crate::topic::TopicCondition;

/// Text used on the wire for a condition without a value.
pub const NO_VALUE: &str = "None";

fn value_text(value: Option<ConditionValue>) -> String {
    value.map_or_else(|| NO_VALUE.to_string(), |v| v.to_string())
}

/// Listener that republishes condition changes on the event channel.
struct ChangeFeed {
    events: EventSender,
}

impl ConditionListener for ChangeFeed {
    fn receive_update(&self, condition: &dyn ConditionCapability) {
        let line = format!("{}_{}", condition.name(), value_text(condition.value()));
        debug!(line = %line, "Condition update");
        // No subscribers is not an error.
        let _ = self.events.send(ExecutionEvent::ConditionChanged {
            condition: condition.name().to_string(),
            line,
            timestamp: Timestamp::now(),
        });
    }
}

/// Holds named conditions and answers evaluation and value queries.
pub struct ConditionRegistry {
    conditions: RwLock<BTreeMap<String, Arc<dyn ConditionCapability>>>,
    topics: RwLock<BTreeMap<String, Arc<TopicCondition>>>,
    blacklist: Vec<String>,
    feed: Arc<ChangeFeed>,
}

impl ConditionRegistry {
    /// Create an empty registry that skips the given condition names.
    pub fn new(blacklist: Vec<String>, events: EventSender) -> Self {
        Self {
            conditions: RwLock::new(BTreeMap::new()),
            topics: RwLock::new(BTreeMap::new()),
            blacklist,
            feed: Arc::new(ChangeFeed { events }),
        }
    }

    /// Create a registry from configuration, registering the configured flags
    /// as pushed boolean conditions.
    pub fn from_config(config: &ConditionsConfig, events: EventSender) -> Self {
        let registry = Self::new(config.blacklist.clone(), events);
        for (name, initial) in &config.flags {
            let flag = Arc::new(TopicCondition::matching(name.clone()).with_initial(*initial));
            if let Err(e) = registry.register_topic(flag) {
                warn!(error = %e, "Skipping configured flag");
            }
        }
        registry
    }

    /// Register a condition.
    ///
    /// Blacklisted, unnamed and duplicate conditions are skipped with a
    /// warning and reported as `LoadFailed`; registration of the remaining
    /// conditions is unaffected.
    pub fn register(&self, condition: Arc<dyn ConditionCapability>) -> Result<(), ConditionError> {
        let name = condition.name().to_string();
        let mut conditions = self.conditions.write().unwrap_or_else(PoisonError::into_inner);
        let reason = if name.is_empty() {
            "empty name"
        } else if self.blacklist.iter().any(|b| *b == name) {
            "blacklisted"
        } else if let Entry::Vacant(slot) = conditions.entry(name.clone()) {
            if condition.accepts_listeners() {
                condition.register_listener(self.feed.clone())?;
            }
            slot.insert(condition);
            info!(condition = %name, "Initialized condition");
            return Ok(());
        } else {
            "duplicate name"
        };
        warn!(condition = %name, reason, "Condition skipped");
        Err(ConditionError::LoadFailed {
            name,
            reason: reason.to_string(),
        })
    }

    /// Register a pushed condition and keep its producer handle reachable
    /// through [`ConditionRegistry::update`].
    pub fn register_topic(&self, topic: Arc<TopicCondition>) -> Result<(), ConditionError> {
        let name = topic.name().to_string();
        self.register(topic.clone())?;
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, topic);
        Ok(())
    }

    /// Evaluate a condition. Unknown names evaluate to `true`.
    pub fn evaluate(&self, name: &str, params: &[String]) -> bool {
        match self.get(name) {
            Some(condition) => condition.evaluate(params),
            None => {
                warn!(condition = %name, "Condition not implemented, evaluating as true");
                true
            }
        }
    }

    /// Evaluate a `Name_p1_p2` expression.
    pub fn evaluate_expression(&self, expr: &str) -> bool {
        let (name, params) = split_name_params(expr);
        let truth = self.evaluate(&name, params.as_slice());
        if truth {
            debug!(condition = %name, params = %params, "Condition is true");
        }
        truth
    }

    /// Current value of a condition, `None` for unknown names.
    pub fn current_value(&self, name: &str) -> Option<ConditionValue> {
        match self.get(name) {
            Some(condition) => condition.value(),
            None => {
                warn!(condition = %name, "Condition not implemented");
                None
            }
        }
    }

    /// Current value as wire text, `"None"` when absent.
    pub fn value_string(&self, name: &str) -> String {
        value_text(self.current_value(name))
    }

    /// Push a new value into a registered pushed condition.
    pub fn update(&self, name: &str, value: impl Into<ConditionValue>) -> Result<bool, ConditionError> {
        let topic = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ConditionError::NotFound(name.to_string()))?;
        Ok(topic.update(value))
    }

    /// Attach a listener to every condition that publishes updates.
    ///
    /// Conditions without a push source reject the listener with a warning.
    /// Returns the number of conditions the listener was attached to.
    pub fn register_listener(&self, listener: Arc<dyn ConditionListener>) -> usize {
        let conditions: Vec<Arc<dyn ConditionCapability>> =
            self.read_conditions().values().cloned().collect();
        let mut attached = 0;
        for condition in conditions {
            match condition.register_listener(listener.clone()) {
                Ok(()) => {
                    debug!(condition = %condition.name(), "Listener registered");
                    attached += 1;
                }
                Err(e) => warn!(error = %e, "Listener not registered"),
            }
        }
        attached
    }

    /// `name_value` for every condition, ordered by name.
    pub fn snapshot(&self) -> Vec<String> {
        self.read_conditions()
            .iter()
            .map(|(name, condition)| format!("{}_{}", name, value_text(condition.value())))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.read_conditions().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ConditionCapability>> {
        self.read_conditions().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_conditions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_conditions().is_empty()
    }

    fn read_conditions(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<dyn ConditionCapability>>> {
        self.conditions.read().unwrap_or_else(PoisonError::into_inner)
    }
}
