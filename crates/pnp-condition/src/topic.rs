//! Conditions fed by an asynchronous push source.
//!
//! The cached value lives in a `watch` channel: the producer replaces it
//! atomically and readers always see the latest complete value. Updates that
//! arrive between two reads are coalesced. Listeners are notified only when
//! the value actually changes.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use pnp_core::ConditionValue;
use tokio::sync::watch;

use crate::condition::{ConditionCapability, ConditionListener};
use crate::error::ConditionError;

/// Predicate over the cached value and the evaluation parameters.
pub type TopicPredicate = Box<dyn Fn(Option<&ConditionValue>, &[String]) -> bool + Send + Sync>;

/// A condition whose value is pushed by an external producer.
pub struct TopicCondition {
    name: String,
    cache: watch::Sender<Option<ConditionValue>>,
    listeners: RwLock<Vec<Arc<dyn ConditionListener>>>,
    predicate: TopicPredicate,
}

impl TopicCondition {
    /// Create a condition with a custom predicate and no value yet.
    pub fn new(name: impl Into<String>, predicate: TopicPredicate) -> Self {
        let (cache, _) = watch::channel(None);
        Self {
            name: name.into(),
            cache,
            listeners: RwLock::new(Vec::new()),
            predicate,
        }
    }

    /// Create a condition with the default matching predicate.
    ///
    /// Without parameters it is true when the value is truthy; with
    /// parameters it is true when the value text equals the `_`-joined
    /// parameters.
    pub fn matching(name: impl Into<String>) -> Self {
        Self::new(
            name,
            Box::new(|value: Option<&ConditionValue>, params: &[String]| match value {
                None => false,
                Some(v) if params.is_empty() => v.is_truthy(),
                Some(v) => v.to_string() == params.join("_"),
            }),
        )
    }

    /// Seed the cache with a value that was already available at startup.
    pub fn with_initial(self, value: impl Into<ConditionValue>) -> Self {
        self.cache.send_replace(Some(value.into()));
        self
    }

    /// Push a new value. Returns whether the cached value changed.
    ///
    /// Listeners are notified after the cache is updated, on the producer's
    /// thread, over a snapshot of the listener list.
    pub fn update(&self, value: impl Into<ConditionValue>) -> bool {
        let value = value.into();
        let changed = self.cache.send_if_modified(|current| {
            if current.as_ref() == Some(&value) {
                false
            } else {
                *current = Some(value);
                true
            }
        });
        if changed {
            self.notify_listeners();
        }
        changed
    }

    /// Watch the cached value from async code.
    pub fn subscribe(&self) -> watch::Receiver<Option<ConditionValue>> {
        self.cache.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify_listeners(&self) {
        // Copy-on-notify: a listener may register another listener while
        // being notified.
        let listeners: Vec<Arc<dyn ConditionListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.receive_update(self);
        }
    }
}

impl fmt::Debug for TopicCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicCondition")
            .field("name", &self.name)
            .field("value", &*self.cache.borrow())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ConditionCapability for TopicCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, params: &[String]) -> bool {
        let value = self.cache.borrow().clone();
        (self.predicate)(value.as_ref(), params)
    }

    fn value(&self) -> Option<ConditionValue> {
        self.cache.borrow().clone()
    }

    fn accepts_listeners(&self) -> bool {
        true
    }

    fn register_listener(&self, listener: Arc<dyn ConditionListener>) -> Result<(), ConditionError> {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_matching_without_value_is_false() {
        let cond = TopicCondition::matching("PersonHere");
        assert!(!cond.evaluate(&[]));
        assert_eq!(cond.value(), None);
    }

    #[test]
    fn test_matching_truthiness_and_params() {
        let cond = TopicCondition::matching("Location");
        cond.update("kitchen");
        assert!(cond.evaluate(&[]));
        assert!(cond.evaluate(&["kitchen".to_string()]));
        assert!(!cond.evaluate(&["hall".to_string()]));

        let flag = TopicCondition::matching("DoorOpen").with_initial(false);
        assert!(!flag.evaluate(&[]));
        flag.update(true);
        assert!(flag.evaluate(&[]));
    }

    #[test]
    fn test_update_reports_change_only() {
        let cond = TopicCondition::matching("Battery");
        assert!(cond.update(0.5));
        assert!(!cond.update(0.5));
        assert!(cond.update(0.4));
    }

    #[test]
    fn test_listeners_notified_on_change_only() {
        let cond = TopicCondition::matching("PersonHere");
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        cond.register_listener(Arc::new(move |_: &dyn ConditionCapability| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        cond.update(true);
        cond.update(true);
        cond.update(false);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_receives_condition_with_new_value() {
        let cond = TopicCondition::matching("Location");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        cond.register_listener(Arc::new(move |c: &dyn ConditionCapability| {
            s.lock()
                .unwrap()
                .push(format!("{}_{}", c.name(), c.value().unwrap()));
        }))
        .unwrap();

        cond.update("hall");
        assert_eq!(*seen.lock().unwrap(), vec!["Location_hall".to_string()]);
    }

    #[test]
    fn test_listener_may_register_during_notification() {
        let cond = Arc::new(TopicCondition::matching("PersonHere"));
        let weak = Arc::downgrade(&cond);
        cond.register_listener(Arc::new(move |_: &dyn ConditionCapability| {
            if let Some(c) = weak.upgrade() {
                c.register_listener(Arc::new(|_: &dyn ConditionCapability| {}))
                    .unwrap();
            }
        }))
        .unwrap();

        cond.update(true);
        assert_eq!(cond.listener_count(), 2);
    }

    #[test]
    fn test_rapid_updates_coalesce_to_latest() {
        let cond = TopicCondition::matching("Counter");
        let rx = cond.subscribe();
        cond.update(1.0);
        cond.update(2.0);
        assert_eq!(cond.value(), Some(ConditionValue::Number(2.0)));
        assert_eq!(*rx.borrow(), Some(ConditionValue::Number(2.0)));
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        let cond = Arc::new(TopicCondition::matching("Label"));
        let values: Vec<String> = (0..200).map(|i| format!("value-{}-{}", i, "x".repeat(i))).collect();

        let producer = {
            let cond = Arc::clone(&cond);
            let values = values.clone();
            std::thread::spawn(move || {
                for v in values {
                    cond.update(ConditionValue::Text(v));
                }
            })
        };

        for _ in 0..1000 {
            if let Some(ConditionValue::Text(v)) = cond.value() {
                assert!(values.contains(&v), "observed torn value {:?}", v);
            }
        }
        producer.join().unwrap();
        assert_eq!(
            cond.value(),
            Some(ConditionValue::Text(values.last().unwrap().clone()))
        );
    }

    #[tokio::test]
    async fn test_subscriber_sees_change() {
        let cond = TopicCondition::matching("DoorOpen");
        let mut rx = cond.subscribe();
        cond.update(true);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(ConditionValue::Bool(true)));
    }
}
