//! Action registry and action instance table.
//!
//! Actions are registered once at startup. Live instances are keyed by goal
//! id; at most one instance may exist per id, and in exclusive mode at most
//! one live instance per action name.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pnp_core::{ActionStatus, EventSender, ExecutionEvent, Goal, GoalId, Params, Timestamp};
use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::handler::{self, ActionCapability};
use crate::instance::ActionInstance;
use crate::status::StatusStore;

/// What `start` did for a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// An instance was created and its body started.
    Started,
    /// The goal was already reached; nothing was instantiated.
    AlreadyReached,
}

/// Registered actions plus the table of live instances.
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn ActionCapability>>,
    instances: Mutex<HashMap<GoalId, ActionInstance>>,
    status: Arc<dyn StatusStore>,
    events: EventSender,
    exclusive_names: bool,
}

impl ActionRegistry {
    pub fn new(status: Arc<dyn StatusStore>, events: EventSender) -> Self {
        Self {
            actions: BTreeMap::new(),
            instances: Mutex::new(HashMap::new()),
            status,
            events,
            exclusive_names: false,
        }
    }

    /// Allow at most one live instance per action name.
    pub fn with_exclusive_names(mut self, exclusive: bool) -> Self {
        self.exclusive_names = exclusive;
        self
    }

    /// Register an action. Unnamed and duplicate actions are skipped with a
    /// warning; the first registration wins.
    pub fn register(&mut self, action: Arc<dyn ActionCapability>) -> Result<(), ActionError> {
        let name = action.name().to_string();
        let reason = if name.is_empty() {
            Some("empty name")
        } else if self.actions.contains_key(&name) {
            Some("duplicate name")
        } else {
            None
        };
        if let Some(reason) = reason {
            warn!(action = %name, reason, "Action skipped");
            return Err(ActionError::LoadFailed {
                name,
                reason: reason.to_string(),
            });
        }
        info!(action = %name, "Initialized action");
        self.actions.insert(name, action);
        Ok(())
    }

    /// Register the built-in actions.
    pub fn register_builtins(&mut self) {
        for action in handler::builtins() {
            let _ = self.register(action);
        }
    }

    pub fn list_actions(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionCapability>> {
        self.actions.get(name).cloned()
    }

    /// Whether the named action's goal is already reached. Unknown actions
    /// never are.
    pub fn is_goal_reached(&self, name: &str, params: &Params) -> bool {
        self.actions
            .get(name)
            .map(|a| a.is_goal_reached(params))
            .unwrap_or(false)
    }

    /// Start an instance for `goal`.
    ///
    /// An unknown action sets its status to `not-implemented`. A goal that
    /// is already reached sets `success` without instantiating anything.
    pub fn start(&self, goal: &Goal) -> Result<StartOutcome, ActionError> {
        let Some(action) = self.get(&goal.name) else {
            warn!(action = %goal.name, "Action not implemented");
            self.status.set(&goal.name, ActionStatus::NotImplemented);
            self.emit(ExecutionEvent::ActionNotImplemented {
                action: goal.name.clone(),
                timestamp: Timestamp::now(),
            });
            return Err(ActionError::NotFound(goal.name.clone()));
        };

        if action.is_goal_reached(&goal.params) {
            info!(action = %goal.name, params = %goal.params, "Goal already reached");
            self.status.set(&goal.name, ActionStatus::Success);
            self.emit(ExecutionEvent::GoalAlreadyReached {
                goal_id: goal.id.clone(),
                action: goal.name.clone(),
                timestamp: Timestamp::now(),
            });
            return Ok(StartOutcome::AlreadyReached);
        }

        let mut instances = self.lock_instances();
        if instances.contains_key(&goal.id) {
            warn!(goal_id = %goal.id, "Goal already has a live instance");
            return Err(ActionError::DuplicateGoal(goal.id.clone()));
        }
        if self.exclusive_names
            && instances
                .values()
                .any(|i| i.goal().name == goal.name && !i.is_finished())
        {
            warn!(action = %goal.name, "Action already running");
            return Err(ActionError::AlreadyRunning(goal.name.clone()));
        }

        info!(action = %goal.name, goal_id = %goal.id, "Starting {}", action.describe(&goal.params));
        let instance = ActionInstance::spawn(action, goal.clone(), self.status.clone());
        instances.insert(goal.id.clone(), instance);
        drop(instances);

        self.emit(ExecutionEvent::GoalStarted {
            goal_id: goal.id.clone(),
            action: goal.name.clone(),
            timestamp: Timestamp::now(),
        });
        Ok(StartOutcome::Started)
    }

    /// Interrupt and remove the instance for `id`. Unknown ids are a no-op.
    pub fn interrupt(&self, id: &GoalId) -> bool {
        let Some(instance) = self.lock_instances().remove(id) else {
            debug!(goal_id = %id, "Interrupt for unknown goal ignored");
            return false;
        };
        let goal = instance.interrupt();
        self.emit(ExecutionEvent::GoalInterrupted {
            goal,
            timestamp: Timestamp::now(),
        });
        true
    }

    /// Remove the instance for `id` without interrupting it.
    pub fn end(&self, id: &GoalId) -> bool {
        let Some(instance) = self.lock_instances().remove(id) else {
            debug!(goal_id = %id, "End for unknown goal ignored");
            return false;
        };
        self.emit(ExecutionEvent::GoalEnded {
            goal_id: id.clone(),
            action: instance.goal().name.clone(),
            timestamp: Timestamp::now(),
        });
        true
    }

    pub fn is_live(&self, id: &GoalId) -> bool {
        self.lock_instances().contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.lock_instances().len()
    }

    pub fn status(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    fn emit(&self, event: ExecutionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn lock_instances(&self) -> MutexGuard<'_, HashMap<GoalId, ActionInstance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::handler::ActionResult;
    use crate::instance::GoalContext;
    use crate::status::InMemoryStatusStore;
    use async_trait::async_trait;
    use pnp_core::{event_channel, GoalFunction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Action whose goal is reached when its first parameter is "here".
    struct GoTo {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ActionCapability for GoTo {
        fn name(&self) -> &str {
            "GoTo"
        }

        fn is_goal_reached(&self, params: &Params) -> bool {
            params.get(0) == Some("here")
        }

        async fn execute(
            &self,
            _params: &Params,
            _ctx: &GoalContext,
        ) -> Result<ActionResult, ActionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(ActionResult::success("arrived"))
        }
    }

    fn make_registry() -> (ActionRegistry, Arc<InMemoryStatusStore>, Arc<AtomicUsize>, EventSender) {
        let status = Arc::new(InMemoryStatusStore::new());
        let events = event_channel(32);
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = ActionRegistry::new(status.clone(), events.clone());
        registry.register_builtins();
        registry
            .register(Arc::new(GoTo { runs: runs.clone() }))
            .unwrap();
        (registry, status, runs, events)
    }

    fn goal(id: &str, name: &str, params: &str) -> Goal {
        Goal::new(GoalId::from(id), name, Params::from_joined(params), GoalFunction::Start)
    }

    #[tokio::test]
    async fn test_list_actions_sorted() {
        let (registry, _, _, _) = make_registry();
        assert_eq!(registry.list_actions(), vec!["GoTo", "Say", "Wait"]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_skipped() {
        let (mut registry, _, _, _) = make_registry();
        let err = registry.register(Arc::new(crate::handler::Wait)).unwrap_err();
        assert!(matches!(err, ActionError::LoadFailed { .. }));
        assert_eq!(registry.list_actions().len(), 3);
    }

    #[tokio::test]
    async fn test_start_unknown_sets_not_implemented() {
        let (registry, status, _, events) = make_registry();
        let mut rx = events.subscribe();
        let err = registry.start(&goal("g-1", "Fly", "")).unwrap_err();
        assert!(matches!(err, ActionError::NotFound(name) if name == "Fly"));
        assert_eq!(status.get("Fly"), Some(ActionStatus::NotImplemented));
        assert_eq!(rx.recv().await.unwrap().event_name(), "action_not_implemented");
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_goal_reached_short_circuits() {
        let (registry, status, runs, _) = make_registry();
        let outcome = registry.start(&goal("g-1", "GoTo", "here")).unwrap();
        assert_eq!(outcome, StartOutcome::AlreadyReached);
        assert_eq!(status.get("GoTo"), Some(ActionStatus::Success));
        assert!(!registry.is_live(&GoalId::from("g-1")));
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_goal_id_rejected_while_live() {
        let (registry, _, _, _) = make_registry();
        registry.start(&goal("g-1", "GoTo", "kitchen")).unwrap();
        let err = registry.start(&goal("g-1", "GoTo", "hall")).unwrap_err();
        assert!(matches!(err, ActionError::DuplicateGoal(id) if id == GoalId::from("g-1")));
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_names() {
        let (registry, _, _, _) = make_registry();
        let registry = registry.with_exclusive_names(true);
        registry.start(&goal("g-1", "GoTo", "kitchen")).unwrap();
        let err = registry.start(&goal("g-2", "GoTo", "hall")).unwrap_err();
        assert!(matches!(err, ActionError::AlreadyRunning(_)));
        registry.start(&goal("g-3", "Wait", "0.01")).unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_removes_and_notifies() {
        let (registry, status, _, events) = make_registry();
        let mut rx = events.subscribe();
        registry.start(&goal("g-1", "GoTo", "kitchen")).unwrap();
        assert_eq!(rx.recv().await.unwrap().event_name(), "goal_started");

        assert!(registry.interrupt(&GoalId::from("g-1")));
        assert!(!registry.is_live(&GoalId::from("g-1")));
        assert_eq!(status.get("GoTo"), Some(ActionStatus::Failure));
        match rx.recv().await.unwrap() {
            ExecutionEvent::GoalInterrupted { goal, .. } => assert_eq!(goal.name, "GoTo"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interrupt_unknown_is_noop() {
        let (registry, _, _, _) = make_registry();
        assert!(!registry.interrupt(&GoalId::from("nope")));
        assert!(!registry.interrupt(&GoalId::from("nope")));
    }

    #[tokio::test]
    async fn test_end_removes_without_interrupt() {
        let (registry, status, _, _) = make_registry();
        registry.start(&goal("g-1", "GoTo", "kitchen")).unwrap();
        assert!(registry.end(&GoalId::from("g-1")));
        assert_eq!(registry.live_count(), 0);
        // No interrupt, so the instance's own status is untouched.
        assert_eq!(status.get("GoTo"), Some(ActionStatus::Running));
        assert!(!registry.end(&GoalId::from("g-1")));
    }

    #[tokio::test]
    async fn test_is_goal_reached_unknown_is_false() {
        let (registry, _, _, _) = make_registry();
        assert!(!registry.is_goal_reached("Fly", &Params::new()));
        assert!(registry.is_goal_reached("GoTo", &Params::from_joined("here")));
    }
}
