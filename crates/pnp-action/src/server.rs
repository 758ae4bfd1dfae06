//! Goal and command server.
//!
//! Routes goal records into the action registry and turns command lines of
//! the form `<action>[_<params>] <cmd>` back into goals. A `start` command
//! creates a fresh goal id for the action name; later `interrupt` and
//! end-class commands for that name reuse it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use pnp_core::{ActionCommand, CommandLine, Goal, GoalFunction, GoalId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::registry::ActionRegistry;

pub struct ActionServer {
    registry: Arc<ActionRegistry>,
    goals: Mutex<HashMap<String, GoalId>>,
}

impl ActionServer {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            goals: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// Apply one goal record.
    pub fn handle_goal(&self, goal: &Goal) -> Result<(), ActionError> {
        debug!(action = %goal.name, goal_id = %goal.id, function = %goal.function, "Goal received");
        match goal.function {
            GoalFunction::Start => self.registry.start(goal).map(|_| ()),
            GoalFunction::Interrupt => {
                self.registry.interrupt(&goal.id);
                Ok(())
            }
            GoalFunction::End => {
                self.registry.end(&goal.id);
                Ok(())
            }
        }
    }

    /// Apply one command line.
    pub fn handle_command(&self, line: &CommandLine) -> Result<(), ActionError> {
        let id = match line.command {
            ActionCommand::Start => {
                let id = GoalId::new();
                self.goals
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(line.action.clone(), id.clone());
                id
            }
            _ => {
                let known = self
                    .goals
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&line.action);
                match known {
                    Some(id) => id,
                    None => {
                        debug!(line = %line, "No goal for command, ignored");
                        return Ok(());
                    }
                }
            }
        };
        let goal = Goal::new(id, line.action.clone(), line.params.clone(), line.command.goal_function());
        self.handle_goal(&goal)
    }

    /// Consume goal records until the channel closes or `shutdown` flips to
    /// `true`.
    pub async fn serve(&self, mut goals: mpsc::Receiver<Goal>, mut shutdown: watch::Receiver<bool>) {
        info!("Action server started");
        loop {
            tokio::select! {
                goal = goals.recv() => match goal {
                    Some(goal) => {
                        if let Err(e) = self.handle_goal(&goal) {
                            warn!(goal_id = %goal.id, error = %e, "Goal rejected");
                        }
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Action server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{InMemoryStatusStore, StatusStore};
    use pnp_core::{event_channel, ActionStatus, Params};
    use std::time::Duration;

    fn make_server() -> (Arc<ActionServer>, Arc<InMemoryStatusStore>) {
        let status = Arc::new(InMemoryStatusStore::new());
        let mut registry = ActionRegistry::new(status.clone(), event_channel(16));
        registry.register_builtins();
        (Arc::new(ActionServer::new(Arc::new(registry))), status)
    }

    fn line(s: &str) -> CommandLine {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_start_then_interrupt_by_name() {
        let (server, status) = make_server();
        server.handle_command(&line("Wait_5 start")).unwrap();
        assert_eq!(server.registry().live_count(), 1);
        assert_eq!(status.get("Wait"), Some(ActionStatus::Running));

        server.handle_command(&line("Wait_5 interrupt")).unwrap();
        assert_eq!(server.registry().live_count(), 0);
        assert_eq!(status.get("Wait"), Some(ActionStatus::Failure));
    }

    #[tokio::test]
    async fn test_end_class_commands_end_goal() {
        let (server, _) = make_server();
        for cmd in ["end", "success", "failure"] {
            server.handle_command(&line("Wait_5 start")).unwrap();
            server
                .handle_command(&line(&format!("Wait_5 {}", cmd)))
                .unwrap();
            assert_eq!(server.registry().live_count(), 0, "after {}", cmd);
        }
    }

    #[tokio::test]
    async fn test_command_without_goal_is_ignored() {
        let (server, _) = make_server();
        server.handle_command(&line("Wait interrupt")).unwrap();
        server.handle_command(&line("Wait end")).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_action_start_errors() {
        let (server, status) = make_server();
        let err = server.handle_command(&line("Fly start")).unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
        assert_eq!(status.get("Fly"), Some(ActionStatus::NotImplemented));
    }

    #[tokio::test]
    async fn test_serve_routes_goals_until_shutdown() {
        let (server, _) = make_server();
        let (tx, rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(rx, stop_rx).await })
        };

        let id = GoalId::from("g-1");
        tx.send(Goal::new(id.clone(), "Wait", Params::from_joined("5"), GoalFunction::Start))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(server.registry().is_live(&id));

        tx.send(Goal::new(id.clone(), "Wait", Params::new(), GoalFunction::Interrupt))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!server.registry().is_live(&id));

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_serve_stops_when_channel_closes() {
        let (server, _) = make_server();
        let (tx, rx) = mpsc::channel::<Goal>(1);
        let (_stop_tx, stop_rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), server.serve(rx, stop_rx))
            .await
            .expect("server should stop");
    }
}
