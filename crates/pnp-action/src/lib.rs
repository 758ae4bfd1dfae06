//! Action side of the PNP executor.
//!
//! Holds the registered action capabilities, the table of live action
//! instances keyed by goal id, the per-action status store, and the server
//! that turns goals and command lines into registry calls.

pub mod error;
pub mod handler;
pub mod instance;
pub mod registry;
pub mod server;
pub mod status;

pub use error::ActionError;
pub use handler::{ActionCapability, ActionResult};
pub use instance::{ActionInstance, GoalContext};
pub use registry::{ActionRegistry, StartOutcome};
pub use server::ActionServer;
pub use status::{status_key, InMemoryStatusStore, StatusStore};
