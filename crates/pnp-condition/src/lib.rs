//! Condition registry for the PNP executor.
//!
//! Holds named condition evaluators, answers truth and value queries, and
//! fans out value-change notifications to registered listeners.

pub mod condition;
pub mod error;
pub mod registry;
pub mod topic;

pub use condition::{ConditionCapability, ConditionListener, PolledCondition};
pub use error::ConditionError;
pub use registry::ConditionRegistry;
pub use topic::TopicCondition;
