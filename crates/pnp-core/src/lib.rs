pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::PnpConfig;
pub use error::{PnpError, Result};
pub use events::{event_channel, EventSender, ExecutionEvent};
pub use types::*;
