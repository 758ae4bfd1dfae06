//! Debug dispatch policy.
//!
//! A policy vetoes dispatch of selected actions before the controller
//! touches any state. It is either an enable-list (only listed actions run)
//! or a disable-list (listed actions are skipped).

use std::path::PathBuf;

use pnp_core::config::DebugConfig;
use pnp_core::PnpConfig;
use tracing::{debug, info, warn};

/// Decides whether an action may be dispatched.
pub trait DispatchGate: Send + Sync {
    fn is_disabled(&self, action: &str) -> bool;
}

/// Gate that never disables anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl DispatchGate for AllowAll {
    fn is_disabled(&self, _action: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugPolicy {
    Enable { mode: String, actions: Vec<String> },
    Disable { mode: String, actions: Vec<String> },
}

impl DebugPolicy {
    /// Resolve the policy selected by a debug configuration.
    ///
    /// Returns `None` when debugging is inactive, the selected mode has no
    /// configuration, or that configuration lists no actions. An `active`
    /// list takes precedence over an `inactive` one.
    pub fn from_config(config: &DebugConfig) -> Option<Self> {
        if !config.active {
            debug!("Debug mode is not active");
            return None;
        }
        let Some(mode_config) = config.configurations.get(&config.mode) else {
            warn!(mode = %config.mode, "Debug mode is not found in configurations");
            return None;
        };
        if let Some(actions) = &mode_config.active {
            return Some(DebugPolicy::Enable {
                mode: config.mode.clone(),
                actions: actions.clone(),
            });
        }
        if let Some(actions) = &mode_config.inactive {
            return Some(DebugPolicy::Disable {
                mode: config.mode.clone(),
                actions: actions.clone(),
            });
        }
        warn!(mode = %config.mode, "Debug mode did not find any actions");
        None
    }

    pub fn mode(&self) -> &str {
        match self {
            DebugPolicy::Enable { mode, .. } | DebugPolicy::Disable { mode, .. } => mode,
        }
    }

    /// Whether the policy lets `action` run.
    pub fn performs(&self, action: &str) -> bool {
        match self {
            DebugPolicy::Enable { actions, .. } => actions.iter().any(|a| a == action),
            DebugPolicy::Disable { actions, .. } => !actions.iter().any(|a| a == action),
        }
    }
}

impl DispatchGate for DebugPolicy {
    fn is_disabled(&self, action: &str) -> bool {
        let perform = self.performs(action);
        if perform {
            debug!(mode = %self.mode(), action = %action, "Action enabled by debug policy");
        } else {
            info!(mode = %self.mode(), action = %action, "Action disabled by debug policy");
        }
        !perform
    }
}

/// Policy read from a configuration file on every check, so the file can be
/// edited while a plan runs. A missing or unreadable file means no policy.
#[derive(Debug, Clone)]
pub struct FileDebugPolicy {
    path: PathBuf,
}

impl FileDebugPolicy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn current(&self) -> Option<DebugPolicy> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Debug file was not found");
            return None;
        }
        match PnpConfig::load(&self.path) {
            Ok(config) => DebugPolicy::from_config(&config.debug),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Debug file could not be read");
                None
            }
        }
    }
}

impl DispatchGate for FileDebugPolicy {
    fn is_disabled(&self, action: &str) -> bool {
        self.current()
            .map(|policy| policy.is_disabled(action))
            .unwrap_or(false)
    }
}
