use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PnpError, Result};

/// Top-level configuration for the PNP executor.
///
/// Loaded from `~/.pnp/config.toml` by default. Every section falls back to
/// its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnpConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub conditions: ConditionsConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

impl PnpConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PnpConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| PnpError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Execution controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Status polling cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// Pause after interrupting live actions when the plan is terminated.
    pub terminate_grace_ms: u64,
    /// Capacity of the execution event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            terminate_grace_ms: 500,
            event_capacity: 256,
        }
    }
}

/// Action registry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Allow at most one live instance per action name.
    pub exclusive_names: bool,
}

/// Condition registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionsConfig {
    /// Condition names that are never registered.
    pub blacklist: Vec<String>,
    /// Boolean pushed conditions created at startup, with their initial value.
    pub flags: BTreeMap<String, bool>,
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self {
            blacklist: vec!["LaserScan".to_string(), "Twist".to_string(), "Pose".to_string()],
            flags: BTreeMap::new(),
        }
    }
}

/// Debug dispatch policy.
///
/// When active, the configuration named by `mode` decides which actions are
/// performed: an `active` list enables only the listed actions, an
/// `inactive` list disables the listed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub active: bool,
    pub mode: String,
    pub configurations: BTreeMap<String, DebugModeConfig>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            active: false,
            mode: "default".to_string(),
            configurations: BTreeMap::new(),
        }
    }
}

/// One named debug configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugModeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_temp_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PnpConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.executor.poll_interval_ms, 100);
        assert_eq!(config.executor.terminate_grace_ms, 500);
        assert_eq!(config.executor.event_capacity, 256);
        assert!(!config.actions.exclusive_names);
        assert_eq!(config.conditions.blacklist, vec!["LaserScan", "Twist", "Pose"]);
        assert!(config.conditions.flags.is_empty());
        assert!(!config.debug.active);
        assert_eq!(config.debug.mode, "default");
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[executor]
poll_interval_ms = 20

[actions]
exclusive_names = true

[conditions]
blacklist = []

[conditions.flags]
PersonHere = true
DoorOpen = false

[debug]
active = true
mode = "speech"

[debug.configurations.speech]
active = ["Say"]

[debug.configurations.nav]
inactive = ["Move", "Turn"]
"#;
        let file = create_temp_config(content);
        let config = PnpConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.executor.poll_interval_ms, 20);
        // Unspecified fields keep their defaults.
        assert_eq!(config.executor.terminate_grace_ms, 500);
        assert!(config.actions.exclusive_names);
        assert!(config.conditions.blacklist.is_empty());
        assert_eq!(config.conditions.flags.get("PersonHere"), Some(&true));
        assert_eq!(config.conditions.flags.get("DoorOpen"), Some(&false));
        assert!(config.debug.active);
        assert_eq!(config.debug.mode, "speech");
        assert_eq!(
            config.debug.configurations["speech"].active,
            Some(vec!["Say".to_string()])
        );
        assert_eq!(config.debug.configurations["speech"].inactive, None);
        assert_eq!(
            config.debug.configurations["nav"].inactive,
            Some(vec!["Move".to_string(), "Turn".to_string()])
        );
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = PnpConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.executor.poll_interval_ms, 100);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = PnpConfig::load(file.path());
        assert!(matches!(result, Err(PnpError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PnpConfig::load_or_default(Path::new("/does/not/exist/config.toml"));
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.executor.poll_interval_ms, 100);
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = PnpConfig::default();
        config.debug.active = true;
        config.debug.configurations.insert(
            "default".to_string(),
            DebugModeConfig {
                active: None,
                inactive: Some(vec!["Speak".to_string()]),
            },
        );
        config.save(&path).unwrap();
        assert!(path.exists());

        let reloaded = PnpConfig::load(&path).unwrap();
        assert!(reloaded.debug.active);
        assert_eq!(
            reloaded.debug.configurations["default"].inactive,
            Some(vec!["Speak".to_string()])
        );
    }
}
