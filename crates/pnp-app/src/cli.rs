//! CLI argument definitions for the `pnp` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pnp: run symbolic robot actions with interrupt triggers and recovery.
#[derive(Parser, Debug)]
#[command(name = "pnp", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one action, optionally guarded by an interrupt rule.
    Exec {
        /// Action name.
        #[arg(short = 'a', long = "action")]
        action: String,

        /// `_`-joined action parameters.
        #[arg(short = 'p', long = "params", default_value = "")]
        params: String,

        /// Interrupt trigger: `timeout_<secs>` or a condition expression.
        #[arg(short = 'i', long = "interrupt", requires = "recovery")]
        interrupt: Option<String>,

        /// `;`-separated recovery steps run when the trigger fires.
        #[arg(short = 'r', long = "recovery", requires = "interrupt")]
        recovery: Option<String>,

        /// Push a flag condition value before executing (`Name=true`).
        #[arg(long = "set", value_parser = parse_flag)]
        set: Vec<(String, bool)>,
    },

    /// List the registered actions.
    Actions,

    /// Print every condition as `name_value`.
    Conditions,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PNP_CONFIG env var > ~/.pnp/config.toml > config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PNP_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn parse_flag(s: &str) -> Result<(String, bool), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected Name=true|false, got {:?}", s))?;
    let value = value
        .trim()
        .parse::<bool>()
        .map_err(|_| format!("expected true or false, got {:?}", value))?;
    Ok((name.trim().to_string(), value))
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".pnp").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".pnp").join("config.toml");
    }
    PathBuf::from("config.toml")
}
