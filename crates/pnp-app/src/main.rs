//! pnp application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Build the condition and action registries, the in-process action
//!    server, the command dispatcher and the execution controller
//! 4. Run the requested subcommand

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pnp_action::{ActionRegistry, ActionServer, InMemoryStatusStore};
use pnp_condition::ConditionRegistry;
use pnp_core::{event_channel, EventSender, Params, PnpConfig, PnpError};
use pnp_exec::{
    CommandDispatcher, ExecContext, ExecError, ExecutionController, FileDebugPolicy, Recovery,
    RuleTable, Trigger,
};
use tracing_subscriber::EnvFilter;

use cli::{CliArgs, Command};

/// Everything a subcommand needs, wired together.
struct Runtime {
    actions: Arc<ActionRegistry>,
    conditions: Arc<ConditionRegistry>,
    controller: Arc<ExecutionController>,
    events: EventSender,
}

fn build_runtime(config: &PnpConfig, config_file: &Path) -> Runtime {
    let events = event_channel(config.executor.event_capacity);
    let status = Arc::new(InMemoryStatusStore::new());

    let mut actions = ActionRegistry::new(status.clone(), events.clone())
        .with_exclusive_names(config.actions.exclusive_names);
    actions.register_builtins();
    let actions = Arc::new(actions);
    tracing::info!(count = actions.list_actions().len(), "Action registry ready");

    let conditions = Arc::new(ConditionRegistry::from_config(&config.conditions, events.clone()));
    tracing::info!(count = conditions.len(), "Condition registry ready");

    let server = Arc::new(ActionServer::new(Arc::clone(&actions)));
    let dispatcher = Arc::new(CommandDispatcher::new(server, status.clone(), events.clone()));

    let ctx = ExecContext {
        rules: Arc::new(RuleTable::new()),
        conditions: conditions.clone(),
        dispatcher,
        status,
        gate: Arc::new(FileDebugPolicy::new(config_file)),
        events: events.clone(),
    };
    let controller = Arc::new(ExecutionController::new(ctx, &config.executor));

    Runtime {
        actions,
        conditions,
        controller,
        events,
    }
}

/// Log every execution event at debug level.
fn spawn_event_log(events: &EventSender) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(event = event.event_name(), %json, "Event"),
                    Err(e) => tracing::warn!(error = %e, "Event not serializable"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn exec(
    runtime: &Runtime,
    action: &str,
    params: &str,
    rule: Option<(String, String)>,
    set: Vec<(String, bool)>,
) -> Result<ExitCode, PnpError> {
    for (name, value) in set {
        if let Err(e) = runtime.conditions.update(&name, value) {
            tracing::warn!(condition = %name, error = %e, "Flag not set");
        }
    }

    let rule = match rule {
        Some((trigger, recovery)) => Some((
            trigger.parse::<Trigger>()?,
            Recovery::parse(&recovery),
        )),
        None => None,
    };

    let _event_log = spawn_event_log(&runtime.events);
    let controller = Arc::clone(&runtime.controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling plan");
            controller.cancel();
        }
    });

    let params = Params::from_joined(params);
    match runtime.controller.execute(action, &params, rule).await {
        Ok(outcome) => {
            println!("{} {}", action, outcome);
            Ok(if outcome.is_failure() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(ExecError::Cancelled) => {
            println!("{} cancelled", action);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(args: CliArgs, config: PnpConfig, config_file: &Path) -> Result<ExitCode, PnpError> {
    let runtime = build_runtime(&config, config_file);
    match args.command {
        Command::Exec {
            action,
            params,
            interrupt,
            recovery,
            set,
        } => {
            let rule = interrupt.zip(recovery);
            exec(&runtime, &action, &params, rule, set).await
        }
        Command::Actions => {
            for name in runtime.actions.list_actions() {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Conditions => {
            for line in runtime.conditions.snapshot() {
                println!("{}", line);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured level can apply.
    let config_file = args.resolve_config_path();
    let config = PnpConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over the resolved level.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting pnp v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    match run(args, config, &config_file).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "pnp failed");
            ExitCode::FAILURE
        }
    }
}
