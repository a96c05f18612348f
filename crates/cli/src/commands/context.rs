//! Per-command setup: configuration, logging, platform client and runtime.

use std::future::Future;

use anyhow::Context as _;
use recfm_core::config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LoggingConfig};
use recfm_core::state::WorkflowState;
use recfm_platform::{HttpPlatform, InMemoryPlatform, Platform, Workflow, WorkflowError};

use crate::commands::CommandResult;
use crate::GlobalArgs;

pub struct CommandContext {
    pub config: AppConfig,
    pub dry_run: bool,
    platform: Box<dyn Platform>,
}

impl CommandContext {
    /// Load configuration, start logging and build the platform client.
    pub fn load(command: &str, global: &GlobalArgs) -> Result<Self, CommandResult> {
        let mut config = load_config(global).map_err(|error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        })?;
        init_logging(&config.logging);

        if global.dry_run {
            // Simulated jobs settle after a poll or two.
            config.training.poll_interval_secs = 0;
            config.endpoint.poll_interval_secs = 0;
        }

        let platform = build_platform(&config, global.dry_run).map_err(|error| {
            CommandResult::failure(command, "platform_init", format!("{error:#}"), 1)
        })?;

        tracing::debug!(
            event_name = "cli.command.started",
            command,
            dry_run = global.dry_run,
            state_path = %config.state_path().display(),
            "command started"
        );
        Ok(Self { config, dry_run: global.dry_run, platform })
    }

    pub fn workflow(&self) -> Workflow<'_, dyn Platform> {
        Workflow::new(self.platform.as_ref(), &self.config)
    }

    pub fn load_state(&self) -> Result<WorkflowState, WorkflowError> {
        Ok(WorkflowState::load_or_default(&self.config.state_path())?)
    }

    pub fn save_state(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        Ok(state.save(&self.config.state_path())?)
    }
}

pub fn load_config(global: &GlobalArgs) -> Result<AppConfig, ConfigError> {
    AppConfig::load(LoadOptions {
        config_path: global.config.clone(),
        require_file: global.config.is_some(),
        overrides: ConfigOverrides {
            base_url: global.base_url.clone(),
            work_dir: global.work_dir.clone(),
            transactions_path: global.transactions.clone(),
            endpoint_name: global.endpoint.clone(),
            log_level: global.log_level.clone(),
        },
    })
}

fn build_platform(config: &AppConfig, dry_run: bool) -> anyhow::Result<Box<dyn Platform>> {
    if dry_run {
        return Ok(Box::new(InMemoryPlatform::default()));
    }

    let platform = HttpPlatform::new(&config.platform).with_context(|| {
        format!("failed to build platform client for {}", config.platform.base_url)
    })?;
    Ok(Box::new(platform))
}

/// Logs go to stderr so stdout carries only the command's JSON document.
fn init_logging(config: &LoggingConfig) {
    use recfm_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when commands run in-process.
    let _ = match config.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

/// Drive a workflow future on a current-thread runtime.
pub fn block_on<T, F>(command: &str, future: F) -> Result<T, CommandResult>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    runtime.block_on(future).map_err(|error| workflow_failure(command, &error))
}

pub fn workflow_failure(command: &str, error: &WorkflowError) -> CommandResult {
    tracing::warn!(
        event_name = "cli.command.failed",
        command,
        error_class = error.error_class(),
        error = %error,
        "command failed"
    );
    CommandResult::failure(command, error.error_class(), error.to_string(), 1)
}
