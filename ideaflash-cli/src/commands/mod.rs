//! Command implementations.
//!
//! Each subcommand is implemented in its own module; helpers shared by the
//! commands that open a session live here.

pub(crate) mod completions;
pub(crate) mod firmware;
pub(crate) mod flash;
pub(crate) mod monitor;
pub(crate) mod ports;
pub(crate) mod session;

use {
    crate::{Cli, CliError, config::Config, was_interrupted},
    anyhow::Result,
    dialoguer::{Confirm, theme::ColorfulTheme},
    ideaflash::{Outcome, Prompt, SessionConfig},
    log::debug,
};

/// Session tunables from flags, environment and config.
pub(crate) fn session_config(cli: &Cli, config: &Config) -> SessionConfig {
    SessionConfig {
        baud: cli.session_baud(config),
        flash_offset: config
            .flash
            .offset(),
        soft_reset: config
            .flash
            .soft_reset(),
        settle_delay: config
            .flash
            .settle_delay(),
        ..SessionConfig::default()
    }
}

/// Confirmation used before erasing.
///
/// `--yes` answers every question; otherwise a dialoguer prompt is shown,
/// which non-interactive mode does not allow.
pub(crate) fn confirmation_prompt(cli: &Cli, assume_yes: bool) -> Result<Box<dyn Prompt>> {
    if assume_yes {
        return Ok(Box::new(|_: &str| true));
    }
    if cli.non_interactive {
        return Err(CliError::Usage(
            "--yes is required to erase the flash in non-interactive mode".to_string(),
        )
        .into());
    }
    Ok(Box::new(|message: &str| {
        match Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(false)
            .interact_opt()
        {
            Ok(answer) => answer.unwrap_or(false),
            Err(e) => {
                debug!("Confirmation prompt failed: {e}");
                false
            },
        }
    }))
}

pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Turn a session outcome into a command result.
///
/// Failures were already written to the session log, so the error only
/// names the step.
pub(crate) fn ensure_done(outcome: Outcome, step: &str) -> Result<()> {
    match outcome {
        Outcome::Done => Ok(()),
        Outcome::Aborted => Err(CliError::Cancelled(format!("{step} cancelled")).into()),
        Outcome::Failed => {
            ensure_not_interrupted()?;
            Err(anyhow::anyhow!("{step} failed"))
        },
    }
}
