//! Flash and erase command implementations.

use {
    super::{
        confirmation_prompt, ensure_done, ensure_not_interrupted, firmware, session_config,
    },
    crate::{Cli, CliError, config::Config, get_port, terminal::TerminalLog, use_fancy_output},
    anyhow::Result,
    console::style,
    ideaflash::{EspHost, Outcome, SessionController, session::CONFIRM_PROGRAM},
    log::debug,
    std::sync::Arc,
};

/// Arguments of the `flash` subcommand.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlashArgs {
    pub firmware: Option<String>,
    pub yes: bool,
    pub no_reset: bool,
    pub monitor: bool,
    pub offset: Option<u32>,
}

/// Flash command implementation.
///
/// Connects, erases and programs the image, optionally keeps relaying device
/// output until Ctrl-C, then disconnects.
pub(crate) fn cmd_flash(cli: &Cli, config: &mut Config, args: &FlashArgs) -> Result<()> {
    let source = firmware::firmware_source(&cli.firmware_dir(config))?;
    let firmware_id = firmware::resolve_firmware(
        &source,
        args.firmware
            .as_deref(),
        cli.non_interactive,
        cli.quiet,
    )?;
    let prompt = confirmation_prompt(cli, args.yes)?;

    let port = get_port(cli, config)?;
    let mut settings = session_config(cli, config);
    if let Some(offset) = args.offset {
        settings.flash_offset = offset;
    }
    if args.no_reset {
        settings.soft_reset = false;
    }
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port.name).green(),
            settings.baud
        );
    }
    ensure_not_interrupted()?;

    let log = Arc::new(TerminalLog::new(use_fancy_output(), cli.quiet));
    let mut session = SessionController::new(
        EspHost::with_port(port),
        Box::new(source),
        prompt,
        log,
        settings,
    );

    ensure_done(session.connect(), "Connecting")?;
    session.select_firmware(Some(firmware_id));

    let programmed = session.program();
    if programmed == Outcome::Aborted {
        let _ = session.disconnect();
        return Err(CliError::Cancelled(format!("Declined: {CONFIRM_PROGRAM}")).into());
    }

    if args.monitor && programmed.is_done() && !crate::was_interrupted() {
        if !cli.quiet {
            eprintln!("{}", style("Showing device output, press Ctrl-C to exit").dim());
        }
        session.relay_until_interrupted();
        debug!("Relay finished");
    }

    let disconnected = session.disconnect();
    ensure_done(programmed, "Programming")?;
    ensure_done(disconnected, "Disconnecting")
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &mut Config, yes: bool) -> Result<()> {
    let mut prompt = confirmation_prompt(cli, yes)?;
    if !prompt.confirm("This will erase the entire flash. Continue?") {
        return Err(CliError::Cancelled("Erase declined".to_string()).into());
    }

    let port = get_port(cli, config)?;
    let source = firmware::firmware_source(&cli.firmware_dir(config))?;
    let log = Arc::new(TerminalLog::new(use_fancy_output(), cli.quiet));
    let mut session = SessionController::new(
        EspHost::with_port(port),
        Box::new(source),
        prompt,
        log,
        session_config(cli, config),
    );

    ensure_done(session.connect(), "Connecting")?;
    let erased = session.erase();
    let disconnected = session.disconnect();
    ensure_done(erased, "Erasing")?;
    ensure_done(disconnected, "Disconnecting")
}
