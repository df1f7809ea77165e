//! Serial monitor command implementation.
//!
//! Device output is relayed line by line through the same read loop a
//! flashing session uses, until Ctrl-C or the port closes.

use {
    crate::{Cli, config::Config, get_port, terminal::TerminalLog, use_fancy_output, was_interrupted},
    anyhow::{Context, Result},
    console::style,
    ideaflash::{ReadLoop, SerialConfig, SerialTransport, transport::READ_POLL_INTERVAL},
    std::{sync::Arc, thread},
};

/// Run the serial monitor.
pub(crate) fn cmd_monitor(cli: &Cli, config: &mut Config, monitor_baud: u32) -> Result<()> {
    let port = get_port(cli, config)?;

    eprintln!(
        "{} Opening {} at {} baud",
        style("📡").cyan(),
        style(&port.name).green(),
        monitor_baud
    );
    eprintln!("{}", style("Press Ctrl-C to exit").dim());

    let transport = SerialTransport::open(&SerialConfig::new(&port.name, monitor_baud))
        .with_context(|| format!("Failed to open serial port {}", port.name))?;

    // Device output is the point of this command, so it is shown even with -q
    let log = Arc::new(TerminalLog::new(use_fancy_output(), false));
    let reader = ReadLoop::spawn(Box::new(transport), log, READ_POLL_INTERVAL)
        .context("Failed to start the serial reader")?;

    while reader.is_running() && !was_interrupted() {
        thread::sleep(READ_POLL_INTERVAL);
    }
    reader.cancel();

    eprintln!("{} Monitor closed", style("👋").cyan());
    Ok(())
}
