//! Interactive serial port selection.
//!
//! Order of preference:
//! - a port named on the command line or in the config
//! - a single recognized ESP32 USB bridge
//! - an interactive pick via dialoguer (never in non-interactive mode)

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    ideaflash::{DetectedPort, discover_ports},
    log::{debug, error, info},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unknown types).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
    /// Force confirmation even for single recognized port.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
pub struct SelectedPort {
    /// The selected port info.
    pub port: DetectedPort,
    /// Whether this port matched a known/configured device.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn cancelled_err() -> anyhow::Error {
    CliError::Cancelled("Port selection cancelled".to_string()).into()
}

fn only_port(mut ports: Vec<DetectedPort>) -> Option<DetectedPort> {
    if ports.len() == 1 { ports.pop() } else { None }
}

fn select_non_interactive_port(
    selection_ports: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    // Exactly one candidate is the only deterministic choice
    match selection_ports.len() {
        0 => Err(usage_err("No serial ports available")),
        1 => {
            let port = only_port(selection_ports).ok_or_else(|| usage_err("No serial ports available"))?;
            Ok(SelectedPort {
                is_known: is_known_device(&port, config),
                port,
            })
        },
        n => Err(usage_err(&format!(
            "{n} serial ports found; pass --port to choose one in non-interactive mode"
        ))),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    if let Some(port_name) = &config
        .port
        .connection
        .serial
    {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    let ports = discover_ports();
    if ports.is_empty() {
        return Err(usage_err("No serial ports found"));
    }

    let known_ports: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();

    // Known bridges first unless the user asks for all
    let selection_ports = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return select_non_interactive_port(selection_ports, config);
    }

    if selection_ports.len() > 1 {
        ensure_interactive_terminal()?;
        return select_port_interactive(selection_ports, config);
    }

    let port = only_port(selection_ports).ok_or_else(|| usage_err("No serial ports available"))?;
    let is_known = is_known_device(&port, config);
    if is_known && !options.confirm_port {
        info!(
            "Auto-selected port: {} [{}]",
            port.name,
            port.device
                .name()
        );
        Ok(SelectedPort { port, is_known })
    } else {
        ensure_interactive_terminal()?;
        confirm_single_port(port)
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port instead",
        ))
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                cancelled_err()
            } else {
                usage_err(&format!("Prompt failed: {io_err}"))
            }
        },
    }
}

/// Find a port by name, falling back to a bare placeholder.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = discover_ports();

    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| {
            // Windows port names are case-insensitive
            ports
                .iter()
                .find(|p| {
                    p.name
                        .eq_ignore_ascii_case(name)
                })
        });

    match found {
        Some(port) => SelectedPort {
            port: port.clone(),
            is_known: port
                .device
                .is_known(),
        },
        None => SelectedPort {
            port: DetectedPort::named(name),
            is_known: false,
        },
    }
}

/// Check if a port matches a known device (from config or built-in list).
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port
        .device
        .is_known()
    {
        return true;
    }

    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config
            .port
            .usb_device
            .iter()
            .any(|device| device.matches(vid, pid)),
        _ => false,
    }
}

fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name)
            .bold()
            .to_string()
    } else {
        port.name
            .clone()
    };

    let device_info = if port
        .device
        .is_known()
    {
        format!(
            " [{}]",
            style(
                port.device
                    .name()
            )
            .yellow()
        )
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{device_info}{product}")
}

fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );
    eprintln!(
        "{}",
        style("Recognized ESP32 USB bridges are shown in bold").dim()
    );

    ports.sort_by_key(|p| !is_known_device(p, config));

    // Keep labels on one line in narrow terminals
    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|port| {
            console::truncate_str(&port_label(port, config), max_item_width, "\u{2026}")
                .into_owned()
        })
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the Ideaboard's serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    let Some(index) = selection else {
        return Err(cancelled_err());
    };
    let port = ports
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
    let is_known = is_known_device(&port, config);
    Ok(SelectedPort { port, is_known })
}

fn confirm_single_port(port: DetectedPort) -> Result<SelectedPort> {
    let product_info = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use serial port {}{product_info}?", port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        Err(cancelled_err())
    }
}

/// Ask user if they want to remember this port.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config
        .port
        .usb_device
        .iter()
        .any(|device| device.matches(vid, pid))
    {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this device for automatic selection?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}
