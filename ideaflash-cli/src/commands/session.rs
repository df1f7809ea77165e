//! Interactive session: the connect button, firmware selector and program
//! button as a terminal menu.

use {
    super::{confirmation_prompt, firmware, session_config},
    crate::{
        Cli, CliError,
        config::Config,
        serial::{map_prompt_error, select_serial_port},
        terminal::TerminalLog,
        use_fancy_output,
    },
    anyhow::Result,
    console::style,
    dialoguer::{Select, theme::ColorfulTheme},
    ideaflash::{
        Controls, EspHost, Host, LogSink, SessionController,
        display_name,
        loader::esp::PortPicker,
    },
    log::debug,
    std::{io::IsTerminal, sync::Arc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Connect,
    SelectFirmware,
    Program,
    ClearLog,
    Quit,
}

/// Menu entries for the current controls, in display order.
fn menu(controls: Controls, selected: Option<&str>) -> Vec<(Action, String)> {
    let firmware_label = match selected {
        Some(id) => format!("Select firmware ({})", display_name(id)),
        None => "Select firmware".to_string(),
    };
    let program_label = if controls.program_enabled {
        "Program".to_string()
    } else {
        "Program (connect first)".to_string()
    };

    vec![
        (Action::Connect, controls.connect_label.to_string()),
        (Action::SelectFirmware, firmware_label),
        (Action::Program, program_label),
        (Action::ClearLog, "Clear log".to_string()),
        (Action::Quit, "Quit".to_string()),
    ]
}

/// Port picker asking the same way as the other commands, on every connect.
fn port_picker(cli: &Cli, config: &Config) -> PortPicker {
    let options = cli.serial_options();
    let config = config.clone();
    Box::new(move || {
        select_serial_port(&options, &config)
            .map(|selected| selected.port)
            .map_err(|e| match e.downcast_ref::<CliError>() {
                Some(CliError::Cancelled(msg)) => ideaflash::Error::Cancelled(msg.clone()),
                _ => ideaflash::Error::Config(format!("{e:#}")),
            })
    })
}

/// `session` command implementation.
pub(crate) fn cmd_session(cli: &Cli, config: &Config) -> Result<()> {
    if cli.non_interactive || !std::io::stdin().is_terminal() {
        return Err(CliError::Usage(
            "The session command needs an interactive terminal; use `flash` instead".to_string(),
        )
        .into());
    }

    let source = firmware::firmware_source(&cli.firmware_dir(config))?;
    let log = Arc::new(TerminalLog::new(use_fancy_output(), cli.quiet));
    let mut session = SessionController::new(
        EspHost::new(port_picker(cli, config)),
        Box::new(source),
        confirmation_prompt(cli, false)?,
        log,
        session_config(cli, config),
    );

    loop {
        let items = menu(session.controls(), session.selected_firmware());
        let labels: Vec<&str> = items
            .iter()
            .map(|(_, label)| label.as_str())
            .collect();
        let prompt = match session.port_name() {
            Some(port) => format!("ideaflash [{}: {port}]", session.state()),
            None => format!("ideaflash [{}]", session.state()),
        };

        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&labels)
            .default(0)
            .interact_opt()
            .map_err(map_prompt_error)?;
        let Some(action) = choice.and_then(|idx| items.get(idx).map(|(action, _)| *action)) else {
            break;
        };
        debug!("Session action: {action:?}");

        match action {
            Action::Connect => {
                let _ = session.click_connect();
            },
            Action::SelectFirmware => pick_firmware(&mut session)?,
            Action::Program => {
                if session.controls().program_enabled {
                    let _ = session.program();
                } else {
                    session.log().error("Connect to a device first");
                }
            },
            Action::ClearLog => session.log().clean(),
            Action::Quit => break,
        }
    }

    if session.is_connected() {
        let _ = session.disconnect();
    }
    eprintln!("{} Bye", style("👋").cyan());
    Ok(())
}

fn pick_firmware<H: Host>(session: &mut SessionController<H>) -> Result<()> {
    let entries = session.catalog()?;
    if entries.is_empty() {
        session.log().error("No firmware images found");
        return Ok(());
    }

    let labels: Vec<String> = entries
        .iter()
        .map(|entry| format!("{} ({})", entry.id, entry.human_size()))
        .collect();
    let current = session
        .selected_firmware()
        .and_then(|id| entries.iter().position(|entry| entry.id == id))
        .unwrap_or(0);

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select firmware")
        .items(&labels)
        .default(current)
        .interact_opt()
        .map_err(map_prompt_error)?;
    if let Some(entry) = choice.and_then(|idx| entries.into_iter().nth(idx)) {
        session.select_firmware(Some(entry.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_when_disconnected() {
        let controls = Controls {
            connect_label: "Connect",
            program_enabled: false,
        };
        let items = menu(controls, None);
        assert_eq!(items[0], (Action::Connect, "Connect".to_string()));
        assert_eq!(items[1].1, "Select firmware");
        assert_eq!(items[2].1, "Program (connect first)");
        assert_eq!(items.last().map(|(a, _)| *a), Some(Action::Quit));
    }

    #[test]
    fn test_menu_when_connected_with_selection() {
        let controls = Controls {
            connect_label: "Disconnect",
            program_enabled: true,
        };
        let items = menu(controls, Some("firmware/ideaboardfirmware03202025.bin"));
        assert_eq!(items[0].1, "Disconnect");
        assert_eq!(items[1].1, "Select firmware (ideaboardfirmware03202025.bin)");
        assert_eq!(items[2], (Action::Program, "Program".to_string()));
    }
}
