//! ideaflash CLI - Command-line tool for flashing ESP32 Ideaboards.
//!
//! ## Features
//!
//! - Erase and program an Ideaboard firmware image in one step
//! - Interactive session with connect/disconnect, firmware selection and program
//! - Relay device output after flashing or as a plain serial monitor
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    ideaflash::{DetectedPort, session::DEFAULT_BAUD},
    log::debug,
    std::{
        env,
        path::PathBuf,
        process::ExitCode,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;
mod serial;
mod terminal;

use {
    config::Config,
    serial::{SerialOptions, ask_remember_port, select_serial_port},
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed since startup.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing input (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user backed out or pressed Ctrl-C (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// ideaflash - Flash firmware onto ESP32 Ideaboards over a serial port.
///
/// Environment variables:
///   IDEAFLASH_PORT              - Default serial port
///   IDEAFLASH_BAUD              - Default baud rate (default: 921600)
///   IDEAFLASH_FIRMWARE_DIR      - Directory searched for firmware images
///   IDEAFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "ideaflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
#[command(after_help = "Examples:\n  \
    ideaflash flash firmware/ideaboardfirmware03202025.bin --monitor\n  \
    ideaflash --port /dev/ttyUSB0 erase --yes\n  \
    ideaflash session")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "IDEAFLASH_PORT")]
    port: Option<String>,

    /// Baud rate for the flashing session.
    #[arg(short, long, global = true, env = "IDEAFLASH_BAUD")]
    baud: Option<u32>,

    /// Directory firmware identifiers are resolved against.
    #[arg(long, global = true, env = "IDEAFLASH_FIRMWARE_DIR", value_name = "DIR")]
    firmware_dir: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "IDEAFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Erase the flash and program a firmware image.
    Flash {
        /// Firmware identifier relative to the firmware directory
        /// (picked from the catalogue if omitted).
        firmware: Option<String>,

        /// Skip the erase/program confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Do not reset the device after programming.
        #[arg(long)]
        no_reset: bool,

        /// Keep showing device output after flashing until Ctrl-C.
        #[arg(long)]
        monitor: bool,

        /// Flash offset to write the image at.
        #[arg(long, value_parser = parse_hex_u32, value_name = "HEX")]
        offset: Option<u32>,
    },

    /// Interactive session: connect, select firmware, program.
    Session,

    /// Erase the entire flash.
    Erase {
        /// Skip the confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// List firmware images in the firmware directory.
    Firmware {
        /// Output the catalogue as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show device output without flashing.
    Monitor {
        /// Baud rate for monitoring.
        #[arg(long, default_value = "115200")]
        monitor_baud: u32,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let s: String = s
        .chars()
        .filter(|c| *c != '_')
        .collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

impl Cli {
    /// Session baud rate: flag/env, then config, then the default.
    fn session_baud(&self, config: &Config) -> u32 {
        self.baud
            .or(config
                .port
                .connection
                .baud)
            .unwrap_or(DEFAULT_BAUD)
    }

    /// Firmware directory: flag/env, then config, then `.`.
    fn firmware_dir(&self, config: &Config) -> PathBuf {
        self.firmware_dir
            .clone()
            .unwrap_or_else(|| {
                config
                    .flash
                    .firmware_dir()
            })
    }

    fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            port: self
                .port
                .clone(),
            list_all_ports: self.list_all_ports,
            non_interactive: self.non_interactive,
            confirm_port: self.confirm_port,
        }
    }
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    if matches!(
        err.downcast_ref::<ideaflash::Error>(),
        Some(ideaflash::Error::Cancelled(_))
    ) || was_interrupted()
    {
        return 130;
    }
    1
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ideaflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // First Ctrl-C asks loops to stop, the second one exits immediately
    if let Err(e) = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    ideaflash::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            yes,
            no_reset,
            monitor,
            offset,
        } => commands::flash::cmd_flash(
            cli,
            &mut config,
            &commands::flash::FlashArgs {
                firmware: firmware.clone(),
                yes: *yes,
                no_reset: *no_reset,
                monitor: *monitor,
                offset: *offset,
            },
        ),
        Commands::Session => commands::session::cmd_session(cli, &config),
        Commands::Erase { yes } => commands::flash::cmd_erase(cli, &mut config, *yes),
        Commands::Firmware { json } => commands::firmware::cmd_firmware(cli, &config, *json),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Monitor { monitor_baud } => {
            commands::monitor::cmd_monitor(cli, &mut config, *monitor_baud)
        },
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g. `ideaflash completions bash`, \
                         or use `ideaflash completions --install`"
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            }
        },
    }
}

/// Get serial port from CLI args or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<DetectedPort> {
    let selected = select_serial_port(&cli.serial_options(), config)?;

    // Offer to remember ports that were not recognized automatically
    if !selected.is_known && !cli.non_interactive && cli.port.is_none() {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port)
}
