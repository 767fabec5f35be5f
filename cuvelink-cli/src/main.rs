//! cuvelink CLI - Command-line tool for the cuvette analyzer MCU.
//!
//! ## Features
//!
//! - Read and stream live sensor status
//! - Drive LEDs, fans, and PWM duty cycles
//! - Calibrate cuvette occupancy detection
//! - Flash firmware through the on-chip bootloader
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use cuvelink::{EventSink, McuLink, SerialConfig};
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Set by the Ctrl-C handler, checked by long-running commands.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Whether Ctrl-C has been pressed since startup (or the last clear).
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Reset the interrupt flag after a command has honored it.
fn clear_interrupted_flag() {
    INTERRUPTED.store(false, Ordering::Relaxed);
}

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Baud rate used when neither the CLI nor the configuration names one.
/// Matches the analyzer MCU's UART.
const DEFAULT_BAUD: u32 = 115_200;

/// User-facing error classes with dedicated exit codes.
///
/// `Usage` maps to exit code 2 and `Cancelled` to 130; anything else
/// reported through anyhow exits with code 1.
#[derive(Debug)]
pub(crate) enum CliError {
    /// Bad invocation or environment setup.
    Usage(String),
    /// Operation cancelled by the user.
    Cancelled(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) | Self::Cancelled(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for CliError {}

/// cuvelink - Bench controller for the cuvette analyzer MCU.
///
/// Environment variables:
///   CUVELINK_PORT              - Default serial port
///   CUVELINK_BAUD              - Default baud rate (default: 115200)
///   CUVELINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "cuvelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/cuvelink/cuvelink")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "CUVELINK_PORT")]
    port: Option<String>,

    /// Baud rate for the serial link (default: 115200, or the configured value).
    #[arg(short, long, global = true, env = "CUVELINK_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "CUVELINK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Selectable measurement LEDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LedKind {
    /// White (broadband) measurement LED.
    White,
    /// Near-infrared measurement LED.
    Nir,
}

impl std::fmt::Display for LedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Nir => write!(f, "NIR"),
        }
    }
}

/// On/off argument for actuators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SwitchState {
    /// Drive the actuator on.
    On,
    /// Drive the actuator off.
    Off,
}

impl SwitchState {
    fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    Ports,

    /// Read one status frame and display it.
    Status {
        /// Response deadline in milliseconds.
        #[arg(long, default_value_t = 2000, value_name = "MS")]
        timeout: u64,
    },

    /// Poll status frames continuously until interrupted.
    Monitor {
        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 500, value_name = "MS")]
        interval: u64,

        /// Stop after this many frames.
        #[arg(long, value_name = "N")]
        count: Option<u64>,
    },

    /// Switch a measurement LED on or off.
    Led {
        /// Which LED to drive.
        #[arg(value_enum)]
        led: LedKind,

        /// Target state.
        #[arg(value_enum)]
        state: SwitchState,

        /// PWM duty percentage to apply along with the switch.
        #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
        duty: Option<u8>,
    },

    /// Switch a chassis fan on or off.
    Fan {
        /// Fan number (1-6).
        #[arg(value_parser = clap::value_parser!(u8).range(1..=6))]
        number: u8,

        /// Target state.
        #[arg(value_enum)]
        state: SwitchState,
    },

    /// Set an LED PWM duty cycle without touching its switch.
    Duty {
        /// Which LED to adjust.
        #[arg(value_enum)]
        led: LedKind,

        /// Duty percentage (0-100).
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Calibrate cuvette detection against an empty chamber.
    Calibrate {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Flash a firmware image through the bootloader.
    Flash {
        /// Path to the raw firmware image.
        firmware: PathBuf,

        /// Resume with a device already sitting in its bootloader.
        #[arg(long)]
        retry: bool,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Show or edit the configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configuration subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,

    /// Print the configuration file path in effect.
    Path,

    /// Set a configuration value (keys: port, baud).
    Set {
        /// Configuration key.
        key: String,

        /// New value.
        value: String,
    },

    /// Delete the global configuration file.
    Reset,
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection (clig.dev best practice) ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
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
        "cuvelink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

/// Print the error and pick the exit code for its class.
fn report_error(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(message)) => {
            eprintln!("{} {message}", style("Error:").red().bold());
            ExitCode::from(2)
        },
        Some(CliError::Cancelled(message)) => {
            eprintln!("{} {message}", style("Cancelled:").yellow().bold());
            ExitCode::from(130)
        },
        None => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // Second Ctrl-C: stop waiting for graceful teardown
            std::process::exit(130);
        }
    })
    .context("failed to install the Ctrl-C handler")?;

    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Ports => commands::ports::run(),
        Commands::Status { timeout } => {
            commands::status::run(cli, &mut config, Duration::from_millis(*timeout))
        },
        Commands::Monitor { interval, count } => {
            commands::monitor::run(cli, &mut config, Duration::from_millis(*interval), *count)
        },
        Commands::Led { led, state, duty } => {
            commands::actuate::led(cli, &mut config, *led, *state, *duty)
        },
        Commands::Fan { number, state } => {
            commands::actuate::fan(cli, &mut config, *number, *state)
        },
        Commands::Duty { led, percent } => {
            commands::actuate::duty(cli, &mut config, *led, *percent)
        },
        Commands::Calibrate { yes } => commands::calibrate::run(cli, &mut config, *yes),
        Commands::Flash {
            firmware,
            retry,
            yes,
        } => commands::flash::run(cli, &mut config, firmware, *retry, *yes),
        Commands::Config { action } => commands::config::run(cli, &mut config, action),
        Commands::Completions { shell } => {
            commands::completions::run(*shell);
            Ok(())
        },
    }
}

/// Get serial port from CLI args or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };

    let selected = select_serial_port(&options, config)?;

    // Ask to remember if not a known device and interactive mode
    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

/// Baud rate from the CLI flag, the configuration, or the wire default.
fn effective_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud.or(config.port.connection.baud).unwrap_or(DEFAULT_BAUD)
}

/// Open the serial link to the analyzer, resolving port and baud rate.
fn open_link(cli: &Cli, config: &mut Config, sink: Arc<dyn EventSink>) -> Result<McuLink> {
    let port = get_port(cli, config)?;
    let baud = effective_baud(cli, config);

    if !cli.quiet {
        eprintln!(
            "{} Connecting to {} at {baud} baud",
            style("🔌").cyan(),
            style(&port).bold()
        );
    }

    let serial = SerialConfig::new(&port, baud);
    McuLink::open(&serial, sink).with_context(|| format!("failed to open serial port {port}"))
}
