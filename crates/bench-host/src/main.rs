//! benchctl: command-line front end for benchlink.
//!
//! Drives a text instrument on a serial port and the USB HID relay board.
//!
//! # Usage
//!
//! ```text
//! benchctl [--config <FILE>] [--log-level <LEVEL>] [--json] <COMMAND>
//!
//! Commands:
//!   ports                         List serial ports
//!   relay list                    List attached relay boards
//!   relay status                  Show every relay
//!   relay get <SEL>               Logical state of one relay
//!   relay set <SEL> <on|off>      Drive one relay, or `all`
//!   relay toggle <SEL>            Invert one relay, or `all`
//!   relay connected <SEL>         Whether the load circuit is closed
//!   relay open-all | close-all    Every relay off / on
//!   relay set-serial <SERIAL>     Rewrite the board serial
//!   scpi identify                 *IDN?
//!   scpi query <CMD>              Send a query, print the reply
//!   scpi write <CMD>              Send a command, no reply expected
//!   scpi checked <CMD>            Send a command, then check the error queue
//!   scpi status                   Decode the status word
//!   scpi timer <CH> <GROUP>       Read one timer group
//!   scpi setpoint <TPL> <CH> <V>  Program a calibrated set point
//! ```
//!
//! `<SEL>` is a relay number, a channel name from the config file, or `all`.
//!
//! # Environment variable overrides
//!
//! | Variable           | Description                          |
//! |--------------------|--------------------------------------|
//! | `BENCHLINK_CONFIG` | Config file path                     |
//! | `BENCHLINK_PORT`   | Serial port of the text instrument   |
//! | `RUST_LOG`         | Log filter, overrides `--log-level`  |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bench_core::relay::{RelayController, RelaySelector};
use bench_core::scpi::CommandChannel;
use bench_host::application::instrument_session::{
    InstrumentAction, InstrumentOutcome, InstrumentSession,
};
use bench_host::application::relay_control::{run_relay_action, RelayAction, RelayOutcome};
use bench_host::infrastructure::serial::{available_ports, SerialSettings, SerialTransport};
use bench_host::infrastructure::storage::config::{load_config, BenchConfig, ConfigError};
use bench_host::infrastructure::usb_relay::{
    list_relay_boards, open_first_relay_board, DEFAULT_TRANSFER_TIMEOUT,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bench instrument and relay board control.
#[derive(Debug, Parser)]
#[command(
    name = "benchctl",
    about = "Control serial bench instruments and the USB HID relay board",
    version
)]
struct Cli {
    /// Config file.  Falls back to `$BENCHLINK_CONFIG`, then the platform
    /// config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List serial ports present on this machine.
    Ports,
    /// USB relay board commands.
    Relay(RelayArgs),
    /// Text instrument commands.
    Scpi(ScpiArgs),
}

#[derive(Debug, Args)]
struct RelayArgs {
    /// Control transfer timeout in milliseconds.  Defaults to the config
    /// value.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: RelayCommand,
}

#[derive(Debug, Subcommand)]
enum RelayCommand {
    List,
    Status,
    Get {
        selector: String,
    },
    Set {
        selector: String,
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        state: bool,
    },
    Toggle {
        selector: String,
    },
    Connected {
        selector: String,
    },
    OpenAll,
    CloseAll,
    SetSerial {
        serial: String,
    },
}

#[derive(Debug, Args)]
struct ScpiArgs {
    /// Serial port.  Defaults to the config value.
    #[arg(long, env = "BENCHLINK_PORT")]
    port: Option<String>,

    /// Baud rate.  Defaults to the config value.
    #[arg(long)]
    baud: Option<u32>,

    /// Per-read timeout in milliseconds.  Defaults to the config value.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: ScpiCommand,
}

#[derive(Debug, Subcommand)]
enum ScpiCommand {
    Identify,
    Query {
        command: String,
    },
    Write {
        command: String,
    },
    Checked {
        command: String,
    },
    Status,
    Timer {
        channel: u8,
        group: u8,
    },
    Setpoint {
        /// Command template with `{channel}` and `{value}` placeholders.
        template: String,
        channel: u8,
        value: f64,
    },
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level.  Logs go to stderr so stdout stays
    // parseable with --json.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ports => {
            let ports = available_ports().context("failed to enumerate serial ports")?;
            if cli.json {
                print_json(&ports)?;
            } else {
                for port in ports {
                    println!("{port}");
                }
            }
            Ok(())
        }
        Command::Relay(args) => run_relay(cli.config, cli.json, args),
        Command::Scpi(args) => run_scpi(cli.config, cli.json, args),
    }
}

// ── Relay board ───────────────────────────────────────────────────────────────

fn run_relay(config_path: Option<PathBuf>, json: bool, args: RelayArgs) -> anyhow::Result<()> {
    let action = match args.command {
        RelayCommand::List => {
            let boards = list_relay_boards().context("failed to enumerate USB devices")?;
            if json {
                print_json(&boards)?;
            } else if boards.is_empty() {
                println!("no relay boards found");
            } else {
                for board in boards {
                    println!("bus {:03} address {:03}  {}", board.bus, board.address, board.product);
                }
            }
            return Ok(());
        }
        RelayCommand::Status => RelayAction::Status,
        RelayCommand::Get { selector } => RelayAction::Get(RelaySelector::from(selector)),
        RelayCommand::Set { selector, state } => {
            RelayAction::Set(RelaySelector::from(selector), state)
        }
        RelayCommand::Toggle { selector } => RelayAction::Toggle(RelaySelector::from(selector)),
        RelayCommand::Connected { selector } => {
            RelayAction::Connected(RelaySelector::from(selector))
        }
        RelayCommand::OpenAll => RelayAction::OpenAll,
        RelayCommand::CloseAll => RelayAction::CloseAll,
        RelayCommand::SetSerial { serial } => RelayAction::SetSerial(serial),
    };

    let config = load_config(config_path.as_deref()).context("relay commands need a config file")?;
    let relay_config = config
        .relay_config()
        .context("invalid [relay] section in config")?;
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .or_else(|| config.relay.as_ref().map(|r| r.transfer_timeout()))
        .unwrap_or(DEFAULT_TRANSFER_TIMEOUT);

    let device = open_first_relay_board(timeout).context("failed to open relay board")?;
    let mut controller =
        RelayController::new(device, relay_config).context("failed to initialise relay board")?;
    info!(
        product = controller.product(),
        serial = controller.serial(),
        relays = controller.num_relays(),
        "relay board ready"
    );

    let outcome = run_relay_action(&mut controller, action)?;
    controller.close();

    if json {
        print_json(&outcome)
    } else {
        print_relay_outcome(&outcome);
        Ok(())
    }
}

fn print_relay_outcome(outcome: &RelayOutcome) {
    match outcome {
        RelayOutcome::Status {
            product,
            serial,
            relays,
        } => {
            println!("{product}  serial {serial}");
            for r in relays {
                let connected = match r.connected {
                    Some(true) => "connected",
                    Some(false) => "open",
                    None => "-",
                };
                println!(
                    "  {:>2} {:<12} {:<3} {}",
                    r.relay,
                    r.name.as_deref().unwrap_or("-"),
                    if r.state { "on" } else { "off" },
                    connected
                );
            }
        }
        RelayOutcome::State { selector, on } => {
            println!("{selector}: {}", if *on { "on" } else { "off" });
        }
        RelayOutcome::Connected {
            selector,
            connected,
        } => println!("{selector}: {}", if *connected { "connected" } else { "open" }),
        RelayOutcome::Serial(status) => println!("serial {}", status.serial),
        RelayOutcome::Done => {}
    }
}

// ── Text instrument ───────────────────────────────────────────────────────────

/// Loads the config for instrument commands.  A missing file is not fatal
/// here: the command line can supply the port.
fn instrument_config(path: Option<PathBuf>) -> anyhow::Result<BenchConfig> {
    match load_config(path.as_deref()) {
        Ok(config) => Ok(config),
        Err(ConfigError::Missing(p)) => {
            warn!(path = %p.display(), "config file not found, using defaults");
            Ok(BenchConfig::default())
        }
        Err(ConfigError::NoPlatformConfigDir) => Ok(BenchConfig::default()),
        Err(e) => Err(e).context("failed to load config"),
    }
}

fn run_scpi(config_path: Option<PathBuf>, json: bool, args: ScpiArgs) -> anyhow::Result<()> {
    let config = instrument_config(config_path)?;

    let Some(port) = args.port.or_else(|| config.serial.port.clone()) else {
        bail!("no serial port given: pass --port, set BENCHLINK_PORT or [serial] port");
    };
    let settings = SerialSettings {
        port,
        baud_rate: args.baud.unwrap_or(config.serial.baud_rate),
        read_timeout: args
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.serial.read_timeout()),
    };

    let action = match args.command {
        ScpiCommand::Identify => InstrumentAction::Identify,
        ScpiCommand::Query { command } => InstrumentAction::Query(command),
        ScpiCommand::Write { command } => InstrumentAction::Write(command),
        ScpiCommand::Checked { command } => InstrumentAction::Checked(command),
        ScpiCommand::Status => InstrumentAction::Status,
        ScpiCommand::Timer { channel, group } => InstrumentAction::Timer { channel, group },
        ScpiCommand::Setpoint {
            template,
            channel,
            value,
        } => InstrumentAction::Setpoint {
            template,
            channel,
            value,
        },
    };

    let calibration = config
        .channel_calibration()
        .context("invalid [calibration] section in config")?;
    let transport = SerialTransport::open(&settings)
        .with_context(|| format!("failed to open serial port {}", settings.port))?;
    let mut session =
        InstrumentSession::new(CommandChannel::with_framer(transport, config.scpi.framer()))
            .with_error_register(config.scpi.error_register())
            .with_status_query(config.scpi.status_query.clone())
            .with_channel_count(config.scpi.channel_count)
            .with_calibration(calibration);

    let outcome = session.run(action)?;
    session.close();

    if json {
        print_json(&outcome)
    } else {
        print_instrument_outcome(&outcome);
        Ok(())
    }
}

fn print_instrument_outcome(outcome: &InstrumentOutcome) {
    match outcome {
        InstrumentOutcome::Response { text } => println!("{text}"),
        InstrumentOutcome::Status { raw, decoded } => {
            println!("status {raw}");
            println!("  {decoded:#?}");
        }
        InstrumentOutcome::Timer(group) => println!(
            "{} V  {} A  {} s",
            group.voltage, group.current, group.seconds
        ),
        InstrumentOutcome::Done => {}
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_switch_accepts_on_off() {
        assert_eq!(parse_switch("ON"), Ok(true));
        assert_eq!(parse_switch("off"), Ok(false));
        assert!(parse_switch("maybe").is_err());
    }

    #[test]
    fn test_relay_set_parses_selector_and_state() {
        let cli = Cli::parse_from(["benchctl", "relay", "set", "dut", "on"]);
        match cli.command {
            Command::Relay(RelayArgs {
                command: RelayCommand::Set { selector, state },
                ..
            }) => {
                assert_eq!(selector, "dut");
                assert!(state);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_scpi_timer_parses_channel_and_group() {
        let cli = Cli::parse_from([
            "benchctl", "--json", "scpi", "--port", "COM3", "timer", "2", "4",
        ]);
        assert!(cli.json);
        match cli.command {
            Command::Scpi(ScpiArgs {
                port,
                command: ScpiCommand::Timer { channel, group },
                ..
            }) => {
                assert_eq!(port.as_deref(), Some("COM3"));
                assert_eq!((channel, group), (2, 4));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
