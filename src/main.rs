use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use z21_rs::cv::Register;
use z21_rs::decode::Reply;
use z21_rs::protocol::{FunctionAction, SpeedSteps};
use z21_rs::{Config, DecoderModel, Z21};

/// Control a Z21 command station over its LAN interface.
///
/// Connection settings fall back to Z21_HOST, Z21_PORT, Z21_TIMEOUT_MS and Z21_VERBOSE.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of the command station.
    #[arg(long)]
    host: Option<String>,
    /// UDP port of the command station.
    #[arg(long)]
    port: Option<u16>,
    /// Receive window in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,
    /// Log every datagram as hex (visible with -v).
    #[arg(long)]
    dump: bool,
    /// Decoder on the programming track or addressed loco (generic, lokpilot5, loksound5, switchpilot).
    #[arg(long, default_value = "generic")]
    decoder: DecoderModel,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serial number, versions, hardware info, lock state and system state.
    Info,
    /// Switch track power on or off.
    Power {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Drive a loco; negative speed reverses.
    Drive {
        loco: u16,
        #[arg(allow_negative_numbers = true)]
        speed: i32,
        /// Drive backwards (flips the sign of the speed).
        #[arg(long)]
        reverse: bool,
        /// Speed steps: 14, 28 or 128.
        #[arg(long, default_value_t = 128)]
        steps: u16,
    },
    /// Stop a loco.
    Stop { loco: u16 },
    /// Emergency-stop a loco.
    Estop { loco: u16 },
    /// Emergency-stop every loco.
    StopAll,
    /// Switch a loco function (F0..F31).
    Function {
        loco: u16,
        index: u8,
        /// on, off or toggle
        action: FunctionAction,
    },
    /// Show what the command station knows about a loco.
    LocoInfo { loco: u16 },
    /// Throw a turnout to output 1 or 2.
    Turnout {
        address: u16,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        output: u8,
    },
    /// Show the position of a turnout.
    TurnoutInfo { address: u16 },
    /// Raw CV access on the programming track.
    Cv {
        #[command(subcommand)]
        action: CvCmd,
    },
    /// Named decoder registers.
    Register {
        #[command(subcommand)]
        action: RegisterCmd,
    },
    /// Reset the decoder on the programming track to factory defaults.
    ResetDecoder,
    /// Enable the brake sound of a LokSound decoder.
    BrakeSound,
    /// Send a hex datagram and print the reply.
    Raw { hex: String },
}

#[derive(Subcommand, Debug)]
enum CvCmd {
    Read {
        id: u16,
        #[arg(long, default_value_t = 0)]
        page: u8,
    },
    Write {
        id: u16,
        value: u8,
        #[arg(long, default_value_t = 0)]
        page: u8,
    },
}

#[derive(Subcommand, Debug)]
enum RegisterCmd {
    List,
    Read { name: String },
    Write { name: String, value: u8 },
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v, TRACE with -vv
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env().context("Invalid Z21_* environment")?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ms) = cli.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    config.verbose |= cli.dump;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("Command failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let z21 = Z21::connect(&config)
        .await
        .with_context(|| format!("Failed to reach command station at {}", config.address()))?
        .with_decoder(cli.decoder);

    let result = execute(&z21, cli.command).await;
    z21.close().await.context("Failed to close connection")?;
    result
}

async fn execute(z21: &Z21, command: Cmd) -> Result<()> {
    match command {
        Cmd::Info => print_info(z21).await?,
        Cmd::Power { state } => match state.as_str() {
            "on" => z21.set_track_power_on().await?,
            _ => z21.set_track_power_off().await?,
        },
        Cmd::Drive {
            loco,
            speed,
            reverse,
            steps,
        } => {
            let steps = SpeedSteps::from_count(steps)?;
            z21.loco_drive(loco, speed, !reverse, steps)
                .await
                .with_context(|| format!("Failed to drive loco {loco}"))?;
        }
        Cmd::Stop { loco } => z21.stop(loco).await?,
        Cmd::Estop { loco } => z21.e_stop(loco).await?,
        Cmd::StopAll => z21.set_stop().await?,
        Cmd::Function { loco, index, action } => z21.loco_function(loco, index, action).await?,
        Cmd::LocoInfo { loco } => {
            let info = z21.get_loco_info(loco).await?;
            let steps = info.speed_steps.map(|s| s.to_string()).unwrap_or_else(|| "unknown steps".into());
            println!(
                "Loco {}: speed {} {} ({}){}{}",
                info.address,
                info.speed(),
                if info.forward { "forward" } else { "reverse" },
                steps,
                if info.is_e_stopped() { ", e-stop" } else { "" },
                if info.busy { ", controlled elsewhere" } else { "" }
            );
            let on: Vec<String> = (0..32).filter(|&f| info.function(f)).map(|f| format!("F{f}")).collect();
            println!("Functions on: {}", if on.is_empty() { "none".into() } else { on.join(" ") });
        }
        Cmd::Turnout { address, output } => z21.set_turnout(address, output == 2).await?,
        Cmd::TurnoutInfo { address } => {
            let info = z21.get_turnout_info(address).await?;
            println!("Turnout {}: {}", info.address, info.state);
        }
        Cmd::Cv { action } => match action {
            CvCmd::Read { id, page } => {
                let value = z21.read_cv(id, page).await.with_context(|| format!("Failed to read CV{id}"))?;
                println!("CV{id} = {value} (0x{value:02X})");
            }
            CvCmd::Write { id, value, page } => {
                z21.write_cv(id, value, page)
                    .await
                    .with_context(|| format!("Failed to write CV{id}"))?;
                info!("CV{} = {}", id, value);
            }
        },
        Cmd::Register { action } => match action {
            RegisterCmd::List => {
                for register in Register::ALL {
                    let spec = register.spec();
                    let supported = if z21.decoder().supports_register(register) { "" } else { " (unsupported)" };
                    println!(
                        "{:<24} CV{:<4} page {:<2} {}..={} {}{}",
                        register.to_string(),
                        spec.cv,
                        spec.page,
                        spec.min,
                        spec.max,
                        spec.access,
                        supported
                    );
                }
            }
            RegisterCmd::Read { name } => {
                let register = parse_register(&name)?;
                let value = z21.read_register(register).await?;
                println!("{register} = {value}");
            }
            RegisterCmd::Write { name, value } => {
                let register = parse_register(&name)?;
                z21.write_register(register, value).await?;
                info!("{} = {}", register, value);
            }
        },
        Cmd::ResetDecoder => z21.reset_decoder().await?,
        Cmd::BrakeSound => z21.set_brake_sound_on().await?,
        Cmd::Raw { hex } => {
            let datagram = hex::decode(hex.replace([' ', ':'], "")).context("Datagram is not valid hex")?;
            let reply = z21.transact_raw(&datagram).await?;
            println!("{}", hex::encode(&reply));
            println!("{:?}", Reply::parse(&reply)?);
        }
    }
    Ok(())
}

fn parse_register(name: &str) -> Result<Register> {
    match Register::from_name(name) {
        Some(register) => Ok(register),
        None => bail!("Unknown register '{}', see `register list`", name),
    }
}

async fn print_info(z21: &Z21) -> Result<()> {
    println!("Serial number:  {}", z21.get_serial_number().await?);
    println!("Version:        {}", z21.get_version().await?);
    println!("Firmware:       {}", z21.get_firmware_version().await?);

    let hw = z21.get_hardware_info().await?;
    println!("Hardware type:  0x{:08X}", hw.hardware_type);
    println!("HW firmware:    0x{:08X}", hw.firmware_version);

    match z21.get_lan_code().await? {
        Some(lock) => println!("Lock state:     {lock}"),
        None => println!("Lock state:     unknown"),
    }

    let state = z21.get_system_state().await?;
    println!("System state:   {state}");
    match state.capabilities {
        Some(caps) => println!(
            "Capabilities:   dcc={} mm={} railcom={} loco={} accessory={} detector={} unlock-code={}",
            caps.dcc(),
            caps.mm(),
            caps.railcom(),
            caps.loco_cmds(),
            caps.accessory_cmds(),
            caps.detector_cmds(),
            caps.needs_unlock_code()
        ),
        None => println!("Capabilities:   not reported by this firmware"),
    }
    Ok(())
}
