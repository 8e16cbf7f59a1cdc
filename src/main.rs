//! CLI Entry Point for serial-scope
//!
//! Headless host for the scope library:
//! - `monitor`: stream from a serial port and print live statistics
//! - `simulate`: the same against the built-in simulated instrument
//! - `alc`: read, write, check or list ALC parameters
//! - `ports` / `capacity`: small helpers
//!
//! # Usage
//!
//! ```bash
//! serial-scope monitor --port /dev/ttyUSB0 --timebase "5 ms/div"
//! serial-scope alc get --port /dev/ttyUSB0
//! serial-scope alc set --port /dev/ttyUSB0 --param mode=0 --param attack_time_us=500
//! serial-scope simulate --duration 5s --json
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serial_scope::acquisition::AcquisitionConfig;
use serial_scope::alc::{validate, AlcField, AlcParameterRecord, CommandChannel};
use serial_scope::config::ScopeConfig;
use serial_scope::serial::{self, SimulatedInstrument};
use serial_scope::session::{ScopeEvent, ScopeSession, TickHandler};
use serial_scope::units::{format_frequency, format_timebase, format_voltage, parse_timebase, parse_volts_per_div};
use serial_scope::{tracing_setup, Frame, ScopeError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "serial-scope")]
#[command(about = "Serial waveform monitor and ALC parameter tool", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/serial_scope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream from a serial port and print live statistics
    Monitor {
        /// Serial port (falls back to serial.port in the config)
        #[arg(long)]
        port: Option<String>,

        /// Baud rate (falls back to serial.baud_rate in the config)
        #[arg(long)]
        baud: Option<u32>,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Run the scope against the built-in simulated instrument
    Simulate {
        /// Sine frequency in Hz
        #[arg(long)]
        frequency: Option<f64>,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Read, write or check ALC parameters
    Alc {
        #[command(subcommand)]
        action: AlcCommand,
    },

    /// List serial ports visible to the OS
    Ports,

    /// Show buffer sizing for a sample rate and timebase
    Capacity {
        /// Sample rate in Hz
        #[arg(long)]
        sample_rate: f64,

        /// Timebase, e.g. "10 ms/div"
        #[arg(long)]
        timebase: String,
    },
}

#[derive(Subcommand)]
enum AlcCommand {
    /// Read the parameter block from the device
    Get {
        #[command(flatten)]
        target: AlcTarget,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and write a parameter block
    Set {
        #[command(flatten)]
        target: AlcTarget,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Check a parameter block without sending it
    Validate {
        #[command(flatten)]
        params: ParamArgs,
    },

    /// List fields with defaults, ranges and descriptions
    Defaults,
}

#[derive(Args)]
struct ScopeArgs {
    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Timebase, e.g. "10 ms/div"
    #[arg(long)]
    timebase: Option<String>,

    /// Vertical scale, e.g. "500 mV"
    #[arg(long)]
    volts_per_div: Option<String>,

    /// Volts represented by one ADC count
    #[arg(long)]
    volts_per_count: Option<f64>,

    /// Stop after this long (e.g. "10s"); runs until Ctrl+C otherwise
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Print every Nth frame
    #[arg(long, default_value_t = 10)]
    every: u64,

    /// Print frames as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AlcTarget {
    /// Serial port (falls back to serial.port in the config)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Talk to the simulated instrument instead of a port
    #[arg(long)]
    simulate: bool,
}

#[derive(Args)]
struct ParamArgs {
    /// TOML file of `name = value` entries applied over the defaults
    #[arg(long)]
    file: Option<PathBuf>,

    /// Single override, repeatable
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(text).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ScopeConfig::load_from(path),
        None => ScopeConfig::load(),
    }
    .context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
        config.validate()?;
    }
    tracing_setup::init_from_config(&config)?;

    match cli.command {
        Commands::Monitor { port, baud, scope } => monitor(config, port, baud, scope).await,
        Commands::Simulate { frequency, scope } => simulate(config, frequency, scope).await,
        Commands::Alc { action } => alc(config, action).await,
        Commands::Ports => {
            let ports = serial::available_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
        Commands::Capacity {
            sample_rate,
            timebase,
        } => capacity(&config, sample_rate, &timebase),
    }
}

fn acquisition_from(base: AcquisitionConfig, args: &ScopeArgs) -> Result<AcquisitionConfig> {
    let mut acquisition = base;
    if let Some(rate) = args.sample_rate {
        acquisition.sample_rate_hz = rate;
    }
    if let Some(text) = &args.timebase {
        acquisition.timebase_s_per_div =
            parse_timebase(text).ok_or_else(|| anyhow!("invalid timebase '{text}'"))?;
    }
    if let Some(text) = &args.volts_per_div {
        acquisition.volts_per_div =
            parse_volts_per_div(text).ok_or_else(|| anyhow!("invalid volts per division '{text}'"))?;
    }
    if let Some(vpc) = args.volts_per_count {
        acquisition.volts_per_count = vpc;
    }
    acquisition.validate()?;
    Ok(acquisition)
}

fn resolve_port(config: &ScopeConfig, port: Option<String>) -> Result<String> {
    port.or_else(|| Some(config.serial.port.clone()).filter(|p| !p.is_empty()))
        .ok_or_else(|| anyhow!("no serial port given; use --port or set serial.port"))
}

async fn monitor(
    mut config: ScopeConfig,
    port: Option<String>,
    baud: Option<u32>,
    args: ScopeArgs,
) -> Result<()> {
    config.acquisition = acquisition_from(config.acquisition, &args)?;
    let port = resolve_port(&config, port)?;
    let baud = baud.unwrap_or(config.serial.baud_rate);

    let mut session = ScopeSession::new(&config)?;
    session
        .connect(&port, baud)
        .await
        .with_context(|| format!("connecting to {port}"))?;

    let result = run_ticks(&mut session, config.display.tick_interval, &args).await;
    session.disconnect().await;
    result
}

async fn simulate(mut config: ScopeConfig, frequency: Option<f64>, args: ScopeArgs) -> Result<()> {
    config.acquisition = acquisition_from(config.acquisition, &args)?;
    if let Some(frequency) = frequency {
        config.simulator.frequency_hz = frequency;
    }
    config.simulator.sample_rate_hz = config.acquisition.sample_rate_hz;
    config.validate()?;

    let instrument = SimulatedInstrument::new(config.simulator.clone());
    let (io, device) = instrument.spawn();

    let mut session = ScopeSession::new(&config)?;
    session.attach("simulator", io)?;

    // Exercise the command path while the stream is running.
    let params = session.commands()?.get().await?;
    info!(
        mode = params.get(AlcField::Mode),
        group = params.get(AlcField::Group),
        "Simulated instrument parameters"
    );

    let result = run_ticks(&mut session, config.display.tick_interval, &args).await;
    session.disconnect().await;
    device.abort();
    result
}

async fn run_ticks(session: &mut ScopeSession, tick: Duration, args: &ScopeArgs) -> Result<()> {
    let acquisition = *session.scope().config();
    info!(
        timebase = %format_timebase(acquisition.timebase_s_per_div),
        capacity = acquisition.buffer_capacity(),
        "Monitoring; press Ctrl+C to stop"
    );

    let deadline = args.duration.map(|d| Instant::now() + d);
    let every = args.every.max(1);
    let mut ticker = tokio::time::interval(tick);
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        match session.on_tick() {
            Some(ScopeEvent::Frame(frame)) => {
                frames += 1;
                if frames % every == 0 {
                    print_frame(&frame, args.json)?;
                }
            }
            Some(ScopeEvent::ConnectionLost { port, reason }) => {
                bail!("connection to {port} lost: {reason}");
            }
            None => {}
        }
    }
    Ok(())
}

fn print_frame(frame: &Frame, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(frame)?);
        return Ok(());
    }
    let stats = &frame.stats;
    println!(
        "Min: {:>10}  Max: {:>10}  Vpp: {:>10}  RMS: {:>10}  Freq: {:>9}  Latest: {:>10}  Samples: {}  Dropped: {}",
        format_voltage(stats.min),
        format_voltage(stats.max),
        format_voltage(stats.vpp),
        format_voltage(stats.rms),
        format_frequency(stats.frequency_hz),
        format_voltage(frame.latest_volts),
        frame.sample_count,
        frame.dropped,
    );
    Ok(())
}

async fn alc(config: ScopeConfig, action: AlcCommand) -> Result<()> {
    match action {
        AlcCommand::Get { target, json } => {
            let (mut session, channel) = open_channel(&config, target).await?;
            let result = channel.get().await;
            session.disconnect().await;
            let record = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                for (field, value) in record.iter() {
                    println!("{:>2} {:<24} {:>8}   ({})", field.index() + 1, field.name(), value, field.spec().range_text);
                }
            }
            Ok(())
        }
        AlcCommand::Set { target, params } => {
            let record = load_record(&params)?;
            let (mut session, channel) = open_channel(&config, target).await?;
            let result = channel.set(&record).await;
            session.disconnect().await;
            match result {
                Ok(response) => {
                    println!("Parameters written: {response}");
                    Ok(())
                }
                Err(ScopeError::Validation(report)) => bail!("not sent, parameters invalid:\n{report}"),
                Err(e) if e.is_retryable() => Err(anyhow!(e).context("device did not answer; try again")),
                Err(e) => Err(e.into()),
            }
        }
        AlcCommand::Validate { params } => {
            let record = load_record(&params)?;
            let report = validate(&record);
            if report.is_empty() {
                println!("All parameters valid");
                Ok(())
            } else {
                bail!("{} invalid parameter(s):\n{report}", report.len())
            }
        }
        AlcCommand::Defaults => {
            for field in AlcField::ALL {
                let spec = field.spec();
                println!(
                    "{:>2} {:<24} {:>8}   {:<16} {}",
                    field.index() + 1,
                    spec.name,
                    spec.default,
                    spec.range_text,
                    spec.description
                );
            }
            Ok(())
        }
    }
}

async fn open_channel(config: &ScopeConfig, target: AlcTarget) -> Result<(ScopeSession, CommandChannel)> {
    let mut session = ScopeSession::new(config)?;
    if target.simulate {
        let (io, _device) = SimulatedInstrument::new(config.simulator.clone()).spawn();
        session.attach("simulator", io)?;
    } else {
        let port = resolve_port(config, target.port)?;
        let baud = target.baud.unwrap_or(config.serial.baud_rate);
        session
            .connect(&port, baud)
            .await
            .with_context(|| format!("connecting to {port}"))?;
    }
    let channel = session.commands()?;
    Ok((session, channel))
}

fn load_record(args: &ParamArgs) -> Result<AlcParameterRecord> {
    let mut record = AlcParameterRecord::defaults();

    if let Some(path) = &args.file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let table: toml::Table =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let pairs: Vec<(String, String)> = table
            .into_iter()
            .map(|(name, value)| {
                let text = match value {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, text)
            })
            .collect();
        record.apply_overrides(pairs.iter().map(|(n, v)| (n.as_str(), v.clone())))?;
    }

    for param in &args.params {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{param}'"))?;
        record.apply_overrides([(name, value.to_string())])?;
    }
    Ok(record)
}

fn capacity(config: &ScopeConfig, sample_rate: f64, timebase: &str) -> Result<()> {
    let timebase_s = parse_timebase(timebase).ok_or_else(|| anyhow!("invalid timebase '{timebase}'"))?;
    let acquisition = AcquisitionConfig {
        sample_rate_hz: sample_rate,
        timebase_s_per_div: timebase_s,
        ..config.acquisition
    };
    acquisition.validate()?;
    println!("Timebase:        {}", format_timebase(timebase_s));
    println!("Window:          {} s", acquisition.window_seconds());
    println!("Buffer capacity: {} samples", acquisition.buffer_capacity());
    println!("Queue capacity:  {} samples", acquisition.queue_capacity());
    Ok(())
}
