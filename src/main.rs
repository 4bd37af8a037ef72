//! ewi-usb-config - configure an Akai EWI USB from the command line
//!
//! Receive and send SysEx settings dumps and change single settings via NRPN.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ewi_usb_config::catalog;
use ewi_usb_config::dumpfile::{load_dump, write_dump, DumpFormat};
use ewi_usb_config::framer::DEFAULT_MAX_SCAN;
use ewi_usb_config::transport::{MidiSource, MidirInput, MidirOutput};
use ewi_usb_config::{BankSet, CancelToken, DeviceSession, Error, SessionConfig};

/// Standard input / output placeholder for dump paths
const STDIO: &str = "-";

/// Time the worker gets to leave edit mode after an interrupt
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Configure an Akai EWI USB wind controller via MIDI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = settings_help())]
struct Args {
    /// Number or (part of) name of the MIDI input/output port to open
    #[arg(short, long, env = "EWI_PORT", default_value = "EWI-USB")]
    port: String,

    /// SysEx device id (127 = any)
    #[arg(short, long, env = "EWI_DEVICE_ID", default_value_t = 127,
          value_parser = clap::value_parser!(u8).range(0..=127))]
    device_id: u8,

    /// MIDI channel for settings (1-16)
    #[arg(short, long, default_value_t = 1,
          value_parser = clap::value_parser!(u8).range(1..=16))]
    channel: u8,

    /// Receive a SysEx dump from the EWI and save it in PATH ('-' for stdout)
    #[arg(short, long, value_name = "PATH")]
    receive: Option<String>,

    /// Request all settings banks (0-3); the purpose of banks 1 and 3 is unclear
    #[arg(long)]
    all_banks: bool,

    /// Send the SysEx dump file PATH to the EWI ('-' for stdin)
    #[arg(short, long, value_name = "PATH")]
    send: Option<String>,

    /// Use ASCII hexadecimal lines for dump files
    #[arg(short, long)]
    ascii: bool,

    /// Allow overwriting an existing file when saving a received dump
    #[arg(short, long)]
    force: bool,

    /// Seconds to wait for each dump bank
    #[arg(short, long, default_value = "5", value_parser = parse_timeout)]
    timeout: Duration,

    /// Maximum number of bytes read from a dump file
    #[arg(long, default_value_t = DEFAULT_MAX_SCAN)]
    max_size: usize,

    /// Send the factory default of every setting
    #[arg(long)]
    reset: bool,

    /// List supported settings and exit
    #[arg(long)]
    list_settings: bool,

    /// Output verbose messages of program operation to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace); overrides --verbose
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Setting to send in the form name=value (can be given more than once)
    #[arg(value_name = "SETTING")]
    settings: Vec<String>,
}

impl Args {
    fn has_action(&self) -> bool {
        self.receive.is_some() || self.send.is_some() || self.reset || !self.settings.is_empty()
    }

    fn dump_format(&self) -> DumpFormat {
        DumpFormat::from_ascii_flag(self.ascii)
    }
}

fn settings_help() -> String {
    let names: Vec<_> = catalog::names().collect();
    format!("Settings:\n   {}", names.join(", "))
}

fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args)?;

    if args.list_settings {
        list_settings();
        return Ok(ExitCode::SUCCESS);
    }

    if !args.has_action() {
        eprintln!("{}", Args::command().render_usage());
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancelToken::new();
    let token = cancel.clone();

    // Session I/O blocks; keep it off the runtime threads
    let mut worker = tokio::task::spawn_blocking(move || run(&args, token));

    let outcome = tokio::select! {
        joined = &mut worker => joined.context("Worker task failed")?,
        _ = interrupt() => {
            info!("Interrupt received, cancelling");
            cancel.cancel();
            match tokio::time::timeout(CANCEL_GRACE, &mut worker).await {
                Ok(joined) => debug!("Worker stopped: {:?}", joined.map(|r| r.is_ok())),
                // Still blocked, e.g. reading a dump from stdin
                Err(_) => warn!("Worker did not stop within {:?}", CANCEL_GRACE),
            }
            std::process::exit(1);
        }
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::Cancelled)) => {
            debug!("Exit after interrupt");
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e),
    }
}

/// Resolves on the first CTRL+C. Never resolves if no handler can be installed.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = match &args.log_level {
        Some(level) => level.as_str(),
        None if args.verbose => "info",
        None => "warn",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

fn run(args: &Args, cancel: CancelToken) -> Result<()> {
    let config = SessionConfig {
        device_id: args.device_id,
        channel: args.channel,
        timeout: args.timeout,
        cancel,
        ..SessionConfig::default()
    };

    if let Some(path) = &args.receive {
        receive_dump(args, path, config.clone())?;
    }

    if let Some(path) = &args.send {
        send_dump(args, path, config.clone())?;
    }

    if args.reset || !args.settings.is_empty() {
        send_settings(args, config)?;
    }

    Ok(())
}

fn open_session(port: &str, with_input: bool, config: SessionConfig) -> Result<DeviceSession> {
    let output = MidirOutput::open(port)
        .with_context(|| format!("Could not open MIDI output '{}'", port))?;

    let input: Option<Box<dyn MidiSource>> = if with_input {
        let input = MidirInput::open(port)
            .with_context(|| format!("Could not open MIDI input '{}'", port))?;
        Some(Box::new(input))
    } else {
        None
    };

    Ok(DeviceSession::open(Box::new(output), input, config)?)
}

fn receive_dump(args: &Args, path: &str, config: SessionConfig) -> Result<()> {
    if path != STDIO && Path::new(path).exists() {
        if args.force {
            warn!("Overwriting existing file '{}'.", path);
        } else {
            bail!("File '{}' exists. Use option -f to overwrite. Aborting.", path);
        }
    }

    let mut session = open_session(&args.port, true, config)?;

    info!("Requesting dumps. Waiting to receive... Press Control-C to cancel.");
    let banks = if args.all_banks {
        BankSet::All
    } else {
        BankSet::Settings
    };
    let result = session.request_dump(banks)?;
    session.close();

    if result.frames.is_empty() {
        bail!("No SysEx dump received. Nothing was written.");
    }
    if !result.is_complete() {
        warn!("No dump received for bank(s) {:?}", result.timed_out);
    }

    if path == STDIO {
        write_dump(io::stdout().lock(), &result.frames, args.dump_format())?;
    } else {
        let file = File::create(path).with_context(|| format!("Could not create '{}'", path))?;
        write_dump(BufWriter::new(file), &result.frames, args.dump_format())
            .with_context(|| format!("Could not write '{}'", path))?;
    }

    info!("Saved {} SysEx messages to '{}'", result.frames.len(), path);
    Ok(())
}

fn send_dump(args: &Args, path: &str, config: SessionConfig) -> Result<()> {
    let frames = if path == STDIO {
        load_dump(io::stdin().lock(), args.dump_format(), args.max_size)?
    } else {
        if !Path::new(path).exists() {
            bail!("File not found: '{}'. Aborting.", path);
        }
        let file = File::open(path).with_context(|| format!("Could not open '{}'", path))?;
        load_dump(file, args.dump_format(), args.max_size)
            .with_context(|| format!("Could not read '{}'", path))?
    };

    if frames.is_empty() {
        bail!("No supported SysEx message found in '{}'. Nothing was sent.", path);
    }

    let mut session = open_session(&args.port, false, config)?;
    session.send_dump(&frames)?;
    info!("Sent {} SysEx messages", frames.len());

    Ok(())
}

fn send_settings(args: &Args, config: SessionConfig) -> Result<()> {
    let mut session = open_session(&args.port, false, config)?;

    if args.reset {
        let count = session.apply_defaults()?;
        info!("Sent factory defaults for {} settings", count);
    }

    if !args.settings.is_empty() {
        let report = session.apply_settings(&args.settings)?;
        if !report.rejected.is_empty() {
            warn!(
                "{} of {} settings not sent",
                report.rejected.len(),
                args.settings.len()
            );
        }
    }

    Ok(())
}

fn list_settings() {
    println!("\n{}", "=== EWI USB Settings ===".bold().cyan());
    println!(
        "\n  {:<14} {:<6} {:<8} {:<8} {}",
        "Name", "NRPN", "Range", "Default", "Description"
    );

    for p in catalog::parameters() {
        let range = format!("{}-{}", p.range.start(), p.range.end());
        let default = p
            .default
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {} {:<6} {:<8} {} {}",
            format!("{:<14}", p.name).green(),
            p.address.to_string(),
            range,
            format!("{:<8}", default).yellow(),
            p.description
        );

        if !p.aliases.is_empty() {
            println!("  {:<14} {} {}", "", "aliases:".dimmed(), p.aliases.join(", "));
        }
        if !p.labels.is_empty() {
            let labels: Vec<_> = p
                .labels
                .iter()
                .map(|l| format!("{}={}", l.name, l.value))
                .collect();
            println!("  {:<14} {} {}", "", "values:".dimmed(), labels.join(", "));
        }
    }
    println!();
}
