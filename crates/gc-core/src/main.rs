//! geiger-cpm - live counts-per-minute from a Geiger counter.
//!
//! Reads count reports from a device, a recorded file, or stdin, and prints
//! one CPM estimate per detected event.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use gc_common::{Error, OutputFormat, Result, StructuredError};
use gc_config::{load_config, validate_config, Config, ConfigError, LoadedConfig};
use gc_core::bounds::ConfidenceBoundTable;
use gc_core::device::{clone_port, open_port, DeviceCommand};
use gc_core::estimator::RateEstimator;
use gc_core::exit_codes::ExitCode;
use gc_core::logging::{event_names, init_logging, LogConfig, LogFormat, LogLevel, Stage};
use gc_core::session::MeasurementSession;
use serialport::SerialPort;

/// Estimate counts per minute from a Geiger counter
#[derive(Parser, Debug)]
#[command(name = "geiger-cpm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,

    #[command(flatten)]
    run: RunOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Configuration file (overrides GC_CONFIG and the XDG lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for readings and errors
    #[arg(long, short = 'f', global = true)]
    format: Option<OutputFormat>,

    /// Log level (overrides GC_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (overrides GC_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Probability that a reset fires while the rate is unchanged
    #[arg(long = "p", global = true)]
    false_positive_p: Option<f64>,

    /// Capacity of the interval history
    #[arg(long, global = true)]
    ring_size: Option<usize>,

    /// Device tick length in seconds
    #[arg(long, global = true)]
    tick_seconds: Option<f64>,

    /// Two-sided confidence level of the bound tables
    #[arg(long, global = true)]
    confidence: Option<f64>,
}

/// Options for the default measurement run
#[derive(Args, Debug)]
struct RunOpts {
    /// Read count lines from a recorded file
    #[arg(long, short = 'i', conflicts_with = "device")]
    input: Option<PathBuf>,

    /// Serial device of the counter; streaming is started and stopped
    #[arg(long, short = 'd')]
    device: Option<PathBuf>,

    /// Decimal places of rendered CPM values
    #[arg(long)]
    precision: Option<usize>,

    /// Resize the history to hold about this many seconds of intervals
    #[arg(long)]
    adaptive_window: Option<f64>,

    /// Do not echo non-count device lines
    #[arg(long)]
    no_passthrough: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the chi-squared bound tables as JSON
    Tables {
        /// Number of rows (defaults to the ring size, at least 100)
        #[arg(long)]
        rows: Option<usize>,
    },
    /// Validate the resolved configuration
    Check,
    /// Send one command byte to the device
    Send {
        /// Serial device of the counter
        #[arg(long, short = 'd')]
        device: PathBuf,

        #[arg(value_enum)]
        command: DeviceCommand,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            let _ = err.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let format = cli.global.format.unwrap_or_default();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => report_error(&err, format),
    };
    std::process::exit(code.as_i32());
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        None => run_session(&cli.global, &cli.run),
        Some(Commands::Tables { rows }) => run_tables(&cli.global, rows),
        Some(Commands::Check) => run_check(&cli.global, &cli.run),
        Some(Commands::Send { ref device, command }) => run_send(device, command),
    }
}

/// Load the configuration and fold command-line overrides into it.
fn resolve_settings(global: &GlobalOpts, run: Option<&RunOpts>) -> Result<LoadedConfig> {
    let mut loaded = load_config(global.config.as_deref()).map_err(|err| {
        tracing::error!(event = event_names::CONFIG_ERROR, stage = %Stage::Init, error = %err, "configuration rejected");
        err
    })?;
    apply_overrides(&mut loaded.config, global, run);
    validate_config(&loaded.config).map_err(ConfigError::from)?;

    match &loaded.path {
        Some(path) => tracing::info!(
            event = event_names::CONFIG_LOADED,
            stage = %Stage::Init,
            path = %path.display(),
            source = %loaded.source,
            "configuration loaded"
        ),
        None => tracing::debug!(
            event = event_names::CONFIG_DEFAULT_USED,
            stage = %Stage::Init,
            "using built-in configuration"
        ),
    }
    Ok(loaded)
}

fn apply_overrides(config: &mut Config, global: &GlobalOpts, run: Option<&RunOpts>) {
    let estimator = &mut config.estimator;
    if let Some(p) = global.false_positive_p {
        estimator.false_positive_p = p;
    }
    if let Some(ring_size) = global.ring_size {
        estimator.ring_size = ring_size;
    }
    if let Some(tick) = global.tick_seconds {
        estimator.tick_seconds = tick;
    }
    if let Some(confidence) = global.confidence {
        estimator.table_confidence = confidence;
    }
    if let Some(format) = global.format {
        config.output.format = format;
    }

    let Some(run) = run else {
        return;
    };
    if let Some(seconds) = run.adaptive_window {
        config.estimator.adaptive_window_seconds = Some(seconds);
    }
    if let Some(precision) = run.precision {
        config.output.precision = precision;
    }
    if run.no_passthrough {
        config.output.passthrough = false;
    }
}

fn run_session(global: &GlobalOpts, run: &RunOpts) -> Result<ExitCode> {
    let loaded = resolve_settings(global, Some(run))?;
    let estimator = RateEstimator::new(loaded.config.estimator.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    let stdout = io::stdout();
    let mut sink = stdout.lock();

    let summary = match (&run.input, &run.device) {
        (Some(path), _) => {
            let source = BufReader::new(File::open(path)?);
            let mut session = MeasurementSession::new(estimator, loaded.config.output.clone())
                .with_stop_flag(Arc::clone(&stop));
            install_interrupt_handler(Arc::clone(&stop), None)?;
            session.run(source, &mut sink)?
        }
        (None, Some(path)) => {
            let device = open_port(path)?;
            let reader = BufReader::new(clone_port(device.as_ref(), path)?);
            let mut writer = device;
            DeviceCommand::StartStreaming.send(&mut writer)?;
            tracing::info!(
                event = event_names::DEVICE_OPENED,
                stage = %Stage::Device,
                path = %path.display(),
                "streaming started"
            );

            install_interrupt_handler(Arc::clone(&stop), Some(clone_port(writer.as_ref(), path)?))?;
            let mut session = MeasurementSession::new(estimator, loaded.config.output.clone())
                .with_stop_flag(Arc::clone(&stop));
            let result = session.run(reader, &mut sink);

            let stopped = DeviceCommand::StopStreaming.send(&mut writer);
            tracing::info!(event = event_names::DEVICE_STOPPED, stage = %Stage::Shutdown, "streaming stopped");
            let summary = result?;
            stopped?;
            summary
        }
        (None, None) => {
            let stdin = io::stdin();
            let mut session = MeasurementSession::new(estimator, loaded.config.output.clone())
                .with_stop_flag(Arc::clone(&stop));
            install_interrupt_handler(Arc::clone(&stop), None)?;
            session.run(stdin.lock(), &mut sink)?
        }
    };

    tracing::debug!(
        stage = %Stage::Shutdown,
        count_lines = summary.count_lines,
        last_cpm = ?summary.last_cpm,
        "session summary"
    );
    Ok(if summary.interrupted {
        ExitCode::Interrupted
    } else {
        ExitCode::Clean
    })
}

/// First Ctrl-C stops after the current line. A second one stops the
/// device (if any) and exits immediately, for a source that has gone quiet.
fn install_interrupt_handler(stop: Arc<AtomicBool>, mut device: Option<Box<dyn SerialPort>>) -> Result<()> {
    ctrlc::set_handler(move || {
        if stop.swap(true, Ordering::SeqCst) {
            if let Some(device) = device.as_mut() {
                let _ = DeviceCommand::StopStreaming.send(device);
            }
            std::process::exit(ExitCode::Interrupted.as_i32());
        }
    })
    .map_err(|e| Error::Io(io::Error::other(e)))
}

fn run_tables(global: &GlobalOpts, rows: Option<usize>) -> Result<ExitCode> {
    let loaded = resolve_settings(global, None)?;
    let table = match rows {
        Some(rows) => ConfidenceBoundTable::from_confidence(loaded.config.estimator.table_confidence, rows)?,
        None => ConfidenceBoundTable::for_estimator(&loaded.config.estimator)?,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &table)?;
    writeln!(out)?;
    Ok(ExitCode::Clean)
}

fn run_check(global: &GlobalOpts, run: &RunOpts) -> Result<ExitCode> {
    let loaded = resolve_settings(global, Some(run))?;
    // Building the estimator also builds any non-standard tables.
    RateEstimator::new(loaded.config.estimator.clone())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let path = loaded.path.as_ref().map(|p| p.display().to_string());
    match loaded.config.output.format {
        OutputFormat::Text => {
            writeln!(out, "configuration ok")?;
            writeln!(out, "  source: {}", loaded.source)?;
            if let Some(path) = &path {
                writeln!(out, "  path: {}", path)?;
            }
            let estimator = &loaded.config.estimator;
            writeln!(out, "  false_positive_p: {}", estimator.false_positive_p)?;
            writeln!(out, "  ring_size: {}", estimator.ring_size)?;
            writeln!(out, "  tick_seconds: {}", estimator.tick_seconds)?;
            writeln!(out, "  table_confidence: {}", estimator.table_confidence)?;
        }
        OutputFormat::Jsonl => {
            let record = serde_json::json!({
                "valid": true,
                "source": loaded.source.to_string(),
                "path": path,
                "config": loaded.config,
            });
            writeln!(out, "{}", record)?;
        }
    }
    Ok(ExitCode::Clean)
}

fn run_send(device: &Path, command: DeviceCommand) -> Result<ExitCode> {
    let mut handle = open_port(device)?;
    command.send(&mut handle)?;
    tracing::info!(stage = %Stage::Device, command = %command, path = %device.display(), "command sent");
    Ok(ExitCode::Clean)
}

fn report_error(err: &Error, format: OutputFormat) -> ExitCode {
    tracing::debug!(event = event_names::COMMAND_FAILED, code = err.code(), "command failed");
    match format {
        OutputFormat::Text => {
            eprintln!("geiger-cpm: {}: {}", err.headline(), err);
            eprintln!("  hint: {}", err.remediation());
        }
        OutputFormat::Jsonl => eprintln!("{}", StructuredError::from(err).to_json()),
    }
    ExitCode::from(err)
}
