//! Trail CLI - Command-line interface for Portal Telemetry
//!
//! Commands:
//! - replay: Feed a recorded stream of host signals through a collector
//! - inspect: Print what a collector persisted to a store directory
//! - doctor: Diagnose configuration and storage

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use portal_telemetry::retention::parse_heatmap_log;
use portal_telemetry::{
    Collector, CollectorConfig, FileStore, HostSignal, KeyValueStore, MemoryStore,
    NavigationContext, PersistedSnapshot, TelemetryError, PRODUCER_NAME, TELEMETRY_VERSION,
};

/// Trail - replay and inspect portal telemetry sessions
#[derive(Parser)]
#[command(name = "trail")]
#[command(author = "Portal Engineering")]
#[command(version = TELEMETRY_VERSION)]
#[command(about = "Replay and inspect portal telemetry sessions", long_about = None)]
struct Cli {
    /// Log engine activity at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed NDJSON host signals through a collector and print the result
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Persist into this directory (in-memory when omitted)
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Collector config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Navigation context of the initial page (JSON)
        #[arg(long)]
        navigation: Option<PathBuf>,

        /// What to print once the stream is consumed
        #[arg(long, value_enum, default_value = "summary")]
        output: OutputView,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the persisted snapshot and heatmap log from a store directory
    Inspect {
        /// Store directory written by a previous replay
        #[arg(long)]
        store_dir: PathBuf,

        /// Collector config file (JSON), for non-default storage keys
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Diagnose configuration and storage
    Doctor {
        /// Collector config file to validate
        #[arg(long)]
        config: Option<PathBuf>,

        /// Store directory to check for writability
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputView {
    /// Record counts and max scroll depth
    Summary,
    /// Complete in-memory state
    Export,
    /// The bounded snapshot as persisted
    Snapshot,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), TrailCliError> {
    match cli.command {
        Commands::Replay {
            input,
            store_dir,
            config,
            navigation,
            output,
            pretty,
        } => cmd_replay(
            &input,
            store_dir.as_deref(),
            config.as_deref(),
            navigation.as_deref(),
            output,
            pretty,
        ),

        Commands::Inspect { store_dir, config } => cmd_inspect(&store_dir, config.as_deref()),

        Commands::Doctor {
            config,
            store_dir,
            json,
        } => cmd_doctor(config.as_deref(), store_dir.as_deref(), json),
    }
}

fn cmd_replay(
    input: &Path,
    store_dir: Option<&Path>,
    config: Option<&Path>,
    navigation: Option<&Path>,
    output: OutputView,
    pretty: bool,
) -> Result<(), TrailCliError> {
    let config = load_config(config)?;
    let navigation = match navigation {
        Some(path) => serde_json::from_str::<NavigationContext>(&fs::read_to_string(path)?)?,
        None => NavigationContext::default(),
    };
    let store: Box<dyn KeyValueStore> = match store_dir {
        Some(dir) => Box::new(FileStore::open(dir)?),
        None => Box::new(MemoryStore::new()),
    };

    let mut collector = Collector::new(config, store, navigation)?;

    let reader: Box<dyn BufRead> = if input.to_string_lossy() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(input)?))
    };

    let mut replayed = 0usize;
    let mut skipped = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match HostSignal::from_json(trimmed) {
            Ok(signal) => {
                collector.handle_signal(signal);
                replayed += 1;
            }
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping unparseable signal");
                skipped += 1;
            }
        }
    }

    info!(
        session_id = %collector.session_id(),
        replayed,
        skipped,
        "replay finished"
    );

    match output {
        OutputView::Summary => print_json(&collector.summary(), pretty),
        OutputView::Export => print_json(&collector.export_data(), pretty),
        OutputView::Snapshot => {
            let snapshot = collector.load_snapshot().ok_or(TrailCliError::NoSnapshot)?;
            print_json(&snapshot, pretty)
        }
    }
}

fn cmd_inspect(store_dir: &Path, config: Option<&Path>) -> Result<(), TrailCliError> {
    let config = load_config(config)?;
    if !store_dir.is_dir() {
        return Err(TrailCliError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("store directory {} does not exist", store_dir.display()),
        )));
    }
    let store = FileStore::open(store_dir)?;

    let snapshot = match store.get(&config.snapshot_key)? {
        Some(raw) => Some(serde_json::from_str::<PersistedSnapshot>(&raw)?),
        None => None,
    };
    let heatmap = parse_heatmap_log(store.get(&config.heatmap_key)?.as_deref());

    if snapshot.is_none() && heatmap.is_empty() {
        return Err(TrailCliError::NoSnapshot);
    }

    let report = serde_json::json!({
        "snapshot": snapshot,
        "heatmap": heatmap,
    });
    print_json(&report, true)
}

fn cmd_doctor(
    config: Option<&Path>,
    store_dir: Option<&Path>,
    json: bool,
) -> Result<(), TrailCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "telemetry_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Portal telemetry version {}", TELEMETRY_VERSION),
    });

    // Config file, or the defaults when none is given
    let config_check = match config {
        Some(path) => match load_config(Some(path)) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (keys {} / {}, mousemove sample rate {})",
                    config.snapshot_key, config.heatmap_key, config.mousemove_sample_rate
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        },
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config given, using defaults".to_string(),
        },
    };
    checks.push(config_check);

    if let Some(dir) = store_dir {
        checks.push(check_store(dir));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input FILE to replay)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay --input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: TELEMETRY_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Trail Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(TrailCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// Round-trip a scratch key through the store directory
fn check_store(dir: &Path) -> DoctorCheck {
    const SCRATCH_KEY: &str = "trail_doctor_scratch";

    let roundtrip = FileStore::open(dir).and_then(|mut store| {
        store.set(SCRATCH_KEY, "ok")?;
        let read_back = store.get(SCRATCH_KEY)?;
        store.remove(SCRATCH_KEY)?;
        Ok(read_back)
    });

    match roundtrip {
        Ok(Some(value)) if value == "ok" => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is writable", dir.display()),
        },
        Ok(_) => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} accepted a write but did not return it", dir.display()),
        },
        Err(e) => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Error,
            message: format!("{} is not usable: {}", dir.display(), e),
        },
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<CollectorConfig, TrailCliError> {
    match path {
        Some(path) => Ok(CollectorConfig::from_json(&read_input(path)?)?),
        None => Ok(CollectorConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, TrailCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), TrailCliError> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

// Error types

#[derive(Debug)]
enum TrailCliError {
    Io(io::Error),
    Telemetry(TelemetryError),
    Json(serde_json::Error),
    NoSnapshot,
    DoctorFailed,
}

impl From<io::Error> for TrailCliError {
    fn from(e: io::Error) -> Self {
        TrailCliError::Io(e)
    }
}

impl From<TelemetryError> for TrailCliError {
    fn from(e: TelemetryError) -> Self {
        TrailCliError::Telemetry(e)
    }
}

impl From<serde_json::Error> for TrailCliError {
    fn from(e: serde_json::Error) -> Self {
        TrailCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TrailCliError> for CliError {
    fn from(e: TrailCliError) -> Self {
        match e {
            TrailCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TrailCliError::Telemetry(TelemetryError::Config(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'trail doctor --config FILE' for details".to_string()),
            },
            TrailCliError::Telemetry(e) => CliError {
                code: "TELEMETRY_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            TrailCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TrailCliError::NoSnapshot => CliError {
                code: "NO_SNAPSHOT".to_string(),
                message: "Nothing persisted under the configured keys".to_string(),
                hint: Some(
                    "Replay with --store-dir first, or pass the --config used then".to_string(),
                ),
            },
            TrailCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
