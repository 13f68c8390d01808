//! RoboFace CLI - Command-line interface for RoboFace Flux
//!
//! Commands:
//! - replay: Run a recorded sensor trace and emit state frames (batch mode)
//! - run: Feed live sensor records from stdin to the threaded engine (streaming mode)
//! - validate: Validate sensor trace schema
//! - schema: Print input, output or config schema
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, select, Receiver};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use roboface_flux::encoder::{StateEncoder, StatePayload, STATE_SCHEMA_VERSION};
use roboface_flux::schema::{
    replay_trace_with, FramePolicy, ReplayOptions, SensorRecord, SensorTraceAdapter,
    SCHEMA_VERSION,
};
use roboface_flux::{
    EmotionChange, EmotionEngine, EngineConfig, EngineError, PRODUCER_NAME, ROBOFACE_VERSION,
};

/// RoboFace - sensor fusion and emotion engine for an animated face
#[derive(Parser)]
#[command(name = "roboface")]
#[command(version = ROBOFACE_VERSION)]
#[command(about = "Turn device sensor streams into a stable emotional state", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON, partial overrides allowed)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded sensor trace (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Keep ticking this many milliseconds after the last record
        #[arg(long, default_value = "0")]
        tail_ms: u64,

        /// Only emit frames for ticks that changed the emotion
        #[arg(long)]
        changes_only: bool,

        /// Fixed producer instance id (for reproducible output)
        #[arg(long)]
        instance_id: Option<String>,
    },

    /// Feed sensor records from stdin to the live engine (streaming mode)
    Run {
        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Keep the engine ticking this long after stdin closes, so the last
        /// records are evaluated and their changes emitted
        #[arg(long, default_value = "1000")]
        linger_ms: u64,

        /// Do not flush output after each frame
        #[arg(long)]
        no_flush: bool,
    },

    /// Validate sensor trace schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Detect from the first character
    Auto,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one state frame per line)
    Ndjson,
    /// JSON array of state frames
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (roboface.sensor_event.v1)
    Input,
    /// Output schema (roboface.state.v1)
    Output,
    /// Engine configuration with defaults
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), RobofaceCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            tail_ms,
            changes_only,
            instance_id,
        } => {
            let config = load_config(config_path)?;
            let options = ReplayOptions {
                tail_ms,
                frames: if changes_only {
                    FramePolicy::OnChange
                } else {
                    FramePolicy::EveryTick
                },
                instance_id,
            };
            cmd_replay(&input, &output, input_format, output_format, &config, &options)
        }

        Commands::Run {
            output_format,
            linger_ms,
            no_flush,
        } => {
            let config = load_config(config_path)?;
            cmd_run(config, output_format, linger_ms, !no_flush)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => {
            let config = load_config(config_path)?;
            cmd_validate(&input, input_format, &config, json)
        }

        Commands::Doctor { json } => cmd_doctor(config_path, json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, RobofaceCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, RobofaceCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records(
    input_data: &str,
    input_format: InputFormat,
) -> Result<Vec<SensorRecord>, RobofaceCliError> {
    let records = match input_format {
        InputFormat::Auto => SensorTraceAdapter::parse_auto(input_data)?,
        InputFormat::Ndjson => SensorTraceAdapter::parse_ndjson(input_data)?,
        InputFormat::Json => SensorTraceAdapter::parse_array(input_data)?,
    };
    Ok(records)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: &EngineConfig,
    options: &ReplayOptions,
) -> Result<(), RobofaceCliError> {
    let input_data = read_input(input)?;
    let records = parse_records(&input_data, input_format)?;

    if records.is_empty() {
        return Err(RobofaceCliError::NoRecords);
    }

    let replay = replay_trace_with(&records, config, options)?;
    tracing::info!(
        records = records.len(),
        frames = replay.frames.len(),
        changes = replay.changes.len(),
        rejected = replay.stats.rejected_samples,
        final_emotion = %replay.final_emotion,
        "replay finished"
    );

    let output_data = format_output(&replay.frames, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(
    config: EngineConfig,
    output_format: OutputFormat,
    linger_ms: u64,
    flush: bool,
) -> Result<(), RobofaceCliError> {
    let mut engine = EmotionEngine::new(config)?;
    let publication = engine.publication();
    let changes = engine.subscribe_emotion();
    let sink = engine.start()?;
    let encoder = StateEncoder::new();

    // stdin is read on its own thread; dropping `done_tx` marks end of input
    let (done_tx, done_rx) = bounded::<()>(0);
    let reader = std::thread::Builder::new()
        .name("roboface-stdin".into())
        .spawn(move || -> Result<usize, RobofaceCliError> {
            let _done = done_tx;
            let stdin = io::stdin();
            let mut count = 0;
            for (line_num, line) in stdin.lock().lines().enumerate() {
                let line = line?;
                if let Some(record) = SensorTraceAdapter::parse_line(&line, line_num + 1)? {
                    record.validate_version()?;
                    sink.send(record.to_event())?;
                    count += 1;
                }
            }
            Ok(count)
        })?;

    let mut stdout = io::stdout();
    let mut emit = |change: EmotionChange| -> Result<(), RobofaceCliError> {
        let frame = encoder.encode(&publication.snapshot(), change.at_ms);
        write!(stdout, "{}", format_output(&[frame], &output_format)?)?;
        if flush {
            stdout.flush()?;
        }
        Ok(())
    };

    loop {
        select! {
            recv(changes) -> change => match change {
                Ok(change) => emit(change)?,
                Err(_) => break,
            },
            recv(done_rx) -> _ => break,
        }
    }

    // The engine keeps ticking without a sink, so records queued right
    // before EOF still get evaluated during the linger window
    forward_changes(&changes, Duration::from_millis(linger_ms), &mut emit)?;

    let stats = engine.stop()?;
    for change in changes.try_iter() {
        emit(change)?;
    }

    let records = reader
        .join()
        .map_err(|_| RobofaceCliError::ReaderPanicked)??;
    tracing::info!(
        records,
        ticks = stats.ticks,
        transitions = stats.transitions,
        dropped = engine.dropped_events(),
        "run finished"
    );

    Ok(())
}

/// Forward emotion changes until `linger` has elapsed
fn forward_changes(
    changes: &Receiver<EmotionChange>,
    linger: Duration,
    mut emit: impl FnMut(EmotionChange) -> Result<(), RobofaceCliError>,
) -> Result<(), RobofaceCliError> {
    let deadline = Instant::now() + linger;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match changes.recv_timeout(remaining) {
            Ok(change) => emit(change)?,
            Err(_) => break,
        }
    }
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    config: &EngineConfig,
    json: bool,
) -> Result<(), RobofaceCliError> {
    let input_data = read_input(input)?;
    let records = parse_records(&input_data, input_format)?;

    let results = SensorTraceAdapter::validate_trace_with(&records, &config.filter);
    let invalid_records = {
        let mut indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        indices.dedup();
        indices.len()
    };

    let report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        total_records: records.len(),
        valid_records: records.len() - invalid_records,
        invalid_records,
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                t_ms: r.t_ms,
                kind: r.kind.to_string(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Schema:          {}", report.schema_version);
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - {} record at {} ms (index {}): {}",
                    err.kind, err.t_ms, err.index, err.error
                );
            }
        }
    }

    if report.invalid_records > 0 {
        Err(RobofaceCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), RobofaceCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "roboface_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("RoboFace Flux version {}", ROBOFACE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}, output schema: {}", SCHEMA_VERSION, STATE_SCHEMA_VERSION),
    });

    // Check config file if provided
    match config_path {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist, defaults would be used".to_string(),
        }),
        Some(path) => match load_config(Some(path)) {
            Ok(config) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config file valid (tick every {} ms, dwell {} ms)",
                    config.runtime.tick_interval_ms, config.emotion.min_dwell_ms
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file, using built-in defaults".to_string(),
        }),
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ROBOFACE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("RoboFace Doctor Report");
        println!("======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RobofaceCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), RobofaceCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One JSON object per line, stamped with engine time in t_ms.");
                println!("The kind field selects the reading:");
                println!();
                println!("- motion:    x, y, z         raw accelerometer (m/s²)");
                println!("- rotation:  z               gyroscope Z rate (rad/s)");
                println!("- proximity: distance, [max_range]");
                println!("- sound:     mean_abs_amplitude over one ~100 ms window");
                println!("- pcm:       samples         raw 16-bit mono PCM window");
                println!();
                println!("Blank lines and lines starting with # are ignored.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: {}", STATE_SCHEMA_VERSION);
                println!();
                println!("- schema_version, computed_at_utc, engine_time_ms");
                println!("- producer: {{ name, version, instance_id }}");
                println!("- emotion: idle | happy | angry | sad | sleep | curious | irritated | listening | surprised");
                println!("- emotion_code: 0-8, same order as above");
                println!("- rule: rule behind the latest change");
                println!("- pose: {{ tilt_x, tilt_y, rotation_z }}");
                println!("- metrics: {{ activity_level, still_time_ms, shake_count, sound_level, is_near }}");
            }
        }
        SchemaType::Config => {
            println!("{}", EngineConfig::default().to_json()?);
        }
    }

    Ok(())
}

// Helper functions

fn format_output(frames: &[StatePayload], format: &OutputFormat) -> Result<String, RobofaceCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for frame in frames {
                out.push_str(&serde_json::to_string(frame)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(frames)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(frames)? + "\n"),
    }
}

fn get_input_json_schema() -> String {
    let number = serde_json::json!({ "type": "number" });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "RoboFace sensor event",
        "type": "object",
        "required": ["t_ms", "kind"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "t_ms": { "type": "integer", "minimum": 0 },
            "kind": {
                "type": "string",
                "enum": ["motion", "rotation", "proximity", "sound", "pcm"]
            },
            "x": number,
            "y": number,
            "z": number,
            "distance": { "type": "number", "minimum": 0 },
            "max_range": number,
            "mean_abs_amplitude": { "type": "number", "minimum": 0, "maximum": 32768 },
            "samples": {
                "type": "array",
                "items": { "type": "integer", "minimum": -32768, "maximum": 32767 }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": STATE_SCHEMA_VERSION,
        "description": "RoboFace state frame",
        "type": "object",
        "required": ["schema_version", "producer", "computed_at_utc", "engine_time_ms", "emotion", "emotion_code", "pose", "metrics"],
        "properties": {
            "schema_version": { "type": "string", "const": STATE_SCHEMA_VERSION },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "computed_at_utc": { "type": "string", "format": "date-time" },
            "engine_time_ms": { "type": "integer" },
            "emotion": {
                "type": "string",
                "enum": ["idle", "happy", "angry", "sad", "sleep", "curious", "irritated", "listening", "surprised"]
            },
            "emotion_code": { "type": "integer", "minimum": 0, "maximum": 8 },
            "rule": { "type": "string" },
            "pose": {
                "type": "object",
                "properties": {
                    "tilt_x": { "type": "number", "minimum": -1, "maximum": 1 },
                    "tilt_y": { "type": "number", "minimum": -1, "maximum": 1 },
                    "rotation_z": { "type": "number" }
                }
            },
            "metrics": {
                "type": "object",
                "properties": {
                    "activity_level": { "type": "number", "minimum": 0 },
                    "still_time_ms": { "type": "integer", "minimum": 0 },
                    "shake_count": { "type": "integer", "minimum": 0 },
                    "sound_level": { "type": "number", "minimum": 0, "maximum": 1 },
                    "is_near": { "type": "boolean" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum RobofaceCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ReaderPanicked,
}

impl From<io::Error> for RobofaceCliError {
    fn from(e: io::Error) -> Self {
        RobofaceCliError::Io(e)
    }
}

impl From<EngineError> for RobofaceCliError {
    fn from(e: EngineError) -> Self {
        RobofaceCliError::Engine(e)
    }
}

impl From<serde_json::Error> for RobofaceCliError {
    fn from(e: serde_json::Error) -> Self {
        RobofaceCliError::Json(e)
    }
}

impl From<roboface_flux::schema::ValidationError> for RobofaceCliError {
    fn from(e: roboface_flux::schema::ValidationError) -> Self {
        RobofaceCliError::Engine(EngineError::Validation(e))
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RobofaceCliError> for CliError {
    fn from(e: RobofaceCliError) -> Self {
        match e {
            RobofaceCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RobofaceCliError::Engine(e) => engine_error(e),
            RobofaceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RobofaceCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No sensor records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RobofaceCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            RobofaceCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            RobofaceCliError::ReaderPanicked => CliError {
                code: "INTERNAL_ERROR".to_string(),
                message: "stdin reader thread panicked".to_string(),
                hint: None,
            },
        }
    }
}

fn engine_error(e: EngineError) -> CliError {
    let (code, hint) = match &e {
        EngineError::ParseError(_) | EngineError::JsonError(_) => (
            "PARSE_ERROR",
            Some(format!("Ensure input matches {} schema", SCHEMA_VERSION)),
        ),
        EngineError::InvalidConfig(_) => (
            "CONFIG_ERROR",
            Some("Run 'roboface schema config' to see every setting".to_string()),
        ),
        EngineError::InvalidSample(_) | EngineError::Validation(_) => (
            "VALIDATION_ERROR",
            Some("Run 'roboface validate' for details".to_string()),
        ),
        EngineError::Stopped
        | EngineError::AlreadyRunning
        | EngineError::SpawnFailed(_)
        | EngineError::WorkerPanicked => ("ENGINE_ERROR", None),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint,
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: String,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    t_ms: u64,
    kind: String,
    error: String,
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use roboface_flux::clock::ManualClock;
    use roboface_flux::EmotionState;
    use std::sync::Arc;

    #[test]
    fn test_linger_emits_changes_after_input_closes() {
        let clock = ManualClock::new(0);
        let mut config = EngineConfig::default();
        config.runtime.tick_interval_ms = 5;
        let mut engine = EmotionEngine::with_clock(config, Arc::new(clock.clone())).unwrap();
        let changes = engine.subscribe_emotion();

        // Same shape as stdin hitting EOF: the only sink goes away
        let sink = engine.start().unwrap();
        sink.push_proximity(0.0, 5.0).unwrap();
        drop(sink);
        clock.set(500);

        let mut seen = Vec::new();
        forward_changes(&changes, Duration::from_secs(2), |change| {
            seen.push(change.to);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![EmotionState::Sleep]);
        assert_eq!(engine.stop().unwrap().accepted_samples, 1);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from(["roboface", "run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                no_flush: false,
                linger_ms: 1000,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["roboface", "run", "--no-flush", "--linger-ms", "0"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                no_flush: true,
                linger_ms: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_linger_returns_immediately() {
        let (_tx, rx) = bounded::<EmotionChange>(1);
        let started = Instant::now();
        forward_changes(&rx, Duration::ZERO, |_| Ok(())).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
