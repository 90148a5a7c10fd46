//! Command-line converter from device log files to tabular formats.

use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
    process::ExitCode,
    thread,
};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use sprocket::{
    avec::{self, ParseOptions, SampleRate, Status},
    export::Format,
    sans::{parser::Mode, stats::ParseStatistics},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log files to convert
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output formats to write
    #[arg(long, value_enum, num_args = 1.., default_values_t = [OutputFormat::Csv])]
    output_format: Vec<OutputFormat>,

    /// Stop at the first decode error instead of resynchronizing
    #[arg(long)]
    strict: bool,

    /// Print parse statistics as JSON instead of exporting
    #[arg(long)]
    print_stats: bool,

    /// Overwrite existing output files
    #[arg(long)]
    force: bool,

    /// Sampling rate of pulse blocks, in hertz
    #[arg(long, value_enum, default_value_t = Rate::Hz1000)]
    samplerate: Rate,

    /// Directory for output files (defaults to each input's directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Columnar,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => Format::Csv,
            OutputFormat::Columnar => Format::Columnar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Rate {
    #[value(name = "1000")]
    Hz1000,
    #[value(name = "500")]
    Hz500,
    #[value(name = "250")]
    Hz250,
    #[value(name = "125")]
    Hz125,
}

impl From<Rate> for SampleRate {
    fn from(rate: Rate) -> Self {
        match rate {
            Rate::Hz1000 => SampleRate::Hz1000,
            Rate::Hz500 => SampleRate::Hz500,
            Rate::Hz250 => SampleRate::Hz250,
            Rate::Hz125 => SampleRate::Hz125,
        }
    }
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    file: &'a Path,
    records: usize,
    status: String,
    statistics: &'a ParseStatistics,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mode = if args.strict {
        Mode::Strict
    } else {
        Mode::Lenient
    };
    let options = ParseOptions::default()
        .mode(mode)
        .samplerate(args.samplerate.into());

    let targets: Vec<_> = args
        .files
        .iter()
        .map(|path| Target::new(path, args.output_dir.as_deref()))
        .collect();

    let mut uses = HashMap::new();
    for target in &targets {
        *uses.entry(target).or_insert(0) += 1;
    }
    let shared: Vec<bool> = targets.iter().map(|t| uses[t] > 1).collect();

    // One independent session per file; results are only joined at the end.
    let outcomes: Vec<_> = thread::scope(|s| {
        let (args, options) = (&args, &options);

        let handles: Vec<_> = args
            .files
            .iter()
            .zip(&targets)
            .zip(&shared)
            .map(|((path, target), &shared)| {
                s.spawn(move || convert(path, target, shared, args, options))
            })
            .collect();

        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut success = true;

    for (path, outcome) in args.files.iter().zip(outcomes) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(file = ?path, "{err:#}");
                success = false;
            }
            Err(_) => {
                error!(file = ?path, "conversion panicked");
                success = false;
            }
        }
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Where the outputs of one input file are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Target {
    dir: PathBuf,
    stem: String,
}

impl Target {
    fn new(path: &Path, output_dir: Option<&Path>) -> Self {
        let dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("recording")
            .to_owned();

        Self { dir, stem }
    }
}

fn convert(
    path: &Path,
    target: &Target,
    shared: bool,
    args: &Args,
    options: &ParseOptions,
) -> anyhow::Result<()> {
    // Two sessions writing the same names would race past the overwrite check.
    if shared && !args.print_stats {
        bail!(
            "Output name {:?} in {:?} is shared with another input",
            target.stem,
            target.dir
        );
    }

    info!(file = ?path, "parsing");

    let file = File::open(path).with_context(|| format!("Failed to open {path:?}"))?;
    let (recording, report) =
        avec::read_recording(file, options).with_context(|| format!("Failed to read {path:?}"))?;

    if args.print_stats {
        let output = StatsOutput {
            file: path,
            records: recording.record_count(),
            status: format!("{:?}", report.status),
            statistics: &report.statistics,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if let Status::Aborted(err) = &report.status {
        bail!("Parsing aborted: {err}");
    }

    if recording.record_count() == 0 {
        bail!("No records found");
    }

    if args.print_stats {
        return Ok(());
    }

    let Target { dir, stem } = target;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {dir:?}"))?;

    for format in &args.output_format {
        let exporter = Format::from(*format).exporter(dir, stem);
        let written = exporter
            .export(&recording, &report.statistics, args.force)
            .with_context(|| format!("Failed to export {path:?} as {format:?}"))?;

        info!(file = ?path, ?format, files = written.len(), "exported");
    }

    Ok(())
}
