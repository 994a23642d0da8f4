use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use facematch::bank::{FeatureBank, MatchOutcome};
use facematch::config::{Config, CONFIG_ENV};
use facematch::faces::{EnrollmentStatus, FaceProcessor, Identification};
use facematch::logging;

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    json: bool,
    train_dir: Option<PathBuf>,
    queries: Vec<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("facematch {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--json" => parsed.json = true,
            "--config" | "-c" => {
                parsed.config_path = Some(path_arg(&args, i));
                i += 1;
            }
            "--train" | "-t" => {
                parsed.train_dir = Some(path_arg(&args, i));
                i += 1;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            query => parsed.queries.push(PathBuf::from(query)),
        }
        i += 1;
    }

    parsed
}

/// The value following the flag at `args[i]`
fn path_arg(args: &[String], i: usize) -> PathBuf {
    match args.get(i + 1) {
        Some(value) => PathBuf::from(value),
        None => {
            eprintln!("Error: {} requires a path argument", args[i]);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"facematch - detect faces and match them against a labelled training set

USAGE:
    facematch [OPTIONS] --train DIR [QUERY...]

Training images are read from DIR/<label>/<image>. Every face found in a
QUERY image is compared against the enrolled faces.

OPTIONS:
    --train, -t DIR     Directory of labelled training images
    --config, -c PATH   Path to config file
    --json              Print one JSON object per detected face
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FACEMATCH_CONFIG    Path to config file (overrides default location)
    FACEMATCH_LOG       Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/facematch/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load().with_context(|| {
            format!("Failed to load config (set {} to override)", CONFIG_ENV)
        })?,
    };

    logging::init(config.log_dir.as_deref())?;

    let Some(train_dir) = args.train_dir.as_deref() else {
        eprintln!("Error: --train DIR is required");
        print_help();
        std::process::exit(1);
    };

    let processor = FaceProcessor::from_config(&config)?;
    let bank = config.bank.build();

    enroll(&processor, &bank, train_dir, &config.enrollment.image_extensions)?;

    for path in &args.queries {
        query(&processor, &bank, path, args.json)?;
    }

    Ok(())
}

/// Fill the bank from the training directory, reporting progress on stderr.
fn enroll(
    processor: &FaceProcessor,
    bank: &FeatureBank,
    root: &Path,
    extensions: &[String],
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let reporter = thread::spawn(move || {
        for status in rx {
            match status {
                EnrollmentStatus::Processing { current, total, path } => {
                    eprintln!("[{}/{}] {}", current, total, path);
                }
                EnrollmentStatus::Error { message } => eprintln!("{}", message),
                EnrollmentStatus::Completed {
                    images_processed,
                    faces_enrolled,
                    failures,
                } => eprintln!(
                    "Enrolled {} faces from {} images ({} failed)",
                    faces_enrolled, images_processed, failures
                ),
                _ => {}
            }
        }
    });

    let summary = processor
        .enroll_directory(bank, root, extensions, Some(tx))
        .with_context(|| format!("Failed to enroll {:?}", root))?;
    let _ = reporter.join();

    if summary.faces == 0 {
        tracing::warn!(root = ?root, "No faces enrolled, every query will be unknown");
    }
    Ok(())
}

/// Identify the faces of one query image and print the result.
///
/// A query image that cannot be processed is reported and skipped.
fn query(processor: &FaceProcessor, bank: &FeatureBank, path: &Path, json: bool) -> Result<()> {
    let identifications = match processor.identify(bank, path) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Query failed");
            eprintln!("{}: {}", path.display(), e);
            return Ok(());
        }
    };

    let mut stdout = io::stdout().lock();
    if identifications.is_empty() && !json {
        writeln!(stdout, "{}: no faces detected", path.display())?;
    }
    for id in &identifications {
        if json {
            writeln!(stdout, "{}", serde_json::to_string(id)?)?;
        } else {
            writeln!(stdout, "{}", describe(id))?;
        }
    }
    Ok(())
}

fn describe(id: &Identification) -> String {
    let b = id.bbox;
    let verdict = match &id.outcome {
        MatchOutcome::Match { label, distance, .. } => {
            format!("{} (distance {:.3})", label, distance)
        }
        MatchOutcome::NoConfidentMatch { nearest, distance } => {
            format!("unknown, closest is {} (distance {:.3})", nearest, distance)
        }
        MatchOutcome::Empty => "unknown, nothing enrolled".to_string(),
    };
    format!(
        "{} face {} [{}, {}, {}, {}] confidence {:.3}: {}",
        id.path.display(),
        id.face,
        b.x1,
        b.y1,
        b.x2,
        b.y2,
        id.confidence,
        verdict
    )
}
