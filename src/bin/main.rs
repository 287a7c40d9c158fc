//! CLI binary for TLG Parser
//!
//! This provides the command-line interface for the TLG parser library.

use anyhow::Result;
use clap::{value_parser, Arg, Command};
use glob::glob;
use std::path::{Path, PathBuf};
use tlg_parser::{
    batch_output_dir, export_gap_audit, export_to_csv, CancelToken, ExportOptions, TlgConfig,
    TlgLog, TlgPipeline,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_DATE"),
    ")"
);

fn main() -> Result<()> {
    let matches = Command::new("TLG Parser")
        .version(VERSION)
        .about("Recover sensor records from harvest TLG binary logs. Output to CSV and JSON.")
        .arg(
            Arg::new("files")
                .help("TLG files to parse (.bin extension, case-insensitive, supports globbing)")
                .required_unless_present("dump-config")
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML file with frame profiles, scaling, crop table and thresholds")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("dump-config")
                .long("dump-config")
                .help("Print the built-in configuration as TOML and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug output (per-frame and per-gap detail)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .help("Export records to <stem>.csv and the gap audit to header_gaps.csv")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-audit")
                .long("no-audit")
                .help("Do not write header_gaps.csv")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Export a <stem>.summary.json per file (requires the json feature)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .help("Directory for output files (default: same as input file)")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("force-export")
                .long("force-export")
                .help("Export even logs the heuristics would skip (empty, mostly gaps, all idle)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .short('j')
                .help("Number of files processed in parallel (default: available cores)")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .default_value("0"),
        )
        .get_matches();

    let debug = matches.get_flag("debug");
    let default_level = if debug { "tlg_parser=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match matches.get_one::<String>("config") {
        Some(path) => TlgConfig::load(Path::new(path))?,
        None => TlgConfig::default(),
    };

    if matches.get_flag("dump-config") {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let export_csv = matches.get_flag("csv");
    let export_options = ExportOptions {
        csv: export_csv,
        audit: export_csv && !matches.get_flag("no-audit"),
        json: matches.get_flag("json"),
        output_dir: matches.get_one::<String>("output-dir").cloned(),
        force_export: matches.get_flag("force-export"),
    };
    let jobs = matches.get_one::<usize>("jobs").copied().unwrap_or(0);
    let file_patterns: Vec<&String> = matches
        .get_many::<String>("files")
        .map(|files| files.collect())
        .unwrap_or_default();

    let valid_paths = collect_input_paths(&file_patterns, debug);
    if valid_paths.is_empty() {
        eprintln!("Error: No valid files found to process.");
        eprintln!("Supported extensions: .bin (case-insensitive)");
        eprintln!("Input patterns were: {file_patterns:?}");
        std::process::exit(1);
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, finishing with partial results...");
        handler_token.cancel();
    }) {
        warn!("Failed to set signal handler: {e}");
    }

    let pipeline = TlgPipeline::new(&config)?;
    let batch = pipeline.parse_batch(&valid_paths, jobs, &cancel)?;

    for (index, log) in batch.logs.iter().enumerate() {
        if index > 0 {
            println!();
        }
        print_summary(log, &pipeline);

        let input_path = log.path.clone().unwrap_or_else(|| PathBuf::from("."));
        if export_options.csv {
            let report = export_to_csv(log, &input_path, &export_options)?;
            match (report.csv_path, report.skipped) {
                (Some(path), _) => println!("  Exported records to: {}", path.display()),
                (None, Some(reason)) => println!("  Skipped export: {reason}"),
                (None, None) => {}
            }
        }
        if export_options.json {
            export_json(log, &input_path, &export_options)?;
        }
    }

    if export_options.audit {
        let dir = batch_output_dir(&valid_paths, &export_options);
        let path = export_gap_audit(&batch, &dir)?;
        println!();
        println!("Gap audit written to: {}", path.display());
    }

    for failure in &batch.failures {
        eprintln!("Error processing {}: {}", failure.path.display(), failure.error);
    }
    if batch.cancelled() {
        eprintln!("Interrupted: results are partial.");
    }

    if batch.logs.is_empty() {
        eprintln!(
            "Error: No files were successfully processed out of {} files found.",
            valid_paths.len()
        );
        eprintln!("Use --debug flag for more detailed error information.");
        std::process::exit(1);
    }

    Ok(())
}

/// Expand globs and keep existing files with a `.bin` extension
fn collect_input_paths(file_patterns: &[&String], debug: bool) -> Vec<PathBuf> {
    let mut valid_paths = Vec::new();
    for pattern in file_patterns {
        let paths: Vec<_> = if pattern.contains('*') || pattern.contains('?') {
            match glob(pattern) {
                Ok(glob_iter) => match glob_iter.collect::<Result<Vec<_>, _>>() {
                    Ok(paths) => {
                        if debug {
                            println!("Glob pattern '{pattern}' matched {} files", paths.len());
                        }
                        paths
                    }
                    Err(e) => {
                        eprintln!("Error expanding glob pattern '{pattern}': {e}");
                        continue;
                    }
                },
                Err(e) => {
                    eprintln!("Invalid glob pattern '{pattern}': {e}");
                    continue;
                }
            }
        } else {
            vec![PathBuf::from(pattern.as_str())]
        };

        for path in paths {
            if !path.exists() {
                eprintln!("Warning: File does not exist: {path:?}");
                continue;
            }

            let valid_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"));
            if !valid_extension {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("none");
                eprintln!("Warning: Skipping file with unsupported extension '{ext}': {path:?}");
                continue;
            }
            valid_paths.push(path);
        }
    }
    valid_paths
}

fn print_summary(log: &TlgLog, pipeline: &TlgPipeline) {
    let filename = log
        .path
        .as_deref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or(&*log.source);
    println!("Processing: {filename}");

    let per_mode: Vec<String> = log
        .stats
        .frames_by_mode
        .iter()
        .map(|(mode, count)| format!("{}: {count}", pipeline.profiles().name(*mode)))
        .collect();
    println!(
        "  Frames: {} ({}), mode switches: {}",
        log.stats.total_frames,
        per_mode.join(", "),
        log.stats.mode_switches
    );
    println!(
        "  Records: {} (idle: {}), duration: {:.1}s",
        log.records.len(),
        log.idle_records(),
        log.duration_seconds()
    );
    println!(
        "  Gaps: {} ({} bytes skipped, longest {} bytes)",
        log.gap_summary.gap_count, log.gap_summary.total_bytes_skipped, log.gap_summary.longest_gap
    );
    if log.stats.decode_errors > 0 {
        println!("  Decode errors: {}", log.stats.decode_errors);
    }
    if log.stats.unknown_crop_records > 0 {
        println!("  Unknown crop records: {}", log.stats.unknown_crop_records);
    }
    if log.cancelled {
        println!("  Cancelled before the end of the stream");
    } else if log.truncated {
        println!(
            "  Truncated: {} trailing bytes",
            log.gap_summary.trailing_bytes
        );
    }
}

#[cfg(feature = "json")]
fn export_json(log: &TlgLog, input_path: &Path, export_options: &ExportOptions) -> Result<()> {
    let path = tlg_parser::export_summary_json(log, input_path, export_options)?;
    println!("  Exported summary to: {}", path.display());
    Ok(())
}

#[cfg(not(feature = "json"))]
fn export_json(_log: &TlgLog, _input_path: &Path, _export_options: &ExportOptions) -> Result<()> {
    warn!("--json requires building with the `json` feature; skipping");
    Ok(())
}
