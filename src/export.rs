//! Export functionality for parsed TLG data
//!
//! Writes recovered records to one CSV per input file, the merged gap audit of
//! a batch to `header_gaps.csv`, and optionally a JSON summary per file.

#[cfg(any(feature = "csv", feature = "json"))]
use crate::conversion::format_iso_timestamp;
#[cfg(feature = "csv")]
use crate::filters::should_skip_export;
#[cfg(any(feature = "csv", feature = "json"))]
use crate::types::*;
#[cfg(any(feature = "csv", feature = "json"))]
use crate::Result;
#[cfg(any(feature = "csv", feature = "json"))]
use anyhow::Context;
use std::path::{Path, PathBuf};
#[cfg(any(feature = "csv", feature = "json"))]
use tracing::{debug, info};

/// Fixed file name of the merged gap audit
pub const GAP_AUDIT_FILE_NAME: &str = "header_gaps.csv";

/// Column names of the record CSV, in output order
pub const RECORD_CSV_COLUMNS: [&str; 25] = [
    "source",
    "offset",
    "mode",
    "timestamp",
    "timestamp_ms",
    "latitude_deg",
    "longitude_deg",
    "altitude_m",
    "yield_t_ha",
    "moisture_pct",
    "mass_flow_kg_s",
    "volume_flow_l_s",
    "density_kg_l",
    "wheel_speed_m_s",
    "gps_speed_m_s",
    "crop_type",
    "machine_state",
    "satellites",
    "position_status",
    "corrected",
    "zero_yield",
    "machine_idle",
    "density_out_of_range",
    "position_invalid",
    "unknown_crop",
];

/// Column names of the gap audit CSV
pub const GAP_AUDIT_COLUMNS: [&str; 5] =
    ["source", "offset", "length", "mode_before", "mode_after"];

/// Export options for controlling output formats
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub csv: bool,
    /// Write the merged gap audit
    pub audit: bool,
    pub json: bool,
    pub output_dir: Option<String>,
    pub force_export: bool,
}

/// Paths written by an export, `None` for formats not written
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub csv_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    /// Reason the log was not exported
    pub skipped: Option<String>,
}

/// Output locations for one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub output_dir: PathBuf,
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Compute output paths consistently: `<output_dir>/<stem>.csv`, where the
/// output directory defaults to the input file's parent
pub fn compute_export_paths(input_path: &Path, export_options: &ExportOptions) -> ExportPaths {
    let base_name = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("tlg");

    let output_dir = match export_options.output_dir {
        Some(ref dir) => PathBuf::from(dir),
        None => input_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    };

    ExportPaths {
        csv: output_dir.join(format!("{base_name}.csv")),
        json: output_dir.join(format!("{base_name}.summary.json")),
        output_dir,
    }
}

/// Output directory for batch-level files such as the gap audit
pub fn batch_output_dir(inputs: &[PathBuf], export_options: &ExportOptions) -> PathBuf {
    match (&export_options.output_dir, inputs.first()) {
        (Some(dir), _) => PathBuf::from(dir),
        (None, Some(first)) => compute_export_paths(first, export_options).output_dir,
        (None, None) => PathBuf::from("."),
    }
}

#[cfg(any(feature = "csv", feature = "json"))]
fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {dir:?}"))?;
        debug!(dir = ?dir, "created output directory");
    }
    Ok(())
}

#[cfg(feature = "csv")]
fn opt_f64(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(String::new, |v| format!("{v:.precision$}"))
}

#[cfg(feature = "csv")]
fn opt_i64(value: Option<i64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

#[cfg(feature = "csv")]
fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[cfg(feature = "csv")]
fn record_row(r: &ScaledRecord) -> Vec<String> {
    vec![
        r.source.to_string(),
        r.record.source_offset.to_string(),
        r.record.mode_id.to_string(),
        format_iso_timestamp(r.timestamp_ms),
        r.timestamp_ms.to_string(),
        format!("{:.7}", r.latitude_deg),
        format!("{:.7}", r.longitude_deg),
        opt_f64(r.altitude_m, 3),
        opt_f64(r.yield_t_ha, 5),
        opt_f64(r.moisture_pct, 4),
        opt_f64(r.mass_flow_kg_s, 6),
        opt_f64(r.volume_flow_l_s, 6),
        opt_f64(r.density_kg_l, 4),
        opt_f64(r.wheel_speed_m_s, 3),
        opt_f64(r.gps_speed_m_s, 3),
        opt_i64(r.record.crop_type),
        opt_i64(r.record.machine_state),
        opt_i64(r.record.satellites),
        r.record.position_status.to_string(),
        flag(r.corrected_flag).to_string(),
        flag(r.flags.zero_yield).to_string(),
        flag(r.flags.machine_idle).to_string(),
        flag(r.flags.density_out_of_range).to_string(),
        flag(r.flags.position_invalid).to_string(),
        flag(r.flags.unknown_crop).to_string(),
    ]
}

/// Export the records of one log to `<stem>.csv`
///
/// Appends without repeating the header when the file already has content,
/// so repeated exports of the same source accumulate.
#[cfg(feature = "csv")]
pub fn export_to_csv(
    log: &TlgLog,
    input_path: &Path,
    export_options: &ExportOptions,
) -> Result<ExportReport> {
    let mut report = ExportReport::default();
    let (skip, reason) = should_skip_export(log, export_options.force_export);
    if skip {
        info!(source = %log.source, reason = %reason, "skipping export");
        report.skipped = Some(reason);
        return Ok(report);
    }

    let paths = compute_export_paths(input_path, export_options);
    ensure_dir(&paths.output_dir)?;

    let has_content = std::fs::metadata(&paths.csv).is_ok_and(|m| m.len() > 0);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", paths.csv))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if !has_content {
        writer.write_record(RECORD_CSV_COLUMNS)?;
    }
    for record in &log.records {
        writer.write_record(record_row(record))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV file: {:?}", paths.csv))?;

    info!(
        path = %paths.csv.display(),
        rows = log.records.len(),
        appended = has_content,
        "exported records"
    );
    report.csv_path = Some(paths.csv);
    Ok(report)
}

/// Write the merged gap audit of a batch to `<output_dir>/header_gaps.csv`,
/// replacing any previous audit
#[cfg(feature = "csv")]
pub fn export_gap_audit(batch: &TlgBatch, output_dir: &Path) -> Result<PathBuf> {
    ensure_dir(output_dir)?;
    let path = output_dir.join(GAP_AUDIT_FILE_NAME);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create gap audit file: {path:?}"))?;

    writer.write_record(GAP_AUDIT_COLUMNS)?;
    let rows = batch.gap_audit();
    for row in &rows {
        writer.write_record([
            row.source.to_string(),
            row.source_offset.to_string(),
            row.length.to_string(),
            row.mode_before.to_string(),
            row.mode_after.map_or_else(String::new, |m| m.to_string()),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush gap audit file: {path:?}"))?;

    info!(path = %path.display(), rows = rows.len(), "exported gap audit");
    Ok(path)
}

/// Per-file summary written by [`export_summary_json`]
#[cfg(feature = "json")]
#[derive(Debug, serde::Serialize)]
pub struct LogSummary<'a> {
    pub source: &'a str,
    pub records: usize,
    pub idle_records: usize,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_seconds: f64,
    pub stats: &'a FrameStats,
    pub gap_summary: crate::gaps::GapSummary,
    pub truncated: bool,
    pub cancelled: bool,
}

#[cfg(feature = "json")]
impl<'a> From<&'a TlgLog> for LogSummary<'a> {
    fn from(log: &'a TlgLog) -> Self {
        Self {
            source: &log.source,
            records: log.records.len(),
            idle_records: log.idle_records(),
            start_time: log.stats.start_time_ms.map(format_iso_timestamp),
            end_time: log.stats.end_time_ms.map(format_iso_timestamp),
            duration_seconds: log.duration_seconds(),
            stats: &log.stats,
            gap_summary: log.gap_summary,
            truncated: log.truncated,
            cancelled: log.cancelled,
        }
    }
}

/// Write `<stem>.summary.json` with frame statistics and the gap summary
#[cfg(feature = "json")]
pub fn export_summary_json(
    log: &TlgLog,
    input_path: &Path,
    export_options: &ExportOptions,
) -> Result<PathBuf> {
    let paths = compute_export_paths(input_path, export_options);
    ensure_dir(&paths.output_dir)?;

    let file = std::fs::File::create(&paths.json)
        .with_context(|| format!("Failed to create summary file: {:?}", paths.json))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &LogSummary::from(log))
        .with_context(|| format!("Failed to write summary file: {:?}", paths.json))?;

    info!(path = %paths.json.display(), "exported summary");
    Ok(paths.json)
}
