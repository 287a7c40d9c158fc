//! Export filtering heuristics for identifying logs worth exporting
//!
//! Harvest controllers leave behind files that decode to nothing useful: logs
//! written while the combine was parked, files from other devices that happen
//! to carry the same extension, and stubs cut off before the first frame.
//!
//! # Usage
//!
//! These filters are controlled via `ExportOptions::force_export`. The CLI skips
//! such logs by default; library consumers call [`should_skip_export`] as needed.

use crate::types::TlgLog;

/// Share of input bytes above which a file is considered not to be a TLG stream
pub const MAX_GAP_RATIO: f64 = 0.9;

/// Determines if a log should be skipped for export
///
/// # Arguments
/// * `log` - The parsed log to evaluate
/// * `force_export` - If true, never skips (overrides all heuristics)
///
/// # Returns
/// Tuple of (should_skip, reason_description)
pub fn should_skip_export(log: &TlgLog, force_export: bool) -> (bool, String) {
    if force_export {
        return (false, String::new());
    }

    if log.records.is_empty() {
        return (true, "no records recovered".to_string());
    }

    let ratio = gap_ratio(log);
    if ratio > MAX_GAP_RATIO {
        return (
            true,
            format!(
                "{:.1}% of bytes outside valid frames - likely a different device",
                ratio * 100.0
            ),
        );
    }

    if log.records.iter().all(|r| r.flags.machine_idle) {
        return (
            true,
            format!("machine idle for all {} records", log.records.len()),
        );
    }

    (false, String::new())
}

/// Fraction of the stream's bytes that fell into header gaps
pub fn gap_ratio(log: &TlgLog) -> f64 {
    if log.stats.total_bytes == 0 {
        return 0.0;
    }
    log.gap_summary.total_bytes_skipped as f64 / log.stats.total_bytes as f64
}
