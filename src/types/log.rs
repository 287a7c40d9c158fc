use crate::gaps::GapSummary;
use crate::types::{FrameStats, HeaderGapEvent, ModeId, ScaledRecord};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Everything recovered from one TLG file
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TlgLog {
    /// File stem, e.g. `TLG00001`
    pub source: Arc<str>,
    pub path: Option<PathBuf>,
    pub records: Vec<ScaledRecord>,
    pub gaps: Vec<HeaderGapEvent>,
    pub gap_summary: GapSummary,
    pub stats: FrameStats,
    /// The stream ended inside a frame or was not fully scanned
    pub truncated: bool,
    pub cancelled: bool,
}

impl TlgLog {
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            path: None,
            records: Vec::new(),
            gaps: Vec::new(),
            gap_summary: GapSummary::default(),
            stats: FrameStats::default(),
            truncated: false,
            cancelled: false,
        }
    }

    /// Time covered by the recovered records in milliseconds
    pub fn duration_ms(&self) -> i64 {
        match (self.stats.start_time_ms, self.stats.end_time_ms) {
            (Some(start), Some(end)) => end.saturating_sub(start).max(0),
            _ => 0,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn idle_records(&self) -> usize {
        self.records.iter().filter(|r| r.flags.machine_idle).count()
    }

    pub fn frames_in_mode(&self, mode: ModeId) -> u32 {
        self.stats.frames_in_mode(mode)
    }
}

/// A file of the batch that could not be processed
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FileFailure {
    pub path: PathBuf,
    /// Error with its full context chain
    pub error: String,
}

/// One row of the merged gap audit
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GapAuditRow {
    pub source: Arc<str>,
    pub source_offset: usize,
    pub length: usize,
    pub mode_before: ModeId,
    pub mode_after: Option<ModeId>,
}

/// Results of a batch, in input order
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TlgBatch {
    pub logs: Vec<TlgLog>,
    pub failures: Vec<FileFailure>,
}

impl TlgBatch {
    pub fn total_records(&self) -> usize {
        self.logs.iter().map(|log| log.records.len()).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.logs.iter().any(|log| log.cancelled)
    }

    /// Gap events of every file, grouped by file in batch order
    pub fn gap_audit(&self) -> Vec<GapAuditRow> {
        self.logs
            .iter()
            .flat_map(|log| {
                log.gaps.iter().map(|gap| GapAuditRow {
                    source: Arc::clone(&log.source),
                    source_offset: gap.source_offset,
                    length: gap.length,
                    mode_before: gap.mode_before,
                    mode_after: gap.mode_after,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_gaps(source: &str, offsets: &[usize]) -> TlgLog {
        let mut log = TlgLog::new(source);
        log.gaps = offsets
            .iter()
            .map(|&source_offset| HeaderGapEvent {
                source_offset,
                length: 3,
                mode_before: ModeId(1),
                mode_after: Some(ModeId(2)),
            })
            .collect();
        log
    }

    #[test]
    fn test_gap_audit_keeps_file_order() {
        let batch = TlgBatch {
            logs: vec![log_with_gaps("B", &[10, 50]), log_with_gaps("A", &[7])],
            failures: Vec::new(),
        };
        let rows: Vec<_> = batch
            .gap_audit()
            .into_iter()
            .map(|row| (row.source.to_string(), row.source_offset))
            .collect();
        assert_eq!(
            rows,
            vec![("B".into(), 10), ("B".into(), 50), ("A".into(), 7)]
        );
    }

    #[test]
    fn test_duration() {
        let mut log = TlgLog::new("TLG00001");
        assert_eq!(log.duration_ms(), 0);
        log.stats.start_time_ms = Some(1_000);
        log.stats.end_time_ms = Some(61_000);
        assert_eq!(log.duration_seconds(), 60.0);
    }
}
