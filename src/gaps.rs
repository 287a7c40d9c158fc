use crate::types::HeaderGapEvent;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Totals over the header gaps of one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GapSummary {
    pub total_bytes_skipped: u64,
    pub gap_count: usize,
    /// Length in bytes of the longest single gap
    pub longest_gap: usize,
    /// Bytes in the trailing gap left by a truncated tail
    pub trailing_bytes: usize,
}

/// Ordered, append-only log of the gaps found while scanning one stream
#[derive(Debug, Clone, Default)]
pub struct HeaderGapMonitor {
    events: Vec<HeaderGapEvent>,
    summary: GapSummary,
}

impl HeaderGapMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, gap: HeaderGapEvent) {
        self.summary.total_bytes_skipped += gap.length as u64;
        self.summary.gap_count += 1;
        self.summary.longest_gap = self.summary.longest_gap.max(gap.length);
        if gap.is_trailing() {
            self.summary.trailing_bytes += gap.length;
        }
        self.events.push(gap);
    }

    pub fn summary(&self) -> GapSummary {
        self.summary
    }

    pub fn events(&self) -> &[HeaderGapEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<HeaderGapEvent> {
        self.events
    }
}
