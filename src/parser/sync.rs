//! Frame synchronization
//!
//! Partitions a raw TLG byte stream into validated frames and header gaps.
//! Frames are not self-delimiting, so every candidate position is checked
//! against the configured mode profiles: the current mode first, then the
//! remaining modes in configuration order. When nothing validates the cursor
//! advances a single byte and the skipped bytes accumulate into a gap, which is
//! closed by the next valid frame or by the end of the stream.
//!
//! The emitted items tile the input exactly: every byte belongs to exactly one
//! frame or gap, in stream order.

use crate::error::TlgError;
use crate::profile::{FrameModeProfile, ProfileSet};
use crate::types::{Frame, HeaderGapEvent, ModeId, ScanItem};
use tracing::debug;

/// Per-stream mutable state of the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncCursor {
    offset: usize,
    current_mode: usize,
    pending_gap_start: Option<usize>,
}

/// Lazy, single-pass scan over one stream
///
/// Owns its cursor; scanning the same stream again requires a new scanner.
pub struct FrameSynchronizer<'a> {
    data: &'a [u8],
    profiles: &'a ProfileSet,
    cursor: SyncCursor,
    queued: Option<Frame<'a>>,
    finished: bool,
}

/// Scan `data` starting in `initial_mode`
pub fn scan<'a>(
    data: &'a [u8],
    profiles: &'a ProfileSet,
    initial_mode: ModeId,
) -> Result<FrameSynchronizer<'a>, TlgError> {
    FrameSynchronizer::new(data, profiles, initial_mode)
}

impl<'a> FrameSynchronizer<'a> {
    pub fn new(
        data: &'a [u8],
        profiles: &'a ProfileSet,
        initial_mode: ModeId,
    ) -> Result<Self, TlgError> {
        let current_mode = profiles.position(initial_mode).ok_or_else(|| {
            TlgError::Config(format!("initial mode {initial_mode} is not a configured profile"))
        })?;

        Ok(Self {
            data,
            profiles,
            cursor: SyncCursor {
                offset: 0,
                current_mode,
                pending_gap_start: None,
            },
            queued: None,
            finished: false,
        })
    }

    /// Offset of the next byte the scanner has not yet consumed
    pub fn offset(&self) -> usize {
        self.cursor.offset
    }

    pub fn current_mode(&self) -> ModeId {
        self.current_profile().mode_id
    }

    fn current_profile(&self) -> &'a FrameModeProfile {
        let profiles: &'a ProfileSet = self.profiles;
        &profiles.profiles()[self.cursor.current_mode]
    }

    /// Index of the first profile validating at the cursor, in priority order
    fn match_at(&self, offset: usize) -> Option<usize> {
        let remaining = self.data.len() - offset;
        let profiles = self.profiles.profiles();
        let current = self.cursor.current_mode;

        std::iter::once(current)
            .chain((0..profiles.len()).filter(|&i| i != current))
            .find(|&i| {
                let profile = &profiles[i];
                profile.frame_length <= remaining
                    && profile.validate(&self.data[offset..offset + profile.frame_length])
            })
    }

    fn close_gap(&mut self, end: usize, mode_after: Option<ModeId>) -> Option<HeaderGapEvent> {
        let start = self.cursor.pending_gap_start.take()?;
        let gap = HeaderGapEvent {
            source_offset: start,
            length: end - start,
            mode_before: self.current_mode(),
            mode_after,
        };
        debug!(
            offset = gap.source_offset,
            length = gap.length,
            mode_before = %gap.mode_before,
            mode_after = ?gap.mode_after,
            "header gap"
        );
        Some(gap)
    }

    fn advance(&mut self) -> Option<ScanItem<'a>> {
        if let Some(frame) = self.queued.take() {
            return Some(ScanItem::Frame(frame));
        }
        if self.finished {
            return None;
        }

        let data: &'a [u8] = self.data;
        let profiles: &'a ProfileSet = self.profiles;
        let min_frame_length = profiles.min_frame_length();
        while data.len() - self.cursor.offset >= min_frame_length {
            let offset = self.cursor.offset;
            let Some(index) = self.match_at(offset) else {
                self.cursor.pending_gap_start.get_or_insert(offset);
                self.cursor.offset += 1;
                continue;
            };

            let profile = &profiles.profiles()[index];
            if index != self.cursor.current_mode {
                debug!(
                    offset,
                    from = %self.current_mode(),
                    to = %profile.mode_id,
                    "frame mode switch"
                );
            }
            let gap = self.close_gap(offset, Some(profile.mode_id));

            self.cursor.current_mode = index;
            self.cursor.offset += profile.frame_length;
            let frame = Frame {
                source_offset: offset,
                mode_id: profile.mode_id,
                frame_length: profile.frame_length,
                payload: &data[offset + profile.overhead_length..self.cursor.offset],
            };

            return match gap {
                Some(gap) => {
                    self.queued = Some(frame);
                    Some(ScanItem::Gap(gap))
                }
                None => Some(ScanItem::Frame(frame)),
            };
        }

        // Too few bytes left for any frame
        self.finished = true;
        let end = data.len();
        if self.cursor.offset < end {
            self.cursor.pending_gap_start.get_or_insert(self.cursor.offset);
        }
        self.cursor.offset = end;
        self.close_gap(end, None).map(ScanItem::Gap)
    }
}

impl<'a> Iterator for FrameSynchronizer<'a> {
    type Item = ScanItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}

impl std::iter::FusedIterator for FrameSynchronizer<'_> {}
