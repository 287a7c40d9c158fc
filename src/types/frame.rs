use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Identifier of a framing mode, as given in the profile configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ModeId(pub u8);

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One validated fixed-length frame located in the source stream
///
/// The payload borrows from the stream; the overhead bytes that precede it are
/// not kept since nothing downstream interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub source_offset: usize,
    pub mode_id: ModeId,
    pub frame_length: usize,
    pub payload: &'a [u8],
}

impl Frame<'_> {
    /// Byte range of the whole frame (overhead + payload) in the source stream
    pub fn byte_range(&self) -> Range<usize> {
        self.source_offset..self.source_offset + self.frame_length
    }
}

/// A run of bytes that matched no frame profile when it was scanned
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HeaderGapEvent {
    pub source_offset: usize,
    pub length: usize,
    pub mode_before: ModeId,
    /// Mode of the frame that ended the gap; `None` for the trailing gap at end of stream
    pub mode_after: Option<ModeId>,
}

impl HeaderGapEvent {
    pub fn byte_range(&self) -> Range<usize> {
        self.source_offset..self.source_offset + self.length
    }

    /// True for the gap closing the stream, i.e. bytes too short for any frame
    pub fn is_trailing(&self) -> bool {
        self.mode_after.is_none()
    }
}

/// Item produced by the frame synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem<'a> {
    Frame(Frame<'a>),
    Gap(HeaderGapEvent),
}

impl ScanItem<'_> {
    pub fn byte_range(&self) -> Range<usize> {
        match self {
            ScanItem::Frame(frame) => frame.byte_range(),
            ScanItem::Gap(gap) => gap.byte_range(),
        }
    }
}

/// Frame statistics for one stream
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FrameStats {
    pub frames_by_mode: BTreeMap<ModeId, u32>,
    pub total_frames: u32,
    pub total_bytes: u64,
    pub frame_bytes: u64,
    pub decode_errors: u32,
    pub unknown_crop_records: u32,
    pub mode_switches: u32,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
}

impl FrameStats {
    pub fn count_frame(&mut self, frame: &Frame<'_>) {
        *self.frames_by_mode.entry(frame.mode_id).or_insert(0) += 1;
        self.total_frames += 1;
        self.frame_bytes += frame.frame_length as u64;
    }

    pub fn frames_in_mode(&self, mode: ModeId) -> u32 {
        self.frames_by_mode.get(&mode).copied().unwrap_or(0)
    }
}
