//! Framing mode profiles
//!
//! A [`FrameModeProfile`] fixes the frame length, overhead length and payload
//! layout of one operating mode, together with the predicate that decides
//! whether a window of bytes is a real frame of that mode. The predicate is a
//! list of configurable [`ValidationRule`]s, optionally extended by a custom
//! [`FrameValidator`] supplied by the caller.

use crate::error::TlgError;
use crate::parser::stream::TlgDataStream;
use crate::schema::{RecordField, RecordSchema};
use crate::types::{ModeId, SensorRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Externally supplied frame predicate
///
/// Receives the full frame (overhead followed by payload).
pub trait FrameValidator: Send + Sync + fmt::Debug {
    fn validate(&self, frame: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    /// Wrapping byte sum stored in one byte
    Sum8,
    /// XOR of all bytes stored in one byte
    Xor8,
    /// Wrapping byte sum stored as little-endian u16
    Sum16Le,
}

impl ChecksumKind {
    pub fn compute(self, bytes: &[u8]) -> u16 {
        match self {
            ChecksumKind::Sum8 => bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) as u16,
            ChecksumKind::Xor8 => bytes.iter().fold(0u8, |acc, b| acc ^ b) as u16,
            ChecksumKind::Sum16Le => bytes
                .iter()
                .fold(0u16, |acc, b| acc.wrapping_add(*b as u16)),
        }
    }

    pub fn width(self) -> usize {
        match self {
            ChecksumKind::Sum8 | ChecksumKind::Xor8 => 1,
            ChecksumKind::Sum16Le => 2,
        }
    }
}

/// One structural check on a candidate frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Fixed bytes at a frame-relative offset
    Marker { offset: usize, bytes: Vec<u8> },
    /// Payload field (located through the mode's schema) within `[min, max]`
    FieldRange {
        field: RecordField,
        min: i64,
        max: i64,
    },
    /// Checksum over the frame-relative range `start..end`, stored at `at`
    Checksum {
        kind: ChecksumKind,
        start: usize,
        end: usize,
        at: usize,
    },
}

impl ValidationRule {
    fn check(&self, frame: &[u8], overhead_length: usize, schema: &RecordSchema) -> bool {
        match self {
            ValidationRule::Marker { offset, bytes } => frame
                .get(*offset..offset + bytes.len())
                .is_some_and(|window| window == bytes.as_slice()),
            ValidationRule::FieldRange { field, min, max } => frame
                .get(overhead_length..)
                .and_then(|payload| schema.read(*field, payload))
                .is_some_and(|value| (*min..=*max).contains(&value)),
            ValidationRule::Checksum {
                kind,
                start,
                end,
                at,
            } => {
                let Some(covered) = frame.get(*start..*end) else {
                    return false;
                };
                let mut stream = TlgDataStream::new(frame);
                stream.set_position(*at);
                let stored = match kind.width() {
                    1 => stream.read_byte().map(u16::from),
                    _ => stream.read_u16_le(),
                };
                stored.is_ok_and(|stored| stored == kind.compute(covered))
            }
        }
    }

    /// Frame-relative byte range the rule reads, used for bounds checks
    fn extent(&self, overhead_length: usize, schema: &RecordSchema) -> usize {
        match self {
            ValidationRule::Marker { offset, bytes } => offset + bytes.len(),
            ValidationRule::FieldRange { field, .. } => schema
                .spec(*field)
                .map(|spec| overhead_length + spec.end())
                .unwrap_or(usize::MAX),
            ValidationRule::Checksum { kind, end, at, .. } => (*end).max(at + kind.width()),
        }
    }

    /// Frame bytes `encode_frame` writes for this rule
    fn stamped_range(&self) -> Option<Range<usize>> {
        match self {
            ValidationRule::Marker { offset, bytes } => Some(*offset..offset + bytes.len()),
            ValidationRule::Checksum { kind, at, .. } => Some(*at..at + kind.width()),
            ValidationRule::FieldRange { .. } => None,
        }
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end
}

/// Constants and predicate of one framing mode
#[derive(Debug, Clone)]
pub struct FrameModeProfile {
    pub mode_id: ModeId,
    pub name: String,
    pub frame_length: usize,
    pub overhead_length: usize,
    pub payload_length: usize,
    pub schema: RecordSchema,
    pub rules: Vec<ValidationRule>,
    custom: Option<Arc<dyn FrameValidator>>,
}

impl FrameModeProfile {
    /// Build a profile and [`check`](Self::check) it
    pub fn new(
        mode_id: ModeId,
        name: impl Into<String>,
        frame_length: usize,
        overhead_length: usize,
        schema: RecordSchema,
        rules: Vec<ValidationRule>,
    ) -> Result<Self, TlgError> {
        let profile = Self {
            mode_id,
            name: name.into(),
            frame_length,
            overhead_length,
            payload_length: frame_length.saturating_sub(overhead_length),
            schema,
            rules,
            custom: None,
        };
        profile.check()?;
        Ok(profile)
    }

    /// Check `overhead + payload == frame`, that the schema and every rule fit
    /// inside the frame, and that marker and checksum bytes overwrite neither
    /// payload fields nor each other
    pub fn check(&self) -> Result<(), TlgError> {
        let name = self.name.as_str();
        if self.frame_length == 0 {
            return Err(TlgError::invalid_profile(name, "frame length must be positive"));
        }
        if self.overhead_length > self.frame_length {
            return Err(TlgError::invalid_profile(
                name,
                format!(
                    "overhead {} exceeds frame length {}",
                    self.overhead_length, self.frame_length
                ),
            ));
        }
        if self.overhead_length + self.payload_length != self.frame_length {
            return Err(TlgError::invalid_profile(
                name,
                "overhead + payload length must equal frame length",
            ));
        }
        self.schema.check(name, self.payload_length)?;

        for rule in &self.rules {
            if let ValidationRule::Checksum { start, end, .. } = rule {
                if start >= end {
                    return Err(TlgError::invalid_profile(
                        name,
                        format!("empty checksum range {start}..{end}"),
                    ));
                }
            }
            if rule.extent(self.overhead_length, &self.schema) > self.frame_length {
                return Err(TlgError::invalid_profile(
                    name,
                    format!("validation rule {rule:?} reaches beyond the frame"),
                ));
            }
        }

        let markers: Vec<Range<usize>> = self
            .rules
            .iter()
            .filter(|rule| matches!(rule, ValidationRule::Marker { .. }))
            .filter_map(ValidationRule::stamped_range)
            .collect();
        for rule in &self.rules {
            let Some(stamped) = rule.stamped_range() else {
                continue;
            };
            let field = self.schema.fields.iter().find(|spec| {
                let start = self.overhead_length + spec.offset;
                overlaps(&stamped, &(start..start + spec.width))
            });
            if let Some(spec) = field {
                return Err(TlgError::invalid_profile(
                    name,
                    format!(
                        "bytes {}..{} of rule {rule:?} overlap payload field '{}'",
                        stamped.start,
                        stamped.end,
                        spec.field.name()
                    ),
                ));
            }
            if let ValidationRule::Checksum { start, end, .. } = rule {
                if overlaps(&stamped, &(*start..*end)) {
                    return Err(TlgError::invalid_profile(
                        name,
                        format!(
                            "checksum stored at {}..{} lies inside its own range {start}..{end}",
                            stamped.start, stamped.end
                        ),
                    ));
                }
                if markers.iter().any(|marker| overlaps(&stamped, marker)) {
                    return Err(TlgError::invalid_profile(
                        name,
                        format!(
                            "checksum stored at {}..{} overlaps a marker",
                            stamped.start, stamped.end
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Wide harvesting mode: 25-byte overhead + 68-byte payload
    pub fn active_default() -> Self {
        Self {
            mode_id: ModeId(1),
            name: "active".to_string(),
            frame_length: 93,
            overhead_length: 25,
            payload_length: 68,
            schema: RecordSchema::active_default(),
            rules: default_rules(0x01),
            custom: None,
        }
    }

    /// Narrow idle/transport mode: 10-byte overhead + 20-byte payload
    pub fn transport_default() -> Self {
        Self {
            mode_id: ModeId(2),
            name: "transport".to_string(),
            frame_length: 30,
            overhead_length: 10,
            payload_length: 20,
            schema: RecordSchema::transport_default(),
            rules: default_rules(0x02),
            custom: None,
        }
    }

    /// Add a caller-supplied predicate, evaluated after the configured rules
    pub fn with_validator(mut self, validator: Arc<dyn FrameValidator>) -> Self {
        self.custom = Some(validator);
        self
    }

    /// Does `frame` (exactly `frame_length` bytes) look like a frame of this mode
    pub fn validate(&self, frame: &[u8]) -> bool {
        frame.len() == self.frame_length
            && self
                .rules
                .iter()
                .all(|rule| rule.check(frame, self.overhead_length, &self.schema))
            && self
                .custom
                .as_ref()
                .map_or(true, |validator| validator.validate(frame))
    }

    /// Build a synthetic frame for `record`: zeroed overhead, payload written
    /// through the schema, then marker and checksum rules stamped in.
    ///
    /// Returns `None` when a value does not fit its field. Custom validators
    /// are not consulted.
    pub fn encode_frame(&self, record: &SensorRecord) -> Option<Vec<u8>> {
        let mut frame = vec![0u8; self.frame_length];
        {
            let payload = &mut frame[self.overhead_length..];
            for (field, value) in record_values(record) {
                if let Some(value) = value {
                    if self.schema.has(field) && !self.schema.write(field, value, payload) {
                        return None;
                    }
                }
            }
        }

        for rule in &self.rules {
            if let ValidationRule::Marker { offset, bytes } = rule {
                frame[*offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
        for rule in &self.rules {
            if let ValidationRule::Checksum {
                kind,
                start,
                end,
                at,
            } = rule
            {
                let sum = kind.compute(&frame[*start..*end]);
                frame[*at] = sum as u8;
                if kind.width() == 2 {
                    frame[at + 1] = (sum >> 8) as u8;
                }
            }
        }
        Some(frame)
    }
}

fn default_rules(mode_tag: u8) -> Vec<ValidationRule> {
    vec![
        ValidationRule::Marker {
            offset: 0,
            bytes: vec![0xA5, 0x5A, mode_tag],
        },
        ValidationRule::FieldRange {
            field: RecordField::TimeOfDayMs,
            min: 0,
            max: 86_399_999,
        },
        ValidationRule::FieldRange {
            field: RecordField::Latitude,
            min: -900_000_000,
            max: 900_000_000,
        },
        ValidationRule::FieldRange {
            field: RecordField::Longitude,
            min: -1_800_000_000,
            max: 1_800_000_000,
        },
    ]
}

fn record_values(record: &SensorRecord) -> [(RecordField, Option<i64>); 17] {
    [
        (RecordField::TimeOfDayMs, Some(record.time_of_day_ms)),
        (RecordField::DaysSinceEpoch, Some(record.days_since_epoch)),
        (RecordField::Latitude, Some(record.latitude_raw)),
        (RecordField::Longitude, Some(record.longitude_raw)),
        (RecordField::Altitude, record.altitude_raw),
        (RecordField::PositionStatus, Some(record.position_status)),
        (RecordField::Pdop, record.pdop_raw),
        (RecordField::Hdop, record.hdop_raw),
        (RecordField::Satellites, record.satellites),
        (RecordField::Yield, record.yield_raw),
        (RecordField::Moisture, record.moisture_raw),
        (RecordField::MassFlow, record.mass_flow_raw),
        (RecordField::VolumeFlow, record.volume_flow_raw),
        (RecordField::CropType, record.crop_type),
        (RecordField::MachineState, record.machine_state),
        (RecordField::WheelSpeed, record.wheel_speed_raw),
        (RecordField::SwathWidth, record.swath_width_raw),
    ]
}

/// Ordered set of framing modes; order is the synchronizer's fallback priority
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: Vec<FrameModeProfile>,
    min_frame_length: usize,
    max_frame_length: usize,
}

impl ProfileSet {
    pub fn new(profiles: Vec<FrameModeProfile>) -> Result<Self, TlgError> {
        if profiles.is_empty() {
            return Err(TlgError::Config("at least one frame profile is required".into()));
        }
        for (i, profile) in profiles.iter().enumerate() {
            profile.check()?;
            if profiles[..i].iter().any(|p| p.mode_id == profile.mode_id) {
                return Err(TlgError::Config(format!(
                    "duplicate frame mode id {}",
                    profile.mode_id
                )));
            }
        }

        let min_frame_length = profiles.iter().map(|p| p.frame_length).min().unwrap_or(0);
        let max_frame_length = profiles.iter().map(|p| p.frame_length).max().unwrap_or(0);
        Ok(Self {
            profiles,
            min_frame_length,
            max_frame_length,
        })
    }

    pub fn get(&self, mode: ModeId) -> Option<&FrameModeProfile> {
        self.profiles.iter().find(|p| p.mode_id == mode)
    }

    pub fn position(&self, mode: ModeId) -> Option<usize> {
        self.profiles.iter().position(|p| p.mode_id == mode)
    }

    pub fn name(&self, mode: ModeId) -> &str {
        self.get(mode).map_or("unknown", |p| p.name.as_str())
    }

    pub fn profiles(&self) -> &[FrameModeProfile] {
        &self.profiles
    }

    pub fn min_frame_length(&self) -> usize {
        self.min_frame_length
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            profiles: vec![
                FrameModeProfile::active_default(),
                FrameModeProfile::transport_default(),
            ],
            min_frame_length: 30,
            max_frame_length: 93,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> SensorRecord {
        SensorRecord {
            time_of_day_ms: 36_000_000,
            days_since_epoch: 16_000,
            latitude_raw: 556_000_000,
            longitude_raw: 121_000_000,
            position_status: 1,
            yield_raw: Some(241_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_profiles_hold_length_invariant() {
        for profile in ProfileSet::default().profiles() {
            assert_eq!(
                profile.overhead_length + profile.payload_length,
                profile.frame_length
            );
            assert!(profile.schema.check(&profile.name, profile.payload_length).is_ok());
        }
    }

    #[test]
    fn test_encoded_frame_validates() {
        let profile = FrameModeProfile::active_default();
        let frame = profile.encode_frame(&sample_record()).unwrap();
        assert_eq!(frame.len(), 93);
        assert_eq!(&frame[..3], &[0xA5, 0x5A, 0x01]);
        assert!(profile.validate(&frame));
        assert!(!FrameModeProfile::transport_default().validate(&frame[..30]));
    }

    #[test]
    fn test_field_range_rejects_impossible_time() {
        let profile = FrameModeProfile::active_default();
        let mut record = sample_record();
        record.time_of_day_ms = 90_000_000;
        let frame = profile.encode_frame(&record).unwrap();
        assert!(!profile.validate(&frame));
    }

    #[test]
    fn test_checksum_rule() {
        let rules = vec![
            ValidationRule::Marker {
                offset: 0,
                bytes: vec![0x7E],
            },
            ValidationRule::Checksum {
                kind: ChecksumKind::Xor8,
                start: 4,
                end: 24,
                at: 1,
            },
        ];
        let profile = FrameModeProfile::new(
            ModeId(9),
            "xor",
            24,
            4,
            RecordSchema::transport_default(),
            rules,
        )
        .unwrap();

        let mut frame = profile.encode_frame(&sample_record()).unwrap();
        assert!(profile.validate(&frame));
        frame[10] ^= 0x40;
        assert!(!profile.validate(&frame));
    }

    #[test]
    fn test_sum16_checksum() {
        assert_eq!(ChecksumKind::Sum16Le.compute(&[0xFF, 0xFF, 0x02]), 0x0200);
        assert_eq!(ChecksumKind::Sum8.compute(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn test_profile_rejects_rules_outside_frame() {
        let err = FrameModeProfile::new(
            ModeId(3),
            "short",
            30,
            10,
            RecordSchema::transport_default(),
            vec![ValidationRule::Marker {
                offset: 29,
                bytes: vec![1, 2],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, TlgError::InvalidProfile { .. }));
    }

    #[test]
    fn test_profile_set_rechecks_edited_profiles() {
        let mut empty = FrameModeProfile::transport_default();
        empty.frame_length = 0;
        empty.overhead_length = 0;
        empty.payload_length = 0;
        let err = ProfileSet::new(vec![FrameModeProfile::active_default(), empty]).unwrap_err();
        assert!(matches!(err, TlgError::InvalidProfile { .. }));

        let mut stretched = FrameModeProfile::transport_default();
        stretched.payload_length = 40;
        assert!(ProfileSet::new(vec![stretched]).is_err());
    }

    #[test]
    fn test_checksum_inside_its_own_range_is_rejected() {
        let err = FrameModeProfile::new(
            ModeId(1),
            "active",
            93,
            25,
            RecordSchema::active_default(),
            vec![ValidationRule::Checksum {
                kind: ChecksumKind::Sum8,
                start: 0,
                end: 93,
                at: 3,
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("inside its own range"), "{err}");
    }

    #[test]
    fn test_stamped_bytes_must_not_hit_fields_or_markers() {
        let over_field = FrameModeProfile::new(
            ModeId(2),
            "transport",
            30,
            10,
            RecordSchema::transport_default(),
            vec![ValidationRule::Marker {
                offset: 8,
                bytes: vec![0xA5, 0x5A, 0x02],
            }],
        )
        .unwrap_err();
        assert!(over_field.to_string().contains("time_of_day_ms"), "{over_field}");

        let over_marker = FrameModeProfile::new(
            ModeId(2),
            "transport",
            30,
            10,
            RecordSchema::transport_default(),
            vec![
                ValidationRule::Marker {
                    offset: 0,
                    bytes: vec![0xA5, 0x5A, 0x02],
                },
                ValidationRule::Checksum {
                    kind: ChecksumKind::Sum16Le,
                    start: 10,
                    end: 30,
                    at: 2,
                },
            ],
        )
        .unwrap_err();
        assert!(over_marker.to_string().contains("overlaps a marker"), "{over_marker}");
    }

    #[derive(Debug)]
    struct RejectAll;

    impl FrameValidator for RejectAll {
        fn validate(&self, _frame: &[u8]) -> bool {
            false
        }
    }

    #[test]
    fn test_custom_validator_is_applied() {
        let profile = FrameModeProfile::active_default();
        let frame = profile.encode_frame(&sample_record()).unwrap();
        let strict = profile.with_validator(Arc::new(RejectAll));
        assert!(!strict.validate(&frame));
    }

    #[test]
    fn test_profile_set_rejects_duplicates_and_empty() {
        assert!(ProfileSet::new(Vec::new()).is_err());
        let dup = vec![
            FrameModeProfile::active_default(),
            FrameModeProfile::active_default(),
        ];
        assert!(ProfileSet::new(dup).is_err());

        let set = ProfileSet::default();
        assert_eq!(set.min_frame_length(), 30);
        assert_eq!(set.max_frame_length(), 93);
        assert_eq!(set.name(ModeId(2)), "transport");
        assert_eq!(set.position(ModeId(2)), Some(1));
    }
}
