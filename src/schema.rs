//! Byte-offset schemas for frame payloads
//!
//! The payload layout is reverse-engineered and differs per framing mode, so it
//! is configuration: each mode registers a list of [`FieldSpec`]s naming where a
//! [`RecordField`] lives inside the payload and how wide it is.

use crate::error::TlgError;
use crate::parser::helpers::{truncate_to_width, width_range};
use crate::parser::stream::TlgDataStream;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sensor fields the decoder knows how to place into a `SensorRecord`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    TimeOfDayMs,
    DaysSinceEpoch,
    Latitude,
    Longitude,
    Altitude,
    PositionStatus,
    Pdop,
    Hdop,
    Satellites,
    Yield,
    Moisture,
    MassFlow,
    VolumeFlow,
    CropType,
    MachineState,
    WheelSpeed,
    SwathWidth,
}

impl RecordField {
    /// Fields every mode must carry for a record to be meaningful
    pub const REQUIRED: [RecordField; 5] = [
        RecordField::TimeOfDayMs,
        RecordField::DaysSinceEpoch,
        RecordField::Latitude,
        RecordField::Longitude,
        RecordField::PositionStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RecordField::TimeOfDayMs => "time_of_day_ms",
            RecordField::DaysSinceEpoch => "days_since_epoch",
            RecordField::Latitude => "latitude",
            RecordField::Longitude => "longitude",
            RecordField::Altitude => "altitude",
            RecordField::PositionStatus => "position_status",
            RecordField::Pdop => "pdop",
            RecordField::Hdop => "hdop",
            RecordField::Satellites => "satellites",
            RecordField::Yield => "yield",
            RecordField::Moisture => "moisture",
            RecordField::MassFlow => "mass_flow",
            RecordField::VolumeFlow => "volume_flow",
            RecordField::CropType => "crop_type",
            RecordField::MachineState => "machine_state",
            RecordField::WheelSpeed => "wheel_speed",
            RecordField::SwathWidth => "swath_width",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Location and encoding of one field inside a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: RecordField,
    /// Byte offset from the start of the payload
    pub offset: usize,
    /// Width in bytes, 1..=4
    pub width: usize,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub endian: Endianness,
}

impl FieldSpec {
    pub fn new(field: RecordField, offset: usize, width: usize, signed: bool) -> Self {
        Self {
            field,
            offset,
            width,
            signed,
            endian: Endianness::Little,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// Field layout of one mode's payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Layout of the 68-byte payload of the wide harvesting mode
    pub fn active_default() -> Self {
        use RecordField::*;
        Self::new(vec![
            FieldSpec::new(TimeOfDayMs, 0, 4, false),
            FieldSpec::new(DaysSinceEpoch, 4, 2, false),
            FieldSpec::new(Latitude, 6, 4, true),
            FieldSpec::new(Longitude, 10, 4, true),
            FieldSpec::new(Altitude, 14, 4, true),
            FieldSpec::new(PositionStatus, 18, 1, false),
            FieldSpec::new(Pdop, 19, 2, false),
            FieldSpec::new(Hdop, 21, 2, false),
            FieldSpec::new(Satellites, 23, 1, false),
            FieldSpec::new(Yield, 24, 4, true),
            FieldSpec::new(Moisture, 28, 4, true),
            FieldSpec::new(MassFlow, 32, 4, true),
            FieldSpec::new(VolumeFlow, 36, 4, true),
            FieldSpec::new(CropType, 40, 1, false),
            FieldSpec::new(MachineState, 41, 1, false),
            FieldSpec::new(WheelSpeed, 42, 2, false),
            FieldSpec::new(SwathWidth, 44, 2, false),
        ])
    }

    /// Layout of the 20-byte payload of the narrow idle/transport mode
    pub fn transport_default() -> Self {
        use RecordField::*;
        Self::new(vec![
            FieldSpec::new(TimeOfDayMs, 0, 4, false),
            FieldSpec::new(DaysSinceEpoch, 4, 2, false),
            FieldSpec::new(Latitude, 6, 4, true),
            FieldSpec::new(Longitude, 10, 4, true),
            FieldSpec::new(PositionStatus, 14, 1, false),
            FieldSpec::new(MachineState, 15, 1, false),
            FieldSpec::new(WheelSpeed, 16, 2, false),
        ])
    }

    pub fn spec(&self, field: RecordField) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.field == field)
    }

    pub fn has(&self, field: RecordField) -> bool {
        self.spec(field).is_some()
    }

    /// Read a field from a payload; `None` when the schema does not carry it
    /// or the payload is too short
    pub fn read(&self, field: RecordField, payload: &[u8]) -> Option<i64> {
        let spec = self.spec(field)?;
        let mut stream = TlgDataStream::new(payload);
        stream.set_position(spec.offset);
        stream.read_int(spec.width, spec.signed, spec.endian).ok()
    }

    /// Write a field into a payload. Returns false when the field is not part of
    /// the schema, does not fit the payload, or the value is out of range.
    pub fn write(&self, field: RecordField, value: i64, payload: &mut [u8]) -> bool {
        let Some(spec) = self.spec(field) else {
            return false;
        };
        let (min, max) = width_range(spec.width, spec.signed);
        if spec.end() > payload.len() || value < min || value > max {
            return false;
        }

        let bits = truncate_to_width(value, spec.width);
        for i in 0..spec.width {
            let shift = match spec.endian {
                Endianness::Little => 8 * i,
                Endianness::Big => 8 * (spec.width - 1 - i),
            };
            payload[spec.offset + i] = (bits >> shift) as u8;
        }
        true
    }

    /// Check the schema against the payload length of its mode
    pub fn check(&self, profile_name: &str, payload_length: usize) -> Result<(), TlgError> {
        let mut seen = HashSet::new();
        for spec in &self.fields {
            if !(1..=4).contains(&spec.width) {
                return Err(TlgError::invalid_profile(
                    profile_name,
                    format!("field '{}' has unsupported width {}", spec.field.name(), spec.width),
                ));
            }
            if spec.end() > payload_length {
                return Err(TlgError::invalid_profile(
                    profile_name,
                    format!(
                        "field '{}' ends at byte {} beyond the {}-byte payload",
                        spec.field.name(),
                        spec.end(),
                        payload_length
                    ),
                ));
            }
            if !seen.insert(spec.field) {
                return Err(TlgError::invalid_profile(
                    profile_name,
                    format!("field '{}' is defined twice", spec.field.name()),
                ));
            }
        }

        if let Some(missing) = RecordField::REQUIRED.iter().find(|field| !self.has(**field)) {
            return Err(TlgError::invalid_profile(
                profile_name,
                format!("required field '{}' is missing", missing.name()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schemas_fit_their_payloads() {
        assert!(RecordSchema::active_default().check("active", 68).is_ok());
        assert!(RecordSchema::transport_default().check("transport", 20).is_ok());
    }

    #[test]
    fn test_write_then_read_signed_field() {
        let schema = RecordSchema::active_default();
        let mut payload = vec![0u8; 68];
        assert!(schema.write(RecordField::Latitude, -335_123_456, &mut payload));
        assert_eq!(schema.read(RecordField::Latitude, &payload), Some(-335_123_456));
    }

    #[test]
    fn test_big_endian_field() {
        let schema = RecordSchema::new(vec![FieldSpec {
            field: RecordField::Yield,
            offset: 1,
            width: 3,
            signed: false,
            endian: Endianness::Big,
        }]);
        let payload = [0x00, 0x03, 0xAD, 0x68];
        assert_eq!(schema.read(RecordField::Yield, &payload), Some(241_000));
    }

    #[test]
    fn test_write_rejects_out_of_range_and_missing_fields() {
        let schema = RecordSchema::transport_default();
        let mut payload = vec![0u8; 20];
        assert!(!schema.write(RecordField::PositionStatus, 256, &mut payload));
        assert!(!schema.write(RecordField::Yield, 1, &mut payload));
        assert_eq!(schema.read(RecordField::Yield, &payload), None);
    }

    #[test]
    fn test_check_rejects_bad_layouts() {
        let mut schema = RecordSchema::transport_default();
        assert!(schema.check("narrow", 16).is_err());

        schema.fields.retain(|spec| spec.field != RecordField::Latitude);
        let err = schema.check("narrow", 20).unwrap_err();
        assert!(err.to_string().contains("latitude"));

        let duplicated = RecordSchema::new(vec![
            FieldSpec::new(RecordField::TimeOfDayMs, 0, 4, false),
            FieldSpec::new(RecordField::TimeOfDayMs, 4, 4, false),
        ]);
        assert!(duplicated.check("dup", 8).unwrap_err().to_string().contains("twice"));
    }

    #[test]
    fn test_field_spec_from_toml() {
        let spec: FieldSpec =
            toml::from_str("field = \"mass_flow\"\noffset = 32\nwidth = 4\nsigned = true\n")
                .unwrap();
        assert_eq!(spec, FieldSpec::new(RecordField::MassFlow, 32, 4, true));
    }
}
