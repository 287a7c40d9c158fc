use crate::error::DecodeError;
use crate::profile::ProfileSet;
use crate::schema::{RecordField, RecordSchema};
use crate::types::{Frame, ModeId, SensorRecord};
use std::collections::HashMap;

/// Decodes frame payloads into raw sensor records using per-mode schemas
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    schemas: HashMap<ModeId, (usize, RecordSchema)>,
}

impl RecordDecoder {
    pub fn new(profiles: &ProfileSet) -> Self {
        let schemas = profiles
            .profiles()
            .iter()
            .map(|p| (p.mode_id, (p.payload_length, p.schema.clone())))
            .collect();
        Self { schemas }
    }

    /// Decode one frame. Pure: the same frame always yields the same record.
    pub fn decode(&self, frame: &Frame<'_>) -> Result<SensorRecord, DecodeError> {
        let (payload_length, schema) = self
            .schemas
            .get(&frame.mode_id)
            .ok_or(DecodeError::UnknownMode(frame.mode_id))?;

        if frame.payload.len() != *payload_length {
            return Err(DecodeError::PayloadLength {
                mode: frame.mode_id,
                expected: *payload_length,
                actual: frame.payload.len(),
            });
        }

        let payload = frame.payload;
        let required = |field: RecordField| {
            schema
                .read(field, payload)
                .ok_or(DecodeError::UnexpectedEof { offset: payload.len() })
        };
        let optional = |field: RecordField| schema.read(field, payload);

        Ok(SensorRecord {
            source_offset: frame.source_offset,
            mode_id: frame.mode_id,
            time_of_day_ms: required(RecordField::TimeOfDayMs)?,
            days_since_epoch: required(RecordField::DaysSinceEpoch)?,
            latitude_raw: required(RecordField::Latitude)?,
            longitude_raw: required(RecordField::Longitude)?,
            altitude_raw: optional(RecordField::Altitude),
            position_status: required(RecordField::PositionStatus)?,
            pdop_raw: optional(RecordField::Pdop),
            hdop_raw: optional(RecordField::Hdop),
            satellites: optional(RecordField::Satellites),
            yield_raw: optional(RecordField::Yield),
            moisture_raw: optional(RecordField::Moisture),
            mass_flow_raw: optional(RecordField::MassFlow),
            volume_flow_raw: optional(RecordField::VolumeFlow),
            crop_type: optional(RecordField::CropType),
            machine_state: optional(RecordField::MachineState),
            wheel_speed_raw: optional(RecordField::WheelSpeed),
            swath_width_raw: optional(RecordField::SwathWidth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FrameModeProfile;

    #[test]
    fn test_decode_transport_frame_leaves_absent_fields_empty() {
        let profile = FrameModeProfile::transport_default();
        let record = SensorRecord {
            mode_id: ModeId(2),
            time_of_day_ms: 1_000,
            days_since_epoch: 16_000,
            latitude_raw: -335_000_000,
            longitude_raw: 1_510_000_000,
            position_status: 4,
            machine_state: Some(3),
            wheel_speed_raw: Some(8_000),
            ..Default::default()
        };
        let bytes = profile.encode_frame(&record).unwrap();
        let frame = Frame {
            source_offset: 0,
            mode_id: ModeId(2),
            frame_length: 30,
            payload: &bytes[10..],
        };

        let decoder = RecordDecoder::new(&ProfileSet::default());
        let decoded = decoder.decode(&frame).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.yield_raw, None);
    }

    #[test]
    fn test_payload_length_mismatch() {
        let payload = [0u8; 67];
        let frame = Frame {
            source_offset: 12,
            mode_id: ModeId(1),
            frame_length: 93,
            payload: &payload,
        };
        let decoder = RecordDecoder::new(&ProfileSet::default());
        assert_eq!(
            decoder.decode(&frame),
            Err(DecodeError::PayloadLength {
                mode: ModeId(1),
                expected: 68,
                actual: 67,
            })
        );
    }

    #[test]
    fn test_unknown_mode() {
        let payload = [0u8; 20];
        let frame = Frame {
            source_offset: 0,
            mode_id: ModeId(7),
            frame_length: 30,
            payload: &payload,
        };
        let decoder = RecordDecoder::new(&ProfileSet::default());
        assert_eq!(
            decoder.decode(&frame),
            Err(DecodeError::UnknownMode(ModeId(7)))
        );
    }
}
