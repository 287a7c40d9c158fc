use crate::types::ModeId;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Decoded raw fields of one frame, still in device-native integer units
///
/// Fields a mode's schema does not carry are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SensorRecord {
    pub source_offset: usize,
    pub mode_id: ModeId,
    /// Milliseconds since midnight
    pub time_of_day_ms: i64,
    /// Days since 1980-01-01 (ISO 11783 epoch)
    pub days_since_epoch: i64,
    /// Degrees * 10^7
    pub latitude_raw: i64,
    /// Degrees * 10^7
    pub longitude_raw: i64,
    /// Millimetres
    pub altitude_raw: Option<i64>,
    pub position_status: i64,
    pub pdop_raw: Option<i64>,
    pub hdop_raw: Option<i64>,
    pub satellites: Option<i64>,
    pub yield_raw: Option<i64>,
    pub moisture_raw: Option<i64>,
    pub mass_flow_raw: Option<i64>,
    pub volume_flow_raw: Option<i64>,
    pub crop_type: Option<i64>,
    pub machine_state: Option<i64>,
    pub wheel_speed_raw: Option<i64>,
    pub swath_width_raw: Option<i64>,
}

impl SensorRecord {
    /// Milliseconds since 1980-01-01T00:00:00Z
    pub fn timestamp_ms(&self) -> i64 {
        self.days_since_epoch * 86_400_000 + self.time_of_day_ms
    }

    /// Yield was measured and is zero. Modes without a yield field never
    /// count.
    pub fn is_zero_yield(&self) -> bool {
        self.yield_raw == Some(0)
    }
}

/// Anomaly and state flags attached to a scaled record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RecordFlags {
    pub zero_yield: bool,
    pub machine_idle: bool,
    pub density_out_of_range: bool,
    pub position_invalid: bool,
    pub unknown_crop: bool,
}

/// Sensor record converted to physical units, with derived metrics
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ScaledRecord {
    /// Source file identity (file stem); the only join key the core attaches
    pub source: Arc<str>,
    pub record: SensorRecord,
    pub timestamp_ms: i64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: Option<f64>,
    pub yield_t_ha: Option<f64>,
    pub moisture_pct: Option<f64>,
    pub mass_flow_kg_s: Option<f64>,
    pub volume_flow_l_s: Option<f64>,
    pub wheel_speed_m_s: Option<f64>,
    pub density_kg_l: Option<f64>,
    pub gps_speed_m_s: Option<f64>,
    pub corrected_flag: bool,
    pub flags: RecordFlags,
}
