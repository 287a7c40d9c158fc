//! Unit conversion for decoded records
//!
//! Raw device integers are scaled into physical units with the factors from
//! [`ScaleConfig`]. Yield is additionally divided by the crop's correction
//! divisor for crop types affected by the factor-of-ten logging bug. Also holds
//! the calendar helpers used to print record timestamps.

use crate::config::{CropEntry, ScaleConfig};
use crate::types::{RecordFlags, ScaledRecord, SensorRecord};
use std::collections::HashMap;
use std::sync::Arc;

/// Converts [`SensorRecord`]s to [`ScaledRecord`]s. Pure and stateless, so one
/// instance can be shared across worker threads.
#[derive(Debug, Clone)]
pub struct ScalingNormalizer {
    scale: ScaleConfig,
    crops: HashMap<i64, CropEntry>,
}

impl ScalingNormalizer {
    pub fn new(scale: &ScaleConfig, crops: &[CropEntry]) -> Self {
        Self {
            scale: scale.clone(),
            crops: crops.iter().map(|c| (c.crop_type, c.clone())).collect(),
        }
    }

    pub fn crop_name(&self, crop_type: i64) -> Option<&str> {
        self.crops.get(&crop_type).map(|c| c.name.as_str())
    }

    /// Scale one record. Derived metrics (`density_kg_l`, `gps_speed_m_s`) and
    /// the idle/density/position flags are left for the derived-metrics stage.
    pub fn normalize(&self, record: SensorRecord, source: &Arc<str>) -> ScaledRecord {
        let scale = &self.scale;
        let mut flags = RecordFlags::default();

        let divisor = match record.crop_type {
            Some(crop_type) => match self.crops.get(&crop_type) {
                Some(entry) => entry.yield_divisor,
                None => {
                    flags.unknown_crop = true;
                    None
                }
            },
            None => None,
        };

        let yield_t_ha = record.yield_raw.map(|raw| {
            let corrected = raw as f64 / divisor.unwrap_or(1.0);
            corrected * scale.yield_t_ha
        });
        let corrected_flag = divisor.is_some() && record.yield_raw.is_some();

        ScaledRecord {
            source: Arc::clone(source),
            timestamp_ms: record.timestamp_ms(),
            latitude_deg: convert_coordinate(record.latitude_raw, scale.coordinate_deg),
            longitude_deg: convert_coordinate(record.longitude_raw, scale.coordinate_deg),
            altitude_m: apply_scale(record.altitude_raw, scale.altitude_m),
            yield_t_ha,
            moisture_pct: apply_scale(record.moisture_raw, scale.moisture_pct),
            mass_flow_kg_s: apply_scale(record.mass_flow_raw, scale.mass_flow_kg_s),
            volume_flow_l_s: apply_scale(record.volume_flow_raw, scale.volume_flow_l_s),
            wheel_speed_m_s: apply_scale(record.wheel_speed_raw, scale.wheel_speed_m_s),
            density_kg_l: None,
            gps_speed_m_s: None,
            corrected_flag,
            flags,
            record,
        }
    }
}

/// Convert a fixed-point coordinate to degrees
pub fn convert_coordinate(raw_value: i64, factor: f64) -> f64 {
    raw_value as f64 * factor
}

fn apply_scale(raw_value: Option<i64>, factor: f64) -> Option<f64> {
    raw_value.map(|v| v as f64 * factor)
}

const MS_PER_DAY: i64 = 86_400_000;

/// Format milliseconds since 1980-01-01T00:00:00Z as ISO 8601 with millisecond
/// precision. Negative inputs clamp to the epoch.
pub fn format_iso_timestamp(timestamp_ms: i64) -> String {
    let timestamp_ms = timestamp_ms.max(0);
    let days = timestamp_ms / MS_PER_DAY;
    let time_of_day = timestamp_ms % MS_PER_DAY;

    let hours = time_of_day / 3_600_000;
    let minutes = (time_of_day % 3_600_000) / 60_000;
    let seconds = (time_of_day % 60_000) / 1000;
    let millis = time_of_day % 1000;

    let (year, month, day) = days_to_ymd(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year, month, day, hours, minutes, seconds, millis
    )
}

/// Days from 1970-01-01 to the 1980-01-01 epoch
const EPOCH_OFFSET_DAYS: i64 = 3652;

/// Convert days since 1980-01-01 to year/month/day in constant time
///
/// Counts in 400-year eras of 146 097 days, with years starting on March 1 so
/// the leap day falls at the end of the year.
fn days_to_ymd(days: i64) -> (i64, u32, u32) {
    let z = days + EPOCH_OFFSET_DAYS + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * shifted_month + 2) / 5 + 1) as u32;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    };
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month as u32, day)
}
