//! Derived metrics and anomaly flags
//!
//! Computes GPS ground speed between consecutive valid fixes, grain density
//! from mass and volume flow, and flags zero-yield runs long enough to count as
//! the machine standing idle. State is per stream; create one calculator per
//! file.

use crate::config::DerivedConfig;
use crate::types::ScaledRecord;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Timestamped position of a record whose fix passed the status checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub timestamp_ms: i64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl Fix {
    fn of(record: &ScaledRecord) -> Self {
        Self {
            timestamp_ms: record.timestamp_ms,
            latitude_deg: record.latitude_deg,
            longitude_deg: record.longitude_deg,
        }
    }

    /// Ground speed from `self` to `next`, `None` unless time moved forward
    pub fn speed_to(&self, next: &Fix) -> Option<f64> {
        let elapsed_s = (next.timestamp_ms - self.timestamp_ms) as f64 / 1000.0;
        if elapsed_s <= 0.0 {
            return None;
        }
        let distance = haversine_distance(
            self.latitude_deg,
            self.longitude_deg,
            next.latitude_deg,
            next.longitude_deg,
        );
        Some(distance / elapsed_s)
    }
}

/// Great-circle distance in metres between two coordinates in degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let sin_dlat_half = (dlat / 2.0).sin();
    let sin_dlon_half = (dlon / 2.0).sin();
    let a = sin_dlat_half.mul_add(
        sin_dlat_half,
        lat1_rad.cos() * lat2_rad.cos() * sin_dlon_half * sin_dlon_half,
    );
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Default)]
struct DerivationCursor {
    last_valid_fix: Option<Fix>,
    consecutive_zero_count: usize,
}

/// Stateful, order-dependent stage after scaling
///
/// Records inside an open zero-yield run are held back until the run reaches
/// the idle threshold or is broken, so the idle flag can be applied to the
/// whole run. Output order always equals input order.
#[derive(Debug, Clone)]
pub struct DerivedMetricsCalculator {
    config: DerivedConfig,
    cursor: DerivationCursor,
    pending: Vec<ScaledRecord>,
}

impl DerivedMetricsCalculator {
    pub fn new(config: &DerivedConfig) -> Self {
        Self {
            config: config.clone(),
            cursor: DerivationCursor::default(),
            pending: Vec::new(),
        }
    }

    /// Feed the next record; returns the records that became final
    ///
    /// Records without a yield field leave an open run as it is. They only
    /// queue behind it to keep output order.
    pub fn update(&mut self, mut record: ScaledRecord) -> Vec<ScaledRecord> {
        self.annotate(&mut record);

        if record.record.yield_raw.is_none() {
            if self.pending.is_empty() {
                return vec![record];
            }
            self.pending.push(record);
            return Vec::new();
        }

        if !record.record.is_zero_yield() {
            self.cursor.consecutive_zero_count = 0;
            let mut ready = std::mem::take(&mut self.pending);
            ready.push(record);
            return ready;
        }

        record.flags.zero_yield = true;
        self.cursor.consecutive_zero_count += 1;
        let threshold = self.config.idle_threshold.max(1);

        if self.cursor.consecutive_zero_count > threshold {
            record.flags.machine_idle = true;
            return vec![record];
        }

        self.pending.push(record);
        if self.cursor.consecutive_zero_count == threshold {
            for held in self.pending.iter_mut().filter(|r| r.flags.zero_yield) {
                held.flags.machine_idle = true;
            }
            return std::mem::take(&mut self.pending);
        }
        Vec::new()
    }

    /// Flush held-back records at end of stream. A run still shorter than the
    /// threshold stays `zero_yield` only.
    pub fn finish(&mut self) -> Vec<ScaledRecord> {
        self.cursor.consecutive_zero_count = 0;
        std::mem::take(&mut self.pending)
    }

    /// Number of records currently held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_position_valid(&self, position_status: i64) -> bool {
        position_status & self.config.position_valid_mask != 0
            && position_status & self.config.position_invalid_mask == 0
    }

    fn annotate(&mut self, record: &mut ScaledRecord) {
        let valid = self.is_position_valid(record.record.position_status);
        record.flags.position_invalid = !valid;

        record.gps_speed_m_s = None;
        if valid {
            let fix = Fix::of(record);
            record.gps_speed_m_s = self
                .cursor
                .last_valid_fix
                .and_then(|previous| previous.speed_to(&fix));
            self.cursor.last_valid_fix = Some(fix);
        }

        record.density_kg_l = match (record.mass_flow_kg_s, record.volume_flow_l_s) {
            (Some(mass), Some(volume)) if mass > 0.0 && volume > 0.0 => Some(mass / volume),
            _ => None,
        };
        record.flags.density_out_of_range = record
            .density_kg_l
            .is_some_and(|d| d < self.config.density_min || d > self.config.density_max);
    }
}
