//! Pipeline configuration
//!
//! Frame profiles, payload schemas, validation rules, scale factors, the crop
//! correction table and derived-metric thresholds are all reverse-engineered
//! per device, so they are loaded from TOML rather than compiled in. The
//! built-in [`TlgConfig::default`] describes the two modes seen so far.
//!
//! ```toml
//! schema_version = "1.0.0"
//! initial_mode = 1
//!
//! [[profiles]]
//! id = 1
//! name = "active"
//! frame_length = 93
//! overhead_length = 25
//!
//! [[profiles.fields]]
//! field = "time_of_day_ms"
//! offset = 0
//! width = 4
//!
//! [[profiles.rules]]
//! type = "marker"
//! offset = 0
//! bytes = [0xA5, 0x5A, 0x01]
//!
//! [derived]
//! idle_threshold = 5
//! ```

use crate::error::TlgError;
use crate::profile::{FrameModeProfile, ProfileSet, ValidationRule};
use crate::schema::{FieldSpec, RecordSchema};
use crate::types::ModeId;
use anyhow::Context;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration schema versions this build understands
pub const SUPPORTED_SCHEMA_VERSION: &str = "^1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlgConfig {
    pub schema_version: String,
    pub initial_mode: u8,
    pub profiles: Vec<ProfileConfig>,
    pub scaling: ScaleConfig,
    pub crops: Vec<CropEntry>,
    pub derived: DerivedConfig,
}

/// One framing mode as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub id: u8,
    pub name: String,
    pub frame_length: usize,
    pub overhead_length: usize,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

impl ProfileConfig {
    pub fn to_profile(&self) -> Result<FrameModeProfile, TlgError> {
        FrameModeProfile::new(
            ModeId(self.id),
            self.name.clone(),
            self.frame_length,
            self.overhead_length,
            RecordSchema::new(self.fields.clone()),
            self.rules.clone(),
        )
    }
}

impl From<&FrameModeProfile> for ProfileConfig {
    fn from(profile: &FrameModeProfile) -> Self {
        Self {
            id: profile.mode_id.0,
            name: profile.name.clone(),
            frame_length: profile.frame_length,
            overhead_length: profile.overhead_length,
            fields: profile.schema.fields.clone(),
            rules: profile.rules.clone(),
        }
    }
}

/// Multiplicative factors from raw device units to physical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Raw coordinate to degrees
    pub coordinate_deg: f64,
    /// Raw altitude (mm) to metres
    pub altitude_m: f64,
    /// Raw yield (mg/m²) to t/ha
    pub yield_t_ha: f64,
    /// Raw moisture (fraction * 10^4) to percent
    pub moisture_pct: f64,
    /// Raw mass flow (mg/s) to kg/s
    pub mass_flow_kg_s: f64,
    /// Raw volume flow (mm³/s) to l/s
    pub volume_flow_l_s: f64,
    /// Raw wheel speed (mm/s) to m/s
    pub wheel_speed_m_s: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            coordinate_deg: 1e-7,
            altitude_m: 1e-3,
            yield_t_ha: 1e-5,
            moisture_pct: 1e-4 * 100.0,
            mass_flow_kg_s: 1e-6,
            volume_flow_l_s: 1e-6,
            wheel_speed_m_s: 1e-3,
        }
    }
}

/// Crop type code as logged by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropEntry {
    pub crop_type: i64,
    pub name: String,
    /// Divisor applied to raw yield before scaling, for crops affected by the
    /// factor-of-ten logging bug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yield_divisor: Option<f64>,
}

impl CropEntry {
    fn new(crop_type: i64, name: &str, yield_divisor: Option<f64>) -> Self {
        Self {
            crop_type,
            name: name.to_string(),
            yield_divisor,
        }
    }
}

/// Thresholds for derived metrics and anomaly flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedConfig {
    pub density_min: f64,
    pub density_max: f64,
    /// Consecutive zero-yield records after which the run counts as machine idle
    pub idle_threshold: usize,
    /// At least one of these position status bits must be set for a valid fix
    pub position_valid_mask: i64,
    /// None of these position status bits may be set for a valid fix
    pub position_invalid_mask: i64,
}

impl Default for DerivedConfig {
    fn default() -> Self {
        Self {
            density_min: 0.2,
            density_max: 1.2,
            idle_threshold: 5,
            position_valid_mask: 0x07,
            position_invalid_mask: 0x08,
        }
    }
}

impl Default for TlgConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            initial_mode: 1,
            profiles: ProfileSet::default()
                .profiles()
                .iter()
                .map(ProfileConfig::from)
                .collect(),
            scaling: ScaleConfig::default(),
            crops: vec![
                CropEntry::new(1, "wheat", None),
                CropEntry::new(2, "barley", None),
                CropEntry::new(3, "oats", None),
                CropEntry::new(4, "rye", None),
                CropEntry::new(5, "rapeseed", Some(10.0)),
                CropEntry::new(6, "grass seed", Some(10.0)),
            ],
            derived: DerivedConfig::default(),
        }
    }
}

impl TlgConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, TlgError> {
        let config: Self =
            toml::from_str(text).map_err(|e| TlgError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, TlgError> {
        toml::to_string_pretty(self).map_err(|e| TlgError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), TlgError> {
        let supported = VersionReq::parse(SUPPORTED_SCHEMA_VERSION)
            .map_err(|e| TlgError::Config(e.to_string()))?;
        let version = Version::parse(&self.schema_version).map_err(|e| {
            TlgError::Config(format!("bad schema_version '{}': {e}", self.schema_version))
        })?;
        if !supported.matches(&version) {
            return Err(TlgError::UnsupportedSchemaVersion {
                found: self.schema_version.clone(),
                supported: SUPPORTED_SCHEMA_VERSION.to_string(),
            });
        }

        let profiles = self.profile_set()?;
        if profiles.get(self.initial_mode()).is_none() {
            return Err(TlgError::Config(format!(
                "initial_mode {} is not a configured profile",
                self.initial_mode
            )));
        }

        let derived = &self.derived;
        if !(derived.density_min.is_finite()
            && derived.density_max.is_finite()
            && derived.density_min < derived.density_max)
        {
            return Err(TlgError::Config(format!(
                "density range [{}, {}] is empty",
                derived.density_min, derived.density_max
            )));
        }
        if derived.idle_threshold == 0 {
            return Err(TlgError::Config("idle_threshold must be at least 1".into()));
        }

        for crop in &self.crops {
            if let Some(divisor) = crop.yield_divisor {
                if !divisor.is_finite() || divisor <= 0.0 {
                    return Err(TlgError::Config(format!(
                        "crop '{}' has invalid yield_divisor {divisor}",
                        crop.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn initial_mode(&self) -> ModeId {
        ModeId(self.initial_mode)
    }

    pub fn profile_set(&self) -> Result<ProfileSet, TlgError> {
        let profiles = self
            .profiles
            .iter()
            .map(ProfileConfig::to_profile)
            .collect::<Result<Vec<_>, _>>()?;
        ProfileSet::new(profiles)
    }
}
