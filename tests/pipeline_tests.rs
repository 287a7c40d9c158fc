//! End-to-end pipeline tests on synthetic TLG files

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tlg_parser::{
    parse_tlg_bytes, parse_tlg_file, should_skip_export, CancelToken, FrameModeProfile,
    FrameValidator, ModeId, ProfileSet, SensorRecord, TlgConfig, TlgPipeline,
};

fn harvesting(second: i64, latitude_raw: i64, yield_raw: i64) -> SensorRecord {
    SensorRecord {
        time_of_day_ms: 43_200_000 + second * 1000,
        days_since_epoch: 16_131,
        latitude_raw,
        longitude_raw: 121_000_000,
        altitude_raw: Some(42_000),
        position_status: 1,
        pdop_raw: Some(140),
        hdop_raw: Some(95),
        satellites: Some(12),
        yield_raw: Some(yield_raw),
        moisture_raw: Some(1_450),
        mass_flow_raw: Some(12_000_000),
        volume_flow_raw: Some(16_000_000),
        crop_type: Some(1),
        machine_state: Some(1),
        wheel_speed_raw: Some(2_500),
        swath_width_raw: Some(9_000),
        ..Default::default()
    }
}

fn encode(records: &[SensorRecord]) -> Vec<u8> {
    let profile = FrameModeProfile::active_default();
    records
        .iter()
        .flat_map(|r| profile.encode_frame(r).unwrap())
        .collect()
}

fn write_tlg(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, data).expect("Failed to write test file");
    path
}

#[test]
fn test_synthetic_frame_round_trip() {
    let record = harvesting(0, 556_000_000, 241_000);
    let data = encode(std::slice::from_ref(&record));
    assert_eq!(data.len(), 93);

    let log = parse_tlg_bytes(&data, "TLG00001", &TlgConfig::default()).unwrap();
    assert_eq!(log.records.len(), 1);

    let decoded = &log.records[0].record;
    let expected = SensorRecord {
        mode_id: ModeId(1),
        ..record
    };
    assert_eq!(decoded, &expected);
}

#[test]
fn test_file_scaling_and_density() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_tlg(&dir, "TLG00001.bin", &encode(&[harvesting(0, 556_000_000, 241_000)]));

    let log = parse_tlg_file(&path, &TlgConfig::default()).unwrap();
    assert_eq!(&*log.source, "TLG00001");
    assert_eq!(log.path.as_deref(), Some(path.as_path()));

    let record = &log.records[0];
    assert!((record.yield_t_ha.unwrap() - 2.41).abs() < 1e-9);
    assert!((record.moisture_pct.unwrap() - 14.5).abs() < 1e-9);
    assert!((record.wheel_speed_m_s.unwrap() - 2.5).abs() < 1e-9);
    assert!((record.density_kg_l.unwrap() - 0.75).abs() < 1e-9);
    assert!(!record.flags.density_out_of_range);
    assert!(!record.flags.position_invalid);
}

#[test]
fn test_gps_speed_between_frames() {
    // 8993e-7 degrees of latitude is just under 100 m
    let data = encode(&[
        harvesting(0, 556_000_000, 100_000),
        harvesting(10, 556_008_993, 100_000),
    ]);
    let log = parse_tlg_bytes(&data, "TLG00002", &TlgConfig::default()).unwrap();

    assert_eq!(log.records[0].gps_speed_m_s, None);
    let speed = log.records[1].gps_speed_m_s.unwrap();
    assert!((speed - 10.0).abs() < 0.01, "speed was {speed}");
    assert!((log.duration_seconds() - 10.0).abs() < 1e-9);
}

#[test]
fn test_idle_run_over_threshold() {
    let mut records = vec![harvesting(0, 556_000_000, 100_000)];
    records.extend((1..=6).map(|s| harvesting(s, 556_000_000, 0)));
    records.push(harvesting(7, 556_000_000, 100_000));
    records.push(harvesting(8, 556_000_000, 0));

    let log = parse_tlg_bytes(&encode(&records), "TLG00003", &TlgConfig::default()).unwrap();
    let idle: Vec<bool> = log.records.iter().map(|r| r.flags.machine_idle).collect();
    assert_eq!(
        idle,
        vec![false, true, true, true, true, true, true, false, false]
    );
    assert!(log.records[8].flags.zero_yield);
    assert_eq!(log.idle_records(), 6);
}

#[test]
fn test_transport_frames_are_not_idle() {
    let profile = FrameModeProfile::transport_default();
    let data: Vec<u8> = (0..6)
        .flat_map(|s| {
            profile
                .encode_frame(&harvesting(s * 10, 556_000_000 + s * 8_993, 0))
                .unwrap()
        })
        .collect();

    let log = parse_tlg_bytes(&data, "TLG00008", &TlgConfig::default()).unwrap();
    assert_eq!(log.records.len(), 6);
    assert_eq!(log.frames_in_mode(ModeId(2)), 6);
    for record in &log.records {
        assert_eq!(record.record.yield_raw, None);
        assert!(!record.flags.zero_yield);
        assert!(!record.flags.machine_idle);
    }
    for record in &log.records[1..] {
        let speed = record.gps_speed_m_s.unwrap();
        assert!((speed - 10.0).abs() < 0.01, "speed was {speed}");
    }
    assert_eq!(log.idle_records(), 0);
    assert_eq!(should_skip_export(&log, false), (false, String::new()));
}

#[test]
fn test_crop_correction_from_config() {
    let config = TlgConfig::from_toml_str(
        r#"
[[crops]]
crop_type = 1
name = "wheat"
yield_divisor = 10.0
"#,
    )
    .unwrap();
    let data = encode(&[harvesting(0, 556_000_000, 241_000)]);
    let log = parse_tlg_bytes(&data, "TLG00004", &config).unwrap();
    assert!((log.records[0].yield_t_ha.unwrap() - 0.241).abs() < 1e-9);
    assert!(log.records[0].corrected_flag);
}

#[test]
fn test_config_file_with_checksum_rule() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = TlgConfig::default();
    for profile in &mut config.profiles {
        profile.rules.push(tlg_parser::ValidationRule::Checksum {
            kind: tlg_parser::ChecksumKind::Sum8,
            start: profile.overhead_length,
            end: profile.frame_length,
            at: 3,
        });
    }
    let config_path = dir.path().join("tlg.toml");
    fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();
    let loaded = TlgConfig::load(&config_path).unwrap();

    let profiles = loaded.profile_set().unwrap();
    let profile = profiles.get(ModeId(1)).unwrap();
    let good = profile.encode_frame(&harvesting(0, 556_000_000, 1)).unwrap();
    let mut bad = profile.encode_frame(&harvesting(1, 556_000_000, 1)).unwrap();
    bad[60] ^= 0x01;

    let data = [good, bad].concat();
    let log = parse_tlg_bytes(&data, "TLG00005", &loaded).unwrap();
    assert_eq!(log.records.len(), 1);
    assert_eq!(log.gap_summary.trailing_bytes, 93);
    assert!(log.truncated);
}

#[derive(Debug)]
struct EarlyFramesOnly;

impl FrameValidator for EarlyFramesOnly {
    fn validate(&self, frame: &[u8]) -> bool {
        // time of day sits at the start of the active payload
        let ms = u32::from_le_bytes([frame[25], frame[26], frame[27], frame[28]]);
        ms < 43_205_000
    }
}

#[test]
fn test_custom_validator_rejects_frames() {
    let config = TlgConfig::default();
    let profiles = ProfileSet::new(vec![
        FrameModeProfile::active_default().with_validator(Arc::new(EarlyFramesOnly)),
        FrameModeProfile::transport_default(),
    ])
    .unwrap();
    let pipeline = TlgPipeline::with_profiles(&config, profiles).unwrap();

    let data = encode(&(0..10).map(|s| harvesting(s, 556_000_000, 1000)).collect::<Vec<_>>());
    let log = pipeline
        .parse_bytes(&data, "TLG00006", &CancelToken::new())
        .unwrap();
    assert_eq!(log.records.len(), 5);
    assert_eq!(log.gap_summary.total_bytes_skipped, 5 * 93);
}

#[test]
fn test_empty_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_tlg(&dir, "TLG00007.bin", &[]);
    let log = parse_tlg_file(&path, &TlgConfig::default()).unwrap();
    assert!(log.records.is_empty());
    assert!(log.gaps.is_empty());
    assert!(!log.truncated);
}
