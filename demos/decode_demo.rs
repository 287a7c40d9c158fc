//! Example demonstrating frame recovery on a damaged synthetic log
//!
//! Builds a stream of harvesting and transport frames with corrupted runs
//! spliced in, decodes it, and prints what was recovered. With an output
//! directory argument the records and gap audit are exported as CSV.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tlg_parser::{
    export_gap_audit, export_to_csv, format_iso_timestamp, parse_tlg_batch, CancelToken,
    ExportOptions, FrameModeProfile, SensorRecord, TlgConfig,
};

fn record(second: i64, yield_raw: i64) -> SensorRecord {
    SensorRecord {
        time_of_day_ms: 36_000_000 + second * 1000,
        days_since_epoch: 16_300,
        latitude_raw: 556_000_000 + second * 45,
        longitude_raw: 121_000_000,
        altitude_raw: Some(35_000),
        position_status: 1,
        satellites: Some(11),
        yield_raw: Some(yield_raw),
        moisture_raw: Some(1_520),
        mass_flow_raw: Some(9_500_000),
        volume_flow_raw: Some(12_500_000),
        crop_type: Some(1),
        machine_state: Some(1),
        wheel_speed_raw: Some(2_200),
        ..Default::default()
    }
}

fn build_stream() -> Result<Vec<u8>> {
    let active = FrameModeProfile::active_default();
    let transport = FrameModeProfile::transport_default();
    let mut data = Vec::new();

    for second in 0..20 {
        let yield_raw = if (8..14).contains(&second) { 0 } else { 310_000 };
        let frame = active
            .encode_frame(&record(second, yield_raw))
            .context("record does not fit the active layout")?;
        data.extend(frame);
        if second == 4 {
            // bus noise between frames
            data.extend([0xA5, 0x5A, 0x03, 0xFF, 0x00, 0x13, 0x37]);
        }
    }
    for second in 20..25 {
        let frame = transport
            .encode_frame(&record(second, 0))
            .context("record does not fit the transport layout")?;
        data.extend(frame);
    }
    // power cut mid-frame
    let partial = active
        .encode_frame(&record(25, 310_000))
        .context("record does not fit the active layout")?;
    data.extend(&partial[..40]);
    Ok(data)
}

fn main() -> Result<()> {
    let output_dir = std::env::args().nth(1).map(PathBuf::from);

    println!("=== TLG Decode Demo ===");
    let dir = std::env::temp_dir().join("tlg_decode_demo");
    std::fs::create_dir_all(&dir)?;
    let input = dir.join("TLG00042.bin");
    let data = build_stream()?;
    std::fs::write(&input, &data)?;
    println!("Synthetic log: {} ({} bytes)", input.display(), data.len());
    println!();

    let batch = parse_tlg_batch(
        std::slice::from_ref(&input),
        &TlgConfig::default(),
        1,
        &CancelToken::new(),
    )?;
    for failure in &batch.failures {
        eprintln!("Failed: {}: {}", failure.path.display(), failure.error);
    }

    for log in &batch.logs {
        println!("=== Frame Statistics ===");
        println!("Total frames: {}", log.stats.total_frames);
        for (mode, count) in &log.stats.frames_by_mode {
            println!("  Mode {mode}: {count}");
        }
        println!("Mode switches: {}", log.stats.mode_switches);
        println!();

        println!("=== Header Gaps ===");
        for gap in &log.gaps {
            let after = gap
                .mode_after
                .map_or_else(|| "end of stream".to_string(), |m| format!("mode {m}"));
            println!(
                "  offset {:>5}, {:>3} bytes, mode {} -> {after}",
                gap.source_offset, gap.length, gap.mode_before
            );
        }
        println!("Truncated: {}", log.truncated);
        println!();

        println!("=== Records ===");
        for record in log.records.iter().take(12) {
            println!(
                "  {} yield={:?} density={:?} idle={}",
                format_iso_timestamp(record.timestamp_ms),
                record.yield_t_ha,
                record.density_kg_l,
                record.flags.machine_idle
            );
        }
        if log.records.len() > 12 {
            println!("  ... {} more", log.records.len() - 12);
        }
        println!("Idle records: {}", log.idle_records());
    }

    if let Some(dir) = output_dir {
        let options = ExportOptions {
            csv: true,
            audit: true,
            output_dir: Some(dir.to_string_lossy().into_owned()),
            ..Default::default()
        };
        for log in &batch.logs {
            let report = export_to_csv(log, &input, &options)?;
            if let Some(path) = report.csv_path {
                println!("\nExported records to: {}", path.display());
            }
        }
        let audit = export_gap_audit(&batch, &dir)?;
        println!("Exported gap audit to: {}", audit.display());
    }

    Ok(())
}
