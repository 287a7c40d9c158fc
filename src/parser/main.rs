use crate::config::{DerivedConfig, TlgConfig};
use crate::conversion::ScalingNormalizer;
use crate::derived::DerivedMetricsCalculator;
use crate::error::TlgError;
use crate::gaps::HeaderGapMonitor;
use crate::parser::decoder::RecordDecoder;
use crate::parser::sync::scan;
use crate::profile::ProfileSet;
use crate::types::*;
use crate::Result;
use anyhow::Context;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation shared by every file of a batch
///
/// Polled between scan items; a cancelled stream returns what it has so far.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Synchronize, decode, scale and derive, for one configuration
///
/// Immutable once built, so a single pipeline is shared by every worker of a
/// batch; all per-stream state lives inside [`TlgPipeline::parse_bytes`].
#[derive(Debug, Clone)]
pub struct TlgPipeline {
    profiles: ProfileSet,
    initial_mode: ModeId,
    decoder: RecordDecoder,
    normalizer: ScalingNormalizer,
    derived: DerivedConfig,
}

impl TlgPipeline {
    pub fn new(config: &TlgConfig) -> std::result::Result<Self, TlgError> {
        config.validate()?;
        Self::with_profiles(config, config.profile_set()?)
    }

    /// Use `profiles` instead of the configured ones, e.g. to attach custom
    /// [`FrameValidator`](crate::profile::FrameValidator)s
    pub fn with_profiles(
        config: &TlgConfig,
        profiles: ProfileSet,
    ) -> std::result::Result<Self, TlgError> {
        let initial_mode = config.initial_mode();
        if profiles.get(initial_mode).is_none() {
            return Err(TlgError::Config(format!(
                "initial mode {initial_mode} is not a configured profile"
            )));
        }
        Ok(Self {
            decoder: RecordDecoder::new(&profiles),
            normalizer: ScalingNormalizer::new(&config.scaling, &config.crops),
            derived: config.derived.clone(),
            profiles,
            initial_mode,
        })
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Process one in-memory stream
    pub fn parse_bytes(
        &self,
        data: &[u8],
        source: &str,
        cancel: &CancelToken,
    ) -> std::result::Result<TlgLog, TlgError> {
        let source: Arc<str> = Arc::from(source);
        let mut log = TlgLog::new(Arc::clone(&source));
        log.stats.total_bytes = data.len() as u64;

        let mut monitor = HeaderGapMonitor::new();
        let mut calculator = DerivedMetricsCalculator::new(&self.derived);
        let mut scanner = scan(data, &self.profiles, self.initial_mode)?;
        let mut last_mode: Option<ModeId> = None;
        let mut warned_crops = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                warn!(
                    source = %source,
                    offset = scanner.offset(),
                    "cancelled, keeping partial results"
                );
                log.cancelled = true;
                log.truncated = true;
                break;
            }
            let Some(item) = scanner.next() else {
                break;
            };

            match item {
                ScanItem::Gap(gap) => {
                    if gap.is_trailing() {
                        warn!(
                            source = %source,
                            offset = gap.source_offset,
                            length = gap.length,
                            "stream ends inside a frame"
                        );
                        log.truncated = true;
                    }
                    monitor.record(gap);
                }
                ScanItem::Frame(frame) => {
                    log.stats.count_frame(&frame);
                    if last_mode.is_some_and(|mode| mode != frame.mode_id) {
                        log.stats.mode_switches += 1;
                    }
                    last_mode = Some(frame.mode_id);

                    let record = match self.decoder.decode(&frame) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(
                                source = %source,
                                offset = frame.source_offset,
                                error = %e,
                                "skipping undecodable frame"
                            );
                            log.stats.decode_errors += 1;
                            continue;
                        }
                    };

                    let scaled = self.normalizer.normalize(record, &source);
                    if scaled.flags.unknown_crop {
                        log.stats.unknown_crop_records += 1;
                        if let Some(crop) = scaled.record.crop_type {
                            if warned_crops.insert(crop) {
                                warn!(source = %source, crop_type = crop, "unknown crop type");
                            }
                        }
                    }
                    push_final(&mut log, calculator.update(scaled));
                }
            }
        }
        push_final(&mut log, calculator.finish());

        log.gap_summary = monitor.summary();
        log.gaps = monitor.into_events();

        info!(
            source = %source,
            frames = log.stats.total_frames,
            records = log.records.len(),
            gaps = log.gap_summary.gap_count,
            bytes_skipped = log.gap_summary.total_bytes_skipped,
            decode_errors = log.stats.decode_errors,
            truncated = log.truncated,
            "parsed stream"
        );
        Ok(log)
    }

    /// Read and process one file. The file stem becomes the record source.
    pub fn parse_file(&self, file_path: &Path, cancel: &CancelToken) -> Result<TlgLog> {
        let source = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());

        if cancel.is_cancelled() {
            debug!(path = ?file_path, "cancelled before start");
            let mut log = TlgLog::new(source);
            log.path = Some(file_path.to_path_buf());
            log.cancelled = true;
            return Ok(log);
        }

        let file_data = std::fs::read(file_path)
            .with_context(|| format!("Failed to read TLG file: {:?}", file_path))?;
        debug!(path = ?file_path, bytes = file_data.len(), "read file");

        let mut log = self
            .parse_bytes(&file_data, &source, cancel)
            .with_context(|| format!("Failed to parse TLG file: {:?}", file_path))?;
        log.path = Some(file_path.to_path_buf());
        Ok(log)
    }

    /// Process files on a bounded worker pool. `jobs == 0` uses the available
    /// parallelism. A failing file is reported in `failures` and does not stop
    /// the others; results keep input order.
    pub fn parse_batch(
        &self,
        paths: &[PathBuf],
        jobs: usize,
        cancel: &CancelToken,
    ) -> Result<TlgBatch> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("tlg-worker-{i}"))
            .build()
            .context("Failed to start worker pool")?;

        let results: Vec<(PathBuf, Result<TlgLog>)> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| (path.clone(), self.parse_file(path, cancel)))
                .collect()
        });

        let mut batch = TlgBatch::default();
        for (path, result) in results {
            match result {
                Ok(log) => batch.logs.push(log),
                Err(e) => {
                    warn!(path = ?path, "{e:#}");
                    batch.failures.push(FileFailure {
                        path,
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        Ok(batch)
    }
}

fn push_final(log: &mut TlgLog, ready: Vec<ScaledRecord>) {
    for record in &ready {
        let ts = record.timestamp_ms;
        log.stats.start_time_ms = Some(log.stats.start_time_ms.map_or(ts, |s| s.min(ts)));
        log.stats.end_time_ms = Some(log.stats.end_time_ms.map_or(ts, |e| e.max(ts)));
    }
    log.records.extend(ready);
}

/// Parse a TLG file with `config`
pub fn parse_tlg_file(file_path: &Path, config: &TlgConfig) -> Result<TlgLog> {
    let pipeline = TlgPipeline::new(config)?;
    pipeline.parse_file(file_path, &CancelToken::new())
}

/// Parse TLG data from memory
pub fn parse_tlg_bytes(data: &[u8], source: &str, config: &TlgConfig) -> Result<TlgLog> {
    let pipeline = TlgPipeline::new(config)?;
    Ok(pipeline.parse_bytes(data, source, &CancelToken::new())?)
}

/// Parse many TLG files in parallel
pub fn parse_tlg_batch(
    paths: &[PathBuf],
    config: &TlgConfig,
    jobs: usize,
    cancel: &CancelToken,
) -> Result<TlgBatch> {
    let pipeline = TlgPipeline::new(config)?;
    pipeline.parse_batch(paths, jobs, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FrameModeProfile;
    use std::io::Write;

    fn active(second: i64, yield_raw: i64) -> Vec<u8> {
        let record = SensorRecord {
            mode_id: ModeId(1),
            time_of_day_ms: 36_000_000 + second * 1000,
            days_since_epoch: 16_131,
            latitude_raw: 556_000_000 + second * 900,
            longitude_raw: 121_000_000,
            position_status: 1,
            yield_raw: Some(yield_raw),
            crop_type: Some(1),
            ..Default::default()
        };
        FrameModeProfile::active_default().encode_frame(&record).unwrap()
    }

    fn transport(second: i64) -> Vec<u8> {
        let record = SensorRecord {
            mode_id: ModeId(2),
            time_of_day_ms: 36_000_000 + second * 1000,
            days_since_epoch: 16_131,
            latitude_raw: 556_000_000,
            longitude_raw: 121_000_000,
            position_status: 1,
            ..Default::default()
        };
        FrameModeProfile::transport_default().encode_frame(&record).unwrap()
    }

    #[test]
    fn test_single_frame_round_trip() {
        let data = active(0, 241_000);
        let log = parse_tlg_bytes(&data, "TLG00001", &TlgConfig::default()).unwrap();

        assert_eq!(log.records.len(), 1);
        assert!(log.gaps.is_empty());
        assert!(!log.truncated);
        let record = &log.records[0];
        assert_eq!(record.record.latitude_raw, 556_000_000);
        assert!((record.yield_t_ha.unwrap() - 2.41).abs() < 1e-9);
        assert_eq!(&*record.source, "TLG00001");
        assert_eq!(log.stats.frames_in_mode(ModeId(1)), 1);
    }

    #[test]
    fn test_mode_switch_and_truncation_are_counted() {
        let mut data = active(0, 1000);
        data.extend(transport(1));
        data.extend(transport(2));
        data.extend(&active(3, 1000)[..40]);

        let log = parse_tlg_bytes(&data, "TLG00002", &TlgConfig::default()).unwrap();
        assert_eq!(log.stats.mode_switches, 1);
        assert_eq!(log.stats.frames_in_mode(ModeId(2)), 2);
        assert!(log.truncated);
        assert_eq!(log.gap_summary.trailing_bytes, 40);
        assert_eq!(log.records[1].record.yield_raw, None);
    }

    #[test]
    fn test_unknown_crop_is_counted() {
        let mut data = active(0, 1000);
        data[25 + 40] = 77;
        let log = parse_tlg_bytes(&data, "TLG00003", &TlgConfig::default()).unwrap();
        assert_eq!(log.stats.unknown_crop_records, 1);
        assert!(log.records[0].flags.unknown_crop);
    }

    #[test]
    fn test_cancelled_stream_keeps_partial_results() {
        let pipeline = TlgPipeline::new(&TlgConfig::default()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let data: Vec<u8> = (0..4).flat_map(|s| active(s, 1000)).collect();
        let log = pipeline.parse_bytes(&data, "TLG00004", &cancel).unwrap();
        assert!(log.cancelled && log.truncated);
        assert!(log.records.is_empty());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = parse_tlg_file(Path::new("/nonexistent/TLG00009.bin"), &TlgConfig::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("TLG00009.bin"));
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("TLG00001.bin");
        let second = dir.path().join("TLG00002.bin");
        std::fs::File::create(&first)
            .unwrap()
            .write_all(&active(0, 1000))
            .unwrap();
        std::fs::File::create(&second)
            .unwrap()
            .write_all(&[active(0, 1000), active(1, 1000)].concat())
            .unwrap();
        let missing = dir.path().join("TLG00003.bin");

        let batch = parse_tlg_batch(
            &[first, missing.clone(), second],
            &TlgConfig::default(),
            2,
            &CancelToken::new(),
        )
        .unwrap();

        let sources: Vec<_> = batch.logs.iter().map(|l| l.source.to_string()).collect();
        assert_eq!(sources, vec!["TLG00001", "TLG00002"]);
        assert_eq!(batch.total_records(), 3);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].path, missing);
    }

    #[test]
    fn test_cancelled_batch_returns_empty_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TLG00001.bin");
        std::fs::write(&path, active(0, 1000)).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let batch = parse_tlg_batch(&[path], &TlgConfig::default(), 1, &cancel).unwrap();
        assert!(batch.cancelled());
        assert!(batch.logs[0].records.is_empty());
    }
}
