//! TLG Parser Library
//!
//! A Rust library for recovering sensor records from harvest-controller TLG
//! binary logs. The logs carry no length prefixes or sync words that survive
//! every firmware, so frames are found by trial validation against a set of
//! framing-mode profiles; bytes that never validate are reported as header gaps.
//!
//! # Features
//!
//! - **`csv`** (default): Enable CSV export of records and the gap audit
//! - **`cli`** (default): Build the command-line interface binary
//! - **`json`**: Enable per-file JSON summaries
//! - **`serde`**: Enable serialization of parsed types
//!
//! # Quick Start
//!
//! Parse a log file and access its records:
//! ```rust,no_run
//! use tlg_parser::{parse_tlg_file, TlgConfig};
//! use std::path::Path;
//!
//! let config = TlgConfig::default();
//! let log = parse_tlg_file(Path::new("TLG00001.bin"), &config).unwrap();
//! println!("Recovered {} records", log.records.len());
//! println!("Skipped {} bytes in {} gaps",
//!     log.gap_summary.total_bytes_skipped, log.gap_summary.gap_count);
//! ```
//!
//! Process a batch in parallel and export it:
//! ```rust,no_run
//! use tlg_parser::{export_gap_audit, export_to_csv, parse_tlg_batch};
//! use tlg_parser::{CancelToken, ExportOptions, TlgConfig};
//! use std::path::{Path, PathBuf};
//!
//! let paths = vec![PathBuf::from("TLG00001.bin"), PathBuf::from("TLG00002.bin")];
//! let batch = parse_tlg_batch(&paths, &TlgConfig::default(), 0, &CancelToken::new()).unwrap();
//!
//! let options = ExportOptions { csv: true, audit: true, ..Default::default() };
//! for log in &batch.logs {
//!     let input = log.path.as_deref().unwrap_or(Path::new("."));
//!     export_to_csv(log, input, &options).unwrap();
//! }
//! export_gap_audit(&batch, Path::new(".")).unwrap();
//! ```
//!
//! # Public API
//!
//! ## Parsing Functions
//! - [`parse_tlg_file`] - Parse one TLG file
//! - [`parse_tlg_bytes`] - Parse TLG data from memory
//! - [`parse_tlg_batch`] - Parse many files on a bounded worker pool
//! - [`scan`] - Low-level frame synchronizer over a byte slice
//! - [`TlgPipeline`] - Reusable pipeline, e.g. with custom frame validators
//!
//! ## Data Types
//! - [`TlgLog`] - Records, gap events and statistics of one file
//! - [`TlgBatch`] - Logs and failures of a batch, in input order
//! - [`ScaledRecord`] - Record in physical units with derived metrics and flags
//! - [`HeaderGapEvent`] - Byte range skipped while searching for sync
//! - [`FrameModeProfile`] - Frame length, layout and validation of one mode
//! - [`TlgConfig`] - Profiles, scaling, crop table and thresholds
//!
//! ## Export Functions
//! - [`export_to_csv`] - Export records to `<stem>.csv`
//! - [`export_gap_audit`] - Export the merged `header_gaps.csv`
//! - [`compute_export_paths`] - Helper for consistent path computation
//!
//! ## Filtering Functions
//! - [`should_skip_export`] - Determine if a log is worth exporting
//! - [`gap_ratio`] - Share of the input that fell into gaps

// Module declarations
pub mod config;
pub mod conversion;
pub mod derived;
pub mod error;
pub mod export;
pub mod filters;
pub mod gaps;
pub mod parser;
pub mod profile;
pub mod schema;
pub mod types;

// Re-export everything from modules for convenience
#[allow(ambiguous_glob_reexports)]
pub use config::*;
#[allow(ambiguous_glob_reexports)]
pub use conversion::*;
#[allow(ambiguous_glob_reexports)]
pub use derived::*;
#[allow(ambiguous_glob_reexports)]
pub use error::*;
#[allow(ambiguous_glob_reexports)]
pub use export::*;
#[allow(ambiguous_glob_reexports)]
pub use filters::*;
#[allow(ambiguous_glob_reexports)]
pub use gaps::*;
#[allow(ambiguous_glob_reexports)]
pub use parser::*;
#[allow(ambiguous_glob_reexports)]
pub use profile::*;
#[allow(ambiguous_glob_reexports)]
pub use schema::*;
#[allow(ambiguous_glob_reexports)]
pub use types::*;

// Re-export Result type for convenience
pub use anyhow::Result;
