use crate::types::ModeId;
use thiserror::Error;

/// Payload decoding failures
///
/// The synchronizer only emits frames of the right length, so these indicate an
/// internal inconsistency; the pipeline counts them and skips the frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload length mismatch for mode {mode}: expected {expected} bytes, got {actual}")]
    PayloadLength {
        mode: ModeId,
        expected: usize,
        actual: usize,
    },
    #[error("no record schema registered for mode {0}")]
    UnknownMode(ModeId),
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("unsupported field width: {0} bytes")]
    UnsupportedWidth(usize),
}

/// Custom error types for TLG parsing
#[derive(Debug, Error)]
pub enum TlgError {
    /// Malformed or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// Profile violating its own length or schema invariants
    #[error("Invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },
    /// Configuration written for an incompatible schema version
    #[error("Unsupported configuration schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: String, supported: String },
}

impl TlgError {
    pub(crate) fn invalid_profile(name: &str, reason: impl Into<String>) -> Self {
        TlgError::InvalidProfile {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
