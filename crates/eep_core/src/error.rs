//! Error taxonomy for EEP definition.
//!
//! Track-level failures never escape [`crate::engine::EepEngine`]; they are
//! recorded as the track's `failure_reason` instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EepError>;

#[derive(Debug, Error)]
pub enum EepError {
    /// Every fallback strategy for an EEP returned the sentinel.
    #[error("{eep} not found: {reason}")]
    NotFound { eep: String, reason: String },

    /// Reference model numbers could not be mapped onto the track samples.
    #[error("ptcri file does not match track, {missing} reference points missing for {mass_key}")]
    ReferenceMismatch { mass_key: String, missing: usize },

    /// Defined EEP indices are not strictly increasing.
    #[error("eeps not monotonically increasing: {}", offenders.join(", "))]
    MonotonicityViolation { offenders: Vec<String> },

    /// A required sample or reference index is absent.
    #[error("incomplete track (M={mass:.4}): {detail}")]
    IncompleteTrack { mass: f64, detail: String },

    #[error("unknown EEP name: {0}")]
    UnknownEep(String),

    #[error("no ptcri mass {0}")]
    MissingMass(String),

    #[error("{quantity}s do not match between track and ptcri file {track} != {table}")]
    MetallicityMismatch {
        quantity: &'static str,
        track: f64,
        table: f64,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl EepError {
    pub(crate) fn incomplete(mass: f64, detail: impl Into<String>) -> Self {
        EepError::IncompleteTrack {
            mass,
            detail: detail.into(),
        }
    }
}
