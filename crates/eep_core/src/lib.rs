//! The `eep_core` crate places equivalent evolutionary points (EEPs) on sampled
//! stellar evolution tracks so that tracks of different mass can be resampled
//! onto a common grid of evolutionary stages.
//!
//! Key components:
//! - **Track**: `Track` samples, the EEP index table and per-EEP notes.
//! - **Critical points**: the EEP catalogues and `CriticalPointTable`, which maps externally
//!   supplied reference points onto a track.
//! - **Features**: nearest-value matching, discrete extrema, `peak_finder` and a parametric
//!   spline inflection search.
//! - **Definition**: `EepDefiner` runs the mass-regime cascade; `EepEngine` wraps it with
//!   reference attachment and batch processing.
pub mod cascade;
pub mod config;
pub mod critical_point;
pub mod define;
pub mod engine;
pub mod error;
pub mod features;
pub mod monotonic;
pub mod regime;
pub mod spline;
pub mod track;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::EepConfig;
pub use critical_point::{Catalogue, CriticalPointTable, IndexSource, LogOnlyRepair, ReferenceRepair};
pub use define::EepDefiner;
pub use engine::{BatchSummary, EepEngine};
pub use error::{EepError, Result};
pub use features::{PeakQuery, SelectionPolicy};
pub use regime::MassRegime;
pub use track::{Column, Sample, Track};
