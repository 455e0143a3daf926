//! Sampled stellar evolution tracks and their EEP annotations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::critical_point::Catalogue;
use crate::error::{EepError, Result};

/// One sampled physical state along a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub age: f64,
    pub log_l: f64,
    pub log_te: f64,
    /// Central hydrogen mass fraction.
    pub xcen: f64,
    /// Central helium mass fraction.
    pub ycen: f64,
    /// Fraction of the luminosity from helium burning.
    pub ly: f64,
    /// Fraction of the luminosity from hydrogen burning.
    pub lx: f64,
    /// Model number written by the evolution code.
    pub model: i64,
    /// Thermal-pulse step counter, only present on TP-AGB tracks.
    #[serde(default)]
    pub tp_step: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    Age,
    LogL,
    LogTe,
    Xcen,
    Ycen,
    Ly,
    Lx,
}

impl Column {
    pub fn of(self, sample: &Sample) -> f64 {
        match self {
            Column::Age => sample.age,
            Column::LogL => sample.log_l,
            Column::LogTe => sample.log_te,
            Column::Xcen => sample.xcen,
            Column::Ycen => sample.ycen,
            Column::Ly => sample.ly,
            Column::Lx => sample.lx,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Column::Age => "AGE",
            Column::LogL => "LOG_L",
            Column::LogTe => "LOG_TE",
            Column::Xcen => "XCEN",
            Column::Ycen => "YCEN",
            Column::Ly => "LY",
            Column::Lx => "LX",
        }
    }
}

/// A single evolution run for one mass and composition.
///
/// `eep_indices` has one slot per name of [`Track::catalogue`]; 0 means the
/// EEP is undefined for this track. Once `failure_reason` is set no EEP work
/// is attempted on the track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub mass: f64,
    pub z: f64,
    pub y: f64,
    pub is_hb: bool,
    pub is_agb: bool,
    pub samples: Vec<Sample>,
    /// Sample indices of the reference critical points, in table column order.
    pub sandro_indices: Vec<usize>,
    pub eep_indices: Vec<usize>,
    pub notes: BTreeMap<String, String>,
    pub failure_reason: Option<String>,
}

impl Track {
    pub fn new(name: impl Into<String>, mass: f64, z: f64, y: f64, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            mass,
            z,
            y,
            is_hb: false,
            is_agb: false,
            samples,
            sandro_indices: Vec::new(),
            eep_indices: vec![0; Catalogue::Normal.len()],
            notes: BTreeMap::new(),
            failure_reason: None,
        }
    }

    pub fn as_horizontal_branch(mut self) -> Self {
        self.is_hb = true;
        self.eep_indices = vec![0; Catalogue::HorizontalBranch.len()];
        self
    }

    pub fn as_agb(mut self) -> Self {
        self.is_agb = true;
        self
    }

    pub fn with_reference_indices(mut self, indices: Vec<usize>) -> Self {
        self.sandro_indices = indices;
        self
    }

    pub fn catalogue(&self) -> Catalogue {
        if self.is_hb {
            Catalogue::HorizontalBranch
        } else {
            Catalogue::Normal
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_index(&self) -> Result<usize> {
        self.samples
            .len()
            .checked_sub(1)
            .ok_or_else(|| EepError::incomplete(self.mass, "track has no samples"))
    }

    /// Key used by critical point tables, e.g. `M1.250`.
    pub fn mass_key(&self) -> String {
        format!("M{:.3}", self.mass)
    }

    pub fn column(&self, column: Column) -> Vec<f64> {
        self.samples.iter().map(|s| column.of(s)).collect()
    }

    /// Values of `column` at each of `indices`; out of range indices are
    /// an incomplete track.
    pub fn column_at(&self, column: Column, indices: &[usize]) -> Result<Vec<f64>> {
        indices.iter().map(|&i| self.value(column, i)).collect()
    }

    pub fn value(&self, column: Column, index: usize) -> Result<f64> {
        self.samples.get(index).map(|s| column.of(s)).ok_or_else(|| {
            EepError::incomplete(
                self.mass,
                format!(
                    "no {} at index {} ({} samples)",
                    column.name(),
                    index,
                    self.samples.len()
                ),
            )
        })
    }

    /// Index of the sample whose age is closest to `age`.
    pub fn closest_age_index(&self, age: f64) -> Result<usize> {
        crate::features::closest_match(age, &self.column(Column::Age))
            .map(|(index, _)| index)
            .ok_or_else(|| EepError::incomplete(self.mass, "no ages to match"))
    }

    pub fn eep(&self, name: &str) -> Result<usize> {
        let ordinal = self
            .catalogue()
            .ordinal(name)
            .ok_or_else(|| EepError::UnknownEep(name.to_string()))?;
        Ok(self.eep_indices.get(ordinal).copied().unwrap_or(0))
    }

    /// Adds or replaces an EEP and records why it sits there.
    pub fn set_eep(&mut self, name: &str, index: usize, note: impl Into<String>) -> Result<()> {
        let ordinal = self
            .catalogue()
            .ordinal(name)
            .ok_or_else(|| EepError::UnknownEep(name.to_string()))?;
        if self.eep_indices.len() != self.catalogue().len() {
            self.eep_indices.resize(self.catalogue().len(), 0);
        }
        let note = note.into();
        debug!(track = %self.name, mass = self.mass, eep = name, index, note = %note, "eep");
        self.eep_indices[ordinal] = index;
        self.notes.insert(name.to_string(), note);
        Ok(())
    }

    /// Defined (non-zero) EEPs in catalogue order.
    pub fn defined_eeps(&self) -> Vec<(&'static str, usize)> {
        self.catalogue()
            .names()
            .iter()
            .zip(self.eep_indices.iter())
            .filter(|(_, &index)| index > 0)
            .map(|(&name, &index)| (name, index))
            .collect()
    }

    pub fn flag(&mut self, reason: impl Into<String>) {
        if self.failure_reason.is_none() {
            self.failure_reason = Some(reason.into());
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.failure_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, Sample, Track};

    fn sample(age: f64) -> Sample {
        Sample {
            age,
            log_l: 1.0,
            log_te: 3.7,
            xcen: 0.7,
            ycen: 0.28,
            ly: 0.0,
            lx: 1.0,
            model: 0,
            tp_step: None,
        }
    }

    #[test]
    fn set_eep_records_note_and_index() {
        let mut track = Track::new("t", 1.0, 0.01, 0.26, (0..5).map(|i| sample(i as f64)).collect());
        track.set_eep("MS_TO", 3, "test").expect("known eep");
        assert_eq!(track.eep("MS_TO").expect("known eep"), 3);
        assert_eq!(track.notes.get("MS_TO").map(String::as_str), Some("test"));
        assert_eq!(track.defined_eeps(), vec![("MS_TO", 3)]);
    }

    #[test]
    fn unknown_names_are_errors() {
        let mut track = Track::new("t", 1.0, 0.01, 0.26, vec![sample(0.0)]).as_horizontal_branch();
        assert!(track.set_eep("MS_TO", 0, "").is_err());
        assert!(track.eep("HE_BEG").is_ok());
    }

    #[test]
    fn value_out_of_range_is_incomplete() {
        let track = Track::new("t", 2.0, 0.01, 0.26, vec![sample(0.0)]);
        let err = track.value(Column::Xcen, 4).expect_err("index 4 is missing");
        assert!(format!("{err}").contains("incomplete track"));
    }

    #[test]
    fn mass_key_uses_three_decimals() {
        let track = Track::new("t", 1.25, 0.01, 0.26, Vec::new());
        assert_eq!(track.mass_key(), "M1.250");
        assert!(track.last_index().is_err());
    }
}
