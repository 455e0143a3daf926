//! EEP catalogues and the per-metallicity table of reference critical points.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EepError, Result};
use crate::track::Track;

pub const EEP_LIST: [&str; 24] = [
    "PMS_BEG",
    "PMS_MIN",
    "PMS_END",
    "MS_BEG",
    "MS_TMIN",
    "MS_TO",
    "SG_MAXL",
    "RG_MINL",
    "RG_BMP1",
    "RG_BMP2",
    "RG_TIP",
    "HE_BEG",
    "YCEN_0.550",
    "YCEN_0.500",
    "YCEN_0.400",
    "YCEN_0.200",
    "YCEN_0.100",
    "YCEN_0.005",
    "YCEN_0.000",
    "AGB_LY1",
    "AGB_LY2",
    "TPAGB",
    "TPAGB1",
    "TPAGB2",
];

pub const EEP_LIST_HB: [&str; 13] = [
    "HE_BEG",
    "YCEN_0.550",
    "YCEN_0.500",
    "YCEN_0.400",
    "YCEN_0.200",
    "YCEN_0.100",
    "YCEN_0.005",
    "YCEN_0.000",
    "AGB_LY1",
    "AGB_LY2",
    "TPAGB",
    "TPAGB1",
    "TPAGB2",
];

/// Column order of the reference critical point files.
pub const REFERENCE_EEPS: [&str; 15] = [
    "PMS_BEG", "PMS_MIN", "PMS_END", "NEAR_ZAM", "MS_BEG", "POINT_B", "POINT_C", "RG_BASE",
    "RG_BMP1", "RG_BMP2", "RG_TIP", "Loop_A", "Loop_B", "Loop_C", "TPAGB",
];

/// The two fixed EEP name catalogues; their order is the order EEP indices
/// must increase in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Catalogue {
    Normal,
    HorizontalBranch,
}

impl Catalogue {
    pub fn names(self) -> &'static [&'static str] {
        match self {
            Catalogue::Normal => &EEP_LIST,
            Catalogue::HorizontalBranch => &EEP_LIST_HB,
        }
    }

    pub fn len(self) -> usize {
        self.names().len()
    }

    pub fn ordinal(self, name: &str) -> Option<usize> {
        self.names().iter().position(|&n| n == name)
    }

    pub fn name(self, ordinal: usize) -> Option<&'static str> {
        self.names().get(ordinal).copied()
    }
}

/// Which index table a name is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// The externally supplied reference ("Sandro") points.
    Reference,
    /// The EEPs defined on the track so far.
    Defined,
}

/// Hook invoked when a table's reference points cannot be mapped onto a
/// track. Implementations usually regenerate the reference file.
pub trait ReferenceRepair: Send + Sync {
    fn repair(&self, mass_key: &str, track_name: &str);
}

/// Default hook: records the mismatch and leaves the table untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyRepair;

impl ReferenceRepair for LogOnlyRepair {
    fn repair(&self, mass_key: &str, track_name: &str) {
        warn!(mass_key, track = track_name, "reference points need regenerating");
    }
}

/// Reference critical points for every mass of one metallicity grid.
///
/// Read-only once built; patches for truncated tracks are applied to the
/// track's own copy of the indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPointTable {
    pub z: f64,
    pub y: f64,
    pub reference_names: Vec<String>,
    /// Model numbers of the reference points keyed by `M{mass:.3}`; a 0 marks
    /// a point the track never reached.
    pub models: BTreeMap<String, Vec<i64>>,
}

impl CriticalPointTable {
    pub fn new(z: f64, y: f64) -> Self {
        Self {
            z,
            y,
            reference_names: REFERENCE_EEPS.iter().map(|s| s.to_string()).collect(),
            models: BTreeMap::new(),
        }
    }

    pub fn with_mass(mut self, mass: f64, models: Vec<i64>) -> Self {
        self.models.insert(format!("M{:.3}", mass), models);
        self
    }

    pub fn eep_names(&self, catalogue: Catalogue) -> &'static [&'static str] {
        catalogue.names()
    }

    /// Catalogue names that are not supplied by the reference points.
    pub fn pending_names(&self, catalogue: Catalogue) -> Vec<&'static str> {
        match catalogue {
            Catalogue::HorizontalBranch => catalogue.names().to_vec(),
            Catalogue::Normal => catalogue
                .names()
                .iter()
                .copied()
                .filter(|name| !self.reference_names.iter().any(|r| r == name))
                .collect(),
        }
    }

    /// Catalogue names whose index is seeded from the reference points.
    pub fn seeded_names(&self, catalogue: Catalogue) -> Vec<&'static str> {
        let pending = self.pending_names(catalogue);
        catalogue
            .names()
            .iter()
            .copied()
            .filter(|name| !pending.contains(name))
            .collect()
    }

    pub fn ordinal(&self, name: &str, source: IndexSource, catalogue: Catalogue) -> Result<usize> {
        match source {
            IndexSource::Reference => self.reference_names.iter().position(|n| n == name),
            IndexSource::Defined => catalogue.ordinal(name),
        }
        .ok_or_else(|| EepError::UnknownEep(name.to_string()))
    }

    pub fn name_of(&self, ordinal: usize, source: IndexSource, catalogue: Catalogue) -> Option<&str> {
        match source {
            IndexSource::Reference => self.reference_names.get(ordinal).map(String::as_str),
            IndexSource::Defined => catalogue.name(ordinal),
        }
    }

    /// Sample index of a reference point, if the track reached it.
    pub fn reference_index(&self, track: &Track, name: &str) -> Option<usize> {
        let ordinal = self.reference_names.iter().position(|n| n == name)?;
        track.sandro_indices.get(ordinal).copied()
    }

    /// Sample index of `name`; undefined EEPs resolve to 0.
    pub fn index_of(&self, track: &Track, name: &str, source: IndexSource) -> Result<usize> {
        match source {
            IndexSource::Reference => {
                self.ordinal(name, source, track.catalogue())?;
                Ok(self.reference_index(track, name).unwrap_or(0))
            }
            IndexSource::Defined => track.eep(name),
        }
    }

    /// Sample indices from EEP `first` through EEP `second` inclusive; empty
    /// if `second` is undefined or not after `first`.
    pub fn inds_between(
        &self,
        track: &Track,
        first: &str,
        second: &str,
        source: IndexSource,
    ) -> Result<Vec<usize>> {
        let start = self.index_of(track, first, source)?;
        let end = self.index_of(track, second, source)?;
        Ok(span(start, end, track.len()))
    }

    /// Maps this table's reference model numbers onto `track` samples and
    /// stores them as `sandro_indices`.
    ///
    /// A single missing trailing point means the track was truncated after the
    /// table was written, and the last sample stands in for it. More missing
    /// points flag the track and invoke `hook`.
    pub fn attach(&self, track: &mut Track, hook: &dyn ReferenceRepair) -> Result<()> {
        if self.z != track.z {
            return Err(EepError::MetallicityMismatch {
                quantity: "Z",
                track: track.z,
                table: self.z,
            });
        }
        if round2(self.y) != round2(track.y) {
            return Err(EepError::MetallicityMismatch {
                quantity: "Y",
                track: track.y,
                table: self.y,
            });
        }

        let key = track.mass_key();
        let Some(models) = self.models.get(&key) else {
            track.flag("no ptcri mass");
            return Err(EepError::MissingMass(key));
        };

        let expected: Vec<i64> = models.iter().copied().take_while(|&m| m != 0).collect();
        let mut indices = Vec::with_capacity(expected.len());
        for model in &expected {
            match track.samples.iter().position(|s| s.model == *model) {
                Some(index) => indices.push(index),
                None => break,
            }
        }

        let missing = expected.len() - indices.len();
        match missing {
            0 => {}
            1 => {
                let last = track.last_index()?;
                warn!(
                    track = %track.name,
                    mass_key = %key,
                    "reference point past the end of the track, using the last sample"
                );
                indices.push(last);
            }
            _ => {
                hook.repair(&key, &track.name);
                track.flag("ptcri file does not match track, not enough MODEs");
                return Err(EepError::ReferenceMismatch {
                    mass_key: key,
                    missing,
                });
            }
        }

        track.sandro_indices = indices;
        Ok(())
    }
}

pub(crate) fn span(start: usize, end: usize, len: usize) -> Vec<usize> {
    if end <= start || len == 0 {
        return Vec::new();
    }
    (start..=end.min(len - 1)).collect()
}

fn round2(value: f64) -> i64 {
    (value * 100.0).round() as i64
}
