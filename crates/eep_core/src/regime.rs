//! Mass regimes that select which EEP search strategy a track gets.

use serde::{Deserialize, Serialize};

use crate::config::EepConfig;
use crate::critical_point::CriticalPointTable;
use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MassRegime {
    /// Never leaves the main sequence within the age of the universe.
    VeryLowMass,
    /// Reaches the turn-off with a radiative core; no MS hook.
    LowMass,
    Intermediate,
    /// Tracks are marked by core composition instead of HR morphology.
    High,
}

impl MassRegime {
    pub fn classify(track: &Track, table: &CriticalPointTable, config: &EepConfig) -> Self {
        if track.mass >= config.high_mass {
            MassRegime::High
        } else if !reaches_turn_off(track, table) {
            MassRegime::VeryLowMass
        } else if track.mass <= config.low_mass {
            MassRegime::LowMass
        } else {
            MassRegime::Intermediate
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MassRegime::VeryLowMass => "very low mass",
            MassRegime::LowMass => "low mass",
            MassRegime::Intermediate => "intermediate mass",
            MassRegime::High => "high mass",
        }
    }
}

/// A track reaches the main sequence turn-off when its reference points run
/// at least as far as POINT_C.
pub fn reaches_turn_off(track: &Track, table: &CriticalPointTable) -> bool {
    table.reference_index(track, "POINT_C").is_some()
}

/// A track has a red giant tip when its reference points run as far as RG_TIP.
pub fn reaches_rg_tip(track: &Track, table: &CriticalPointTable) -> bool {
    table.reference_index(track, "RG_TIP").is_some()
}
