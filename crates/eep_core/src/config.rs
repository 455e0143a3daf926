use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Thresholds driving the EEP cascade.
///
/// Most of these are empirically tuned against the Padova grids and carry no
/// derivation; they are kept as named values so each grid can run with its
/// own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EepConfig {
    /// Tracks at or below this mass use the low-mass main sequence rules.
    pub low_mass: f64,
    /// Above this mass SG_MAXL is placed by mean age.
    pub inte_mass: f64,
    /// Tracks at or above this mass take the high-mass branch.
    pub high_mass: f64,
    /// Age standing in for "never reaches the turn-off".
    pub max_age: f64,
    pub pms_min_age: f64,
    pub ms_beg_xcen: f64,
    pub low_mass_tmin_xcen: f64,
    /// Δlog L between MS_BEG and the raw MS_TMIN below which the minimum is
    /// located by the spline second derivative.
    pub tmin_interp_delta: f64,
    /// Minimum Δlog L between MS_TMIN and a plausible MS_TO.
    pub msto_min_delta: f64,
    /// Mass window whose main sequence search falls back to the track end.
    pub transition_mass: (f64, f64),
    pub low_z_pms_end: f64,
    pub tmin_first_max_z: f64,
    pub ycen_tolerance: f64,
    pub ycen_targets: Vec<f64>,
    /// Central abundances at or below this count as exhausted.
    pub depletion_epsilon: f64,
    pub rg_minl_min_sep: usize,
    pub rg_minl_max_base_offset: usize,
    pub sg_maxl_min_sep: usize,
    pub he_spike_ratio: f64,
    /// Only the first few |LY - LX| minima are considered; later ones sit in
    /// thermal pulses.
    pub agb_max_minima: usize,
    pub agb_tp_first_min_age: f64,
    pub agb_tp_age: f64,
    pub agb_tp_age_late: f64,
    pub tpagb_points: usize,
    pub peak_min_points: usize,
    pub spline_grid: usize,
    pub repair_min_gap: usize,
    pub repair_slack: usize,
}

impl Default for EepConfig {
    fn default() -> Self {
        Self {
            low_mass: 1.25,
            inte_mass: 12.0,
            high_mass: 19.0,
            max_age: 1.0e11,
            pms_min_age: 0.2,
            ms_beg_xcen: 0.6,
            low_mass_tmin_xcen: 0.3,
            tmin_interp_delta: 0.1,
            msto_min_delta: 0.01,
            transition_mass: (0.7, 0.9),
            low_z_pms_end: 0.004,
            tmin_first_max_z: 0.01,
            ycen_tolerance: 0.01,
            ycen_targets: vec![0.55, 0.5, 0.4, 0.2, 0.1, 0.005, 0.0],
            depletion_epsilon: 1e-10,
            rg_minl_min_sep: 50,
            rg_minl_max_base_offset: 100,
            sg_maxl_min_sep: 10,
            he_spike_ratio: 10.0,
            agb_max_minima: 6,
            agb_tp_first_min_age: 0.89,
            agb_tp_age: 0.98,
            agb_tp_age_late: 0.999,
            tpagb_points: 3,
            peak_min_points: 3,
            spline_grid: 100,
            repair_min_gap: 5,
            repair_slack: 9,
        }
    }
}

impl EepConfig {
    /// Parses a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn is_depleted(&self, fraction: f64) -> bool {
        fraction.abs() <= self.depletion_epsilon
    }
}
