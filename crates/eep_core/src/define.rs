//! Places every EEP of the catalogue on a track.
//!
//! Reference points seed the index table, a mass-regime specific cascade
//! fills in the rest, and a final ordering check flags tracks whose EEPs do
//! not increase. Every assignment records a note naming the strategy that
//! produced it.

use tracing::{debug, warn};

use crate::cascade::{first_success, Attempt};
use crate::config::EepConfig;
use crate::critical_point::{span, CriticalPointTable, IndexSource};
use crate::error::{EepError, Result};
use crate::features::{
    closest_match, find_extrema, linear_fit, peak_finder, remove_dupes, second_derivative_root,
    PeakQuery, SelectionPolicy,
};
use crate::monotonic::{check_monotonic_increase, check_sandros_eeps};
use crate::regime::{reaches_rg_tip, MassRegime};
use crate::track::{Column, Track};

/// Runs the EEP cascade against one metallicity's reference table.
#[derive(Debug, Clone, Copy)]
pub struct EepDefiner<'a> {
    table: &'a CriticalPointTable,
    config: &'a EepConfig,
}

impl<'a> EepDefiner<'a> {
    pub fn new(table: &'a CriticalPointTable, config: &'a EepConfig) -> Self {
        Self { table, config }
    }

    /// Defines all EEPs of `track`. Failures are recorded as the track's
    /// `failure_reason`; flagged tracks are left untouched.
    pub fn define_eep_stages(&self, track: &mut Track) {
        if track.is_flagged() {
            debug!(track = %track.name, "skipping flagged track");
            return;
        }
        if let Err(err) = self.define(track) {
            warn!(track = %track.name, mass = track.mass, error = %err, "eep definition failed");
            track.flag(err.to_string());
        }
    }

    fn define(&self, track: &mut Track) -> Result<()> {
        self.seed(track)?;

        if track.is_agb {
            self.add_tpagb_eeps(track)?;
            return check_monotonic_increase(track);
        }
        if track.is_hb {
            self.add_hb_beg(track)?;
            self.add_cen_eeps(track, 0)?;
            self.add_agb_eeps(track)?;
            return check_monotonic_increase(track);
        }

        self.check_pms_beg(track)?;
        self.check_ms_beg(track)?;

        let regime = MassRegime::classify(track, self.table, self.config);
        debug!(track = %track.name, mass = track.mass, regime = regime.name(), "mass regime");
        match regime {
            MassRegime::High => self.add_high_mass_eeps(track)?,
            MassRegime::VeryLowMass => self.add_age_limited_eeps(track)?,
            MassRegime::LowMass | MassRegime::Intermediate => {
                self.add_intermediate_eeps(track, regime)?
            }
        }
        check_monotonic_increase(track)
    }

    /// Resets the index table and copies in the reference points.
    fn seed(&self, track: &mut Track) -> Result<()> {
        let catalogue = track.catalogue();
        track.notes.clear();
        track.eep_indices = vec![0; catalogue.len()];
        if track.is_hb {
            return Ok(());
        }
        for name in self.table.seeded_names(catalogue) {
            let Some(index) = self.table.reference_index(track, name) else {
                continue;
            };
            if index >= track.len() {
                return Err(EepError::incomplete(
                    track.mass,
                    format!("reference {name} at {index} is past the last sample"),
                ));
            }
            if index > 0 {
                track.set_eep(name, index, "reference point")?;
            }
        }
        check_sandros_eeps(track, self.config)
    }

    fn check_pms_beg(&self, track: &mut Track) -> Result<()> {
        let Some(&first) = track.sandro_indices.first() else {
            return Err(EepError::incomplete(track.mass, "no reference points"));
        };
        let min_age = self.config.pms_min_age;
        if track.value(Column::Age, first)? <= min_age {
            // Ages are compared at a precision of 0.1 yr.
            let index = track
                .samples
                .iter()
                .position(|s| (s.age * 10.0).round() / 10.0 > min_age)
                .ok_or_else(|| {
                    EepError::incomplete(track.mass, format!("no sample older than {min_age}"))
                })?;
            track.set_eep("PMS_BEG", index, format!("overwritten with age > {min_age}"))?;
        }
        Ok(())
    }

    fn check_ms_beg(&self, track: &mut Track) -> Result<()> {
        let xcen = self
            .table
            .reference_index(track, "MS_BEG")
            .and_then(|index| track.value(Column::Xcen, index).ok());
        let Some(xcen) = xcen else {
            track
                .notes
                .insert("MS_BEG".to_string(), "Incomplete track?".to_string());
            return Err(EepError::incomplete(track.mass, "no MS_BEG reference point"));
        };
        if xcen < self.config.ms_beg_xcen {
            warn!(track = %track.name, mass = track.mass, xcen, "reference MS_BEG has low XCEN");
            let threshold = self.config.ms_beg_xcen;
            track.notes.insert(
                "MS_BEG".to_string(),
                format!("reference MS_BEG but could be wrong XCEN < {threshold}, {xcen:.3}"),
            );
            if track.mass <= self.config.low_mass {
                self.add_ms_beg_eep(track)?;
            }
        }
        Ok(())
    }

    fn add_ms_beg_eep(&self, track: &mut Track) -> Result<()> {
        let target = self.config.ms_beg_xcen;
        let found = closest_match(target, &track.column(Column::Xcen)).map(|(index, _)| index);
        if let Some(index) = found.filter(|&index| index > 0) {
            track.set_eep(
                "MS_BEG",
                index,
                format!("overwrote reference for closer match to XCEN={target}"),
            )?;
        }
        Ok(())
    }

    fn add_eep_with_age(&self, track: &mut Track, name: &str, age: f64) -> Result<usize> {
        let index = track.closest_age_index(age)?;
        let actual = track.value(Column::Age, index)?;
        track.set_eep(name, index, format!("By age = {age:e} is {actual:e}"))?;
        Ok(index)
    }

    /// Tracks that never leave the main sequence: only MS_TO and MS_TMIN are
    /// placed, by age.
    fn add_age_limited_eeps(&self, track: &mut Track) -> Result<()> {
        for name in self.table.pending_names(track.catalogue()) {
            track.set_eep(name, 0, "No MS_TO")?;
        }
        let ms_beg = track.eep("MS_BEG")?;
        let ms_to = self.add_eep_with_age(track, "MS_TO", self.config.max_age)?;
        let to_age = track.value(Column::Age, ms_to)?;
        let ms_tmin = self.add_eep_with_age(track, "MS_TMIN", to_age / 2.0)?;
        // MS_BEG can come after half the turn-off age.
        if ms_tmin <= ms_beg {
            let beg_age = track.value(Column::Age, ms_beg)?;
            self.add_eep_with_age(track, "MS_TMIN", (to_age + beg_age) / 2.0)?;
        }
        Ok(())
    }

    fn add_intermediate_eeps(&self, track: &mut Track, regime: MassRegime) -> Result<()> {
        self.add_ms_eeps(track, regime)?;

        track.set_eep("HE_BEG", 0, "Initializing")?;
        let rg_tip = track.eep("RG_TIP")?;
        let cens = if rg_tip > 0 {
            self.add_cen_eeps(track, rg_tip)?
        } else {
            Vec::new()
        };
        let mut he_beg = 0;
        if let Some(&first_cen) = cens.first().filter(|&&i| i > 0) {
            he_beg = self.add_quiescent_he_eep(track, rg_tip, first_cen, "RG_TIP")?;
        }
        if he_beg == 0 || !reaches_rg_tip(track, self.table) {
            for name in self.helium_burning_names(track) {
                track.set_eep(name, 0, "no He EEPs")?;
            }
        }

        self.add_sg_rg_eeps(track)?;
        self.add_agb_eeps(track)
    }

    /// Pending EEPs after HE_BEG.
    fn helium_burning_names(&self, track: &Track) -> Vec<&'static str> {
        self.table
            .pending_names(track.catalogue())
            .into_iter()
            .skip_while(|&name| name != "HE_BEG")
            .skip(1)
            .collect()
    }

    fn add_ms_eeps(&self, track: &mut Track, regime: MassRegime) -> Result<()> {
        let last = track.last_index()?;
        let mut inds = self
            .table
            .inds_between(track, "MS_BEG", "POINT_C", IndexSource::Reference)?;
        let (lo, hi) = self.config.transition_mass;
        if inds.is_empty() && (lo..=hi).contains(&track.mass) {
            if let Some(start) = self.table.reference_index(track, "MS_BEG") {
                inds = (start..last).collect();
            }
        }

        let ms_tmin = if inds.is_empty() {
            track.set_eep("MS_TMIN", 0, "No points between MS_BEG and POINT_C")?;
            0
        } else {
            match self.find_ms_tmin(track, &inds, regime)? {
                Some((index, note)) => {
                    track.set_eep("MS_TMIN", index, note)?;
                    index
                }
                None => {
                    track.set_eep("MS_TMIN", 0, "no MS_TMIN between MS_BEG and POINT_C")?;
                    0
                }
            }
        };

        if ms_tmin == 0 {
            track.set_eep("MS_TO", 0, "no MS_TMIN")?;
        } else {
            let bounded = self
                .table
                .inds_between(track, "MS_TMIN", "RG_BMP1", IndexSource::Defined)?;
            let (inds, until) = if bounded.is_empty() {
                ((ms_tmin..=last).collect(), "final track point")
            } else {
                (bounded, "RG_BMP1")
            };
            match self.find_ms_to(track, &inds, ms_tmin, until)? {
                Some((index, note)) => track.set_eep("MS_TO", index, note)?,
                None => track.set_eep("MS_TO", 0, "No MS_TO found after four methods")?,
            }
        }

        if track.eep("MS_TO")? == 0 {
            warn!(track = %track.name, mass = track.mass, "no MS_TO, placing main sequence by age");
            let ms_beg = track.eep("MS_BEG")?;
            let halfway = ms_beg + track.len().saturating_sub(ms_beg) / 2;
            track.set_eep("MS_TMIN", halfway, "Half way from MS_BEG to Fin")?;
            self.add_eep_with_age(track, "MS_TO", self.config.max_age)?;
        }
        Ok(())
    }

    fn find_ms_tmin(
        &self,
        track: &Track,
        inds: &[usize],
        regime: MassRegime,
    ) -> Result<Option<(usize, String)>> {
        let config = self.config;
        let start_l = track.value(Column::LogL, inds[0])?;
        let log_l = track.column_at(Column::LogL, inds)?;
        let log_te = track.column_at(Column::LogTe, inds)?;
        let resolved = |index: usize| {
            inds.iter()
                .position(|&i| i == index)
                .is_some_and(|k| (log_l[k] - start_l).abs() >= config.tmin_interp_delta)
        };

        let mut attempts = Vec::new();
        if regime == MassRegime::LowMass {
            let xcen = track.column_at(Column::Xcen, inds)?;
            let target = config.low_mass_tmin_xcen;
            attempts.push(Attempt::new(format!("XCEN=={target}"), move || {
                closest_match(target, &xcen).map(|(k, _)| inds[k])
            }));
        }
        attempts.push(Attempt::new("Min logT", || {
            let query = PeakQuery::min(Column::LogTe).parametric(false);
            peak_finder(track, inds, &query, config).filter(|&i| resolved(i))
        }));
        attempts.push(Attempt::new("Min logT by interpolation", || {
            second_derivative_root(&log_te, inds, true, config.spline_grid)
        }));
        Ok(first_success("MS_TMIN", attempts))
    }

    fn find_ms_to(
        &self,
        track: &Track,
        inds: &[usize],
        ms_tmin: usize,
        until: &str,
    ) -> Result<Option<(usize, String)>> {
        let config = self.config;
        let tmin_l = track.value(Column::LogL, ms_tmin)?;
        let log_l = track.column_at(Column::LogL, inds)?;
        let separated = |index: usize| {
            track
                .value(Column::LogL, index)
                .is_ok_and(|l| (l - tmin_l).abs() >= config.msto_min_delta)
        };
        let query = PeakQuery::max(Column::LogTe);

        let attempts = vec![
            Attempt::new(format!("Max logT between MS_TMIN and {until}"), || {
                peak_finder(track, inds, &query, config).filter(|&i| separated(i))
            }),
            Attempt::new(
                format!("Max logT between MS_TMIN and {until}, less linear fit"),
                || {
                    let query = query.parametric(false).less_linear_fit(true);
                    peak_finder(track, inds, &query, config).filter(|&i| separated(i))
                },
            ),
            Attempt::new(
                format!("Min logL between MS_TMIN and {until} by interpolation"),
                || {
                    second_derivative_root(&log_l, inds, true, config.spline_grid)
                        .filter(|&i| separated(i))
                },
            ),
            Attempt::new("XCEN==0", || {
                inds.iter()
                    .copied()
                    .find(|&i| track.value(Column::Xcen, i).is_ok_and(|x| config.is_depleted(x)))
            }),
        ];
        Ok(first_success("MS_TO", attempts))
    }

    /// Matches each configured central helium fraction after `start`. A
    /// target further than the tolerance from every remaining sample is left
    /// undefined and the next search starts from the last match.
    fn add_cen_eeps(&self, track: &mut Track, start: usize) -> Result<Vec<usize>> {
        let ycen = track.column(Column::Ycen);
        let tolerance = self.config.ycen_tolerance;
        let mut from = start;
        let mut found = Vec::with_capacity(self.config.ycen_targets.len());
        for &target in &self.config.ycen_targets {
            let name = format!("YCEN_{target:.3}");
            let window = ycen.get(from..).unwrap_or(&[]);
            let (index, note) = match closest_match(target, window) {
                Some((k, diff)) if diff <= tolerance => {
                    (from + k, format!("YCEN == {:.6}", ycen[from + k]))
                }
                Some((k, _)) => (
                    0,
                    format!(
                        "YCEN == {:.6} not within {tolerance} of {target:.3}",
                        ycen[from + k]
                    ),
                ),
                None => (0, "no samples left to match".to_string()),
            };
            track.set_eep(&name, index, note)?;
            if index > 0 {
                from = index + 1;
            }
            found.push(index);
        }
        Ok(found)
    }

    /// HE_BEG is the LY minimum between `start` and `end`, moved past an early
    /// helium flash spike when one is present.
    fn add_quiescent_he_eep(
        &self,
        track: &mut Track,
        start: usize,
        end: usize,
        start_name: &str,
    ) -> Result<usize> {
        let inds: Vec<usize> = (start..end.min(track.len())).collect();
        if inds.is_empty() {
            track.set_eep(
                "HE_BEG",
                0,
                format!("No HE_BEG M={:.4} Z={:.4}", track.mass, track.z),
            )?;
            return Ok(0);
        }
        let ly = track.column_at(Column::Ly, &inds)?;
        let mut he_min = argmin(&ly).unwrap_or(0);
        let subset = inds.len() / 3;
        if let Some(he_max) = argmax(&ly[..subset]) {
            let base = ly[0];
            let spike = if base > 0.0 {
                ly[he_max] / base > self.config.he_spike_ratio
            } else {
                ly[he_max] > 0.0
            };
            if he_min == 0 || spike {
                if let Some(k) = argmin(&ly[he_max + 1..]) {
                    he_min = he_max + 1 + k;
                }
            }
        }
        let index = inds[he_min];
        track.set_eep("HE_BEG", index, format!("Min LY after {start_name}"))?;
        Ok(index)
    }

    fn add_sg_rg_eeps(&self, track: &mut Track) -> Result<()> {
        let ms_to = track.eep("MS_TO")?;
        let rg_base = self.table.reference_index(track, "RG_BASE");
        let policies = [
            SelectionPolicy::Last,
            SelectionPolicy::First,
            SelectionPolicy::MinOfMin,
        ];

        let mut found = None;
        for policy in policies {
            found = self.add_rg_minl_eep(track, "MS_TO", policy)?;
            if self.rg_minl_plausible(track, found, ms_to, rg_base) {
                break;
            }
        }
        // The subgiant maximum is sometimes the better anchor.
        if !self.rg_minl_plausible(track, found, ms_to, rg_base) {
            for policy in policies {
                self.add_sg_maxl_eep(track, "RG_BMP1")?;
                found = self.add_rg_minl_eep(track, "SG_MAXL", policy)?;
                if self.rg_minl_plausible(track, found, ms_to, rg_base) {
                    break;
                }
            }
        }
        if !self.rg_minl_plausible(track, found, ms_to, rg_base) {
            track.set_eep(
                "RG_MINL",
                rg_base.unwrap_or(0),
                "Set RG_MINL to reference RG_BASE",
            )?;
        }

        if self.add_sg_maxl_eep(track, "RG_MINL")?.is_none() {
            self.add_sg_maxl_eep(track, "RG_BMP1")?;
        }
        Ok(())
    }

    /// RG_MINL must sit well after MS_TO, near the reference RG_BASE, and
    /// after core hydrogen is gone.
    fn rg_minl_plausible(
        &self,
        track: &Track,
        rg_minl: Option<usize>,
        ms_to: usize,
        rg_base: Option<usize>,
    ) -> bool {
        let Some(index) = rg_minl else {
            return false;
        };
        if index < ms_to + self.config.rg_minl_min_sep {
            return false;
        }
        if rg_base.is_some_and(|base| index.abs_diff(base) > self.config.rg_minl_max_base_offset) {
            return false;
        }
        track
            .value(Column::Xcen, index)
            .is_ok_and(|x| (x * 1e4).round() <= 0.0)
    }

    fn add_rg_minl_eep(
        &self,
        track: &mut Track,
        from: &str,
        policy: SelectionPolicy,
    ) -> Result<Option<usize>> {
        let config = self.config;
        let view: &Track = track;
        let inds = self
            .table
            .inds_between(view, from, "RG_BMP1", IndexSource::Defined)?;
        let query = PeakQuery::min(Column::LogL).policy(policy);
        let label = format!("{} Min logL between {from} and RG_BMP1", policy.label());

        let mut attempts = Vec::new();
        if view.mass >= config.low_mass {
            attempts.push(Attempt::new(format!("{label} with parametric interp"), || {
                peak_finder(view, &inds, &query, config)
            }));
        }
        attempts.push(Attempt::new(format!("{label} with less linear fit"), || {
            let query = query.parametric(false).less_linear_fit(true);
            peak_finder(view, &inds, &query, config)
        }));
        attempts.push(Attempt::new(label.clone(), || {
            peak_finder(view, &inds, &query.parametric(false), config)
        }));

        match first_success("RG_MINL", attempts) {
            Some((index, note)) => {
                track.set_eep("RG_MINL", index, note)?;
                Ok(Some(index))
            }
            None => {
                track.set_eep("RG_MINL", 0, format!("no {label}"))?;
                Ok(None)
            }
        }
    }

    fn add_sg_maxl_eep(&self, track: &mut Track, until: &str) -> Result<Option<usize>> {
        let config = self.config;
        let ms_to = track.eep("MS_TO")?;
        let rg_minl = track.eep("RG_MINL")?;

        if track.mass > config.inte_mass {
            let mean_age =
                (track.value(Column::Age, ms_to)? + track.value(Column::Age, rg_minl)?) / 2.0;
            let index = track.closest_age_index(mean_age)?;
            track.set_eep(
                "SG_MAXL",
                index,
                "Set SG_MAXL to be mean age between MS_TO and RG_MINL",
            )?;
            return Ok(Some(index));
        }

        let view: &Track = track;
        let inds = self
            .table
            .inds_between(view, "MS_TO", until, IndexSource::Defined)?;
        let policy = if until == "RG_MINL" {
            SelectionPolicy::MaxOfMax
        } else {
            SelectionPolicy::Last
        };
        let query = PeakQuery::max(Column::LogL).policy(policy).parametric(false);
        let clear_of_rg_minl =
            |index: usize| index != ms_to && index.abs_diff(rg_minl) >= config.sg_maxl_min_sep;
        let label = format!("{} logL between MS_TO and {until}", policy.label());

        let attempts = vec![
            Attempt::new(label.clone(), || {
                peak_finder(view, &inds, &query, config).filter(|&i| clear_of_rg_minl(i))
            }),
            Attempt::new(format!("{label} with less linear fit"), || {
                peak_finder(view, &inds, &query.less_linear_fit(true), config)
                    .filter(|&i| clear_of_rg_minl(i))
            }),
            Attempt::new("SG_MAXL from detrended logL vs logT", || {
                detrended_hr_max(view, &inds).filter(|&i| i != ms_to)
            }),
        ];

        match first_success("SG_MAXL", attempts) {
            Some((index, note)) => {
                track.set_eep("SG_MAXL", index, note)?;
                Ok(Some(index))
            }
            None => {
                track.set_eep("SG_MAXL", 0, format!("no SG_MAXL between MS_TO and {until}"))?;
                Ok(None)
            }
        }
    }

    /// High-mass tracks: core composition marks the main sequence and the
    /// phases between turn-off and helium ignition are spaced evenly.
    fn add_high_mass_eeps(&self, track: &mut Track) -> Result<()> {
        let config = self.config;
        let ms_to = track
            .samples
            .iter()
            .position(|s| config.is_depleted(s.xcen))
            .ok_or_else(|| EepError::incomplete(track.mass, "XCEN never reaches 0"))?;
        track.set_eep("MS_TO", ms_to, "XCEN==0")?;

        if track.z < config.low_z_pms_end {
            self.fix_low_z_pms_end(track)?;
        }

        let pms_end = track.eep("PMS_END")?;
        if track.z <= config.tmin_first_max_z {
            self.add_high_mass_tmin(track, pms_end, ms_to, "PMS_END")?;
            self.add_high_mass_ms_beg(track, "PMS_END", "MS_TMIN")?;
        } else {
            let ms_beg = self.add_high_mass_ms_beg(track, "PMS_END", "MS_TO")?;
            self.add_high_mass_tmin(track, ms_beg, ms_to, "MS_BEG")?;
        }
        if track.eep("MS_TMIN")? == 0 {
            let ms_beg = track.eep("MS_BEG")?;
            let age =
                (track.value(Column::Age, ms_beg)? + track.value(Column::Age, ms_to)?) / 2.0;
            let index = track.closest_age_index(age)?;
            track.set_eep("MS_TMIN", index, "halfway in age between MS_BEG and MS_TO")?;
        }

        let fin = track.last_index()?;
        let mut cens = self.add_cen_eeps(track, ms_to)?;
        let tail = match cens[..] {
            [.., prev, last] => Some((prev, last)),
            _ => None,
        };
        if let Some((prev, last)) = tail.filter(|&(prev, _)| prev > 0) {
            let prev_depleted = track
                .value(Column::Ycen, prev)
                .is_ok_and(|y| config.is_depleted(y));
            if prev_depleted || last == fin {
                let patched = (prev + fin) / 2;
                if let Some(name) = config.ycen_targets.last().map(|t| format!("YCEN_{t:.3}")) {
                    track.set_eep(&name, patched, "Reset between YCEN=0.005 and final point")?;
                }
                if let Some(slot) = cens.last_mut() {
                    *slot = patched;
                }
            }
        }
        if cens.last().is_some_and(|&last| last >= fin) {
            return Err(EepError::NotFound {
                eep: "YCEN_0.000".to_string(),
                reason: format!("final point on track is cut before final ycen M={:.4}", track.mass),
            });
        }

        let first_cen = cens.first().copied().unwrap_or(0);
        let he_beg = self.add_quiescent_he_eep(track, ms_to, first_cen, "MS_TO")?;
        if he_beg <= ms_to {
            return Err(EepError::NotFound {
                eep: "HE_BEG".to_string(),
                reason: "no LY minimum between MS_TO and YCEN_0.550".to_string(),
            });
        }
        track.set_eep("TPAGB", fin, "Last track value")?;

        let spaced = linspace_indices(ms_to, he_beg, 7);
        let names = ["SG_MAXL", "RG_MINL", "RG_BMP1", "RG_BMP2", "RG_TIP"];
        for (name, &index) in names.iter().zip(&spaced[1..]) {
            track.set_eep(name, index, "linspace between MS_TO, HE_BEG")?;
        }
        self.add_agb_eeps(track)
    }

    fn fix_low_z_pms_end(&self, track: &mut Track) -> Result<()> {
        let inds = self
            .table
            .inds_between(track, "PMS_MIN", "NEAR_ZAM", IndexSource::Reference)?;
        let query = PeakQuery::max(Column::LogL)
            .policy(SelectionPolicy::Last)
            .parametric(false);
        if let Some(index) = peak_finder(track, &inds, &query, self.config) {
            track.set_eep(
                "PMS_END",
                index,
                "PMS_END fixed by max L between PMS_MIN and NEAR_ZAM",
            )?;
        }
        Ok(())
    }

    fn add_high_mass_ms_beg(&self, track: &mut Track, from: &str, until: &str) -> Result<usize> {
        let config = self.config;
        let view: &Track = track;
        let inds = self
            .table
            .inds_between(view, from, until, IndexSource::Defined)?;
        let query = PeakQuery::min(Column::LogL);
        let attempts = vec![
            Attempt::new(format!("Min logL between {from} and {until}"), || {
                peak_finder(view, &inds, &query, config)
            }),
            Attempt::new(
                format!("Min logL between {from} and {until} without parametric"),
                || peak_finder(view, &inds, &query.parametric(false), config),
            ),
        ];
        match first_success("MS_BEG", attempts) {
            Some((index, note)) => track.set_eep("MS_BEG", index, note)?,
            None => {
                track.notes.insert(
                    "MS_BEG".to_string(),
                    format!("reference MS_BEG, no logL min between {from} and {until}"),
                );
            }
        }
        track.eep("MS_BEG")
    }

    fn add_high_mass_tmin(
        &self,
        track: &mut Track,
        start: usize,
        end: usize,
        from: &str,
    ) -> Result<()> {
        let inds = span(start, end, track.len());
        let query = PeakQuery::min(Column::LogTe)
            .policy(SelectionPolicy::MinOfMin)
            .parametric(false);
        if let Some(index) = peak_finder(track, &inds, &query, self.config) {
            track.set_eep("MS_TMIN", index, format!("Min logT between {from} and MS_TO"))?;
        }
        Ok(())
    }

    fn add_hb_beg(&self, track: &mut Track) -> Result<()> {
        if let Some(&index) = track.sandro_indices.first().filter(|&&i| i > 0) {
            return track.set_eep("HE_BEG", index, "reference HE_BEG");
        }
        let min_age = self.config.pms_min_age;
        let index = track
            .samples
            .iter()
            .position(|s| s.age > min_age)
            .ok_or_else(|| EepError::incomplete(track.mass, "no sample to start HB from"))?;
        track.set_eep("HE_BEG", index, format!("first point with age > {min_age}"))
    }

    /// AGB_LY1 and AGB_LY2: where helium shell burning first overtakes
    /// hydrogen shell burning and where hydrogen wins back.
    fn add_agb_eeps(&self, track: &mut Track) -> Result<()> {
        let ycen_0 = track.eep("YCEN_0.000")?;
        if ycen_0 == 0 {
            track.set_eep("AGB_LY1", 0, "no YCEN_0.000")?;
            track.set_eep("AGB_LY2", 0, "no YCEN_0.000")?;
            return Ok(());
        }
        let fin = track.last_index()?;
        let tpagb = track.eep("TPAGB")?;
        let end = if tpagb > ycen_0 { tpagb } else { fin };
        let ((ly1, note1), (ly2, note2)) = self.find_agb_crossings(track, ycen_0, end, fin)?;
        track.set_eep("AGB_LY1", ly1, note1)?;
        track.set_eep("AGB_LY2", ly2, note2)
    }

    fn find_agb_crossings(
        &self,
        track: &Track,
        ycen_0: usize,
        end: usize,
        fin: usize,
    ) -> Result<((usize, String), (usize, String))> {
        let config = self.config;
        let spaced = linspace_indices(ycen_0, end, 4);
        let bound = if end == fin { "final track point" } else { "TPAGB" };
        let no_agb = || {
            let note = format!("no eagb linspace between YCEN_0.000 and {bound}");
            ((spaced[1], note.clone()), (spaced[2], note))
        };

        let final_age = track.value(Column::Age, fin)?;
        if !final_age.is_finite() || final_age <= 0.0 {
            return Ok(no_agb());
        }
        let norm_age = |index: usize| track.samples[index].age / final_age;

        let exhausted: Vec<usize> = (ycen_0..=end.min(fin))
            .filter(|&i| config.is_depleted(track.samples[i].ycen))
            .collect();
        let diff: Vec<f64> = exhausted
            .iter()
            .map(|&i| (track.samples[i].ly - track.samples[i].lx).abs())
            .collect();
        let mut minima = find_extrema(&diff).minima;
        minima.truncate(config.agb_max_minima);
        if minima.len() <= 2 {
            return Ok(no_agb());
        }

        // Two deepest minima, in track order.
        let deepest = |minima: &[usize]| -> Option<(usize, usize)> {
            let mut ranked = minima.to_vec();
            ranked.sort_by(|&a, &b| diff[a].total_cmp(&diff[b]));
            match ranked[..] {
                [a, b, ..] => {
                    let (a, b) = (exhausted[a], exhausted[b]);
                    Some((a.min(b), a.max(b)))
                }
                _ => None,
            }
        };
        let Some((mut ly1, mut ly2)) = deepest(&minima) else {
            return Ok(no_agb());
        };
        let mut suffix = "";
        let mut keep = 4usize;

        // Drop candidates that fall inside thermal pulses.
        if norm_age(exhausted[minima[0]]) < config.agb_tp_first_min_age
            && norm_age(ly1) > config.agb_tp_age
        {
            while norm_age(ly1) > config.agb_tp_age {
                minima.truncate(keep);
                let Some(pair) = deepest(&minima) else {
                    return Ok(no_agb());
                };
                (ly1, ly2) = pair;
                keep = keep.saturating_sub(1);
            }
            suffix = " adjusted to be outside of a TP";
        }
        if norm_age(ly2) > config.agb_tp_age_late {
            while norm_age(ly2) > config.agb_tp_age_late {
                minima.truncate(keep);
                let Some(pair) = deepest(&minima) else {
                    return Ok(no_agb());
                };
                (ly1, ly2) = pair;
                keep = keep.saturating_sub(1);
            }
            suffix = " adjusted to be outside of a TP";
        }

        Ok((
            (ly1, format!("first deepest min when ly == lx after YCEN_0.000{suffix}")),
            (ly2, format!("second deepest min when ly == lx after YCEN_0.000{suffix}")),
        ))
    }

    /// TP-AGB tracks: the markers are evenly spaced in age from the first
    /// thermal pulse step.
    fn add_tpagb_eeps(&self, track: &mut Track) -> Result<()> {
        let start = track
            .samples
            .iter()
            .position(|s| s.tp_step == Some(1))
            .ok_or_else(|| EepError::incomplete(track.mass, "no thermal pulse step 1"))?;
        let start_age = track.value(Column::Age, start)?;
        let ages: Vec<f64> = track.samples[start..]
            .iter()
            .map(|s| s.age - start_age)
            .collect();
        let total = ages.last().copied().unwrap_or(0.0);
        let points = self.config.tpagb_points.max(1);
        for k in 0..points {
            let target = if points == 1 {
                0.0
            } else {
                total * k as f64 / (points - 1) as f64
            };
            let offset = closest_match(target, &ages).map_or(0, |(j, _)| j);
            let (name, note) = if k == 0 {
                ("TPAGB".to_string(), "TPAGB start".to_string())
            } else {
                (format!("TPAGB{k}"), format!("TPAGB age {k}"))
            };
            track.set_eep(&name, start + offset, note)?;
        }
        Ok(())
    }
}

/// Index of the maximum of logL once the linear logL-logT trend is removed,
/// taking the hottest such maximum.
fn detrended_hr_max(track: &Track, inds: &[usize]) -> Option<usize> {
    let log_te = track.column_at(Column::LogTe, inds).ok()?;
    let log_l = track.column_at(Column::LogL, inds).ok()?;
    let keep = remove_dupes(&log_te, &log_l);
    let xs: Vec<f64> = keep.iter().map(|&k| log_te[k]).collect();
    let ys: Vec<f64> = keep.iter().map(|&k| log_l[k]).collect();
    let (slope, intercept) = linear_fit(&xs, &ys).ok()?;
    let residual: Vec<f64> = xs
        .iter()
        .zip(&ys)
        .map(|(&x, &y)| y - (slope * x + intercept))
        .collect();
    find_extrema(&residual)
        .maxima
        .into_iter()
        .max_by(|&a, &b| xs[a].total_cmp(&xs[b]))
        .map(|j| inds[keep[j]])
}

/// `n` evenly spaced indices from `start` to `end`, rounded.
fn linspace_indices(start: usize, end: usize, n: usize) -> Vec<usize> {
    if n < 2 {
        return vec![start; n];
    }
    let (a, b) = (start as f64, end as f64);
    (0..n)
        .map(|k| (a + (b - a) * k as f64 / (n - 1) as f64).round() as usize)
        .collect()
}

fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
