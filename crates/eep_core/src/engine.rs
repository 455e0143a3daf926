//! Entry points that attach reference points and define EEPs on tracks.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EepConfig;
use crate::critical_point::{CriticalPointTable, LogOnlyRepair, ReferenceRepair};
use crate::define::EepDefiner;
use crate::track::Track;

/// Outcome of [`EepEngine::process_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    /// `(track name, failure reason)` for every flagged track.
    pub flagged: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.processed - self.flagged.len()
    }
}

/// One metallicity's reference table together with the thresholds and the
/// repair hook used for every track of that grid.
pub struct EepEngine {
    table: CriticalPointTable,
    config: EepConfig,
    repair: Box<dyn ReferenceRepair>,
}

impl EepEngine {
    pub fn new(table: CriticalPointTable, config: EepConfig) -> Self {
        Self {
            table,
            config,
            repair: Box::new(LogOnlyRepair),
        }
    }

    pub fn with_repair_hook(mut self, hook: impl ReferenceRepair + 'static) -> Self {
        self.repair = Box::new(hook);
        self
    }

    pub fn table(&self) -> &CriticalPointTable {
        &self.table
    }

    pub fn config(&self) -> &EepConfig {
        &self.config
    }

    pub fn definer(&self) -> EepDefiner<'_> {
        EepDefiner::new(&self.table, &self.config)
    }

    /// Maps the reference points onto `track` and defines its EEPs. Any
    /// failure is left on the track as `failure_reason`.
    pub fn load_critical_points(&self, track: &mut Track) {
        if track.is_flagged() {
            return;
        }
        if let Err(err) = self.table.attach(track, self.repair.as_ref()) {
            warn!(track = %track.name, mass = track.mass, error = %err, "could not attach reference points");
            track.flag(err.to_string());
            return;
        }
        self.definer().define_eep_stages(track);
    }

    /// Defines EEPs from reference indices already on the track.
    pub fn define_eep_stages(&self, track: &mut Track) {
        self.definer().define_eep_stages(track);
    }

    /// Runs [`Self::load_critical_points`] on every track. Tracks are
    /// independent, so with the `parallel` feature they are processed on the
    /// rayon pool.
    pub fn process_batch(&self, tracks: &mut [Track]) -> BatchSummary {
        #[cfg(feature = "parallel")]
        tracks
            .par_iter_mut()
            .for_each(|track| self.load_critical_points(track));
        #[cfg(not(feature = "parallel"))]
        tracks
            .iter_mut()
            .for_each(|track| self.load_critical_points(track));

        let flagged: Vec<(String, String)> = tracks
            .iter()
            .filter_map(|track| {
                track
                    .failure_reason
                    .as_ref()
                    .map(|reason| (track.name.clone(), reason.clone()))
            })
            .collect();
        let summary = BatchSummary {
            processed: tracks.len(),
            flagged,
        };
        info!(
            z = self.table.z,
            processed = summary.processed,
            flagged = summary.flagged.len(),
            "eep batch done"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::test_support::synthetic_track;

    struct SharedCounter(Arc<AtomicUsize>);

    impl ReferenceRepair for SharedCounter {
        fn repair(&self, _mass_key: &str, _track_name: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn batch_reports_flagged_tracks() {
        let table = CriticalPointTable::new(0.01, 0.26).with_mass(1.0, vec![2, 80, 90, 95]);
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = EepEngine::new(table, EepConfig::default())
            .with_repair_hook(SharedCounter(Arc::clone(&calls)));

        let mut unknown_mass = synthetic_track(20, |_, _| {});
        unknown_mass.name = "unknown".to_string();
        unknown_mass.mass = 3.0;
        let mut mismatched = synthetic_track(20, |_, _| {});
        mismatched.name = "mismatched".to_string();

        let mut tracks = vec![unknown_mass, mismatched];
        let summary = engine.process_batch(&mut tracks);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.succeeded(), 0);
        assert_eq!(
            summary.flagged,
            vec![
                ("unknown".to_string(), "no ptcri mass".to_string()),
                (
                    "mismatched".to_string(),
                    "ptcri file does not match track, not enough MODEs".to_string()
                ),
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composition_mismatch_is_recorded_on_the_track() {
        let table = CriticalPointTable::new(0.02, 0.26).with_mass(1.0, vec![2]);
        let engine = EepEngine::new(table, EepConfig::default());
        let mut track = synthetic_track(20, |_, _| {});
        engine.load_critical_points(&mut track);
        assert!(track
            .failure_reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("Zs do not match")));
    }
}
