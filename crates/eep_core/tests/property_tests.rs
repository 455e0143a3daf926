//! Invariants of EEP definition over arbitrary tracks.

use eep_core::monotonic::monotonic_violations;
use eep_core::{CriticalPointTable, EepConfig, EepEngine, Sample, Track};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;

type Row = (f64, f64, f64, f64, f64, f64);

fn build_track(mass: f64, rows: &[Row], references: Vec<usize>) -> Track {
    let samples: Vec<Sample> = rows
        .iter()
        .enumerate()
        .map(|(i, &(log_l, log_te, xcen, ycen, ly, lx))| Sample {
            age: 1.0e6 * (i + 1) as f64,
            log_l,
            log_te,
            xcen,
            ycen,
            ly,
            lx,
            model: i as i64 + 1,
            tp_step: None,
        })
        .collect();
    Track::new("arbitrary", mass, 0.01, 0.26, samples).with_reference_indices(references)
}

fn arbitrary_track() -> impl Strategy<Value = Track> {
    let row = (
        -2.0f64..6.0,
        3.4f64..4.8,
        0.0f64..0.75,
        0.0f64..1.0,
        0.0f64..1.0,
        0.0f64..1.0,
    );
    let mass = prop_oneof![Just(0.5), Just(1.0), Just(2.5), Just(8.0), Just(20.0)];
    (mass, vec(row, 20..120)).prop_flat_map(|(mass, rows)| {
        let n = rows.len();
        btree_set(0..n, 0..=15)
            .prop_map(move |refs| build_track(mass, &rows, refs.into_iter().collect()))
    })
}

fn engine() -> EepEngine {
    EepEngine::new(CriticalPointTable::new(0.01, 0.26), EepConfig::default())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every track ends either flagged or with strictly increasing EEPs.
    #[test]
    fn defined_eeps_increase_unless_flagged(mut track in arbitrary_track()) {
        engine().define_eep_stages(&mut track);
        prop_assert!(track.is_flagged() || monotonic_violations(&track).is_empty());
    }

    /// EEP indices always address a sample of the track.
    #[test]
    fn eep_indices_stay_in_range(mut track in arbitrary_track()) {
        engine().define_eep_stages(&mut track);
        let len = track.len();
        prop_assert!(track.eep_indices.iter().all(|&i| i < len));
        prop_assert_eq!(track.eep_indices.len(), track.catalogue().len());
    }

    /// Defining a second time changes nothing.
    #[test]
    fn definition_is_idempotent(mut track in arbitrary_track()) {
        let engine = engine();
        engine.define_eep_stages(&mut track);
        let first = (
            track.eep_indices.clone(),
            track.notes.clone(),
            track.failure_reason.clone(),
        );
        engine.define_eep_stages(&mut track);
        prop_assert_eq!(
            (track.eep_indices.clone(), track.notes.clone(), track.failure_reason.clone()),
            first
        );
    }
}
