#![allow(dead_code)]

use eep_core::{Sample, Track};

/// Routes engine logs to the test harness; set `RUST_LOG=eep_core=debug` to
/// see every EEP assignment.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sample(i: usize) -> Sample {
    Sample {
        age: 1.0e5 * (i + 1) as f64,
        log_l: 0.0,
        log_te: 3.7,
        xcen: 0.7,
        ycen: 0.28,
        ly: 0.0,
        lx: 1.0,
        model: 10 * i as i64 + 1,
        tp_step: None,
    }
}

pub fn track_with(
    n: usize,
    mass: f64,
    z: f64,
    mut shape: impl FnMut(usize, &mut Sample),
) -> Track {
    let samples = (0..n)
        .map(|i| {
            let mut s = sample(i);
            shape(i, &mut s);
            s
        })
        .collect();
    Track::new(format!("Z{z}_M{mass:.3}"), mass, z, 0.26, samples)
}

/// A 20 Msun track whose core hydrogen is exhausted at sample 13, with a
/// helium luminosity minimum at 40 and core helium exhausted at 150.
pub fn high_mass_track() -> Track {
    track_with(200, 20.0, 0.02, |i, s| {
        let x = i as f64;
        s.log_te = 4.5 + 0.001 * (x - 9.0).powi(2);
        s.log_l = 5.0 + 0.002 * (x - 6.0).powi(2);
        s.xcen = match i {
            0..=4 => 0.7,
            5..=13 => 0.7 * (13.0 - x) / 8.0,
            _ => 0.0,
        };
        s.ycen = match i {
            0..=39 => 0.98 - s.xcen,
            40..=150 => (150.0 - x) * 0.98 / 110.0,
            _ => 0.0,
        };
        s.ly = 0.05 + 1e-4 * (x - 40.0).powi(2);
    })
    .with_reference_indices(vec![0, 1, 3, 4, 5])
}

/// A 0.5 Msun track that never reaches the turn-off.
pub fn very_low_mass_track() -> Track {
    track_with(100, 0.5, 0.01, |i, s| {
        s.age = 1.0e8 * (i + 1) as f64;
        s.xcen = 0.7 - 0.001 * i as f64;
        s.log_l = -1.0 + 0.001 * i as f64;
    })
    .with_reference_indices(vec![0, 2, 4, 6, 8])
}

/// A 20 Msun track at Z = 0.001. Its log L peaks between PMS_MIN and
/// NEAR_ZAM at sample 5 and dips to the main sequence at 15; log Te bottoms
/// out at 25.
pub fn low_z_high_mass_track() -> Track {
    track_with(200, 20.0, 0.001, |i, s| {
        let x = i as f64;
        s.log_te = 4.5 + 0.001 * (x - 25.0).powi(2);
        s.log_l = if i < 5 {
            5.0 - 0.01 * (x - 5.0).powi(2)
        } else {
            4.8 + 0.002 * (x - 15.0).powi(2)
        };
        s.xcen = match i {
            0..=20 => 0.7,
            21..=40 => 0.7 * (40.0 - x) / 20.0,
            _ => 0.0,
        };
        s.ycen = match i {
            0..=60 => 0.98 - s.xcen,
            61..=170 => (170.0 - x) * 0.98 / 110.0,
            _ => 0.0,
        };
        s.ly = 0.05 + 1e-4 * (x - 60.0).powi(2);
    })
    .with_reference_indices(vec![0, 1, 3, 8, 10])
}

/// A 2.5 Msun track with reference points through RG_TIP. Past the log Te
/// minimum at 50 the luminosity barely changes, so the turn-off has to come
/// from core hydrogen exhaustion at 100 and the red giant minimum from the
/// reference RG_BASE at 150.
pub fn intermediate_mass_track() -> Track {
    track_with(300, 2.5, 0.01, |i, s| {
        let x = i as f64;
        s.log_te = if i <= 80 {
            4.0 + 1e-4 * (x - 50.0).powi(2)
        } else {
            4.09 - 1e-3 * (x - 80.0)
        };
        s.log_l = match i {
            0..=19 => 1.0,
            20..=50 => 1.0 + 0.01 * (x - 20.0),
            _ => 1.3 + 5e-7 * (x - 50.0).powi(2),
        };
        s.xcen = match i {
            0..=60 => 0.7,
            61..=100 => 0.7 * (100.0 - x) / 40.0,
            _ => 0.0,
        };
        s.ycen = match i {
            0..=200 => 0.98 - s.xcen,
            201..=260 => (260.0 - x) * 0.98 / 60.0,
            _ => 0.0,
        };
        s.ly = 0.05 + 1e-4 * (x - 200.0).powi(2);
    })
    .with_reference_indices(vec![0, 5, 10, 15, 20, 40, 80, 150, 160, 170, 180])
}

/// A horizontal branch track starting at the reference HE_BEG (sample 5).
/// Core helium is gone at 110, and |LY - LX| dips at 114, 124, 136 and 144.
/// Ages are compressed after 130, so the two deepest dips fall inside the
/// thermal pulses.
pub fn horizontal_branch_track() -> Track {
    let dips = [(114.0, 0.1), (124.0, 0.2), (136.0, 0.0), (144.0, 0.01)];
    track_with(150, 1.0, 0.01, |i, s| {
        let x = i as f64;
        s.age = if i <= 130 {
            1.0e5 * (x + 1.0)
        } else {
            1.0e5 * (131.0 + 0.1 * (x - 130.0))
        };
        s.ycen = match i {
            0..=10 => 0.98,
            11..=110 => (110.0 - x) * 0.98 / 100.0,
            _ => 0.0,
        };
        s.lx = 0.5;
        s.ly = 1.5;
        for &(at, depth) in &dips {
            let d: f64 = (x - at).abs();
            if d < 4.0 {
                s.ly = s.ly.min(0.5 + depth + 0.05 * d);
            }
        }
    })
    .as_horizontal_branch()
    .with_reference_indices(vec![5])
}
