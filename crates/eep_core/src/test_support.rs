use crate::track::{Sample, Track};

pub(crate) fn blank_sample(i: usize) -> Sample {
    Sample {
        age: i as f64,
        log_l: 0.0,
        log_te: 3.7,
        xcen: 0.7,
        ycen: 0.28,
        ly: 0.0,
        lx: 1.0,
        model: i as i64 + 2,
        tp_step: None,
    }
}

/// A 1 Msun, Z=0.01 track of `n` samples, each adjusted by `shape`.
pub(crate) fn synthetic_track(n: usize, mut shape: impl FnMut(usize, &mut Sample)) -> Track {
    let samples = (0..n)
        .map(|i| {
            let mut sample = blank_sample(i);
            shape(i, &mut sample);
            sample
        })
        .collect();
    Track::new("synthetic", 1.0, 0.01, 0.26, samples)
}
