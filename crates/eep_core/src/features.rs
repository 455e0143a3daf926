//! Curve feature primitives: nearest-value matching, discrete extrema, and
//! spline-based peak and inflection searches over a slice of a track.

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use num_traits::Float;
use tracing::debug;

use crate::config::EepConfig;
use crate::spline::ParametricSpline;
use crate::track::{Column, Track};

/// Index of the value nearest `target` and its absolute difference. Ties go
/// to the first occurrence; NaNs are skipped.
pub fn closest_match<T: Float>(target: T, values: &[T]) -> Option<(usize, T)> {
    let mut best: Option<(usize, T)> = None;
    for (i, &value) in values.iter().enumerate() {
        let diff = (value - target).abs();
        if diff.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if current <= diff => {}
            _ => best = Some((i, diff)),
        }
    }
    best
}

/// Index of the point nearest `(x, y)` in the plane and its distance.
pub fn closest_match_2d(x: f64, y: f64, xs: &[f64], ys: &[f64]) -> Option<(usize, f64)> {
    let distances: Vec<f64> = xs
        .iter()
        .zip(ys.iter())
        .map(|(&xi, &yi)| (xi - x).hypot(yi - y))
        .collect();
    closest_match(0.0, &distances)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extrema {
    pub maxima: Vec<usize>,
    pub minima: Vec<usize>,
}

impl Extrema {
    pub fn maxima_count(&self) -> usize {
        self.maxima.len()
    }

    pub fn minima_count(&self) -> usize {
        self.minima.len()
    }

    pub fn of_kind(&self, get_max: bool) -> &[usize] {
        if get_max {
            &self.maxima
        } else {
            &self.minima
        }
    }
}

/// Local extrema from sign changes of the first difference.
///
/// Flat runs are skipped, so a plateau at the top of a rise counts as one
/// maximum located at its first sample. The end points are never extrema.
pub fn find_extrema<T: Float>(signal: &[T]) -> Extrema {
    let mut extrema = Extrema::default();
    let mut prev_sign = 0i8;
    let mut turn = 0usize;
    for i in 1..signal.len() {
        let step = signal[i] - signal[i - 1];
        let sign = if step > T::zero() {
            1
        } else if step < T::zero() {
            -1
        } else {
            0
        };
        if sign == 0 {
            continue;
        }
        if prev_sign > 0 && sign < 0 {
            extrema.maxima.push(turn);
        } else if prev_sign < 0 && sign > 0 {
            extrema.minima.push(turn);
        }
        prev_sign = sign;
        turn = i;
    }
    extrema
}

/// Indices that survive dropping consecutive repeated `(x, y)` points.
pub fn remove_dupes(x: &[f64], y: &[f64]) -> Vec<usize> {
    let mut keep: Vec<usize> = Vec::with_capacity(x.len());
    for i in 0..x.len().min(y.len()) {
        match keep.last() {
            Some(&j) if x[j] == x[i] && y[j] == y[i] => {}
            _ => keep.push(i),
        }
    }
    keep
}

/// Least-squares line `y = slope * x + intercept`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    if x.len() != y.len() {
        bail!("Linear fit needs equal length inputs.");
    }
    if x.len() < 2 {
        bail!("Linear fit needs at least two points.");
    }
    let design = DMatrix::from_fn(x.len(), 2, |r, c| if c == 0 { x[r] } else { 1.0 });
    let rhs = DVector::from_column_slice(y);
    let coeffs = design
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(|err| anyhow!("Linear fit failed: {err}"))?;
    if coeffs.iter().any(|c| !c.is_finite()) {
        bail!("Linear fit produced non-finite coefficients.");
    }
    Ok((coeffs[0], coeffs[1]))
}

/// How one candidate is picked when a search finds several extrema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    First,
    Last,
    MaxOfMax,
    MinOfMin,
}

impl SelectionPolicy {
    pub fn label(self) -> &'static str {
        match self {
            SelectionPolicy::First => "first",
            SelectionPolicy::Last => "last",
            SelectionPolicy::MaxOfMax => "max of max",
            SelectionPolicy::MinOfMin => "min of min",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakQuery {
    pub column: Column,
    pub get_max: bool,
    pub policy: SelectionPolicy,
    /// Search a parametric spline through (log Te, log L) instead of the raw samples.
    pub parametric: bool,
    /// Subtract a least-squares line before searching.
    pub less_linear_fit: bool,
}

impl PeakQuery {
    pub fn max(column: Column) -> Self {
        Self {
            column,
            get_max: true,
            policy: SelectionPolicy::MaxOfMax,
            parametric: true,
            less_linear_fit: false,
        }
    }

    pub fn min(column: Column) -> Self {
        Self {
            column,
            get_max: false,
            policy: SelectionPolicy::MinOfMin,
            parametric: true,
            less_linear_fit: false,
        }
    }

    pub fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn parametric(mut self, parametric: bool) -> Self {
        self.parametric = parametric;
        self
    }

    pub fn less_linear_fit(mut self, less_linear_fit: bool) -> Self {
        self.less_linear_fit = less_linear_fit;
        self
    }
}

/// Locates an extremum of `query.column` over the track samples `inds`.
///
/// Returns `None` when the range is too short or no candidate extremum
/// exists; callers fall back to another strategy.
pub fn peak_finder(
    track: &Track,
    inds: &[usize],
    query: &PeakQuery,
    config: &EepConfig,
) -> Option<usize> {
    if inds.len() < config.peak_min_points.max(2) {
        debug!(
            mass = track.mass,
            points = inds.len(),
            "peak finder skipped, not enough points"
        );
        return None;
    }
    let parametric = query.parametric && matches!(query.column, Column::LogL | Column::LogTe);
    let result = if parametric {
        parametric_peak(track, inds, query, config)
    } else {
        sampled_peak(track, inds, query)
    };
    match result {
        Ok(found) => found,
        Err(err) => {
            debug!(mass = track.mass, error = %err, "peak finder failed");
            None
        }
    }
}

fn sampled_peak(track: &Track, inds: &[usize], query: &PeakQuery) -> Result<Option<usize>> {
    let mut signal = track.column_at(query.column, inds)?;
    if query.less_linear_fit {
        let abscissa: Vec<f64> = inds.iter().map(|&i| i as f64).collect();
        detrend(&abscissa, &mut signal)?;
    }
    Ok(select(&signal, query).map(|k| inds[k]))
}

fn parametric_peak(
    track: &Track,
    inds: &[usize],
    query: &PeakQuery,
    config: &EepConfig,
) -> Result<Option<usize>> {
    let log_te = track.column_at(Column::LogTe, inds)?;
    let log_l = track.column_at(Column::LogL, inds)?;
    let keep = remove_dupes(&log_te, &log_l);
    if keep.len() < config.peak_min_points.max(2) {
        return Ok(None);
    }
    let xs: Vec<f64> = keep.iter().map(|&k| log_te[k]).collect();
    let ys: Vec<f64> = keep.iter().map(|&k| log_l[k]).collect();
    let spline = ParametricSpline::fit(&xs, &ys)?;
    let curve = spline.sample(config.spline_grid.max(10 * keep.len()));

    let mut signal = match query.column {
        Column::LogTe => curve.x.clone(),
        _ => curve.y.clone(),
    };
    if is_flat(&signal) {
        return Ok(None);
    }
    if query.less_linear_fit {
        detrend(&curve.u, &mut signal)?;
    }
    let Some(k) = select(&signal, query) else {
        return Ok(None);
    };
    Ok(closest_match_2d(curve.x[k], curve.y[k], &xs, &ys).map(|(j, _)| inds[keep[j]]))
}

fn detrend(abscissa: &[f64], signal: &mut [f64]) -> Result<()> {
    let (slope, intercept) = linear_fit(abscissa, signal)?;
    for (value, &x) in signal.iter_mut().zip(abscissa) {
        *value -= slope * x + intercept;
    }
    Ok(())
}

fn is_flat(signal: &[f64]) -> bool {
    let (lo, hi) = signal
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    hi - lo <= 1e-12 * (1.0 + hi.abs())
}

fn select(signal: &[f64], query: &PeakQuery) -> Option<usize> {
    let extrema = find_extrema(signal);
    let candidates = extrema.of_kind(query.get_max);
    let by_value = |a: &&usize, b: &&usize| signal[**a].total_cmp(&signal[**b]);
    match query.policy {
        SelectionPolicy::First => candidates.first().copied(),
        SelectionPolicy::Last => candidates.last().copied(),
        SelectionPolicy::MaxOfMax => candidates.iter().max_by(by_value).copied(),
        SelectionPolicy::MinOfMin => candidates.iter().min_by(by_value).copied(),
    }
}

/// Domain index nearest the first sign change of d²x/d(index)² of the
/// requested polarity, from a parametric spline through `(domain, signal)`.
///
/// Used where a feature is too shallow to show up as a discrete extremum.
pub fn second_derivative_root(
    signal: &[f64],
    domain: &[usize],
    positive_to_negative: bool,
    grid: usize,
) -> Option<usize> {
    if signal.len() != domain.len() || signal.len() < 3 {
        return None;
    }
    let abscissa: Vec<f64> = domain.iter().map(|&i| i as f64).collect();
    let spline = match ParametricSpline::fit(&abscissa, signal) {
        Ok(spline) => spline,
        Err(err) => {
            debug!(error = %err, "second derivative spline failed");
            return None;
        }
    };
    let curve = spline.sample(grid.max(3));
    let d2 = curve.d2y_dx2();

    // Curvature below this is rounding noise from the spline solve.
    let x_span = abscissa[abscissa.len() - 1] - abscissa[0];
    let y_span = signal.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
        - signal.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let floor = 1e-9 * y_span.max(f64::MIN_POSITIVE) / (x_span * x_span);

    let mut last_sign = 0i8;
    let mut crossing = None;
    for (k, &value) in d2.iter().enumerate() {
        if !value.is_finite() || value.abs() <= floor {
            continue;
        }
        let sign = if value > 0.0 { 1 } else { -1 };
        let flipped = if positive_to_negative {
            last_sign > 0 && sign < 0
        } else {
            last_sign < 0 && sign > 0
        };
        if flipped {
            crossing = Some(k);
            break;
        }
        last_sign = sign;
    }
    let crossing = crossing?;
    closest_match_2d(curve.x[crossing], curve.y[crossing], &abscissa, signal)
        .map(|(j, _)| domain[j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::synthetic_track;

    #[test]
    fn closest_match_prefers_first_on_ties() {
        let values = [0.5, 0.3, 0.1, 0.3];
        assert_eq!(closest_match(0.3, &values).map(|m| m.0), Some(1));
        let (index, diff) = closest_match(0.2, &[0.5, 0.25, 0.15]).expect("non-empty");
        assert_eq!(index, 1);
        assert!((diff - 0.05).abs() < 1e-12);
        assert!(closest_match(1.0, &[] as &[f64]).is_none());
    }

    #[test]
    fn closest_match_skips_nan() {
        assert_eq!(closest_match(1.0, &[f64::NAN, 3.0, 0.8]).map(|m| m.0), Some(2));
    }

    #[test]
    fn find_extrema_reports_interior_turns() {
        let signal = [0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 3.0, 2.0];
        let extrema = find_extrema(&signal);
        assert_eq!(extrema.maxima, vec![2, 6]);
        assert_eq!(extrema.minima, vec![4]);
        assert_eq!(extrema.maxima_count(), 2);
        assert_eq!(extrema.minima_count(), 1);
    }

    #[test]
    fn find_extrema_uses_first_sample_of_plateau() {
        let signal = [0.0, 1.0, 1.0, 1.0, 0.0];
        assert_eq!(find_extrema(&signal).maxima, vec![1]);
        assert!(find_extrema(&[2.0, 2.0, 2.0]).maxima.is_empty());
        assert!(find_extrema(&[1.0, 2.0, 3.0]).minima.is_empty());
    }

    #[test]
    fn remove_dupes_keeps_first_of_each_run() {
        let x = [1.0, 1.0, 2.0, 2.0, 1.0];
        let y = [0.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(remove_dupes(&x, &y), vec![0, 2, 3, 4]);
    }

    #[test]
    fn linear_fit_recovers_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = linear_fit(&x, &y).expect("fit");
        assert!((slope - 2.0).abs() < 1e-10);
        assert!((intercept - 1.0).abs() < 1e-10);
        assert!(linear_fit(&[1.0], &[2.0]).is_err());
    }

    #[test]
    fn peak_finder_returns_single_minimum() {
        let track = synthetic_track(100, |i, s| {
            s.log_te = 4.0 + 1e-3 * (i as f64 - 42.0).powi(2);
            s.log_l = 1.0 + 0.01 * i as f64;
        });
        let inds: Vec<usize> = (10..=80).collect();
        let config = EepConfig::default();
        let query = PeakQuery::min(Column::LogTe).parametric(false);
        assert_eq!(peak_finder(&track, &inds, &query, &config), Some(42));
        let query = PeakQuery::min(Column::LogTe);
        assert_eq!(peak_finder(&track, &inds, &query, &config), Some(42));
    }

    #[test]
    fn peak_finder_is_none_on_flat_signal() {
        let track = synthetic_track(60, |i, s| {
            s.log_te = 3.9;
            s.log_l = 1.0 + 0.01 * i as f64;
        });
        let inds: Vec<usize> = (5..=50).collect();
        let config = EepConfig::default();
        for parametric in [false, true] {
            let query = PeakQuery::min(Column::LogTe).parametric(parametric);
            assert_eq!(peak_finder(&track, &inds, &query, &config), None);
        }
    }

    #[test]
    fn peak_finder_skips_short_ranges() {
        let track = synthetic_track(10, |i, s| s.log_l = (i as f64 - 1.0).abs());
        let config = EepConfig::default();
        let query = PeakQuery::min(Column::LogL).parametric(false);
        assert_eq!(peak_finder(&track, &[0, 1], &query, &config), None);
    }

    #[test]
    fn less_linear_fit_exposes_bump_under_drift() {
        // A rising signal whose bump never turns over until the trend is removed.
        let track = synthetic_track(80, |i, s| {
            let x = i as f64;
            s.log_l = 0.05 * x + 0.25 * (-(x - 40.0).powi(2) / 30.0).exp();
        });
        let inds: Vec<usize> = (0..80).collect();
        let config = EepConfig::default();
        let plain = PeakQuery::max(Column::LogL).parametric(false);
        assert_eq!(peak_finder(&track, &inds, &plain, &config), None);
        let detrended = plain.less_linear_fit(true);
        let found = peak_finder(&track, &inds, &detrended, &config).expect("bump");
        assert!((38..=42).contains(&found), "found {found}");
    }

    #[test]
    fn selection_policy_picks_between_candidates() {
        let track = synthetic_track(50, |i, s| {
            let x = i as f64;
            s.log_l = (x / 4.0).sin() * (1.0 + x / 50.0);
        });
        let inds: Vec<usize> = (0..50).collect();
        let config = EepConfig::default();
        let base = PeakQuery::max(Column::LogL).parametric(false);
        let first = peak_finder(&track, &inds, &base.policy(SelectionPolicy::First), &config);
        let last = peak_finder(&track, &inds, &base.policy(SelectionPolicy::Last), &config);
        let best = peak_finder(&track, &inds, &base, &config);
        assert_eq!(first, Some(7));
        assert_eq!(last, Some(32));
        assert_eq!(best, last);
    }

    #[test]
    fn second_derivative_root_finds_inflection() {
        let domain: Vec<usize> = (100..200).collect();
        let signal: Vec<f64> = domain
            .iter()
            .map(|&i| -1e-6 * (i as f64 - 150.0).powi(3))
            .collect();
        let root = second_derivative_root(&signal, &domain, true, 100).expect("inflection");
        assert!((146..=154).contains(&root), "root {root}");
        assert_eq!(second_derivative_root(&signal, &domain, false, 100), None);
    }

    #[test]
    fn second_derivative_root_none_without_curvature() {
        let domain: Vec<usize> = (0..40).collect();
        let signal: Vec<f64> = domain.iter().map(|&i| 0.5 * i as f64).collect();
        assert_eq!(second_derivative_root(&signal, &domain, true, 100), None);
        assert_eq!(second_derivative_root(&signal[..2], &domain[..2], true, 100), None);
    }
}
