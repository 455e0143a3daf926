//! Cubic splines with analytic derivatives.
//!
//! [`ParametricSpline`] fits `x(u)` and `y(u)` jointly against the normalized
//! chord length `u`, so curves that double back in `x` (loops in the HR
//! diagram) can still be differentiated.

use anyhow::{bail, Result};
use nalgebra::DVector;

/// Interpolating cubic spline with natural end conditions.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivative at each knot.
    moments: Vec<f64>,
}

impl CubicSpline {
    pub fn natural(knots: &[f64], values: &[f64]) -> Result<Self> {
        let n = knots.len();
        if n != values.len() {
            bail!(
                "Spline knots ({}) and values ({}) differ in length.",
                n,
                values.len()
            );
        }
        if n < 2 {
            bail!("Spline needs at least two knots, got {}.", n);
        }
        if knots.iter().chain(values).any(|v| !v.is_finite()) {
            bail!("Spline input must be finite.");
        }
        if knots.windows(2).any(|w| w[1] <= w[0]) {
            bail!("Spline knots must be strictly increasing.");
        }

        let mut moments = vec![0.0; n];
        if n > 2 {
            let m = n - 2;
            let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();
            let mut sub = DVector::zeros(m);
            let mut diag = DVector::zeros(m);
            let mut sup = DVector::zeros(m);
            let mut rhs = DVector::zeros(m);
            for i in 0..m {
                let (h0, h1) = (h[i], h[i + 1]);
                sub[i] = h0;
                diag[i] = 2.0 * (h0 + h1);
                sup[i] = h1;
                rhs[i] = 6.0
                    * ((values[i + 2] - values[i + 1]) / h1 - (values[i + 1] - values[i]) / h0);
            }
            let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;
            moments[1..=m].copy_from_slice(interior.as_slice());
        }

        Ok(Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            moments,
        })
    }

    fn interval(&self, t: f64) -> usize {
        let last = self.knots.len() - 2;
        self.knots.partition_point(|&k| k <= t).saturating_sub(1).min(last)
    }

    /// Value (`order` 0) or derivative of order 1 or 2 at `t`.
    pub fn eval(&self, t: f64, order: usize) -> f64 {
        let i = self.interval(t);
        let (x0, x1) = (self.knots[i], self.knots[i + 1]);
        let (y0, y1) = (self.values[i], self.values[i + 1]);
        let (m0, m1) = (self.moments[i], self.moments[i + 1]);
        let h = x1 - x0;
        let a = x1 - t;
        let b = t - x0;
        let c0 = y0 / h - m0 * h / 6.0;
        let c1 = y1 / h - m1 * h / 6.0;
        match order {
            0 => m0 * a.powi(3) / (6.0 * h) + m1 * b.powi(3) / (6.0 * h) + c0 * a + c1 * b,
            1 => -m0 * a * a / (2.0 * h) + m1 * b * b / (2.0 * h) - c0 + c1,
            2 => (m0 * a + m1 * b) / h,
            _ => 0.0,
        }
    }
}

/// Thomas algorithm for a diagonally dominant tridiagonal system.
fn solve_tridiagonal(
    sub: &DVector<f64>,
    diag: &DVector<f64>,
    sup: &DVector<f64>,
    rhs: &DVector<f64>,
) -> Result<DVector<f64>> {
    let n = diag.len();
    let mut c = DVector::zeros(n);
    let mut d = DVector::zeros(n);
    let mut pivot = diag[0];
    if pivot.abs() <= f64::EPSILON {
        bail!("Singular tridiagonal system.");
    }
    c[0] = sup[0] / pivot;
    d[0] = rhs[0] / pivot;
    for i in 1..n {
        pivot = diag[i] - sub[i] * c[i - 1];
        if pivot.abs() <= f64::EPSILON {
            bail!("Singular tridiagonal system.");
        }
        c[i] = sup[i] / pivot;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / pivot;
    }
    let mut x = DVector::zeros(n);
    x[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    Ok(x)
}

/// A spline curve `(x(u), y(u))` with `u` the normalized chord length.
#[derive(Debug, Clone)]
pub struct ParametricSpline {
    x: CubicSpline,
    y: CubicSpline,
}

/// A parametric spline sampled on a regular grid in `u`.
#[derive(Debug, Clone, Default)]
pub struct SampledCurve {
    pub u: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub dx: Vec<f64>,
    pub dy: Vec<f64>,
    pub ddx: Vec<f64>,
    pub ddy: Vec<f64>,
}

impl SampledCurve {
    /// d²y/dx² along the curve; NaN where x(u) is stationary.
    pub fn d2y_dx2(&self) -> Vec<f64> {
        (0..self.u.len())
            .map(|i| {
                let dx = self.dx[i];
                if dx.abs() <= f64::EPSILON {
                    f64::NAN
                } else {
                    (dx * self.ddy[i] - self.dy[i] * self.ddx[i]) / dx.powi(3)
                }
            })
            .collect()
    }
}

impl ParametricSpline {
    /// Fits through every point; consecutive duplicate points must be removed
    /// by the caller.
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            bail!("Parametric spline needs equal length inputs.");
        }
        if x.len() < 2 {
            bail!("Parametric spline needs at least two points.");
        }
        let mut u = Vec::with_capacity(x.len());
        u.push(0.0);
        for i in 1..x.len() {
            let step = (x[i] - x[i - 1]).hypot(y[i] - y[i - 1]);
            if !step.is_finite() || step <= 0.0 {
                bail!("Duplicate or non-finite point at index {} in parametric spline.", i);
            }
            u.push(u[i - 1] + step);
        }
        let total = u[u.len() - 1];
        for value in &mut u {
            *value /= total;
        }
        Ok(Self {
            x: CubicSpline::natural(&u, x)?,
            y: CubicSpline::natural(&u, y)?,
        })
    }

    /// Samples `points` values of `u` evenly spaced on `[0, 1)`.
    pub fn sample(&self, points: usize) -> SampledCurve {
        let mut curve = SampledCurve::default();
        for k in 0..points {
            let u = k as f64 / points as f64;
            curve.u.push(u);
            curve.x.push(self.x.eval(u, 0));
            curve.y.push(self.y.eval(u, 0));
            curve.dx.push(self.x.eval(u, 1));
            curve.dy.push(self.y.eval(u, 1));
            curve.ddx.push(self.x.eval(u, 2));
            curve.ddy.push(self.y.eval(u, 2));
        }
        curve
    }
}

#[cfg(test)]
mod tests {
    use super::{CubicSpline, ParametricSpline};

    fn assert_err_contains<T: std::fmt::Debug>(result: anyhow::Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn natural_spline_interpolates_knots() {
        let knots = [0.0, 1.0, 2.5, 4.0, 5.0];
        let values = [1.0, -2.0, 0.5, 3.0, 2.0];
        let spline = CubicSpline::natural(&knots, &values).expect("spline");
        for (k, v) in knots.iter().zip(values.iter()) {
            assert!((spline.eval(*k, 0) - v).abs() < 1e-12);
        }
        assert!(spline.eval(0.0, 2).abs() < 1e-12);
        assert!(spline.eval(5.0, 2).abs() < 1e-12);
    }

    #[test]
    fn natural_spline_reproduces_lines_exactly() {
        let knots: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let values: Vec<f64> = knots.iter().map(|x| 2.0 * x - 1.0).collect();
        let spline = CubicSpline::natural(&knots, &values).expect("spline");
        assert!((spline.eval(2.3, 0) - 3.6).abs() < 1e-12);
        assert!((spline.eval(2.3, 1) - 2.0).abs() < 1e-12);
        assert!(spline.eval(2.3, 2).abs() < 1e-12);
    }

    #[test]
    fn spline_rejects_bad_knots() {
        assert_err_contains(CubicSpline::natural(&[0.0], &[1.0]), "at least two knots");
        assert_err_contains(
            CubicSpline::natural(&[0.0, 0.0, 1.0], &[1.0, 2.0, 3.0]),
            "strictly increasing",
        );
        assert_err_contains(
            ParametricSpline::fit(&[0.0, 0.0], &[1.0, 1.0]),
            "Duplicate",
        );
    }

    #[test]
    fn parabola_has_positive_curvature_in_the_interior() {
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.01 * (v - 15.0).powi(2)).collect();
        let spline = ParametricSpline::fit(&x, &y).expect("spline");
        let curve = spline.sample(100);
        let d2 = curve.d2y_dx2();
        for value in &d2[10..90] {
            assert!(*value > 0.0);
        }
    }
}
