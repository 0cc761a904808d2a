use levenberg_marquardt::{
    LeastSquaresProblem,
    LevenbergMarquardt,
    TerminationReason,
};
use nalgebra::{
    DMatrix,
    DVector,
    Dyn,
    Owned,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::f64::consts::LN_2;
use tracing::debug;

use crate::errors::{
    Result,
    SignalError,
    check_same_length,
};

/// `2 * sqrt(2 ln 2)`, the FWHM of a unit-sigma Gaussian.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// One Gaussian component, parameterised by its full width at half maximum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GaussPeak {
    pub height: f64,
    pub center: f64,
    pub fwhm: f64,
}

impl GaussPeak {
    pub fn new(height: f64, center: f64, fwhm: f64) -> Self {
        Self {
            height,
            center,
            fwhm,
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        gaussian(x, self.height, self.center, self.fwhm)
    }

    pub fn curve(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|x| self.eval(*x)).collect()
    }

    pub fn area(&self) -> f64 {
        self.height * self.fwhm / FWHM_PER_SIGMA * (2.0 * std::f64::consts::PI).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.height.is_finite() && self.center.is_finite() && self.fwhm.is_finite()
    }
}

/// `h * exp(-4 ln 2 (x - c)^2 / w^2)`
///
/// # Example
///
/// ```
/// use dfsignal::gaussian::gaussian;
///
/// assert_eq!(gaussian(600.0, 2.0, 600.0, 40.0), 2.0);
/// assert!((gaussian(620.0, 2.0, 600.0, 40.0) - 1.0).abs() < 1e-12);
/// ```
pub fn gaussian(x: f64, height: f64, center: f64, fwhm: f64) -> f64 {
    height * (-4.0 * LN_2 * (x - center).powi(2) / (fwhm * fwhm)).exp()
}

pub fn sum_of_gaussians(xs: &[f64], peaks: &[GaussPeak]) -> Vec<f64> {
    xs.iter()
        .map(|x| peaks.iter().map(|p| p.eval(*x)).sum())
        .collect()
}

/// Least-squares fit of a single Gaussian to a distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GaussianFit {
    pub height: f64,
    pub center: f64,
    pub center_stderr: Option<f64>,
    pub fwhm: f64,
    pub sigma: f64,
    pub curve: Vec<f64>,
}

/// Sum of Gaussians against `(xs, ys)`.
///
/// Heights and widths are fitted as logarithms so they stay positive. Each
/// center is mapped through a logistic onto its window.
struct GaussianSumProblem<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    windows: Vec<(f64, f64)>,
    params: DVector<f64>,
}

fn logistic(t: f64) -> f64 {
    1.0 / (1.0 + (-t).exp())
}

impl<'a> GaussianSumProblem<'a> {
    fn new(xs: &'a [f64], ys: &'a [f64], initial: &[GaussPeak], windows: Vec<(f64, f64)>) -> Self {
        let mut params = DVector::zeros(initial.len() * 3);
        for (i, (peak, (lo, hi))) in initial.iter().zip(windows.iter()).enumerate() {
            let frac = if hi > lo {
                ((peak.center - lo) / (hi - lo)).clamp(1e-6, 1.0 - 1e-6)
            } else {
                0.5
            };
            params[3 * i] = peak.height.max(1e-12).ln();
            params[3 * i + 1] = (frac / (1.0 - frac)).ln();
            params[3 * i + 2] = peak.fwhm.abs().max(1e-12).ln();
        }
        Self {
            xs,
            ys,
            windows,
            params,
        }
    }

    fn decode(&self) -> Vec<GaussPeak> {
        self.windows
            .iter()
            .enumerate()
            .map(|(i, (lo, hi))| {
                GaussPeak::new(
                    self.params[3 * i].exp(),
                    lo + (hi - lo) * logistic(self.params[3 * i + 1]),
                    self.params[3 * i + 2].exp(),
                )
            })
            .collect()
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for GaussianSumProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let peaks = self.decode();
        Some(DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(self.ys.iter())
                .map(|(x, y)| peaks.iter().map(|p| p.eval(*x)).sum::<f64>() - y),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let peaks = self.decode();
        let mut jac = natural_jacobian(self.xs, &peaks);
        for (i, (lo, hi)) in self.windows.iter().enumerate() {
            let s = logistic(self.params[3 * i + 1]);
            let dc = (hi - lo) * s * (1.0 - s);
            let (h, w) = (peaks[i].height, peaks[i].fwhm);
            for row in 0..self.xs.len() {
                jac[(row, 3 * i)] *= h;
                jac[(row, 3 * i + 1)] *= dc;
                jac[(row, 3 * i + 2)] *= w;
            }
        }
        Some(jac)
    }
}

/// Jacobian of the Gaussian sum with respect to `(height, center, fwhm)`.
fn natural_jacobian(xs: &[f64], peaks: &[GaussPeak]) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(xs.len(), peaks.len() * 3);
    for (row, x) in xs.iter().enumerate() {
        for (i, p) in peaks.iter().enumerate() {
            let w2 = p.fwhm * p.fwhm;
            let d = x - p.center;
            let e = (-4.0 * LN_2 * d * d / w2).exp();
            let g = p.height * e;
            jac[(row, 3 * i)] = e;
            jac[(row, 3 * i + 1)] = g * 8.0 * LN_2 * d / w2;
            jac[(row, 3 * i + 2)] = g * 8.0 * LN_2 * d * d / (w2 * p.fwhm);
        }
    }
    jac
}

/// Runs the solver and returns the refined peaks with the residual sum of squares.
fn solve_gaussian_sum(
    xs: &[f64],
    ys: &[f64],
    initial: &[GaussPeak],
    windows: Vec<(f64, f64)>,
    context: &str,
) -> Result<(Vec<GaussPeak>, f64)> {
    let problem = GaussianSumProblem::new(xs, ys, initial, windows);
    let (problem, report) = LevenbergMarquardt::new().minimize(problem);
    let accepted = report.termination.was_successful()
        || matches!(report.termination, TerminationReason::LostPatience);
    let peaks = problem.decode();
    if !accepted || !peaks.iter().all(GaussPeak::is_finite) {
        return Err(SignalError::NoConvergence {
            iterations: report.number_of_evaluations,
            context: format!("{}: {:?}", context, report.termination),
        });
    }
    debug!(
        "{} finished after {} evaluations ({:?})",
        context, report.number_of_evaluations, report.termination
    );
    Ok((peaks, 2.0 * report.objective_function))
}

/// Fits one Gaussian to `(xs, ys)`, starting from the weighted moments.
///
/// Errors when the distribution is empty or has fewer than three bins.
pub fn fit_gaussian(xs: &[f64], ys: &[f64]) -> Result<GaussianFit> {
    check_same_length(xs, ys, "fit_gaussian")?;
    let total: f64 = ys.iter().sum();
    if xs.len() < 3 || !(total > 0.0) {
        return Err(SignalError::InsufficientData {
            real: xs.len(),
            expected: 3,
            context: "fit_gaussian needs a populated distribution".to_string(),
        });
    }

    let mean = xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum::<f64>() / total;
    let var = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| y * (x - mean).powi(2))
        .sum::<f64>()
        / total;
    let step = (xs[xs.len() - 1] - xs[0]).abs() / (xs.len() - 1) as f64;
    let sigma0 = var.sqrt().max(step / 2.0);
    let height0 = ys.iter().copied().fold(f64::MIN, f64::max);
    let span = (xs[0].min(xs[xs.len() - 1]), xs[0].max(xs[xs.len() - 1]));

    let initial = [GaussPeak::new(height0, mean, sigma0 * FWHM_PER_SIGMA)];
    let (peaks, rss) = solve_gaussian_sum(xs, ys, &initial, vec![span], "fit_gaussian")?;
    let peak = peaks[0];

    let jac = natural_jacobian(xs, &peaks);
    let s2 = rss / (xs.len() as f64 - 3.0).max(1.0);
    let center_stderr = (jac.transpose() * &jac)
        .try_inverse()
        .map(|cov| (cov[(1, 1)] * s2).abs().sqrt())
        .filter(|v| v.is_finite());

    Ok(GaussianFit {
        height: peak.height,
        center: peak.center,
        center_stderr,
        fwhm: peak.fwhm,
        sigma: peak.fwhm / FWHM_PER_SIGMA,
        curve: peak.curve(xs),
    })
}

/// Joint least-squares refinement of several Gaussians.
///
/// Each center is kept between the midpoints to its neighbours' initial
/// centers; heights and widths stay positive.
pub fn fit_gaussians(xs: &[f64], ys: &[f64], initial: &[GaussPeak]) -> Result<Vec<GaussPeak>> {
    check_same_length(xs, ys, "fit_gaussians")?;
    if initial.is_empty() {
        return Err(SignalError::empty("fit_gaussians: no initial peaks"));
    }
    if xs.len() < initial.len() * 3 {
        return Err(SignalError::InsufficientData {
            real: xs.len(),
            expected: initial.len() * 3,
            context: "fit_gaussians: fewer samples than parameters".to_string(),
        });
    }
    let mut sorted = initial.to_vec();
    sorted.sort_by(|a, b| a.center.total_cmp(&b.center));

    let x_lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let x_hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let windows = (0..sorted.len())
        .map(|i| {
            let lower = if i == 0 {
                x_lo
            } else {
                (sorted[i - 1].center + sorted[i].center) / 2.0
            };
            let upper = if i + 1 == sorted.len() {
                x_hi
            } else {
                (sorted[i + 1].center + sorted[i].center) / 2.0
            };
            (lower, upper)
        })
        .collect();

    let (peaks, _) = solve_gaussian_sum(xs, ys, &sorted, windows, "fit_gaussians")?;
    Ok(peaks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_maximum_at_half_width() {
        let p = GaussPeak::new(3.0, 700.0, 50.0);
        assert!((p.eval(725.0) - 1.5).abs() < 1e-12);
        assert!((p.eval(675.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_area() {
        let p = GaussPeak::new(1.0, 0.0, FWHM_PER_SIGMA);
        assert!((p.area() - (2.0 * std::f64::consts::PI).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_fit_gaussian_recovers_parameters() {
        let xs: Vec<f64> = (0..80).map(|i| 450.0 + 6.7125 * (i as f64 + 0.5)).collect();
        let truth = GaussPeak::new(12.0, 720.0, 90.0);
        let ys = truth.curve(&xs);
        let fit = fit_gaussian(&xs, &ys).unwrap();
        assert!((fit.center - 720.0).abs() < 1e-4);
        assert!((fit.fwhm - 90.0).abs() < 1e-3);
        assert!((fit.sigma - 90.0 / FWHM_PER_SIGMA).abs() < 1e-3);
        assert_eq!(fit.curve.len(), xs.len());
    }

    #[test]
    fn test_fit_gaussian_empty_distribution() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ys = vec![0.0; 10];
        assert!(fit_gaussian(&xs, &ys).is_err());
    }

    #[test]
    fn test_fit_two_gaussians() {
        let xs: Vec<f64> = (0..200).map(|i| 500.0 + 2.0 * i as f64).collect();
        let truth = [GaussPeak::new(5.0, 600.0, 40.0), GaussPeak::new(3.0, 760.0, 60.0)];
        let ys = sum_of_gaussians(&xs, &truth);
        let initial = [GaussPeak::new(4.0, 610.0, 50.0), GaussPeak::new(2.0, 750.0, 50.0)];
        let fitted = fit_gaussians(&xs, &ys, &initial).unwrap();
        assert_eq!(fitted.len(), 2);
        for (got, want) in fitted.iter().zip(truth.iter()) {
            assert!((got.center - want.center).abs() < 1e-3);
            assert!((got.height - want.height).abs() < 1e-3);
            assert!((got.fwhm - want.fwhm).abs() < 1e-3);
        }
    }

    #[test]
    fn test_fit_gaussian_reports_center_stderr() {
        let xs: Vec<f64> = (0..80).map(|i| 450.0 + 6.7125 * (i as f64 + 0.5)).collect();
        let ys: Vec<f64> = GaussPeak::new(12.0, 700.0, 80.0)
            .curve(&xs)
            .into_iter()
            .enumerate()
            .map(|(i, y)| y + 0.3 * (i as f64 * 1.7).sin())
            .collect();
        let fit = fit_gaussian(&xs, &ys).unwrap();
        assert!((fit.center - 700.0).abs() < 2.0);
        let stderr = fit.center_stderr.unwrap();
        assert!(stderr > 0.0 && stderr < 2.0, "stderr {}", stderr);
    }

    #[test]
    fn test_fit_gaussians_keeps_centers_in_their_windows() {
        let xs: Vec<f64> = (0..200).map(|i| 500.0 + 2.0 * i as f64).collect();
        let truth = [GaussPeak::new(5.0, 600.0, 40.0), GaussPeak::new(1.0, 780.0, 40.0)];
        let ys = sum_of_gaussians(&xs, &truth);
        // Seeded in reverse order; windows split at the midpoint, 700.
        let initial = [GaussPeak::new(0.5, 800.0, 60.0), GaussPeak::new(4.0, 620.0, 30.0)];
        let fitted = fit_gaussians(&xs, &ys, &initial).unwrap();
        assert!(fitted[0].center < 710.0);
        assert!(fitted[1].center >= 710.0 && fitted[1].center <= 898.0);
        assert!((fitted[1].center - 780.0).abs() < 1e-2);
        assert!(fitted.iter().all(|p| p.height > 0.0 && p.fwhm > 0.0));
    }
}
