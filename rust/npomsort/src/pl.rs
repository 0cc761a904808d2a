//! Photoluminescence decomposition into a sum of Gaussians.

use dfsignal::extrema::detect_maxima;
use dfsignal::gaussian::{
    GaussPeak,
    sum_of_gaussians,
};
use dfsignal::optimize::{
    Bound,
    NelderMeadConfig,
    nelder_mead_bounded,
};
use dfsignal::rolling::rolling_std;
use dfsignal::ButterworthLowpass;
use tracing::debug;

use crate::config::PlConfig;
use crate::errors::ProcessingError;
use crate::models::PlAnalysis;
use crate::peaks::estimate_fwhm_at;

/// Splits a PL spectrum into at most `gauss_max_peaks` Gaussians.
///
/// Peaks are picked greedily from the smoothed residual, tallest first,
/// until the tallest remaining maximum drops under `noise_threshold` times the
/// local noise or would sit at or before the previous center. The set is then
/// refined jointly by minimising the absolute deviation, restarting from the
/// last result while the simplex has not converged.
///
/// A spectrum without any peak above the noise gives an empty analysis.
pub fn decompose(
    x: &[f64],
    y: &[f64],
    config: &PlConfig,
    smoother: &ButterworthLowpass,
) -> Result<PlAnalysis, ProcessingError> {
    let peaks = greedy_peaks(x, y, config, smoother);
    if peaks.is_empty() {
        debug!("No PL peak above the noise");
        return Ok(PlAnalysis::empty(y.to_vec()));
    }

    let refined = refine(x, y, &peaks, config)?;
    let fit = sum_of_gaussians(x, &refined);
    let residual_stddev = population_std(y.iter().zip(fit.iter()).map(|(a, b)| a - b));
    Ok(PlAnalysis {
        peaks: refined,
        fit: Some(fit),
        residual_stddev: Some(residual_stddev),
        spectrum: y.to_vec(),
    })
}

fn greedy_peaks(
    x: &[f64],
    y: &[f64],
    config: &PlConfig,
    smoother: &ButterworthLowpass,
) -> Vec<GaussPeak> {
    let smoothed = smoother.filtfilt(y);
    let wiggle: Vec<f64> = y.iter().zip(smoothed.iter()).map(|(a, b)| a - b).collect();
    let noise = rolling_std(&wiggle, config.noise_window);

    let mut residual = y.to_vec();
    let mut peaks: Vec<GaussPeak> = Vec::new();
    let mut last_center = f64::NEG_INFINITY;
    while peaks.len() < config.gauss_max_peaks {
        let s = smoother.filtfilt(&residual);
        let Some(i) = detect_maxima(&s)
            .into_iter()
            .filter(|&i| s[i] > 0.0)
            .max_by(|&a, &b| s[a].total_cmp(&s[b]))
        else {
            break;
        };
        if s[i] <= config.noise_threshold * noise[i] || x[i] <= last_center {
            break;
        }
        let Some(est) = estimate_fwhm_at(x, &s, i, config.fwhm_factor) else {
            break;
        };
        if est.is_degenerate() || est.fwhm <= 0.0 || est.height <= 0.0 {
            break;
        }
        let peak = GaussPeak::new(est.height, est.center, est.fwhm);
        residual
            .iter_mut()
            .zip(x.iter())
            .for_each(|(r, xv)| *r -= peak.eval(*xv));
        last_center = peak.center;
        peaks.push(peak);
    }
    peaks.sort_by(|a, b| a.center.total_cmp(&b.center));
    peaks
}

fn refine(
    x: &[f64],
    y: &[f64],
    peaks: &[GaussPeak],
    config: &PlConfig,
) -> Result<Vec<GaussPeak>, ProcessingError> {
    let (x_lo, x_hi) = (x[0], x[x.len() - 1]);
    let mut x0 = Vec::with_capacity(peaks.len() * 3);
    let mut bounds = Vec::with_capacity(peaks.len() * 3);
    for (k, p) in peaks.iter().enumerate() {
        let lower = if k == 0 {
            x_lo
        } else {
            (2.0 * peaks[k - 1].center + p.center) / 3.0
        };
        let upper = if k + 1 == peaks.len() {
            x_hi
        } else {
            (p.center + 2.0 * peaks[k + 1].center) / 3.0
        };
        x0.extend_from_slice(&[p.height, p.center, p.fwhm]);
        bounds.push(Bound::new(p.height / 2.0, 2.0 * p.height));
        bounds.push(Bound::new(lower, upper));
        bounds.push(Bound::new(
            (p.fwhm / 2.0).min(10.0),
            (10.0 * p.height).max(2.0 * p.fwhm),
        ));
    }

    let objective = |params: &[f64]| -> f64 {
        x.iter()
            .zip(y.iter())
            .map(|(xv, yv)| {
                let model: f64 = params
                    .chunks_exact(3)
                    .map(|c| dfsignal::gaussian(*xv, c[0], c[1], c[2]))
                    .sum();
                (yv - model).abs()
            })
            .sum()
    };

    let greedy_cost = objective(&x0);
    let nm_config = NelderMeadConfig::default();
    let mut current = x0;
    let mut best_cost = greedy_cost;
    let mut converged = false;
    for attempt in 0..config.max_restarts.max(1) {
        let res = nelder_mead_bounded(&objective, &current, &bounds, &nm_config).map_err(|e| {
            ProcessingError::FitDegenerate {
                context: format!("PL refinement: {}", e),
            }
        })?;
        debug!(
            "PL refinement attempt {}: cost {:.4e} after {} evaluations, converged: {}",
            attempt, res.fval, res.evaluations, res.converged
        );
        current = res.x;
        best_cost = res.fval;
        if res.converged {
            converged = true;
            break;
        }
    }

    if current.iter().any(|v| !v.is_finite()) {
        return Err(ProcessingError::FitDegenerate {
            context: "PL refinement produced non-finite parameters".to_string(),
        });
    }
    if !converged && !(best_cost < greedy_cost) {
        return Err(ProcessingError::FitDegenerate {
            context: format!(
                "PL refinement neither converged nor improved on {:.4e}",
                greedy_cost
            ),
        });
    }

    Ok(current
        .chunks_exact(3)
        .map(|c| GaussPeak::new(c[0], c[1], c[2]))
        .collect())
}

fn population_std(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfsignal::SmoothingConfig;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn axis() -> Vec<f64> {
        (0..1000)
            .map(|i| 400.0 + 600.0 * i as f64 / 999.0)
            .collect()
    }

    fn smoother() -> ButterworthLowpass {
        ButterworthLowpass::new(&SmoothingConfig::default()).unwrap()
    }

    #[test]
    fn test_three_peaks_recovered() {
        let x = axis();
        let truth = [
            GaussPeak::new(1.0, 600.0, 30.0),
            GaussPeak::new(0.7, 700.0, 30.0),
            GaussPeak::new(0.4, 800.0, 30.0),
        ];
        let amp = 0.01 * 3f64.sqrt();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let y: Vec<f64> = x
            .iter()
            .map(|&v| truth.iter().map(|p| p.eval(v)).sum::<f64>() + rng.gen_range(-amp..amp))
            .collect();

        let out = decompose(&x, &y, &PlConfig::default(), &smoother()).unwrap();
        assert_eq!(out.peaks.len(), 3, "{:?}", out.peaks);
        for (got, want) in out.peaks.iter().zip(truth.iter()) {
            assert!((got.center - want.center).abs() < 5.0, "{:?}", got);
            assert!((got.height - want.height).abs() < 0.2 * want.height, "{:?}", got);
            assert!((got.fwhm - want.fwhm).abs() < 0.2 * want.fwhm, "{:?}", got);
        }
        assert!(out.has_positive_peak());
        assert!(out.residual_stddev.unwrap() < 0.05);
        assert_eq!(out.fit.as_ref().map(|f| f.len()), Some(x.len()));
    }

    #[test]
    fn test_flat_spectrum_has_no_peaks() {
        let x = axis();
        let y = vec![0.0; x.len()];
        let out = decompose(&x, &y, &PlConfig::default(), &smoother()).unwrap();
        assert!(out.peaks.is_empty());
        assert!(!out.has_positive_peak());
        assert!(out.fit.is_none());
    }

    #[test]
    fn test_population_std() {
        let v = [1.0, 3.0];
        assert_eq!(population_std(v.into_iter()), 1.0);
        assert_eq!(population_std(std::iter::empty()), 0.0);
    }
}
