use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::errors::{
    Result,
    SignalError,
    check_same_length,
};
use crate::extrema::detect_minima;
use crate::linalg::Pentadiagonal;
use crate::smoothing::ButterworthLowpass;

/// Region searched for the first minimum after the transverse shoulder.
const LEADING_BAND_NM: (f64, f64) = (450.0, 1000.0);
/// Region searched for the first minimum after the coupled mode.
const TRAILING_BAND_NM: (f64, f64) = (800.0, 1000.0);
/// Region whose smoothed minimum is shifted to zero after subtraction.
const ZERO_BAND_NM: (f64, f64) = (450.0, 850.0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaselineConfig {
    pub lambda: f64,
    pub p: f64,
    pub iterations: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lambda: 10f64.powf(6.7),
            p: 0.003,
            iterations: 10,
        }
    }
}

/// Asymmetric least squares baseline.
///
/// Repeatedly solves `(W + lambda * D^T D) z = W y`, with `D` the second
/// difference operator and weights `p` above the current baseline and
/// `1 - p` on or below it.
pub fn als_baseline(y: &[f64], config: &BaselineConfig) -> Result<Vec<f64>> {
    let n = y.len();
    if n == 0 {
        return Err(SignalError::empty("als_baseline"));
    }
    if !(config.p > 0.0 && config.p < 1.0) {
        return Err(SignalError::InvalidParameter {
            name: "p",
            value: config.p,
            context: "asymmetry must lie in (0, 1)".to_string(),
        });
    }
    if n < 3 {
        return Ok(y.to_vec());
    }

    let penalty = Pentadiagonal::second_difference_penalty(n, config.lambda);
    let mut weights = vec![1.0; n];
    let mut z = y.to_vec();
    let mut rhs = vec![0.0; n];
    for _ in 0..config.iterations.max(1) {
        for i in 0..n {
            rhs[i] = weights[i] * y[i];
        }
        z = penalty
            .solve_with_extra_diagonal(&weights, &rhs)
            .map_err(|e| e.append_to_context("als_baseline"))?;
        for i in 0..n {
            weights[i] = if y[i] > z[i] { config.p } else { 1.0 - config.p };
        }
    }
    Ok(z)
}

/// Removes the scattering background of a dark-field spectrum.
///
/// The stretch between the first smoothed minimum above 450 nm and the first
/// smoothed minimum in 800-1000 nm is baselined with [`als_baseline`]; the
/// baseline is held constant outside that stretch. The result is shifted so
/// its smoothed minimum over 450-850 nm sits at zero. When a band has no
/// minimum, its edge is used instead.
///
/// `x` must be ascending.
pub fn remove_baseline(
    x: &[f64],
    y: &[f64],
    smoother: &ButterworthLowpass,
    config: &BaselineConfig,
) -> Result<Vec<f64>> {
    check_same_length(x, y, "remove_baseline")?;
    let n = y.len();
    if n == 0 {
        return Err(SignalError::empty("remove_baseline"));
    }

    let leading = band_indices(x, LEADING_BAND_NM);
    let trailing = band_indices(x, TRAILING_BAND_NM);

    let mut start = match leading {
        Some((lo, hi)) => first_smoothed_minimum(&y[lo..=hi], smoother)
            .map(|i| lo + i)
            .unwrap_or(lo),
        None => 0,
    };
    let mut end = match trailing {
        Some((lo, hi)) => first_smoothed_minimum(&y[lo..=hi], smoother)
            .map(|i| lo + i)
            .unwrap_or(hi),
        None => n - 1,
    };
    if end < start + 2 {
        debug!(
            "Baseline anchors {}..{} too close, using the whole spectrum",
            start, end
        );
        start = 0;
        end = n - 1;
    }

    let segment = als_baseline(&y[start..=end], config)?;
    let head = segment[0];
    let tail = segment[segment.len() - 1];
    let mut out: Vec<f64> = (0..n)
        .map(|i| {
            let b = if i < start {
                head
            } else if i > end {
                tail
            } else {
                segment[i - start]
            };
            y[i] - b
        })
        .collect();

    let (zlo, zhi) = band_indices(x, ZERO_BAND_NM).unwrap_or((0, n - 1));
    let smoothed = smoother.filtfilt(&out[zlo..=zhi]);
    let floor = smoothed.iter().copied().fold(f64::INFINITY, f64::min);
    if floor.is_finite() {
        out.iter_mut().for_each(|v| *v -= floor);
    }
    Ok(out)
}

/// Inclusive index range of the samples of an ascending `x` inside `band`.
pub fn band_indices(x: &[f64], band: (f64, f64)) -> Option<(usize, usize)> {
    let lo = x.iter().position(|v| *v >= band.0)?;
    let hi = x.iter().rposition(|v| *v <= band.1)?;
    if hi < lo { None } else { Some((lo, hi)) }
}

fn first_smoothed_minimum(y: &[f64], smoother: &ButterworthLowpass) -> Option<usize> {
    let smoothed = smoother.filtfilt(y);
    detect_minima(&smoothed).first().copied()
}
