use nalgebra::{
    DMatrix,
    DVector,
};
use num_complex::Complex64;
use serde::{
    Deserialize,
    Serialize,
};
use std::f64::consts::PI;

use crate::errors::{
    Result,
    SignalError,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    pub cutoff_hz: f64,
    pub fs_hz: f64,
    pub order: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: 1500.0,
            fs_hz: 60000.0,
            order: 5,
        }
    }
}

/// Zero-phase digital Butterworth low-pass filter.
///
/// Coefficients are designed once (bilinear transform with pre-warping) and
/// applied forward then backward, with odd-extension padding of
/// `3 * (order + 1)` samples and steady-state initial conditions.
///
/// # Example
///
/// ```
/// use dfsignal::smoothing::{ButterworthLowpass, SmoothingConfig};
///
/// let filter = ButterworthLowpass::new(&SmoothingConfig::default()).unwrap();
/// let flat = vec![3.0; 100];
/// let smoothed = filter.filtfilt(&flat);
/// assert!(smoothed.iter().all(|v| (v - 3.0).abs() < 1e-6));
/// ```
#[derive(Debug, Clone)]
pub struct ButterworthLowpass {
    b: Vec<f64>,
    a: Vec<f64>,
    zi: Vec<f64>,
}

impl ButterworthLowpass {
    pub fn new(config: &SmoothingConfig) -> Result<Self> {
        let nyquist = 0.5 * config.fs_hz;
        if !(config.fs_hz > 0.0) {
            return Err(SignalError::InvalidParameter {
                name: "fs_hz",
                value: config.fs_hz,
                context: "sampling frequency must be positive".to_string(),
            });
        }
        if !(config.cutoff_hz > 0.0 && config.cutoff_hz < nyquist) {
            return Err(SignalError::InvalidParameter {
                name: "cutoff_hz",
                value: config.cutoff_hz,
                context: format!("cutoff must lie in (0, {})", nyquist),
            });
        }
        if config.order == 0 {
            return Err(SignalError::InvalidParameter {
                name: "order",
                value: 0.0,
                context: "filter order must be at least 1".to_string(),
            });
        }

        let (b, a) = design_lowpass(config.order, config.cutoff_hz / nyquist);
        let zi = steady_state_initial_conditions(&b, &a)?;
        Ok(Self { b, a, zi })
    }

    pub fn coefficients(&self) -> (&[f64], &[f64]) {
        (&self.b, &self.a)
    }

    fn padlen(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// Forward-backward filtering of `y`.
    ///
    /// Each end is odd-extended by `min(3 * (order + 1), len - 1)` samples.
    /// Inputs of `3 * (order + 1)` samples or fewer therefore get a shorter
    /// extension than the full padding, which leaves larger edge transients
    /// than a long input would see. They still come back smoothed and of the
    /// same length. Inputs of fewer than two samples are returned unchanged.
    pub fn filtfilt(&self, y: &[f64]) -> Vec<f64> {
        let n = y.len();
        if n < 2 {
            return y.to_vec();
        }
        let edge = self.padlen().min(n - 1);

        let mut ext = Vec::with_capacity(n + 2 * edge);
        ext.extend((1..=edge).rev().map(|i| 2.0 * y[0] - y[i]));
        ext.extend_from_slice(y);
        ext.extend((1..=edge).map(|i| 2.0 * y[n - 1] - y[n - 1 - i]));

        let forward = self.lfilter(&ext, ext[0]);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let start = reversed[0];
        reversed = self.lfilter(&reversed, start);
        reversed.reverse();
        reversed[edge..edge + n].to_vec()
    }

    /// Direct form II transposed, with the state scaled to `initial`.
    fn lfilter(&self, x: &[f64], initial: f64) -> Vec<f64> {
        let order = self.a.len() - 1;
        let mut z: Vec<f64> = self.zi.iter().map(|v| v * initial).collect();
        let mut out = Vec::with_capacity(x.len());
        for &xv in x {
            let yv = self.b[0] * xv + z[0];
            for i in 1..=order {
                let carry = if i < order { z[i] } else { 0.0 };
                z[i - 1] = self.b[i] * xv - self.a[i] * yv + carry;
            }
            out.push(yv);
        }
        out
    }
}

/// Numerator and denominator of a digital Butterworth low-pass with the
/// cutoff given as a fraction of Nyquist.
fn design_lowpass(order: usize, wn: f64) -> (Vec<f64>, Vec<f64>) {
    // Pre-warp for the bilinear transform with fs = 2.
    let fs2 = 4.0;
    let warped = fs2 * (PI * wn / 2.0).tan();

    let poles: Vec<Complex64> = (0..order)
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            let analog = Complex64::from_polar(warped, theta);
            (fs2 + analog) / (fs2 - analog)
        })
        .collect();

    let mut a = vec![Complex64::new(1.0, 0.0)];
    for pole in poles.iter() {
        let mut next = vec![Complex64::new(0.0, 0.0); a.len() + 1];
        for (i, c) in a.iter().enumerate() {
            next[i] += *c;
            next[i + 1] -= *c * *pole;
        }
        a = next;
    }
    let a: Vec<f64> = a.into_iter().map(|c| c.re).collect();

    // All zeros sit at z = -1; gain is set for unit DC response.
    let binomial: Vec<f64> = (0..=order).map(|k| binomial(order, k)).collect();
    let gain = a.iter().sum::<f64>() / binomial.iter().sum::<f64>();
    let b = binomial.into_iter().map(|c| c * gain).collect();
    (b, a)
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Filter state that yields a constant output for a unit step input.
fn steady_state_initial_conditions(b: &[f64], a: &[f64]) -> Result<Vec<f64>> {
    let n = a.len() - 1;
    // (I - companion(a)^T) zi = b[1..] - a[1..] * b[0]
    let m = DMatrix::from_fn(n, n, |i, j| {
        let mut v = if i == j { 1.0 } else { 0.0 };
        if j == 0 {
            v += a[i + 1];
        }
        if j == i + 1 {
            v -= 1.0;
        }
        v
    });
    let rhs = DVector::from_fn(n, |i, _| b[i + 1] - a[i + 1] * b[0]);
    m.lu()
        .solve(&rhs)
        .map(|zi| zi.iter().copied().collect())
        .ok_or_else(|| SignalError::SingularSystem {
            context: "butterworth initial conditions".to_string(),
        })
}
