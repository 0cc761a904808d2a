use crate::errors::{
    Result,
    SignalError,
    check_same_length,
};
use crate::nan::repair_nans_in_place;

/// Half central difference of `y` with respect to `x`.
///
/// Interior samples use `(y[i+1] - y[i-1]) / (x[i+1] - x[i-1]) / 2`; the two
/// end samples use the one-sided difference to their neighbour, also halved.
/// Positions where `dx` is zero are treated as gaps and interpolated.
pub fn central_difference(x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    check_same_length(x, y, "central_difference")?;
    let n = y.len();
    if n < 2 {
        return Err(SignalError::InsufficientData {
            real: n,
            expected: 2,
            context: "central_difference".to_string(),
        });
    }

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let (lo, hi) = match i {
            0 => (0, 1),
            i if i == n - 1 => (n - 2, n - 1),
            i => (i - 1, i + 1),
        };
        let dx = x[hi] - x[lo];
        if dx == 0.0 {
            out.push(f64::NAN);
        } else {
            out.push((y[hi] - y[lo]) / dx / 2.0);
        }
    }
    repair_nans_in_place(&mut out)
        .map_err(|e| e.append_to_context("central_difference: every dx was zero"))?;
    Ok(out)
}
