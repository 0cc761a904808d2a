use crate::errors::{
    Result,
    SignalError,
};

/// Number of finite neighbours averaged to fill a leading or trailing gap.
const EDGE_FILL_SAMPLES: usize = 3;

/// Replaces every non-finite sample of `y`.
///
/// - A leading run takes the mean of the first three finite samples after it.
/// - A trailing run takes the mean of the last three finite samples before it.
/// - An interior run of length `k` between finite samples `a` and `b` is
///   filled with `a + i * (b - a) / (k + 1)` for `i = 1..=k`.
///
/// A slice without gaps is returned unchanged. A slice with no finite sample
/// at all is an error, since there is nothing to interpolate from.
///
/// # Example
///
/// ```
/// use dfsignal::nan::repair_nans;
///
/// let y = vec![f64::NAN, 1.0, 2.0, 3.0, f64::NAN, 5.0, f64::NAN];
/// let out = repair_nans(&y).unwrap();
/// assert_eq!(out, vec![2.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0 / 3.0]);
/// ```
pub fn repair_nans(y: &[f64]) -> Result<Vec<f64>> {
    let mut out = y.to_vec();
    repair_nans_in_place(&mut out)?;
    Ok(out)
}

pub fn repair_nans_in_place(y: &mut [f64]) -> Result<()> {
    if y.iter().all(|v| v.is_finite()) {
        return Ok(());
    }
    let first = match y.iter().position(|v| v.is_finite()) {
        Some(i) => i,
        None => {
            return Err(SignalError::AllNan {
                context: format!("No finite samples in slice of length {}", y.len()),
            });
        }
    };
    // A finite sample exists, so `rposition` always succeeds here.
    let last = y.iter().rposition(|v| v.is_finite()).unwrap_or(first);

    if first > 0 {
        let fill = mean_of_finite(y[first..].iter().copied());
        y[..first].iter_mut().for_each(|v| *v = fill);
    }
    if last + 1 < y.len() {
        let fill = mean_of_finite(y[..=last].iter().rev().copied());
        y[last + 1..].iter_mut().for_each(|v| *v = fill);
    }

    let mut i = first;
    while i < last {
        if y[i + 1].is_finite() {
            i += 1;
            continue;
        }
        let gap_start = i + 1;
        let mut gap_end = gap_start;
        while !y[gap_end].is_finite() {
            gap_end += 1;
        }
        let a = y[i];
        let b = y[gap_end];
        let k = (gap_end - gap_start) as f64;
        for (offset, v) in y[gap_start..gap_end].iter_mut().enumerate() {
            *v = a + (offset + 1) as f64 * (b - a) / (k + 1.0);
        }
        i = gap_end;
    }
    Ok(())
}

fn mean_of_finite(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values.filter(|v| v.is_finite()).take(EDGE_FILL_SAMPLES) {
        sum += v;
        count += 1;
    }
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_nans_is_identity() {
        let y = vec![0.5, -1.0, 3.25, 8.0];
        assert_eq!(repair_nans(&y).unwrap(), y);
    }

    #[test]
    fn test_interior_run() {
        let y = vec![1.0, f64::NAN, f64::NAN, f64::NAN, 5.0];
        let out = repair_nans(&y).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_leading_and_trailing_runs() {
        let y = vec![f64::NAN, f64::NAN, 3.0, 6.0, 9.0, 12.0, f64::NAN];
        let out = repair_nans(&y).unwrap();
        assert_eq!(out[0], 6.0);
        assert_eq!(out[1], 6.0);
        assert_eq!(out[6], 9.0);
    }

    #[test]
    fn test_short_edges_use_available_samples() {
        let y = vec![f64::NAN, 4.0, f64::NAN];
        let out = repair_nans(&y).unwrap();
        assert_eq!(out, vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_all_nan_is_error() {
        let y = vec![f64::NAN; 4];
        assert!(matches!(repair_nans(&y), Err(SignalError::AllNan { .. })));
    }

    #[test]
    fn test_output_is_always_finite() {
        let y = vec![
            f64::NAN,
            1.0,
            f64::INFINITY,
            2.0,
            f64::NAN,
            f64::NAN,
            0.0,
            f64::NAN,
        ];
        let out = repair_nans(&y).unwrap();
        assert_eq!(out.len(), y.len());
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
