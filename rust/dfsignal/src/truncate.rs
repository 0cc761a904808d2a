use crate::errors::{
    Result,
    SignalError,
    check_same_length,
};

/// Samples averaged to build the padding value beyond either end.
const PAD_AVERAGE_SAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Truncated {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Truncated {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Keeps the samples with `start <= x[i] <= finish`.
///
/// When the window reaches past either end of `x`, that side is first
/// extended on the axis step with the mean of the five nearest samples, so
/// the window is always covered. Descending axes are handled and returned in
/// their original order.
///
/// # Example
///
/// ```
/// use dfsignal::truncate::truncate;
///
/// let x = vec![10.0, 11.0, 12.0, 13.0];
/// let y = vec![1.0, 2.0, 3.0, 4.0];
/// let t = truncate(&x, &y, 11.0, 15.0).unwrap();
/// assert_eq!(t.x, vec![11.0, 12.0, 13.0, 14.0, 15.0]);
/// assert_eq!(t.y, vec![2.0, 3.0, 4.0, 2.5, 2.5]);
/// ```
pub fn truncate(x: &[f64], y: &[f64], start: f64, finish: f64) -> Result<Truncated> {
    check_same_length(x, y, "truncate")?;
    if x.is_empty() {
        return Err(SignalError::empty("truncate"));
    }
    if !(start <= finish) {
        return Err(SignalError::InvalidParameter {
            name: "start",
            value: start,
            context: format!("truncation start must not exceed finish ({})", finish),
        });
    }

    let descending = x.len() > 1 && x[0] > x[x.len() - 1];
    let (xs, ys): (Vec<f64>, Vec<f64>) = if descending {
        (x.iter().rev().copied().collect(), y.iter().rev().copied().collect())
    } else {
        (x.to_vec(), y.to_vec())
    };

    let n = xs.len();
    let step = if n > 1 { xs[1] - xs[0] } else { 0.0 };
    let tol = step.abs() * 1e-9;

    let mut out_x = Vec::new();
    let mut out_y = Vec::new();

    if step > 0.0 && xs[0] > start {
        let fill = edge_mean(ys.iter().take(PAD_AVERAGE_SAMPLES));
        let mut k = 1usize;
        let mut pad = Vec::new();
        loop {
            let xv = xs[0] - k as f64 * step;
            if xv < start - tol {
                break;
            }
            pad.push(xv);
            k += 1;
        }
        for xv in pad.into_iter().rev() {
            if xv <= finish + tol {
                out_x.push(xv);
                out_y.push(fill);
            }
        }
    }

    for (xv, yv) in xs.iter().zip(ys.iter()) {
        if *xv >= start - tol && *xv <= finish + tol {
            out_x.push(*xv);
            out_y.push(*yv);
        }
    }

    let last_step = if n > 1 { xs[n - 1] - xs[n - 2] } else { 0.0 };
    if last_step > 0.0 && xs[n - 1] < finish {
        let fill = edge_mean(ys.iter().rev().take(PAD_AVERAGE_SAMPLES));
        let mut k = 1usize;
        loop {
            let xv = xs[n - 1] + k as f64 * last_step;
            if xv > finish + tol {
                break;
            }
            if xv >= start - tol {
                out_x.push(xv);
                out_y.push(fill);
            }
            k += 1;
        }
    }

    // Clamp values that only passed thanks to the tolerance.
    for xv in out_x.iter_mut() {
        *xv = xv.clamp(start, finish);
    }

    if descending {
        out_x.reverse();
        out_y.reverse();
    }
    Ok(Truncated { x: out_x, y: out_y })
}

fn edge_mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count.max(1) as f64
}
