#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slope {
    Flat,
    Rising,
    Falling,
}

impl Slope {
    fn between(a: f64, b: f64) -> Self {
        if a < b {
            Slope::Rising
        } else if a > b {
            Slope::Falling
        } else {
            Slope::Flat
        }
    }
}

/// Indices where the slope turns from falling to rising.
///
/// Flat stretches are skipped when deciding the turn, and a minimum spread
/// over a plateau is reported at the middle of the plateau. Slices shorter
/// than three samples have no minima.
///
/// # Example
///
/// ```
/// use dfsignal::extrema::detect_minima;
///
/// let y = [3.0, 1.0, 2.0, 0.0, 0.0, 0.0, 4.0];
/// assert_eq!(detect_minima(&y), vec![1, 4]);
/// ```
pub fn detect_minima(y: &[f64]) -> Vec<usize> {
    let mut out = Vec::new();
    if y.len() < 3 {
        return out;
    }

    let mut previous = Slope::between(y[0], y[1]);
    let mut begin = 1usize;
    for i in 2..y.len() {
        let current = Slope::between(y[i - 1], y[i]);
        if current == Slope::Flat {
            continue;
        }
        if previous != Slope::Flat && previous != current && current == Slope::Rising {
            out.push((begin + i - 1) / 2);
        }
        begin = i;
        previous = current;
    }
    out
}

/// Indices of local maxima, i.e. the minima of `-y`.
pub fn detect_maxima(y: &[f64]) -> Vec<usize> {
    let negated: Vec<f64> = y.iter().map(|v| -v).collect();
    detect_minima(&negated)
}

/// Index of the element of `candidates` whose `x` is closest to `target`.
pub fn nearest_index(x: &[f64], candidates: &[usize], target: f64) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .min_by(|&a, &b| (x[a] - target).abs().total_cmp(&(x[b] - target).abs()))
}

/// Index of the sample of `x` closest to `target`.
pub fn closest_sample(x: &[f64], target: f64) -> Option<usize> {
    (0..x.len()).min_by(|&a, &b| (x[a] - target).abs().total_cmp(&(x[b] - target).abs()))
}

/// Largest finite value and its index.
pub fn argmax(y: &[f64]) -> Option<(usize, f64)> {
    y.iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
            Some((_, best)) if best >= v => acc,
            _ => Some((i, v)),
        })
}

/// Smallest finite value and its index.
pub fn argmin(y: &[f64]) -> Option<(usize, f64)> {
    y.iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
            Some((_, best)) if best <= v => acc,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_valleys() {
        let y = [5.0, 4.0, 3.0, 4.0, 5.0, 2.0, 6.0];
        assert_eq!(detect_minima(&y), vec![2, 5]);
    }

    #[test]
    fn test_plateau_reports_midpoint() {
        let y = [5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 5.0];
        assert_eq!(detect_minima(&y), vec![3]);
    }

    #[test]
    fn test_monotonic_has_none() {
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!(detect_minima(&y).is_empty());
        assert!(detect_maxima(&y).is_empty());
    }

    #[test]
    fn test_maxima_of_sine() {
        let y: Vec<f64> = (0..400).map(|i| (i as f64 * 0.05).sin()).collect();
        let maxima = detect_maxima(&y);
        assert_eq!(maxima.len(), 3);
        // sin peaks at pi/2 -> i = 31.4
        assert_eq!(maxima[0], 31);
    }

    #[test]
    fn test_short_slices() {
        assert!(detect_minima(&[]).is_empty());
        assert!(detect_minima(&[1.0, 0.0]).is_empty());
    }

    #[test]
    fn test_nearest() {
        let x = [400.0, 500.0, 600.0, 700.0];
        assert_eq!(nearest_index(&x, &[0, 2, 3], 640.0), Some(2));
        assert_eq!(nearest_index(&x, &[], 640.0), None);
        assert_eq!(closest_sample(&x, 551.0), Some(2));
    }

    #[test]
    fn test_arg_extremes_skip_nan() {
        let y = [1.0, f64::NAN, 7.0, -2.0, 7.0];
        assert_eq!(argmax(&y), Some((2, 7.0)));
        assert_eq!(argmin(&y), Some((3, -2.0)));
        assert_eq!(argmax(&[]), None);
    }
}
