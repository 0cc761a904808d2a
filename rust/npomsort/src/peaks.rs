use dfsignal::extrema::{
    argmax,
    nearest_index,
};
use dfsignal::{
    ButterworthLowpass,
    detect_minima,
    truncate,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    FailureKind,
    ProcessingError,
};

/// Lower edge of the peak-finding window.
const PEAK_WINDOW_START_NM: f64 = 450.0;
/// Upper edge of the peak-finding window.
const PEAK_WINDOW_END_NM: f64 = 987.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FwhmEstimate {
    pub center: f64,
    pub height: f64,
    pub fwhm: f64,
}

impl FwhmEstimate {
    pub fn is_degenerate(&self) -> bool {
        !(self.fwhm.is_finite() && self.center.is_finite() && self.height.is_finite())
            || self.fwhm == 0.0
    }
}

/// Width of the largest peak in `(x, y)`.
///
/// See [`estimate_fwhm_at`]; the peak is the largest sample, kept one sample
/// away from either end.
pub fn estimate_fwhm(x: &[f64], y: &[f64], fwhm_factor: f64) -> Option<FwhmEstimate> {
    let (maxdex, _) = argmax(y)?;
    estimate_fwhm_at(x, y, maxdex, fwhm_factor)
}

/// Width of the peak at `maxdex`.
///
/// Each flank is walked outwards to its half-maximum crossing, interpolated
/// linearly between samples (the flank end when it never crosses). When one
/// half width exceeds the other by more than `fwhm_factor`, the peak is
/// assumed to overlap a neighbour on that side and twice the narrower half
/// width is reported; otherwise the two are summed.
///
/// # Example
///
/// ```
/// use npomsort::peaks::estimate_fwhm;
///
/// let x: Vec<f64> = (0..201).map(|i| 600.0 + i as f64).collect();
/// let y: Vec<f64> = x.iter().map(|v| (-4.0 * 2f64.ln() * ((v - 700.0) / 40.0).powi(2)).exp()).collect();
/// let est = estimate_fwhm(&x, &y, 1.1).unwrap();
/// assert_eq!(est.center, 700.0);
/// assert!((est.fwhm - 40.0).abs() < 0.1);
/// ```
pub fn estimate_fwhm_at(
    x: &[f64],
    y: &[f64],
    maxdex: usize,
    fwhm_factor: f64,
) -> Option<FwhmEstimate> {
    let n = y.len();
    if n < 3 || x.len() != n {
        return None;
    }
    let maxdex = maxdex.clamp(1, n - 2);
    let height = y[maxdex];
    let center = x[maxdex];
    let half = height / 2.0;

    let left = (0..maxdex)
        .rev()
        .find(|&i| y[i] <= half)
        .map(|i| crossing(x[i], y[i], x[i + 1], y[i + 1], half))
        .unwrap_or(x[0]);
    let right = (maxdex + 1..n)
        .find(|&i| y[i] <= half)
        .map(|i| crossing(x[i - 1], y[i - 1], x[i], y[i], half))
        .unwrap_or(x[n - 1]);

    let h1 = (center - left).abs();
    let h2 = (right - center).abs();
    let (wide, narrow) = if h1 > h2 { (h1, h2) } else { (h2, h1) };
    let fwhm = if wide > fwhm_factor * narrow {
        2.0 * narrow
    } else {
        h1 + h2
    };
    Some(FwhmEstimate {
        center,
        height,
        fwhm,
    })
}

fn crossing(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    if y1 == y0 {
        return x0;
    }
    x0 + (level - y0) * (x1 - x0) / (y1 - y0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MainPeaks {
    pub weird: Option<FwhmEstimate>,
    pub coupled: FwhmEstimate,
    /// Wavelength of the minimum separating the two halves.
    pub split_nm: f64,
}

/// Locates the coupled mode and, when `weird` is set, the weird peak.
///
/// The smoothed 450-987 nm window is split at the minimum nearest
/// `midpoint_nm`. The right half holds the coupled mode. The left half runs
/// from the first minimum (or 450 nm when that minimum is the split) and is
/// only measured for weird peakers.
pub fn find_main_peaks(
    x: &[f64],
    y: &[f64],
    weird: bool,
    midpoint_nm: f64,
    fwhm_factor: f64,
    smoother: &ButterworthLowpass,
) -> Result<MainPeaks, ProcessingError> {
    let window = truncate(x, y, PEAK_WINDOW_START_NM, PEAK_WINDOW_END_NM)
        .map_err(ProcessingError::signal(FailureKind::PeakFinding))?;
    let smoothed = smoother.filtfilt(&window.y);
    let minima = detect_minima(&smoothed);

    let split = nearest_index(&window.x, &minima, midpoint_nm).ok_or_else(|| {
        ProcessingError::NoMinima {
            kind: FailureKind::PeakFinding,
            context: "no minimum to split the spectrum at".to_string(),
        }
    })?;
    let split_nm = window.x[split];

    let weird_peak = if weird {
        let start = if minima[0] == split {
            PEAK_WINDOW_START_NM
        } else {
            window.x[minima[0]]
        };
        let left = truncate(&window.x, &smoothed, start, split_nm)
            .map_err(ProcessingError::signal(FailureKind::PeakFinding))?;
        estimate_fwhm(&left.x, &left.y, fwhm_factor)
    } else {
        None
    };

    let right = truncate(&window.x, &smoothed, split_nm, PEAK_WINDOW_END_NM)
        .map_err(ProcessingError::signal(FailureKind::PeakFinding))?;
    let coupled = estimate_fwhm(&right.x, &right.y, fwhm_factor).ok_or_else(|| {
        ProcessingError::DegenerateEstimate {
            kind: FailureKind::PeakFinding,
            value: right.len() as f64,
            context: "coupled mode window too short".to_string(),
        }
    })?;
    if coupled.is_degenerate() {
        return Err(ProcessingError::DegenerateEstimate {
            kind: FailureKind::PeakFinding,
            value: coupled.fwhm,
            context: "coupled mode width".to_string(),
        });
    }

    Ok(MainPeaks {
        weird: weird_peak,
        coupled,
        split_nm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfsignal::SmoothingConfig;
    use dfsignal::gaussian::gaussian;

    fn axis() -> Vec<f64> {
        (0..1000)
            .map(|i| 400.0 + 600.0 * i as f64 / 999.0)
            .collect()
    }

    #[test]
    fn test_fwhm_of_gaussian() {
        let x = axis();
        let y: Vec<f64> = x.iter().map(|&v| gaussian(v, 2.0, 720.0, 80.0)).collect();
        let est = estimate_fwhm(&x, &y, 1.1).unwrap();
        assert!((est.center - 720.0).abs() < 0.5);
        assert!((est.height - 2.0).abs() < 1e-3);
        assert!((est.fwhm - 80.0).abs() < 0.1);
    }

    #[test]
    fn test_fwhm_asymmetric_uses_narrow_side() {
        let x: Vec<f64> = (0..400).map(|i| i as f64).collect();
        // Right flank twice as wide as the left one.
        let y: Vec<f64> = x
            .iter()
            .map(|&v| {
                let w = if v < 200.0 { 20.0 } else { 40.0 };
                gaussian(v, 1.0, 200.0, w)
            })
            .collect();
        let est = estimate_fwhm(&x, &y, 1.1).unwrap();
        assert!((est.fwhm - 20.0).abs() < 0.1);
        let est = estimate_fwhm(&x, &y, 2.5).unwrap();
        assert!((est.fwhm - 30.0).abs() < 0.1);
    }

    #[test]
    fn test_fwhm_max_at_edge_is_clamped() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..10).map(|i| 10.0 - i as f64).collect();
        let est = estimate_fwhm(&x, &y, 1.1).unwrap();
        assert_eq!(est.center, 1.0);
        assert!(estimate_fwhm(&x[..2], &y[..2], 1.1).is_none());
    }

    #[test]
    fn test_main_peaks_single() {
        let x = axis();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| gaussian(v, 1.0, 533.0, 30.0) + gaussian(v, 2.0, 720.0, 80.0) + 0.01)
            .collect();
        let smoother = ButterworthLowpass::new(&SmoothingConfig::default()).unwrap();
        let peaks = find_main_peaks(&x, &y, false, 680.0, 1.1, &smoother).unwrap();
        assert!(peaks.weird.is_none());
        assert!((peaks.coupled.center - 720.0).abs() < 2.0);
        assert!((peaks.coupled.height - 2.01).abs() < 0.01);
        assert!((peaks.split_nm - 585.0).abs() < 5.0);
    }

    #[test]
    fn test_main_peaks_weird() {
        let x = axis();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| {
                gaussian(v, 1.0, 533.0, 30.0)
                    + gaussian(v, 2.0, 720.0, 80.0)
                    + gaussian(v, 5.0, 620.0, 15.0)
                    + 0.01
            })
            .collect();
        let smoother = ButterworthLowpass::new(&SmoothingConfig::default()).unwrap();
        let peaks = find_main_peaks(&x, &y, true, 680.0, 1.1, &smoother).unwrap();
        let weird = peaks.weird.unwrap();
        assert!((weird.center - 620.0).abs() < 3.0);
        assert!((peaks.coupled.center - 720.0).abs() < 2.0);
    }

    #[test]
    fn test_main_peaks_without_minima() {
        let x = axis();
        let y: Vec<f64> = x.iter().map(|&v| v / 1000.0).collect();
        let smoother = ButterworthLowpass::new(&SmoothingConfig::default()).unwrap();
        let err = find_main_peaks(&x, &y, false, 680.0, 1.1, &smoother).unwrap_err();
        assert_eq!(err.kind(), FailureKind::PeakFinding);
    }
}
