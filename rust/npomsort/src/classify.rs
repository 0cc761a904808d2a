//! Accept/reject rules for dark-field spectra.

use dfsignal::extrema::{
    argmax,
    closest_sample,
};
use dfsignal::{
    ButterworthLowpass,
    detect_maxima,
    truncate,
};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::errors::{
    FailureKind,
    ProcessingError,
};
use crate::models::RejectionReason;

const CLASSIFY_START_NM: f64 = 450.0;
/// Upper end of the classification window and of the coupled-mode range.
pub const CLASSIFY_END_NM: f64 = 900.0;

fn classification_error(source: dfsignal::SignalError) -> ProcessingError {
    ProcessingError::Signal {
        kind: FailureKind::Classification,
        source,
    }
}

/// Runs the four NPoM trials in order and returns the first one failed.
///
/// `y` is the baseline-corrected spectrum. Trials:
/// enough signal over 450-900 nm, more signal at long wavelengths than at
/// short ones, more signal in the window than beyond 900 nm, and more than
/// one smoothed maximum.
pub fn test_if_npom(
    x: &[f64],
    y: &[f64],
    config: &AnalysisConfig,
    smoother: &ButterworthLowpass,
) -> Result<Option<RejectionReason>, ProcessingError> {
    let window =
        truncate(x, y, CLASSIFY_START_NM, CLASSIFY_END_NM).map_err(classification_error)?;
    let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let upper_sum: f64 = if x_max > CLASSIFY_END_NM {
        truncate(x, y, CLASSIFY_END_NM, x_max)
            .map_err(classification_error)?
            .y
            .iter()
            .sum()
    } else {
        0.0
    };

    let floor = window.y.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = window.y.iter().map(|v| v - floor).collect();
    let total: f64 = shifted.iter().sum();
    let global_min = y.iter().copied().fold(f64::INFINITY, f64::min);

    if !(total > config.npom_signal_lower && global_min > -0.1) {
        return Ok(Some(RejectionReason::LowSignal));
    }

    let third = shifted.len() / 3;
    let first: f64 = shifted[..third].iter().sum();
    let rest: f64 = shifted[third..].iter().sum();
    if !(first <= rest * config.npom_threshold) {
        return Ok(Some(RejectionReason::WeakCmRegion));
    }

    if !(3.0 * total > upper_sum / config.npom_threshold) {
        return Ok(Some(RejectionReason::JustNoise));
    }

    let smoothed = smoother.filtfilt(&shifted);
    if detect_maxima(&smoothed).len() <= 1 {
        return Ok(Some(RejectionReason::TooFewPeaks));
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoublePeakVerdict {
    Single,
    Double,
    Rejected(RejectionReason),
}

/// Decides whether the raw spectrum has two coupled-mode peaks.
///
/// Only smoothed maxima above `cm_low_limit_nm` compete. The runner-up must
/// reach `1 / doubles_threshold` of the winner and sit more than
/// `doubles_min_separation_nm` away from it.
pub fn test_if_double(
    x: &[f64],
    y: &[f64],
    config: &AnalysisConfig,
    smoother: &ButterworthLowpass,
) -> Result<DoublePeakVerdict, ProcessingError> {
    let window =
        truncate(x, y, CLASSIFY_START_NM, CLASSIFY_END_NM).map_err(classification_error)?;
    let smoothed = smoother.filtfilt(&window.y);
    let maxima = detect_maxima(&smoothed);
    if maxima.is_empty() {
        return Ok(DoublePeakVerdict::Rejected(RejectionReason::TooFewPeaks));
    }

    let tallest = maxima
        .iter()
        .copied()
        .max_by(|&a, &b| smoothed[a].total_cmp(&smoothed[b]))
        .unwrap_or(maxima[0]);
    let mut above: Vec<usize> = maxima
        .iter()
        .copied()
        .filter(|&i| window.x[i] > config.cm_low_limit_nm)
        .collect();
    if above.is_empty() || window.x[tallest] < config.cm_low_limit_nm {
        return Ok(DoublePeakVerdict::Rejected(
            RejectionReason::CmBelowLowerLimit,
        ));
    }
    above.sort_by(|&a, &b| smoothed[b].total_cmp(&smoothed[a]));
    if above.len() < 2 {
        return Ok(DoublePeakVerdict::Single);
    }

    let (first, second) = (above[0], above[1]);
    let tall_enough = smoothed[second] > smoothed[first] / config.doubles_threshold;
    let separation = (window.x[first] - window.x[second]).abs();
    let far_enough = separation > config.doubles_min_separation_nm;
    match (tall_enough, far_enough) {
        (true, true) => Ok(DoublePeakVerdict::Double),
        (true, false) => {
            debug!(
                "Maxima at {:.1} and {:.1} nm pass the height rule but are only {:.1} nm apart, treating as single",
                window.x[first], window.x[second], separation
            );
            Ok(DoublePeakVerdict::Single)
        }
        _ => Ok(DoublePeakVerdict::Single),
    }
}

/// Flags an intermediate peak between the transverse mode and
/// `weird_upper_nm` that outshines the transverse mode by `weird_factor`.
pub fn test_if_weird_peak(
    x: &[f64],
    y: &[f64],
    transverse_nm: f64,
    config: &AnalysisConfig,
    smoother: &ButterworthLowpass,
) -> Result<bool, ProcessingError> {
    let window = truncate(x, y, CLASSIFY_START_NM, config.weird_upper_nm)
        .map_err(classification_error)?;
    let smoothed = smoother.filtfilt(&window.y);
    let Some(trans_idx) = closest_sample(&window.x, transverse_nm) else {
        return Ok(false);
    };
    let trans_height = smoothed[trans_idx];

    let maxima = detect_maxima(&smoothed);
    if maxima.is_empty() {
        return Ok(false);
    }
    let peak_height = maxima
        .iter()
        .map(|&i| smoothed[i])
        .fold(f64::NEG_INFINITY, f64::max);
    let Some((peak_idx, _)) = argmax(&smoothed) else {
        return Ok(false);
    };
    let peak_nm = window.x[peak_idx];

    Ok(peak_height >= trans_height * config.weird_factor && peak_nm > transverse_nm)
}
