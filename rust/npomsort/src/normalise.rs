use dfsignal::extrema::{
    closest_sample,
    nearest_index,
};
use dfsignal::{
    ButterworthLowpass,
    central_difference,
    detect_maxima,
    detect_minima,
    truncate,
};
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::errors::{
    FailureKind,
    ProcessingError,
};

const TRANSVERSE_WINDOW_NM: (f64, f64) = (450.0, 600.0);

/// Affine map applied to every sample of a normalised spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormalisationMap {
    /// Trough before the transverse mode goes to `trough_norm` and the
    /// transverse mode to `trans_norm`.
    Trough {
        trough: f64,
        transverse: f64,
        trough_norm: f64,
        trans_norm: f64,
    },
    /// Smoothed minimum goes to zero and the transverse mode to one.
    Floor { floor: f64, transverse: f64 },
}

impl NormalisationMap {
    pub fn apply(&self, v: f64) -> f64 {
        match *self {
            NormalisationMap::Trough {
                trough,
                transverse,
                trough_norm,
                trans_norm,
            } => (v - trough) / (transverse - trough) * (trans_norm - trough_norm) + trough_norm,
            NormalisationMap::Floor { floor, transverse } => (v - floor) / transverse,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransverseNormalisation {
    pub normalised: Vec<f64>,
    pub transverse_nm: f64,
    /// Smoothed amplitude of the transverse mode before normalisation.
    pub transverse_height: f64,
    /// `(wavelength, amplitude)` of the trough before the transverse mode.
    pub trough: Option<(f64, f64)>,
    pub map: NormalisationMap,
}

impl TransverseNormalisation {
    pub fn apply(&self, v: f64) -> f64 {
        self.map.apply(v)
    }
}

/// Scales a baseline-corrected spectrum so its transverse mode sits at
/// `trans_norm`.
///
/// The transverse mode is the second-derivative minimum of the smoothed
/// 450-600 nm window nearest `init_nm`, unless the amplitude at `init_nm` is
/// more than twice as large, in which case `init_nm` itself is used. The
/// trough is the last smoothed minimum before the transverse mode, or the
/// last second-derivative maximum when there is none.
pub fn normalise_to_transverse(
    x: &[f64],
    y: &[f64],
    init_nm: f64,
    trans_norm: f64,
    trough_norm: f64,
    smoother: &ButterworthLowpass,
) -> Result<TransverseNormalisation, ProcessingError> {
    let norm_err = ProcessingError::signal(FailureKind::Normalisation);
    let window = truncate(x, y, TRANSVERSE_WINDOW_NM.0, TRANSVERSE_WINDOW_NM.1).map_err(norm_err)?;
    let smoothed = smoother.filtfilt(&window.y);
    let d1 = central_difference(&window.x, &smoothed)
        .map_err(ProcessingError::signal(FailureKind::Normalisation))?;
    let d2 = central_difference(&window.x, &d1)
        .map_err(ProcessingError::signal(FailureKind::Normalisation))?;

    let init_idx =
        closest_sample(&window.x, init_nm).ok_or_else(|| ProcessingError::NoMinima {
            kind: FailureKind::Normalisation,
            context: "empty transverse window".to_string(),
        })?;
    let d2_minima = detect_minima(&d2);
    let trans_idx = nearest_index(&window.x, &d2_minima, init_nm).unwrap_or(init_idx);
    let mut transverse_nm = window.x[trans_idx];
    let mut transverse_height = smoothed[trans_idx];
    if smoothed[init_idx] > 2.0 * transverse_height {
        debug!(
            "Amplitude at {} nm dwarfs the curvature minimum at {:.1} nm",
            init_nm, transverse_nm
        );
        transverse_nm = init_nm;
        transverse_height = smoothed[init_idx];
    }

    let before = |idx: &usize| window.x[*idx] < transverse_nm;
    let trough_idx = detect_minima(&smoothed)
        .iter()
        .copied()
        .filter(before)
        .last()
        .or_else(|| detect_maxima(&d2).iter().copied().filter(before).last());
    let trough = trough_idx.map(|i| (window.x[i], smoothed[i]));

    let map = match trough {
        Some((_, a0)) if a0 < transverse_height => NormalisationMap::Trough {
            trough: a0,
            transverse: transverse_height,
            trough_norm,
            trans_norm,
        },
        _ => {
            if !(transverse_height.is_finite() && transverse_height > 0.0) {
                return Err(ProcessingError::DegenerateEstimate {
                    kind: FailureKind::Normalisation,
                    value: transverse_height,
                    context: "transverse amplitude must be positive".to_string(),
                });
            }
            let floor = smoothed.iter().copied().fold(f64::INFINITY, f64::min);
            NormalisationMap::Floor {
                floor,
                transverse: transverse_height,
            }
        }
    };

    Ok(TransverseNormalisation {
        normalised: y.iter().map(|v| map.apply(*v)).collect(),
        transverse_nm,
        transverse_height,
        trough,
        map,
    })
}
