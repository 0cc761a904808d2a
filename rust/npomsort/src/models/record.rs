use dfsignal::GaussPeak;
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;

use crate::errors::FailureKind;

/// Why a spectrum was not accepted as an NPoM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    LowSignal,
    WeakCmRegion,
    JustNoise,
    TooFewPeaks,
    CmBelowLowerLimit,
    CmAboveUpperLimit,
    NoPositivePlPeaks,
    Failed(FailureKind),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::LowSignal => f.write_str("Signal too low"),
            RejectionReason::WeakCmRegion => f.write_str("CM region too weak"),
            RejectionReason::JustNoise => f.write_str("Just noise"),
            RejectionReason::TooFewPeaks => f.write_str("Too few peaks detected"),
            RejectionReason::CmBelowLowerLimit => {
                f.write_str("Spectral maximum below the coupled mode lower limit")
            }
            RejectionReason::CmAboveUpperLimit => {
                f.write_str("Coupled mode above the 900 nm upper limit")
            }
            RejectionReason::NoPositivePlPeaks => f.write_str("No positive PL peaks"),
            RejectionReason::Failed(kind) => write!(f, "Analysis failed during {}", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransverseMode {
    pub wavelength: f64,
    pub intensity_raw: f64,
    pub intensity_norm: f64,
}

/// Coupled mode or weird peak, measured on both the raw and the normalised
/// spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResonancePeak {
    pub wavelength: f64,
    pub intensity_raw: f64,
    pub intensity_norm: f64,
    pub fwhm_raw: Option<f64>,
    pub fwhm_norm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlAnalysis {
    /// Ordered by center.
    pub peaks: Vec<GaussPeak>,
    pub fit: Option<Vec<f64>>,
    pub residual_stddev: Option<f64>,
    pub spectrum: Vec<f64>,
}

impl PlAnalysis {
    pub fn empty(spectrum: Vec<f64>) -> Self {
        Self {
            peaks: Vec::new(),
            fit: None,
            residual_stddev: None,
            spectrum,
        }
    }

    pub fn has_positive_peak(&self) -> bool {
        self.peaks.iter().any(|p| p.height > 0.0)
    }
}

/// Everything learned about one spectrum. Built once by the analyser and
/// not changed afterwards, apart from its position in the batch.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysedRecord {
    pub index: usize,
    #[serde(skip)]
    pub wavelengths: Arc<[f64]>,
    pub is_npom: bool,
    pub rejection_reason: Option<RejectionReason>,
    pub is_double_peak: Option<bool>,
    pub has_weird_peak: Option<bool>,
    pub transverse: Option<TransverseMode>,
    pub coupled: Option<ResonancePeak>,
    pub weird: Option<ResonancePeak>,
    pub intensity_ratio_raw: Option<f64>,
    pub intensity_ratio_norm: Option<f64>,
    pub raw: Vec<f64>,
    pub normalized_spectrum: Option<Vec<f64>>,
    pub pl: Option<PlAnalysis>,
}

impl AnalysedRecord {
    pub fn new(wavelengths: Arc<[f64]>, raw: Vec<f64>) -> Self {
        Self {
            index: 0,
            wavelengths,
            is_npom: false,
            rejection_reason: None,
            is_double_peak: None,
            has_weird_peak: None,
            transverse: None,
            coupled: None,
            weird: None,
            intensity_ratio_raw: None,
            intensity_ratio_norm: None,
            raw,
            normalized_spectrum: None,
            pl: None,
        }
    }

    pub fn failed(wavelengths: Arc<[f64]>, raw: Vec<f64>, kind: FailureKind) -> Self {
        let mut out = Self::new(wavelengths, raw);
        out.rejection_reason = Some(RejectionReason::Failed(kind));
        out
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.rejection_reason, Some(RejectionReason::Failed(_)))
    }

    /// Marks the record as not an NPoM and drops every peak field, the
    /// peak flags and the normalised spectrum. Raw data and PL stay.
    pub fn reject(&mut self, reason: RejectionReason) {
        self.is_npom = false;
        self.rejection_reason = Some(reason);
        self.is_double_peak = None;
        self.has_weird_peak = None;
        self.normalized_spectrum = None;
        self.transverse = None;
        self.coupled = None;
        self.weird = None;
        self.intensity_ratio_raw = None;
        self.intensity_ratio_norm = None;
    }

    pub fn coupled_wavelength(&self) -> Option<f64> {
        self.coupled.map(|c| c.wavelength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_clears_peaks() {
        let x: Arc<[f64]> = Arc::from(vec![500.0, 600.0]);
        let mut rec = AnalysedRecord::new(x, vec![1.0, 2.0]);
        rec.is_npom = true;
        rec.transverse = Some(TransverseMode {
            wavelength: 533.0,
            intensity_raw: 1.0,
            intensity_norm: 1.0,
        });
        rec.intensity_ratio_raw = Some(2.0);
        rec.is_double_peak = Some(false);
        rec.has_weird_peak = Some(true);
        rec.normalized_spectrum = Some(vec![0.5, 1.0]);
        rec.reject(RejectionReason::NoPositivePlPeaks);
        assert!(!rec.is_npom);
        assert!(rec.transverse.is_none());
        assert!(rec.intensity_ratio_raw.is_none());
        assert!(rec.is_double_peak.is_none());
        assert!(rec.has_weird_peak.is_none());
        assert!(rec.normalized_spectrum.is_none());
        assert_eq!(rec.raw, vec![1.0, 2.0]);
        assert_eq!(rec.rejection_reason, Some(RejectionReason::NoPositivePlPeaks));
        assert!(!rec.is_failed());
    }

    #[test]
    fn test_failed_record() {
        let x: Arc<[f64]> = Arc::from(vec![500.0]);
        let rec = AnalysedRecord::failed(x, vec![0.0], FailureKind::Baseline);
        assert!(rec.is_failed());
        assert_eq!(
            rec.rejection_reason.map(|r| r.to_string()),
            Some("Analysis failed during baseline".to_string())
        );
    }
}
