use dfsignal::{
    ButterworthLowpass,
    remove_baseline,
};
use std::sync::Arc;
use tracing::{
    debug,
    warn,
};

use crate::classify::{
    CLASSIFY_END_NM,
    DoublePeakVerdict,
    test_if_double,
    test_if_npom,
    test_if_weird_peak,
};
use crate::config::AnalysisConfig;
use crate::errors::{
    ConfigError,
    FailureKind,
    ProcessingError,
};
use crate::models::{
    AnalysedRecord,
    PlAnalysis,
    RejectionReason,
    ResonancePeak,
    TransverseMode,
};
use crate::normalise::normalise_to_transverse;
use crate::peaks::{
    FwhmEstimate,
    find_main_peaks,
};
use crate::pl::decompose;

/// A co-measured photoluminescence spectrum and its own wavelength axis.
#[derive(Debug, Clone, Copy)]
pub struct PlSpectrum<'a> {
    pub wavelengths: &'a [f64],
    pub intensities: &'a [f64],
}

/// Runs the full per-spectrum pipeline with one validated configuration.
///
/// The analyser holds no mutable state, so one instance can be shared by
/// every spectrum of a batch (and across threads).
#[derive(Debug, Clone)]
pub struct SpectrumAnalyser {
    config: AnalysisConfig,
    smoother: ButterworthLowpass,
}

impl SpectrumAnalyser {
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let smoother = ButterworthLowpass::new(&config.smoothing).map_err(ConfigError::Smoothing)?;
        Ok(Self { config, smoother })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn smoother(&self) -> &ButterworthLowpass {
        &self.smoother
    }

    /// Analyses one cleaned dark-field spectrum. Never fails: processing
    /// errors come back as a record rejected with [`FailureKind`].
    pub fn analyse_spectrum(&self, wavelengths: &Arc<[f64]>, y: &[f64]) -> AnalysedRecord {
        self.analyse_with_pl(wavelengths, y, None)
    }

    pub fn analyse_with_pl(
        &self,
        wavelengths: &Arc<[f64]>,
        y: &[f64],
        pl: Option<PlSpectrum<'_>>,
    ) -> AnalysedRecord {
        let out = self.run(wavelengths, y, false).map(|mut rec| {
            if let (true, Some(pl)) = (rec.is_npom, pl) {
                self.attach_pl(&mut rec, pl);
            }
            rec
        });
        self.finish(out, wavelengths, y)
    }

    /// Same pipeline with the NPoM trials skipped, for bin-averaged spectra.
    pub fn analyse_representative(&self, wavelengths: &Arc<[f64]>, y: &[f64]) -> AnalysedRecord {
        let out = self.run(wavelengths, y, true);
        self.finish(out, wavelengths, y)
    }

    fn finish(
        &self,
        out: Result<AnalysedRecord, ProcessingError>,
        wavelengths: &Arc<[f64]>,
        y: &[f64],
    ) -> AnalysedRecord {
        match out {
            Ok(rec) => rec,
            Err(e) => {
                debug!("Spectrum analysis failed: {}", e);
                AnalysedRecord::failed(wavelengths.clone(), y.to_vec(), e.kind())
            }
        }
    }

    fn run(
        &self,
        wavelengths: &Arc<[f64]>,
        y: &[f64],
        bypass_npom_tests: bool,
    ) -> Result<AnalysedRecord, ProcessingError> {
        let cfg = &self.config;
        let x: &[f64] = wavelengths;
        let mut rec = AnalysedRecord::new(wavelengths.clone(), y.to_vec());

        let pre = remove_baseline(x, y, &self.smoother, &cfg.baseline)
            .map_err(ProcessingError::signal(FailureKind::Baseline))?;

        let double = if bypass_npom_tests {
            match test_if_double(x, y, cfg, &self.smoother)? {
                DoublePeakVerdict::Double => true,
                DoublePeakVerdict::Single => false,
                DoublePeakVerdict::Rejected(reason) => {
                    debug!("Representative spectrum would be rejected: {}", reason);
                    false
                }
            }
        } else {
            let npom_reason = test_if_npom(x, &pre, cfg, &self.smoother)?;
            let verdict = test_if_double(x, y, cfg, &self.smoother)?;
            match (npom_reason, verdict) {
                (Some(reason), _) | (None, DoublePeakVerdict::Rejected(reason)) => {
                    rec.reject(reason);
                    return Ok(rec);
                }
                (None, DoublePeakVerdict::Double) => true,
                (None, DoublePeakVerdict::Single) => false,
            }
        };
        rec.is_npom = true;
        rec.is_double_peak = Some(double);

        let norm = normalise_to_transverse(
            x,
            &pre,
            cfg.transverse_init_nm,
            cfg.trans_norm,
            cfg.trough_norm,
            &self.smoother,
        )?;
        let transverse = TransverseMode {
            wavelength: norm.transverse_nm,
            intensity_raw: norm.transverse_height,
            intensity_norm: cfg.trans_norm,
        };

        let weird = test_if_weird_peak(x, y, transverse.wavelength, cfg, &self.smoother)?;
        rec.has_weird_peak = Some(weird);

        let raw_peaks = find_main_peaks(
            x,
            y,
            weird,
            cfg.peak_find_midpoint_nm,
            cfg.fwhm_factor,
            &self.smoother,
        )?;
        let norm_peaks = find_main_peaks(
            x,
            &norm.normalised,
            weird,
            cfg.peak_find_midpoint_nm,
            cfg.fwhm_factor,
            &self.smoother,
        )?;

        let cm_nm = raw_peaks.coupled.center;
        if cm_nm.is_finite() && cm_nm <= cfg.cm_low_limit_nm {
            debug!("Coupled mode at {:.1} nm is below the lower limit", cm_nm);
            rec.reject(RejectionReason::CmBelowLowerLimit);
            return Ok(rec);
        }
        if !(cm_nm <= CLASSIFY_END_NM) {
            debug!("Coupled mode at {:.1} nm is above {} nm", cm_nm, CLASSIFY_END_NM);
            rec.reject(RejectionReason::CmAboveUpperLimit);
            return Ok(rec);
        }

        let mut coupled = resonance(&raw_peaks.coupled, &norm_peaks.coupled);
        if double {
            coupled.fwhm_raw = None;
            coupled.fwhm_norm = None;
        }
        rec.weird = match (raw_peaks.weird, norm_peaks.weird) {
            (Some(r), Some(n)) => Some(resonance(&r, &n)),
            (Some(r), None) => {
                debug!("Weird peak at {:.1} nm not resolved after normalisation", r.center);
                Some(ResonancePeak {
                    wavelength: r.center,
                    intensity_raw: r.height,
                    intensity_norm: norm.apply(r.height),
                    fwhm_raw: Some(r.fwhm),
                    fwhm_norm: None,
                })
            }
            _ => None,
        };

        rec.intensity_ratio_raw = Some(coupled.intensity_raw / transverse.intensity_raw);
        rec.intensity_ratio_norm = Some(coupled.intensity_norm / transverse.intensity_norm);
        rec.transverse = Some(transverse);
        rec.coupled = Some(coupled);
        rec.normalized_spectrum = Some(norm.normalised);
        Ok(rec)
    }

    fn attach_pl(&self, rec: &mut AnalysedRecord, pl: PlSpectrum<'_>) {
        let pl_config = &self.config.pl;
        let analysis = match decompose(pl.wavelengths, pl.intensities, pl_config, &self.smoother) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("PL decomposition failed, keeping no peaks: {}", e);
                PlAnalysis::empty(pl.intensities.to_vec())
            }
        };
        let positive = analysis.has_positive_peak();
        rec.pl = Some(analysis);
        if !positive {
            rec.reject(RejectionReason::NoPositivePlPeaks);
        }
    }
}

fn resonance(raw: &FwhmEstimate, norm: &FwhmEstimate) -> ResonancePeak {
    ResonancePeak {
        wavelength: raw.center,
        intensity_raw: raw.height,
        intensity_norm: norm.height,
        fwhm_raw: Some(raw.fwhm),
        fwhm_norm: Some(norm.fwhm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfsignal::gaussian::gaussian;

    fn axis() -> Arc<[f64]> {
        (0..1000)
            .map(|i| 400.0 + 600.0 * i as f64 / 999.0)
            .collect()
    }

    fn analyser() -> SpectrumAnalyser {
        SpectrumAnalyser::new(AnalysisConfig::default()).unwrap()
    }

    fn classic(x: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&v| gaussian(v, 1.0, 533.0, 30.0) + gaussian(v, 2.0, 720.0, 80.0) + 0.01)
            .collect()
    }

    #[test]
    fn test_ratio_uses_record_fields() {
        let x = axis();
        let rec = analyser().analyse_spectrum(&x, &classic(&x));
        assert!(rec.is_npom, "{:?}", rec.rejection_reason);
        let t = rec.transverse.unwrap();
        let c = rec.coupled.unwrap();
        assert_eq!(rec.intensity_ratio_raw, Some(c.intensity_raw / t.intensity_raw));
        assert_eq!(rec.intensity_ratio_norm, Some(c.intensity_norm / t.intensity_norm));
        assert_eq!(t.intensity_norm, 1.0);
    }

    #[test]
    fn test_rejected_record_has_no_peaks() {
        let x = axis();
        let rec = analyser().analyse_spectrum(&x, &vec![0.0001; x.len()]);
        assert!(!rec.is_npom);
        assert_eq!(rec.rejection_reason, Some(RejectionReason::LowSignal));
        assert!(rec.transverse.is_none());
        assert!(rec.coupled.is_none());
        assert!(rec.weird.is_none());
        assert!(rec.intensity_ratio_raw.is_none());
        assert!(rec.normalized_spectrum.is_none());
    }

    #[test]
    fn test_empty_pl_rejects() {
        let x = axis();
        let pl = vec![0.0; x.len()];
        let rec = analyser().analyse_with_pl(
            &x,
            &classic(&x),
            Some(PlSpectrum {
                wavelengths: &x,
                intensities: &pl,
            }),
        );
        assert!(!rec.is_npom);
        assert_eq!(rec.rejection_reason, Some(RejectionReason::NoPositivePlPeaks));
        assert!(rec.coupled.is_none());
        assert!(rec.pl.as_ref().is_some_and(|p| p.peaks.is_empty()));
    }

    #[test]
    fn test_representative_skips_npom_trials() {
        let x = axis();
        // Transverse-dominated: rejected as a weak CM region, still measurable.
        let y: Vec<f64> = x
            .iter()
            .map(|&v| gaussian(v, 5.0, 533.0, 30.0) + gaussian(v, 1.0, 720.0, 80.0))
            .collect();
        let a = analyser();
        assert_eq!(
            a.analyse_spectrum(&x, &y).rejection_reason,
            Some(RejectionReason::WeakCmRegion)
        );
        let rec = a.analyse_representative(&x, &y);
        assert!(rec.is_npom, "{:?}", rec.rejection_reason);
        assert!((rec.coupled_wavelength().unwrap() - 720.0).abs() < 5.0);
    }

    #[test]
    fn test_coupled_mode_beyond_900_nm_rejected() {
        let x = axis();
        let y: Vec<f64> = classic(&x)
            .into_iter()
            .zip(x.iter())
            .map(|(v, &w)| v + gaussian(w, 3.0, 960.0, 30.0))
            .collect();
        let rec = analyser().analyse_spectrum(&x, &y);
        assert!(!rec.is_npom);
        assert_eq!(rec.rejection_reason, Some(RejectionReason::CmAboveUpperLimit));
        assert!(rec.coupled.is_none());
        assert!(rec.is_double_peak.is_none());
        assert!(rec.has_weird_peak.is_none());
        assert!(rec.normalized_spectrum.is_none());
    }

    #[test]
    fn test_pl_rejection_clears_flags_and_normalisation() {
        let x = axis();
        let pl = vec![0.0; x.len()];
        let rec = analyser().analyse_with_pl(
            &x,
            &classic(&x),
            Some(PlSpectrum {
                wavelengths: &x,
                intensities: &pl,
            }),
        );
        assert!(rec.is_double_peak.is_none());
        assert!(rec.has_weird_peak.is_none());
        assert!(rec.normalized_spectrum.is_none());
        assert_eq!(rec.raw.len(), x.len());
        assert!(rec.pl.is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = AnalysisConfig::default();
        cfg.trough_norm = cfg.trans_norm;
        assert!(SpectrumAnalyser::new(cfg).is_err());
    }
}
