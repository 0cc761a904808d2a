use dfsignal::{
    BaselineConfig,
    ButterworthLowpass,
    CosmicRayParams,
    SmoothingConfig,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::ConfigError;

/// Tunables of the per-spectrum analysis and of the bucket histograms.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum summed signal over 450-900 nm for an NPoM.
    pub npom_signal_lower: f64,
    /// Slant and noise factor of the NPoM test.
    pub npom_threshold: f64,
    pub doubles_threshold: f64,
    pub doubles_min_separation_nm: f64,
    pub weird_factor: f64,
    pub weird_upper_nm: f64,
    pub cm_low_limit_nm: f64,
    pub peak_find_midpoint_nm: f64,
    pub transverse_init_nm: f64,
    pub trans_norm: f64,
    pub trough_norm: f64,
    pub fwhm_factor: f64,
    pub smoothing: SmoothingConfig,
    pub baseline: BaselineConfig,
    pub histogram: HistogramConfig,
    pub pl: PlConfig,
    pub cosmic: CosmicRayParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            npom_signal_lower: 0.05,
            npom_threshold: 1.5,
            doubles_threshold: 2.0,
            doubles_min_separation_nm: 30.0,
            weird_factor: 1.4,
            weird_upper_nm: 670.0,
            cm_low_limit_nm: 600.0,
            peak_find_midpoint_nm: 680.0,
            transverse_init_nm: 533.0,
            trans_norm: 1.0,
            trough_norm: 0.61,
            fwhm_factor: 1.1,
            smoothing: SmoothingConfig::default(),
            baseline: BaselineConfig::default(),
            histogram: HistogramConfig::default(),
            pl: PlConfig::default(),
            cosmic: CosmicRayParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistogramConfig {
    pub num_bins: usize,
    pub start_nm: f64,
    pub end_nm: f64,
    /// Spectra with a normalised intensity ratio at or above this, or a
    /// normalised minimum at or below its negative, are left out.
    pub intensity_ratio_threshold: f64,
    pub min_bin_fraction: f64,
    pub cm_min_nm: f64,
    pub cm_max_nm: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            num_bins: 80,
            start_nm: 450.0,
            end_nm: 987.0,
            intensity_ratio_threshold: 8.0,
            min_bin_fraction: 0.2,
            cm_min_nm: 600.0,
            cm_max_nm: 900.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlConfig {
    pub gauss_max_peaks: usize,
    pub noise_threshold: f64,
    pub fwhm_factor: f64,
    pub noise_window: usize,
    pub range_nm: [f64; 2],
    pub hist_start_nm: f64,
    pub hist_end_nm: f64,
    pub max_restarts: usize,
}

impl Default for PlConfig {
    fn default() -> Self {
        Self {
            gauss_max_peaks: 10,
            noise_threshold: 1.0,
            fwhm_factor: 1.8,
            noise_window: 20,
            range_nm: [540.0, 820.0],
            hist_start_nm: 505.0,
            hist_end_nm: 900.0,
            max_restarts: 3,
        }
    }
}

/// Gold nanoparticle diameters with known peak-finding presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleSize {
    Nm40,
    Nm50,
    Nm60,
    Nm70,
    Nm80,
}

impl ParticleSize {
    /// `(peak_find_midpoint_nm, cm_low_limit_nm)`
    pub fn presets(&self) -> (f64, f64) {
        match self {
            ParticleSize::Nm80 => (680.0, 600.0),
            ParticleSize::Nm70 => (630.0, 580.0),
            ParticleSize::Nm60 => (580.0, 540.0),
            ParticleSize::Nm50 => (550.0, 520.0),
            ParticleSize::Nm40 => (540.0, 500.0),
        }
    }
}

impl TryFrom<u32> for ParticleSize {
    type Error = ConfigError;

    fn try_from(size_nm: u32) -> Result<Self, Self::Error> {
        match size_nm {
            40 => Ok(ParticleSize::Nm40),
            50 => Ok(ParticleSize::Nm50),
            60 => Ok(ParticleSize::Nm60),
            70 => Ok(ParticleSize::Nm70),
            80 => Ok(ParticleSize::Nm80),
            _ => Err(ConfigError::UnknownParticleSize { size_nm }),
        }
    }
}

impl AnalysisConfig {
    pub fn for_particle_size(size_nm: u32) -> Result<Self, ConfigError> {
        let size = ParticleSize::try_from(size_nm)?;
        Ok(Self::default().with_particle_size(size))
    }

    pub fn with_particle_size(mut self, size: ParticleSize) -> Self {
        let (midpoint, cm_low) = size.presets();
        self.peak_find_midpoint_nm = midpoint;
        self.cm_low_limit_nm = cm_low;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("npom_threshold", self.npom_threshold),
            ("doubles_threshold", self.doubles_threshold),
            ("weird_factor", self.weird_factor),
            ("fwhm_factor", self.fwhm_factor),
            ("pl.fwhm_factor", self.pl.fwhm_factor),
        ];
        for (field, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    value,
                    reason: "must be positive",
                });
            }
        }
        if self.trans_norm == self.trough_norm {
            return Err(ConfigError::InvalidValue {
                field: "trough_norm",
                value: self.trough_norm,
                reason: "must differ from trans_norm",
            });
        }
        if self.histogram.num_bins == 0 {
            return Err(ConfigError::InvalidValue {
                field: "histogram.num_bins",
                value: 0.0,
                reason: "need at least one bin",
            });
        }
        if !(self.histogram.start_nm < self.histogram.end_nm) {
            return Err(ConfigError::InvalidValue {
                field: "histogram.start_nm",
                value: self.histogram.start_nm,
                reason: "must be below histogram.end_nm",
            });
        }
        if !(self.pl.hist_start_nm < self.pl.hist_end_nm) {
            return Err(ConfigError::InvalidValue {
                field: "pl.hist_start_nm",
                value: self.pl.hist_start_nm,
                reason: "must be below pl.hist_end_nm",
            });
        }
        if !(self.pl.range_nm[0] < self.pl.range_nm[1]) {
            return Err(ConfigError::InvalidValue {
                field: "pl.range_nm",
                value: self.pl.range_nm[0],
                reason: "lower edge must be below the upper edge",
            });
        }
        if !(self.baseline.p > 0.0 && self.baseline.p < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "baseline.p",
                value: self.baseline.p,
                reason: "must lie in (0, 1)",
            });
        }
        ButterworthLowpass::new(&self.smoothing).map_err(ConfigError::Smoothing)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn test_particle_presets() {
        let cfg = AnalysisConfig::for_particle_size(60).unwrap();
        assert_eq!(cfg.peak_find_midpoint_nm, 580.0);
        assert_eq!(cfg.cm_low_limit_nm, 540.0);
        let cfg = AnalysisConfig::for_particle_size(80).unwrap();
        assert_eq!(cfg, AnalysisConfig::default());
    }

    #[test]
    fn test_unknown_particle_size() {
        match AnalysisConfig::for_particle_size(65) {
            Err(ConfigError::UnknownParticleSize { size_nm }) => assert_eq!(size_nm, 65),
            other => panic!("Expected UnknownParticleSize, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_config_file() {
        let cfg: AnalysisConfig =
            serde_json::from_str(r#"{"doubles_threshold": 3.0, "pl": {"noise_window": 30}}"#)
                .unwrap();
        assert_eq!(cfg.doubles_threshold, 3.0);
        assert_eq!(cfg.pl.noise_window, 30);
        assert_eq!(cfg.pl.gauss_max_peaks, 10);
        assert_eq!(cfg.histogram.num_bins, 80);
    }

    #[test]
    fn test_validate_rejects_bad_cutoff() {
        let mut cfg = AnalysisConfig::default();
        cfg.smoothing.cutoff_hz = 40_000.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Smoothing(_))));
    }
}
