//! Coupled-mode histograms and bin-averaged representative spectra.

use dfsignal::baseline::band_indices;
use dfsignal::extrema::{
    argmax,
    detect_maxima,
};
use dfsignal::gaussian::{
    GaussPeak,
    fit_gaussian,
    fit_gaussians,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::analysis::SpectrumAnalyser;
use crate::config::HistogramConfig;
use crate::models::{
    AnalysedRecord,
    BucketName,
    Buckets,
};

/// Band over which a normalised spectrum must stay above `-threshold`.
const SANITY_BAND_NM: (f64, f64) = (450.0, 900.0);
/// Oversampling of the PL weight distribution before peak picking.
const PL_FINE_FACTOR: usize = 10;

/// Uniform bins over `[start, end]`; the last bin is closed on the right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bins {
    pub edges: Vec<f64>,
}

impl Bins {
    pub fn uniform(start: f64, end: f64, k: usize) -> Self {
        let width = (end - start) / k as f64;
        Self {
            edges: (0..=k).map(|i| start + i as f64 * width).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> f64 {
        match self.len() {
            0 => 0.0,
            k => (self.edges[k] - self.edges[0]) / k as f64,
        }
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    pub fn index_of(&self, v: f64) -> Option<usize> {
        let k = self.len();
        if k == 0 || !v.is_finite() {
            return None;
        }
        let (start, end) = (self.edges[0], self.edges[k]);
        if v < start || v > end {
            return None;
        }
        Some((((v - start) / self.width()).floor() as usize).min(k - 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountFit {
    pub center: f64,
    pub center_stderr: Option<f64>,
    pub fwhm: f64,
    pub sigma: f64,
    /// Fitted counts at the bin centers.
    pub curve: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Representative {
    pub bin: usize,
    pub record: AnalysedRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    /// Mean normalised spectrum per bin; zeros for empty bins.
    pub binned_mean: Vec<Vec<f64>>,
    pub binned_mean_raw: Vec<Vec<f64>>,
    pub fit: Option<CountFit>,
    pub modal: Option<Representative>,
    pub average: Option<Representative>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Bin of the coupled mode when the record is clean enough to histogram.
fn qualifying_bin(rec: &AnalysedRecord, cfg: &HistogramConfig, bins: &Bins) -> Option<usize> {
    let cm = rec.coupled_wavelength()?;
    if !(cm > cfg.cm_min_nm && cm < cfg.cm_max_nm) {
        return None;
    }
    let ratio = rec.intensity_ratio_norm?;
    if !(ratio < cfg.intensity_ratio_threshold) {
        return None;
    }
    let norm = rec.normalized_spectrum.as_ref()?;
    let (lo, hi) = band_indices(&rec.wavelengths, SANITY_BAND_NM)?;
    let floor = norm[lo..=hi].iter().copied().fold(f64::INFINITY, f64::min);
    if !(floor > -cfg.intensity_ratio_threshold) {
        return None;
    }
    bins.index_of(cm)
}

struct BinAccumulator {
    counts: Vec<usize>,
    sums: Vec<Vec<f64>>,
    sums_raw: Vec<Vec<f64>>,
}

impl BinAccumulator {
    fn new(k: usize, n: usize) -> Self {
        Self {
            counts: vec![0; k],
            sums: vec![vec![0.0; n]; k],
            sums_raw: vec![vec![0.0; n]; k],
        }
    }

    fn add(&mut self, bin: usize, norm: &[f64], raw: &[f64]) {
        self.counts[bin] += 1;
        self.sums[bin]
            .iter_mut()
            .zip(norm)
            .for_each(|(s, v)| *s += v);
        self.sums_raw[bin]
            .iter_mut()
            .zip(raw)
            .for_each(|(s, v)| *s += v);
    }

    fn means(self) -> (Vec<usize>, Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let divide = |sums: Vec<Vec<f64>>, counts: &[usize]| -> Vec<Vec<f64>> {
            sums.into_iter()
                .zip(counts)
                .map(|(mut s, &c)| {
                    if c > 0 {
                        s.iter_mut().for_each(|v| *v /= c as f64);
                    }
                    s
                })
                .collect()
        };
        let mean = divide(self.sums, &self.counts);
        let mean_raw = divide(self.sums_raw, &self.counts);
        (self.counts, mean, mean_raw)
    }
}

/// Histogram of coupled-mode wavelengths over `members`, with the modal and
/// average bins re-analysed as representative spectra.
///
/// An empty or unqualified bucket yields zero counts and no fit.
pub fn build_histogram(
    wavelengths: &Arc<[f64]>,
    members: &[&AnalysedRecord],
    analyser: &SpectrumAnalyser,
) -> Histogram {
    let cfg = &analyser.config().histogram;
    let bins = Bins::uniform(cfg.start_nm, cfg.end_nm, cfg.num_bins);
    let mut acc = BinAccumulator::new(bins.len(), wavelengths.len());
    for rec in members {
        let Some(bin) = qualifying_bin(rec, cfg, &bins) else {
            continue;
        };
        if let Some(norm) = rec.normalized_spectrum.as_ref() {
            acc.add(bin, norm, &rec.raw);
        }
    }
    let (counts, binned_mean, binned_mean_raw) = acc.means();

    let centers = bins.centers();
    let weights: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    let fit = if counts.iter().any(|&c| c > 0) {
        match fit_gaussian(&centers, &weights) {
            Ok(f) => Some(CountFit {
                center: f.center,
                center_stderr: f.center_stderr,
                fwhm: f.fwhm,
                sigma: f.sigma,
                curve: f.curve,
            }),
            Err(e) => {
                debug!("Histogram fit failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let represent = |bin: usize| -> Option<Representative> {
        if counts[bin] == 0 {
            return None;
        }
        Some(Representative {
            bin,
            record: analyser.analyse_representative(wavelengths, &binned_mean[bin]),
        })
    };
    let modal = argmax(&weights)
        .filter(|(_, v)| *v > 0.0)
        .and_then(|(bin, _)| represent(bin));
    let average = fit
        .as_ref()
        .and_then(|f| bins.index_of(f.center))
        .and_then(represent);

    Histogram {
        edges: bins.edges,
        counts,
        binned_mean,
        binned_mean_raw,
        fit,
        modal,
        average,
    }
}

/// One histogram per NPoM bucket, built in parallel and keyed in bucket order.
pub fn build_histograms(
    wavelengths: &Arc<[f64]>,
    records: &[AnalysedRecord],
    buckets: &Buckets,
    analyser: &SpectrumAnalyser,
) -> BTreeMap<BucketName, Histogram> {
    BucketName::NPOM_SUBSETS
        .par_iter()
        .map(|&name| {
            let members: Vec<&AnalysedRecord> =
                buckets.get(name).iter().map(|&i| &records[i]).collect();
            (name, build_histogram(wavelengths, &members, analyser))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PlHistogram {
    pub edges: Vec<f64>,
    /// Summed peak heights, each divided by its record's peak count.
    pub weights: Vec<f64>,
    /// Records with at least one peak center in the bin.
    pub counts: Vec<usize>,
    pub binned_mean: Vec<Vec<f64>>,
    pub peaks: Option<Vec<GaussPeak>>,
}

/// Distribution of PL peak centers over `members`.
pub fn build_pl_histogram(
    members: &[&AnalysedRecord],
    analyser: &SpectrumAnalyser,
) -> PlHistogram {
    let pl_cfg = &analyser.config().pl;
    let bins = Bins::uniform(
        pl_cfg.hist_start_nm,
        pl_cfg.hist_end_nm,
        analyser.config().histogram.num_bins,
    );
    let k = bins.len();
    let n = members
        .iter()
        .filter_map(|r| r.pl.as_ref())
        .map(|pl| pl.spectrum.len())
        .next()
        .unwrap_or(0);

    let mut weights = vec![0.0; k];
    let mut counts = vec![0usize; k];
    let mut sums = vec![vec![0.0; n]; k];
    for pl in members.iter().filter_map(|r| r.pl.as_ref()) {
        if pl.peaks.is_empty() {
            continue;
        }
        let share = pl.peaks.len() as f64;
        let mut touched = vec![false; k];
        for peak in &pl.peaks {
            if !(peak.center >= pl_cfg.range_nm[0] && peak.center <= pl_cfg.range_nm[1]) {
                continue;
            }
            if let Some(bin) = bins.index_of(peak.center) {
                weights[bin] += peak.height / share;
                touched[bin] = true;
            }
        }
        for bin in (0..k).filter(|&b| touched[b]) {
            counts[bin] += 1;
            sums[bin]
                .iter_mut()
                .zip(pl.spectrum.iter())
                .for_each(|(s, v)| *s += v);
        }
    }
    let binned_mean = sums
        .into_iter()
        .zip(counts.iter())
        .map(|(mut s, &c)| {
            if c > 0 {
                s.iter_mut().for_each(|v| *v /= c as f64);
            }
            s
        })
        .collect();

    let peaks = fit_pl_distribution(&bins, &weights, analyser);
    PlHistogram {
        edges: bins.edges,
        weights,
        counts,
        binned_mean,
        peaks,
    }
}

/// Sum-of-Gaussians fit seeded from the maxima of the smoothed, oversampled
/// weight distribution that reach `min_bin_fraction` of its peak.
fn fit_pl_distribution(
    bins: &Bins,
    weights: &[f64],
    analyser: &SpectrumAnalyser,
) -> Option<Vec<GaussPeak>> {
    if !weights.iter().any(|w| *w > 0.0) {
        return None;
    }
    let centers = bins.centers();
    let fine_n = centers.len() * PL_FINE_FACTOR;
    let (lo, hi) = (centers[0], centers[centers.len() - 1]);
    let fine_x: Vec<f64> = (0..fine_n)
        .map(|i| lo + (hi - lo) * i as f64 / (fine_n - 1).max(1) as f64)
        .collect();
    let fine_y: Vec<f64> = fine_x
        .iter()
        .map(|&v| interpolate(&centers, weights, v))
        .collect();
    let smoothed = analyser.smoother().filtfilt(&fine_y);

    let top = smoothed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let cutoff = top * analyser.config().histogram.min_bin_fraction;
    let seeds: Vec<GaussPeak> = detect_maxima(&smoothed)
        .into_iter()
        .filter(|&i| smoothed[i] > cutoff)
        .map(|i| GaussPeak::new(smoothed[i], fine_x[i], 4.0 * bins.width()))
        .collect();
    if seeds.is_empty() {
        debug!("No seed for the PL histogram fit");
        return None;
    }
    match fit_gaussians(&centers, weights, &seeds) {
        Ok(peaks) => Some(peaks),
        Err(e) => {
            debug!("PL histogram fit failed: {}", e);
            None
        }
    }
}

fn interpolate(xs: &[f64], ys: &[f64], v: f64) -> f64 {
    match xs.iter().position(|x| *x >= v) {
        None => ys[ys.len() - 1],
        Some(0) => ys[0],
        Some(i) => {
            let t = (v - xs[i - 1]) / (xs[i] - xs[i - 1]);
            ys[i - 1] + t * (ys[i] - ys[i - 1])
        }
    }
}

/// One PL histogram per NPoM bucket.
pub fn build_pl_histograms(
    records: &[AnalysedRecord],
    buckets: &Buckets,
    analyser: &SpectrumAnalyser,
) -> BTreeMap<BucketName, PlHistogram> {
    BucketName::NPOM_SUBSETS
        .par_iter()
        .map(|&name| {
            let members: Vec<&AnalysedRecord> =
                buckets.get(name).iter().map(|&i| &records[i]).collect();
            (name, build_pl_histogram(&members, analyser))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::models::{
        PlAnalysis,
        ResonancePeak,
    };

    fn axis() -> Arc<[f64]> {
        (0..1000)
            .map(|i| 400.0 + 600.0 * i as f64 / 999.0)
            .collect()
    }

    fn synthetic(x: &Arc<[f64]>, cm: f64, ratio: f64, level: f64) -> AnalysedRecord {
        let mut rec = AnalysedRecord::new(x.clone(), vec![level; x.len()]);
        rec.is_npom = true;
        rec.coupled = Some(ResonancePeak {
            wavelength: cm,
            intensity_raw: ratio,
            intensity_norm: ratio,
            fwhm_raw: None,
            fwhm_norm: None,
        });
        rec.intensity_ratio_norm = Some(ratio);
        rec.normalized_spectrum = Some(vec![level; x.len()]);
        rec
    }

    #[test]
    fn test_bins() {
        let bins = Bins::uniform(450.0, 987.0, 80);
        assert_eq!(bins.len(), 80);
        assert_eq!(bins.index_of(450.0), Some(0));
        assert_eq!(bins.index_of(987.0), Some(79));
        assert_eq!(bins.index_of(449.9), None);
        assert_eq!(bins.index_of(f64::NAN), None);
    }

    #[test]
    fn test_counts_and_means() {
        let x = axis();
        let analyser = SpectrumAnalyser::new(AnalysisConfig::default()).unwrap();
        let records = [
            synthetic(&x, 700.0, 1.5, 1.0),
            synthetic(&x, 700.5, 1.5, 3.0),
            synthetic(&x, 750.0, 1.5, 5.0),
            // Filtered: ratio too high, coupled mode out of range.
            synthetic(&x, 720.0, 9.0, 1.0),
            synthetic(&x, 950.0, 1.5, 1.0),
        ];
        let members: Vec<&AnalysedRecord> = records.iter().collect();
        let hist = build_histogram(&x, &members, &analyser);
        assert_eq!(hist.total(), 3);

        let bins = Bins::uniform(450.0, 987.0, 80);
        let b = bins.index_of(700.0).unwrap();
        assert_eq!(hist.counts[b], 2);
        assert!(hist.binned_mean[b].iter().all(|v| (v - 2.0).abs() < 1e-12));
        assert!(hist.binned_mean_raw[b].iter().all(|v| (v - 2.0).abs() < 1e-12));
        assert_eq!(hist.modal.as_ref().map(|m| m.bin), Some(b));
    }

    #[test]
    fn test_empty_bucket() {
        let x = axis();
        let analyser = SpectrumAnalyser::new(AnalysisConfig::default()).unwrap();
        let hist = build_histogram(&x, &[], &analyser);
        assert_eq!(hist.total(), 0);
        assert_eq!(hist.counts.len(), 80);
        assert!(hist.fit.is_none());
        assert!(hist.modal.is_none());
        assert!(hist.average.is_none());
    }

    #[test]
    fn test_pl_histogram_weights() {
        let x = axis();
        let analyser = SpectrumAnalyser::new(AnalysisConfig::default()).unwrap();
        let mut rec = AnalysedRecord::new(x.clone(), vec![0.0; x.len()]);
        rec.pl = Some(PlAnalysis {
            peaks: vec![
                GaussPeak::new(1.0, 600.0, 30.0),
                GaussPeak::new(0.5, 700.0, 30.0),
                // Outside the PL range: ignored but still counts as a peak.
                GaussPeak::new(2.0, 850.0, 30.0),
            ],
            fit: None,
            residual_stddev: None,
            spectrum: vec![1.0; x.len()],
        });
        let hist = build_pl_histogram(&[&rec], &analyser);
        let total: f64 = hist.weights.iter().sum();
        assert!((total - 0.5).abs() < 1e-12);
        assert_eq!(hist.counts.iter().sum::<usize>(), 2);
    }
}
