use dfsignal::nan::repair_nans_in_place;
use dfsignal::{
    CosmicRayParams,
    remove_cosmic_rays,
    repair_nans,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::analysis::{
    PlSpectrum,
    SpectrumAnalyser,
};
use crate::data_sources::nullable;
use crate::errors::{
    FailureKind,
    InvalidInputError,
    ProcessingError,
};
use crate::histogram::{
    Histogram,
    PlHistogram,
    build_histograms,
    build_pl_histograms,
};
use crate::models::{
    AnalysedRecord,
    BucketName,
    BucketSummary,
    Buckets,
};

/// Background and white-reference spectra shared by a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calibration {
    #[serde(deserialize_with = "nullable::spectrum")]
    pub background: Vec<f64>,
    #[serde(deserialize_with = "nullable::spectrum")]
    pub reference: Vec<f64>,
}

impl Calibration {
    /// `(raw - background) / reference` with gaps repaired and spikes removed.
    ///
    /// Expects a calibration that went through [`BatchInput::validate`].
    pub fn clean(
        &self,
        x: &[f64],
        raw: &[f64],
        params: &CosmicRayParams,
    ) -> Result<Vec<f64>, ProcessingError> {
        let y = repair_nans(raw).map_err(ProcessingError::signal(FailureKind::Cleaning))?;
        let corrected: Vec<f64> = y
            .iter()
            .zip(self.background.iter().zip(self.reference.iter()))
            .map(|(v, (bg, r))| (v - bg) / r)
            .collect();
        remove_cosmic_rays(x, &corrected, Some(&self.reference), params)
            .map_err(ProcessingError::signal(FailureKind::Cleaning))
    }
}

fn clean_uncalibrated(
    x: &[f64],
    raw: &[f64],
    params: &CosmicRayParams,
) -> Result<Vec<f64>, ProcessingError> {
    let y = repair_nans(raw).map_err(ProcessingError::signal(FailureKind::Cleaning))?;
    remove_cosmic_rays(x, &y, None, params).map_err(ProcessingError::signal(FailureKind::Cleaning))
}

/// Photoluminescence spectra measured alongside the dark-field ones, one per
/// dark-field spectrum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlInput {
    pub wavelengths: Vec<f64>,
    #[serde(deserialize_with = "nullable::spectra")]
    pub spectra: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchInput {
    pub wavelengths: Arc<[f64]>,
    #[serde(deserialize_with = "nullable::spectra")]
    pub spectra: Vec<Vec<f64>>,
    #[serde(default)]
    pub calibration: Option<Calibration>,
    #[serde(default)]
    pub misaligned_indices: Vec<usize>,
    #[serde(default)]
    pub pl: Option<PlInput>,
}

/// Checks a wavelength axis and returns whether it is descending.
fn check_axis(x: &[f64]) -> Result<bool, InvalidInputError> {
    if x.is_empty() {
        return Err(InvalidInputError::EmptyWavelengths);
    }
    for (index, &v) in x.iter().enumerate() {
        if !v.is_finite() {
            return Err(InvalidInputError::NonFiniteWavelength { index });
        }
        if v <= 0.0 {
            return Err(InvalidInputError::NonPositiveWavelength { index, value: v });
        }
    }
    let descending = x.len() > 1 && x[1] < x[0];
    for (i, w) in x.windows(2).enumerate() {
        let ok = if descending { w[1] < w[0] } else { w[1] > w[0] };
        if !ok {
            return Err(InvalidInputError::NonMonotonicWavelengths { index: i + 1 });
        }
    }
    Ok(descending)
}

fn check_spectrum(
    y: &[f64],
    n: usize,
    what: &'static str,
    index: usize,
) -> Result<(), InvalidInputError> {
    if y.len() != n {
        return Err(InvalidInputError::LengthMismatch {
            what,
            index: Some(index),
            expected: n,
            got: y.len(),
        });
    }
    if !y.iter().any(|v| v.is_finite()) {
        return Err(InvalidInputError::AllNanSpectrum { what, index });
    }
    Ok(())
}

impl BatchInput {
    pub fn new(wavelengths: Vec<f64>, spectra: Vec<Vec<f64>>) -> Self {
        Self {
            wavelengths: wavelengths.into(),
            spectra,
            calibration: None,
            misaligned_indices: Vec::new(),
            pl: None,
        }
    }

    pub fn with_calibration(mut self, background: Vec<f64>, reference: Vec<f64>) -> Self {
        self.calibration = Some(Calibration {
            background,
            reference,
        });
        self
    }

    pub fn with_misaligned(mut self, indices: Vec<usize>) -> Self {
        self.misaligned_indices = indices;
        self
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Structural checks that must hold before any spectrum is analysed.
    ///
    /// On success the calibration has its gaps repaired and every array is
    /// in ascending wavelength order (descending inputs are reversed).
    pub fn validate(&mut self) -> Result<(), InvalidInputError> {
        if self.spectra.is_empty() {
            return Err(InvalidInputError::EmptyBatch);
        }
        let descending = check_axis(&self.wavelengths)?;
        let n = self.wavelengths.len();
        for (i, y) in self.spectra.iter().enumerate() {
            check_spectrum(y, n, "spectrum", i)?;
        }

        if let Some(cal) = self.calibration.as_mut() {
            check_spectrum(&cal.background, n, "background", 0)?;
            check_spectrum(&cal.reference, n, "reference", 0)?;
            let repair = |v: &mut [f64], what: &'static str| {
                repair_nans_in_place(v)
                    .map_err(|_| InvalidInputError::AllNanSpectrum { what, index: 0 })
            };
            repair(&mut cal.background, "background")?;
            repair(&mut cal.reference, "reference")?;
            if let Some((index, &value)) = cal.reference.iter().enumerate().find(|(_, v)| **v <= 0.0)
            {
                return Err(InvalidInputError::NonPositiveReference { index, value });
            }
        }

        let batch_size = self.spectra.len();
        if let Some(&index) = self.misaligned_indices.iter().find(|&&i| i >= batch_size) {
            return Err(InvalidInputError::MisalignedIndexOutOfRange { index, batch_size });
        }

        let mut pl_descending = false;
        if let Some(pl) = self.pl.as_ref() {
            if pl.spectra.len() != batch_size {
                return Err(InvalidInputError::LengthMismatch {
                    what: "pl spectra",
                    index: None,
                    expected: batch_size,
                    got: pl.spectra.len(),
                });
            }
            pl_descending = check_axis(&pl.wavelengths)?;
            for (i, y) in pl.spectra.iter().enumerate() {
                check_spectrum(y, pl.wavelengths.len(), "pl spectrum", i)?;
            }
        }

        if descending {
            info!("Wavelength axis is descending, reversing every spectrum");
            self.wavelengths = self.wavelengths.iter().rev().copied().collect();
            self.spectra.iter_mut().for_each(|y| y.reverse());
            if let Some(cal) = self.calibration.as_mut() {
                cal.background.reverse();
                cal.reference.reverse();
            }
        }
        if let (true, Some(pl)) = (pl_descending, self.pl.as_mut()) {
            info!("PL wavelength axis is descending, reversing every PL spectrum");
            pl.wavelengths.reverse();
            pl.spectra.iter_mut().for_each(|y| y.reverse());
        }
        Ok(())
    }
}

/// Receives batch progress. Reports arrive in 5 % steps.
pub trait ProgressPort: Sync {
    fn start(&self, _total: usize) {}
    fn report(&self, done: usize, total: usize);
    fn finish(&self) {}
}

/// Logs progress at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressPort for TracingProgress {
    fn report(&self, done: usize, total: usize) {
        info!(
            "Analysed {}/{} spectra ({:.0}%)",
            done,
            total,
            100.0 * done as f64 / total.max(1) as f64
        );
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub histograms: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { histograms: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub records: Vec<AnalysedRecord>,
    pub buckets: Buckets,
    pub histograms: BTreeMap<BucketName, Histogram>,
    pub pl_histograms: BTreeMap<BucketName, PlHistogram>,
    pub summaries: BTreeMap<BucketName, BucketSummary>,
    /// Set when the run stopped early; `records` then holds a prefix.
    pub cancelled: bool,
}

/// Cleans, analyses and sorts every spectrum of `input`.
///
/// Spectra are processed one at a time in input order. `cancel` is checked
/// before each spectrum; once set, the records finished so far are sorted
/// and returned with `cancelled` set. Only structural problems with the
/// input are errors; per-spectrum failures land in the `Failed` bucket.
pub fn run_batch(
    mut input: BatchInput,
    analyser: &SpectrumAnalyser,
    progress: &dyn ProgressPort,
    cancel: &AtomicBool,
    options: BatchOptions,
) -> Result<BatchResult, InvalidInputError> {
    input.validate()?;
    let x = input.wavelengths.clone();
    let total = input.len();
    let cosmic = &analyser.config().cosmic;

    progress.start(total);
    let mut records = Vec::with_capacity(total);
    let mut cancelled = false;
    // Reports land on whole 5 % steps of the batch.
    let mut last_step = 0;
    let mut last_reported = 0;
    for (i, raw) in input.spectra.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!("Batch cancelled after {} of {} spectra", i, total);
            cancelled = true;
            break;
        }

        let cleaned = match input.calibration.as_ref() {
            Some(cal) => cal.clean(&x, raw, cosmic),
            None => clean_uncalibrated(&x, raw, cosmic),
        };
        let pl_spectrum = input
            .pl
            .as_ref()
            .map(|pl| {
                let y = repair_nans(&pl.spectra[i])
                    .map_err(ProcessingError::signal(FailureKind::Cleaning));
                (pl.wavelengths.as_slice(), y)
            });
        let mut rec = match (cleaned, pl_spectrum) {
            (Err(e), _) | (Ok(_), Some((_, Err(e)))) => {
                debug!("Cleaning spectrum {} failed: {}", i, e);
                AnalysedRecord::failed(x.clone(), raw.clone(), FailureKind::Cleaning)
            }
            (Ok(y), Some((pl_x, Ok(pl_y)))) => analyser.analyse_with_pl(
                &x,
                &y,
                Some(PlSpectrum {
                    wavelengths: pl_x,
                    intensities: &pl_y,
                }),
            ),
            (Ok(y), None) => analyser.analyse_spectrum(&x, &y),
        };
        rec.index = i;
        records.push(rec);

        let done = i + 1;
        let step = done * 20 / total;
        if step > last_step {
            last_step = step;
            last_reported = done;
            progress.report(done, total);
        }
    }
    if last_reported != records.len() {
        progress.report(records.len(), total);
    }
    progress.finish();

    let buckets = Buckets::route(&records, &input.misaligned_indices);
    let summaries = BucketName::ALL
        .iter()
        .map(|&name| {
            let members = buckets.get(name).iter().map(|&i| &records[i]);
            (name, BucketSummary::from_records(members))
        })
        .collect();
    let (histograms, pl_histograms) = if options.histograms {
        let pl = if input.pl.is_some() {
            build_pl_histograms(&records, &buckets, analyser)
        } else {
            BTreeMap::new()
        };
        (build_histograms(&x, &records, &buckets, analyser), pl)
    } else {
        (BTreeMap::new(), BTreeMap::new())
    };

    info!(
        "Sorted {} spectra: {} NPoMs, {} rejected, {} failed",
        records.len(),
        buckets.len_of(BucketName::AllNpoms),
        buckets.len_of(BucketName::NonNpom),
        buckets.len_of(BucketName::Failed)
    );
    Ok(BatchResult {
        records,
        buckets,
        histograms,
        pl_histograms,
        summaries,
        cancelled,
    })
}
