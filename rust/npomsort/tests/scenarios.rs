use dfsignal::gaussian::gaussian;
use npomsort::histogram::Bins;
use npomsort::{
    AnalysedRecord,
    AnalysisConfig,
    BatchInput,
    BatchOptions,
    BucketName,
    PlInput,
    RejectionReason,
    SpectrumAnalyser,
    TracingProgress,
    run_batch,
};
use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn axis() -> Vec<f64> {
    (0..1000)
        .map(|i| 400.0 + 600.0 * i as f64 / 999.0)
        .collect()
}

/// Transverse mode at 533 nm, coupled mode at `cm`, flat offset of 0.01.
fn npom_like(x: &[f64], cm: f64, extra: &[(f64, f64, f64)]) -> Vec<f64> {
    x.iter()
        .map(|&v| {
            gaussian(v, 1.0, 533.0, 30.0)
                + gaussian(v, 2.0, cm, 80.0)
                + 0.01
                + extra
                    .iter()
                    .map(|&(h, c, w)| gaussian(v, h, c, w))
                    .sum::<f64>()
        })
        .collect()
}

/// Noise-free synthetic spectra have near-zero derivatives in their tails,
/// which the spike search would otherwise chase.
fn synthetic_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.cosmic.max_iter = 0;
    config
}

fn analyser() -> SpectrumAnalyser {
    SpectrumAnalyser::new(synthetic_config()).unwrap()
}

fn analyse(y: &[f64]) -> AnalysedRecord {
    let x: Arc<[f64]> = axis().into();
    analyser().analyse_spectrum(&x, y)
}

fn run_with(input: BatchInput, analyser: &SpectrumAnalyser) -> npomsort::BatchResult {
    let cancel = AtomicBool::new(false);
    run_batch(
        input,
        analyser,
        &TracingProgress,
        &cancel,
        BatchOptions::default(),
    )
    .unwrap()
}

fn run(input: BatchInput) -> npomsort::BatchResult {
    run_with(input, &analyser())
}

fn default_analyser() -> SpectrumAnalyser {
    SpectrumAnalyser::new(AnalysisConfig::default()).unwrap()
}

fn assert_coupled_in_range(rec: &AnalysedRecord, cm_low_limit_nm: f64) {
    if let Some(cm) = rec.coupled_wavelength() {
        assert!(
            cm > cm_low_limit_nm && cm <= 900.0,
            "record {} has its coupled mode at {} nm",
            rec.index,
            cm
        );
    }
}

#[test]
fn test_low_signal_is_rejected() {
    let x = axis();
    let input = BatchInput::new(x.clone(), vec![vec![0.0001; x.len()]])
        .with_calibration(vec![0.0; x.len()], vec![1.0; x.len()]);
    let result = run(input);
    let rec = &result.records[0];
    assert!(!rec.is_npom);
    assert_eq!(rec.rejection_reason, Some(RejectionReason::LowSignal));
    assert_eq!(result.buckets.get(BucketName::NonNpom), &[0]);
}

#[test]
fn test_classic_single_peak() {
    let rec = analyse(&npom_like(&axis(), 720.0, &[]));
    assert!(rec.is_npom, "{:?}", rec.rejection_reason);
    assert_eq!(rec.is_double_peak, Some(false));
    assert_eq!(rec.has_weird_peak, Some(false));

    let transverse = rec.transverse.unwrap();
    let coupled = rec.coupled.unwrap();
    assert!((transverse.wavelength - 533.0).abs() <= 2.0, "{:?}", transverse);
    assert!((coupled.wavelength - 720.0).abs() <= 5.0, "{:?}", coupled);
    let ratio = rec.intensity_ratio_raw.unwrap();
    assert!((ratio - 2.0).abs() <= 0.2, "ratio {}", ratio);
    assert!(coupled.fwhm_raw.is_some());
}

#[test]
fn test_classic_single_peak_with_default_cleaning() {
    let x = axis();
    let input = BatchInput::new(x.clone(), vec![npom_like(&x, 720.0, &[])]);
    let result = run_with(input, &default_analyser());
    let rec = &result.records[0];
    assert!(rec.is_npom, "{:?}", rec.rejection_reason);
    assert_eq!(rec.is_double_peak, Some(false));
    let coupled = rec.coupled.unwrap();
    assert!((coupled.wavelength - 720.0).abs() <= 5.0, "{:?}", coupled);
    let ratio = rec.intensity_ratio_raw.unwrap();
    assert!((ratio - 2.0).abs() <= 0.2, "ratio {}", ratio);
}

#[test]
fn test_coupled_mode_above_900_nm_is_rejected() {
    let rec = analyse(&npom_like(&axis(), 720.0, &[(3.0, 960.0, 30.0)]));
    assert!(!rec.is_npom);
    assert_eq!(rec.rejection_reason, Some(RejectionReason::CmAboveUpperLimit));
    assert!(rec.coupled.is_none());
}

#[test]
fn test_coupled_mode_below_lower_limit_is_rejected() {
    let mut config = synthetic_config();
    config.cm_low_limit_nm = 750.0;
    let analyser = SpectrumAnalyser::new(config).unwrap();
    let x: Arc<[f64]> = axis().into();
    let rec = analyser.analyse_spectrum(&x, &npom_like(&x, 720.0, &[]));
    assert!(!rec.is_npom);
    assert_eq!(rec.rejection_reason, Some(RejectionReason::CmBelowLowerLimit));
    assert!(rec.coupled.is_none());

    // Same spectrum, limit just below the peak.
    let mut config = synthetic_config();
    config.cm_low_limit_nm = 700.0;
    let analyser = SpectrumAnalyser::new(config).unwrap();
    let rec = analyser.analyse_spectrum(&x, &npom_like(&x, 720.0, &[]));
    assert!(rec.is_npom, "{:?}", rec.rejection_reason);
    assert_coupled_in_range(&rec, 700.0);
}

#[test]
fn test_double_peak() {
    let rec = analyse(&npom_like(&axis(), 720.0, &[(1.5, 820.0, 40.0)]));
    assert!(rec.is_npom, "{:?}", rec.rejection_reason);
    assert_eq!(rec.is_double_peak, Some(true));
    let coupled = rec.coupled.unwrap();
    assert!(coupled.fwhm_raw.is_none());
    assert!(coupled.fwhm_norm.is_none());
    assert!((coupled.wavelength - 720.0).abs() <= 10.0, "{:?}", coupled);
}

#[test]
fn test_weird_peak() {
    let rec = analyse(&npom_like(&axis(), 720.0, &[(5.0, 620.0, 15.0)]));
    assert!(rec.is_npom, "{:?}", rec.rejection_reason);
    assert_eq!(rec.has_weird_peak, Some(true));
    let weird = rec.weird.unwrap();
    assert!((weird.wavelength - 620.0).abs() <= 3.0, "{:?}", weird);
    let coupled = rec.coupled.unwrap();
    assert!((coupled.wavelength - 720.0).abs() <= 10.0, "{:?}", coupled);
}

fn coupled_mode_sweep() -> BatchInput {
    let x = axis();
    let spectra = (0..100)
        .map(|k| npom_like(&x, 650.0 + 150.0 * k as f64 / 99.0, &[]))
        .collect();
    BatchInput::new(x, spectra)
}

#[test]
fn test_histogram_of_coupled_mode_sweep() {
    let result = run(coupled_mode_sweep());
    assert_eq!(result.buckets.len_of(BucketName::AllNpoms), 100);

    let hist = &result.histograms[&BucketName::AllNpoms];
    assert_eq!(hist.total(), 100);
    let fit = hist.fit.as_ref().unwrap();
    assert!((fit.center - 725.0).abs() <= 5.0, "{:?}", fit.center);
    assert!(fit.fwhm > 50.0, "{:?}", fit.fwhm);
    assert!(hist.modal.is_some());
    assert!(hist.average.is_some());
}

#[test]
fn test_histogram_of_coupled_mode_sweep_with_default_cleaning() {
    let result = run_with(coupled_mode_sweep(), &default_analyser());
    assert_eq!(result.buckets.len_of(BucketName::AllNpoms), 100);
    for rec in &result.records {
        assert_coupled_in_range(rec, 600.0);
    }
    let fit = result.histograms[&BucketName::AllNpoms].fit.as_ref().unwrap();
    assert!((fit.center - 725.0).abs() <= 5.0, "{:?}", fit.center);
}

#[test]
fn test_binned_mean_is_member_mean() {
    let result = run(coupled_mode_sweep());
    let hist = &result.histograms[&BucketName::AllNpoms];
    let bins = Bins::uniform(450.0, 987.0, 80);

    let mut members: Vec<Vec<&AnalysedRecord>> = vec![Vec::new(); bins.len()];
    for rec in &result.records {
        let cm = rec.coupled_wavelength().unwrap();
        members[bins.index_of(cm).unwrap()].push(rec);
    }
    for (k, recs) in members.iter().enumerate() {
        assert_eq!(hist.counts[k], recs.len());
        if recs.is_empty() {
            continue;
        }
        for i in (0..1000).step_by(97) {
            let expected = recs
                .iter()
                .map(|r| r.normalized_spectrum.as_ref().unwrap()[i])
                .sum::<f64>()
                / recs.len() as f64;
            assert!((hist.binned_mean[k][i] - expected).abs() < 1e-9);
        }
    }
}

#[test]
fn test_pl_decomposition_in_batch() {
    let x = axis();
    let amp = 0.01 * 3f64.sqrt();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let pl: Vec<f64> = x
        .iter()
        .map(|&v| {
            gaussian(v, 1.0, 600.0, 30.0)
                + gaussian(v, 0.7, 700.0, 30.0)
                + gaussian(v, 0.4, 800.0, 30.0)
                + rng.gen_range(-amp..amp)
        })
        .collect();
    let mut input = BatchInput::new(x.clone(), vec![npom_like(&x, 720.0, &[])]);
    input.pl = Some(PlInput {
        wavelengths: x.clone(),
        spectra: vec![pl],
    });

    let result = run(input);
    let rec = &result.records[0];
    assert!(rec.is_npom, "{:?}", rec.rejection_reason);
    let peaks = &rec.pl.as_ref().unwrap().peaks;
    assert_eq!(peaks.len(), 3, "{:?}", peaks);
    for (got, (h, c)) in peaks.iter().zip([(1.0, 600.0), (0.7, 700.0), (0.4, 800.0)]) {
        assert!((got.center - c).abs() <= 5.0, "{:?}", got);
        assert!((got.height - h).abs() <= 0.2 * h, "{:?}", got);
    }
    assert!(result.pl_histograms.contains_key(&BucketName::AllNpoms));
}

#[test]
fn test_mixed_batch_invariants() {
    let x = axis();
    let mut all_nan = vec![f64::NAN; x.len()];
    all_nan[0] = 1.0;
    let spectra = vec![
        npom_like(&x, 720.0, &[]),
        vec![0.0001; x.len()],
        npom_like(&x, 720.0, &[(1.5, 820.0, 40.0)]),
        npom_like(&x, 720.0, &[(5.0, 620.0, 15.0)]),
        npom_like(&x, 760.0, &[]),
        all_nan,
        npom_like(&x, 720.0, &[(3.0, 960.0, 30.0)]),
    ];
    let n = spectra.len();
    let result = run(BatchInput::new(x, spectra).with_misaligned(vec![4]));
    let b = &result.buckets;

    assert_eq!(result.records.len(), n);
    for (i, rec) in result.records.iter().enumerate() {
        assert_eq!(rec.index, i);
        assert_coupled_in_range(rec, 600.0);
        if rec.is_npom {
            let t = rec.transverse.unwrap();
            let c = rec.coupled.unwrap();
            assert_eq!(rec.intensity_ratio_raw, Some(c.intensity_raw / t.intensity_raw));
            assert_eq!(rec.intensity_ratio_norm, Some(c.intensity_norm / t.intensity_norm));
        } else {
            assert!(rec.transverse.is_none());
            assert!(rec.coupled.is_none());
            assert!(rec.weird.is_none());
            assert!(rec.intensity_ratio_raw.is_none());
            assert!(rec.intensity_ratio_norm.is_none());
            assert!(rec.is_double_peak.is_none());
            assert!(rec.has_weird_peak.is_none());
            assert!(rec.normalized_spectrum.is_none());
        }
    }
    assert_eq!(
        result.records[6].rejection_reason,
        Some(RejectionReason::CmAboveUpperLimit)
    );

    let npoms = b.len_of(BucketName::AllNpoms);
    assert_eq!(b.len_of(BucketName::Singles) + b.len_of(BucketName::Doubles), npoms);
    assert_eq!(
        b.len_of(BucketName::WeirdPeakers) + b.len_of(BucketName::NonWeirdPeakers),
        npoms
    );
    let ideal = b
        .get(BucketName::Singles)
        .iter()
        .filter(|&&i| b.get(BucketName::NonWeirdPeakers).contains(&i))
        .count();
    assert_eq!(b.len_of(BucketName::Ideal), ideal);
    assert_eq!(
        npoms + b.len_of(BucketName::NonNpom) + b.len_of(BucketName::Failed),
        n
    );
    assert_eq!(b.get(BucketName::Misaligned), &[4]);
    assert_eq!(b.len_of(BucketName::All), n);
    assert_eq!(result.summaries[&BucketName::All].count, n);
}
