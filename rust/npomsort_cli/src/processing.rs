use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use npomsort::{
    BatchResult,
    BucketName,
    ProgressPort,
};
use tabled::settings::Style;
use tabled::{
    Table,
    Tabled,
};

/// Terminal progress bar fed by the batch loop.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl ProgressPort for BarProgress {
    fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn report(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Bucket")]
    bucket: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "CM (nm)")]
    coupled_wavelength: String,
    #[tabled(rename = "CM FWHM (nm)")]
    coupled_fwhm: String,
    #[tabled(rename = "Ratio (norm)")]
    intensity_ratio: String,
    #[tabled(rename = "Fit center (nm)")]
    fit_center: String,
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{:.1}", v),
        _ => "-".to_string(),
    }
}

pub fn summary_table(result: &BatchResult) -> String {
    let rows: Vec<BucketRow> = BucketName::ALL
        .iter()
        .map(|name| {
            let summary = result.summaries.get(name);
            let fit_center = result
                .histograms
                .get(name)
                .and_then(|h| h.fit.as_ref())
                .map(|f| f.center);
            BucketRow {
                bucket: name.label(),
                count: result.buckets.len_of(*name),
                coupled_wavelength: fmt_opt(summary.and_then(|s| s.coupled_wavelength)),
                coupled_fwhm: fmt_opt(summary.and_then(|s| s.coupled_fwhm_raw)),
                intensity_ratio: fmt_opt(summary.and_then(|s| s.intensity_ratio_norm)),
                fit_center: fmt_opt(fit_center),
            }
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
