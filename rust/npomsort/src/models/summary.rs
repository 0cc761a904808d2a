use serde::{
    Deserialize,
    Serialize,
};

use super::AnalysedRecord;

#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    sum: f64,
    n: usize,
}

impl RunningMean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.n += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.n == 0 {
            None
        } else {
            Some(self.sum / self.n as f64)
        }
    }
}

/// Mean of every numeric peak field over the records of one bucket.
/// Records missing a field are left out of that field's mean only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub count: usize,
    pub transverse_wavelength: Option<f64>,
    pub transverse_intensity_raw: Option<f64>,
    pub coupled_wavelength: Option<f64>,
    pub coupled_intensity_raw: Option<f64>,
    pub coupled_intensity_norm: Option<f64>,
    pub coupled_fwhm_raw: Option<f64>,
    pub coupled_fwhm_norm: Option<f64>,
    pub weird_wavelength: Option<f64>,
    pub weird_intensity_raw: Option<f64>,
    pub intensity_ratio_raw: Option<f64>,
    pub intensity_ratio_norm: Option<f64>,
}

impl BucketSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AnalysedRecord>) -> Self {
        let mut count = 0;
        let mut acc = [RunningMean::default(); 11];
        for rec in records {
            count += 1;
            let t = rec.transverse.as_ref();
            let c = rec.coupled.as_ref();
            let w = rec.weird.as_ref();
            let fields = [
                t.map(|t| t.wavelength),
                t.map(|t| t.intensity_raw),
                c.map(|c| c.wavelength),
                c.map(|c| c.intensity_raw),
                c.map(|c| c.intensity_norm),
                c.and_then(|c| c.fwhm_raw),
                c.and_then(|c| c.fwhm_norm),
                w.map(|w| w.wavelength),
                w.map(|w| w.intensity_raw),
                rec.intensity_ratio_raw,
                rec.intensity_ratio_norm,
            ];
            for (a, v) in acc.iter_mut().zip(fields) {
                a.push(v);
            }
        }
        let [tw, tr, cw, cr, cn, cfr, cfn, ww, wr, rr, rn] = acc.map(|a| a.mean());
        Self {
            count,
            transverse_wavelength: tw,
            transverse_intensity_raw: tr,
            coupled_wavelength: cw,
            coupled_intensity_raw: cr,
            coupled_intensity_norm: cn,
            coupled_fwhm_raw: cfr,
            coupled_fwhm_norm: cfn,
            weird_wavelength: ww,
            weird_intensity_raw: wr,
            intensity_ratio_raw: rr,
            intensity_ratio_norm: rn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResonancePeak;
    use std::sync::Arc;

    fn with_coupled(wl: f64, fwhm: Option<f64>) -> AnalysedRecord {
        let x: Arc<[f64]> = Arc::from(vec![500.0]);
        let mut rec = AnalysedRecord::new(x, vec![0.0]);
        rec.coupled = Some(ResonancePeak {
            wavelength: wl,
            intensity_raw: 2.0,
            intensity_norm: 1.5,
            fwhm_raw: fwhm,
            fwhm_norm: fwhm,
        });
        rec
    }

    #[test]
    fn test_means_skip_missing_fields() {
        let records = [with_coupled(700.0, Some(80.0)), with_coupled(740.0, None)];
        let summary = BucketSummary::from_records(records.iter());
        assert_eq!(summary.count, 2);
        assert_eq!(summary.coupled_wavelength, Some(720.0));
        assert_eq!(summary.coupled_fwhm_raw, Some(80.0));
        assert_eq!(summary.transverse_wavelength, None);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BucketSummary::from_records(std::iter::empty());
        assert_eq!(summary, BucketSummary::default());
    }
}
