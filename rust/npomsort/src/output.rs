use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{
    Path,
    PathBuf,
};
use tracing::debug;

use crate::batch::BatchResult;
use crate::errors::OutputWritingError;
use crate::histogram::{
    Histogram,
    PlHistogram,
};
use crate::models::{
    AnalysedRecord,
    BucketName,
    BucketSummary,
};

/// One row per analysed spectrum; the flat view of [`AnalysedRecord`]
/// without the spectra themselves.
#[derive(Debug, Clone, Serialize, ParquetRecordWriter)]
pub struct RecordRow {
    index: u32,
    is_npom: bool,
    rejection_reason: Option<String>,
    is_double_peak: Option<bool>,
    has_weird_peak: Option<bool>,

    // Transverse
    transverse_wavelength: Option<f64>,
    transverse_intensity_raw: Option<f64>,
    transverse_intensity_norm: Option<f64>,

    // Coupled mode
    coupled_wavelength: Option<f64>,
    coupled_intensity_raw: Option<f64>,
    coupled_intensity_norm: Option<f64>,
    coupled_fwhm_raw: Option<f64>,
    coupled_fwhm_norm: Option<f64>,

    // Weird peak
    weird_wavelength: Option<f64>,
    weird_intensity_raw: Option<f64>,
    weird_intensity_norm: Option<f64>,

    intensity_ratio_raw: Option<f64>,
    intensity_ratio_norm: Option<f64>,

    // PL
    n_pl_peaks: u8,
    pl_residual_stddev: Option<f64>,
}

impl From<&AnalysedRecord> for RecordRow {
    fn from(rec: &AnalysedRecord) -> Self {
        let t = rec.transverse.as_ref();
        let c = rec.coupled.as_ref();
        let w = rec.weird.as_ref();
        let pl = rec.pl.as_ref();
        Self {
            index: rec.index as u32,
            is_npom: rec.is_npom,
            rejection_reason: rec.rejection_reason.map(|r| r.to_string()),
            is_double_peak: rec.is_double_peak,
            has_weird_peak: rec.has_weird_peak,
            transverse_wavelength: t.map(|t| t.wavelength),
            transverse_intensity_raw: t.map(|t| t.intensity_raw),
            transverse_intensity_norm: t.map(|t| t.intensity_norm),
            coupled_wavelength: c.map(|c| c.wavelength),
            coupled_intensity_raw: c.map(|c| c.intensity_raw),
            coupled_intensity_norm: c.map(|c| c.intensity_norm),
            coupled_fwhm_raw: c.and_then(|c| c.fwhm_raw),
            coupled_fwhm_norm: c.and_then(|c| c.fwhm_norm),
            weird_wavelength: w.map(|w| w.wavelength),
            weird_intensity_raw: w.map(|w| w.intensity_raw),
            weird_intensity_norm: w.map(|w| w.intensity_norm),
            intensity_ratio_raw: rec.intensity_ratio_raw,
            intensity_ratio_norm: rec.intensity_ratio_norm,
            n_pl_peaks: pl.map_or(0, |p| p.peaks.len().min(u8::MAX as usize) as u8),
            pl_residual_stddev: pl.and_then(|p| p.residual_stddev),
        }
    }
}

fn parquet_error(context: &'static str) -> impl FnOnce(parquet::errors::ParquetError) -> OutputWritingError {
    move |source| OutputWritingError::Parquet { source, context }
}

fn create_new(path: &Path) -> Result<File, OutputWritingError> {
    File::create_new(path).map_err(|err| {
        tracing::error!("Failed to open file {:?} with error: {}", path, err);
        OutputWritingError::Io {
            source: err,
            path: PathBuf::from(path),
        }
    })
}

pub struct RecordParquetWriter {
    row_group_size: usize,
    writer: SerializedFileWriter<File>,
    buffer: Vec<RecordRow>,
}

impl RecordParquetWriter {
    /// Refuses to overwrite an existing file.
    pub fn new(out_path: impl AsRef<Path>, row_group_size: usize) -> Result<Self, OutputWritingError> {
        let file = create_new(out_path.as_ref())?;
        let rows: &[RecordRow] = &[];
        let schema = rows.schema().map_err(parquet_error("Building record schema"))?;
        let writer = SerializedFileWriter::new(file, schema, Default::default())
            .map_err(parquet_error("Creating parquet writer"))?;
        Ok(Self {
            buffer: Vec::with_capacity(row_group_size),
            writer,
            row_group_size: row_group_size.max(1),
        })
    }

    fn flush_to_file(&mut self) -> Result<(), OutputWritingError> {
        debug!("Flushing {} records to file", self.buffer.len());
        let mut row_group = self
            .writer
            .next_row_group()
            .map_err(parquet_error("Starting row group"))?;
        self.buffer
            .as_slice()
            .write_to_row_group(&mut row_group)
            .map_err(parquet_error("Writing row group"))?;
        row_group.close().map_err(parquet_error("Closing row group"))?;
        self.buffer.clear();
        Ok(())
    }

    pub fn add(&mut self, record: &AnalysedRecord) -> Result<(), OutputWritingError> {
        self.buffer.push(record.into());
        if self.buffer.len() >= self.row_group_size {
            self.flush_to_file()?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<(), OutputWritingError> {
        if !self.buffer.is_empty() {
            self.flush_to_file()?;
        }
        self.writer
            .close()
            .map_err(parquet_error("Closing parquet file"))?;
        Ok(())
    }
}

pub fn write_records_parquet(
    records: &[AnalysedRecord],
    out_path: impl AsRef<Path>,
) -> Result<(), OutputWritingError> {
    let mut writer = RecordParquetWriter::new(out_path, 4096)?;
    for rec in records {
        writer.add(rec)?;
    }
    writer.close()
}

pub fn write_json<T: Serialize + ?Sized>(
    value: &T,
    out_path: impl AsRef<Path>,
    context: &'static str,
) -> Result<(), OutputWritingError> {
    let file = create_new(out_path.as_ref())?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|source| OutputWritingError::Json { source, context })
}

/// Histograms and summaries per bucket, as written to `histograms.json`.
#[derive(Debug, Serialize)]
pub struct HistogramReport<'a> {
    pub histograms: &'a BTreeMap<BucketName, Histogram>,
    pub pl_histograms: &'a BTreeMap<BucketName, PlHistogram>,
    pub summaries: &'a BTreeMap<BucketName, BucketSummary>,
}

impl<'a> From<&'a BatchResult> for HistogramReport<'a> {
    fn from(result: &'a BatchResult) -> Self {
        Self {
            histograms: &result.histograms,
            pl_histograms: &result.pl_histograms,
            summaries: &result.summaries,
        }
    }
}

/// Writes `records.parquet`, `buckets.json` and `histograms.json` into
/// `out_dir`, creating the directory if needed. Existing files are not
/// overwritten.
pub fn write_batch_result(result: &BatchResult, out_dir: &Path) -> Result<(), OutputWritingError> {
    std::fs::create_dir_all(out_dir).map_err(|source| OutputWritingError::Io {
        source,
        path: PathBuf::from(out_dir),
    })?;
    write_records_parquet(&result.records, out_dir.join("records.parquet"))?;
    write_json(&result.buckets, out_dir.join("buckets.json"), "Writing buckets")?;
    write_json(
        &HistogramReport::from(result),
        out_dir.join("histograms.json"),
        "Writing histograms",
    )?;
    debug!("Wrote batch outputs to {}", out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        RejectionReason,
        ResonancePeak,
    };
    use std::sync::Arc;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("npomsort_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_row_from_record() {
        let x: Arc<[f64]> = Arc::from(vec![500.0]);
        let mut rec = AnalysedRecord::new(x, vec![1.0]);
        rec.index = 4;
        rec.is_npom = true;
        rec.coupled = Some(ResonancePeak {
            wavelength: 720.0,
            intensity_raw: 2.0,
            intensity_norm: 1.9,
            fwhm_raw: None,
            fwhm_norm: Some(80.0),
        });
        let row = RecordRow::from(&rec);
        assert_eq!(row.index, 4);
        assert_eq!(row.coupled_wavelength, Some(720.0));
        assert_eq!(row.coupled_fwhm_norm, Some(80.0));
        assert_eq!(row.rejection_reason, None);
        assert_eq!(row.n_pl_peaks, 0);

        rec.reject(RejectionReason::JustNoise);
        let row = RecordRow::from(&rec);
        assert_eq!(row.rejection_reason.as_deref(), Some("Just noise"));
        assert_eq!(row.coupled_wavelength, None);
    }

    #[test]
    fn test_parquet_writer_refuses_overwrite() {
        let dir = scratch_dir("parquet");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("records.parquet");

        let x: Arc<[f64]> = Arc::from(vec![500.0]);
        let records: Vec<AnalysedRecord> = (0..3)
            .map(|i| {
                let mut rec = AnalysedRecord::new(x.clone(), vec![1.0]);
                rec.index = i;
                rec
            })
            .collect();
        let mut writer = RecordParquetWriter::new(&path, 2).unwrap();
        for rec in &records {
            writer.add(rec).unwrap();
        }
        writer.close().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        assert!(matches!(
            write_records_parquet(&records, &path),
            Err(OutputWritingError::Io { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
