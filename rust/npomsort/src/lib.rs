pub mod analysis;
pub mod batch;
pub mod classify;
pub mod config;
pub mod data_sources;
pub mod errors;
pub mod histogram;
pub mod models;
pub mod normalise;
pub mod output;
pub mod peaks;
pub mod pl;
extern crate parquet;
#[macro_use]
extern crate parquet_derive;

pub use analysis::{
    PlSpectrum,
    SpectrumAnalyser,
};
pub use batch::{
    BatchInput,
    BatchOptions,
    BatchResult,
    Calibration,
    PlInput,
    ProgressPort,
    TracingProgress,
    run_batch,
};
pub use config::{
    AnalysisConfig,
    HistogramConfig,
    ParticleSize,
    PlConfig,
};
pub use data_sources::BatchFormat;
pub use errors::{
    FailureKind,
    NpomSortError,
    Result,
};
pub use histogram::{
    Histogram,
    PlHistogram,
};
pub use models::{
    AnalysedRecord,
    BucketName,
    BucketSummary,
    Buckets,
    RejectionReason,
};
