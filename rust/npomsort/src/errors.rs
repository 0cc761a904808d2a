use dfsignal::SignalError;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

/// Stage of the per-spectrum pipeline that gave up on a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Cleaning,
    Baseline,
    Classification,
    Normalisation,
    PeakFinding,
    PlDecomposition,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Cleaning => "cleaning",
            FailureKind::Baseline => "baseline",
            FailureKind::Classification => "classification",
            FailureKind::Normalisation => "normalisation",
            FailureKind::PeakFinding => "peak finding",
            FailureKind::PlDecomposition => "PL decomposition",
        };
        f.write_str(name)
    }
}

/// Errors raised while analysing a single spectrum.
///
/// These never escape [`crate::SpectrumAnalyser`]; they end up as a
/// `Failed(kind)` rejection on the record instead.
#[derive(Debug, Clone)]
pub enum ProcessingError {
    Signal {
        kind: FailureKind,
        source: SignalError,
    },
    NoMinima {
        kind: FailureKind,
        context: String,
    },
    DegenerateEstimate {
        kind: FailureKind,
        value: f64,
        context: String,
    },
    FitDegenerate {
        context: String,
    },
}

impl ProcessingError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessingError::Signal { kind, .. }
            | ProcessingError::NoMinima { kind, .. }
            | ProcessingError::DegenerateEstimate { kind, .. } => *kind,
            ProcessingError::FitDegenerate { .. } => FailureKind::PlDecomposition,
        }
    }

    pub fn append_to_context(mut self, extra: &str) -> Self {
        match &mut self {
            ProcessingError::Signal { source, .. } => {
                *source = source.clone().append_to_context(extra);
            }
            ProcessingError::NoMinima { context, .. }
            | ProcessingError::DegenerateEstimate { context, .. }
            | ProcessingError::FitDegenerate { context } => {
                if !context.is_empty() {
                    context.push_str("; ");
                }
                context.push_str(extra);
            }
        }
        self
    }

    pub(crate) fn signal(kind: FailureKind) -> impl FnOnce(SignalError) -> Self {
        move |source| ProcessingError::Signal { kind, source }
    }
}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ProcessingError {}

/// Problems with a batch that are caught before any spectrum is analysed.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidInputError {
    EmptyBatch,
    EmptyWavelengths,
    LengthMismatch {
        what: &'static str,
        index: Option<usize>,
        expected: usize,
        got: usize,
    },
    NonFiniteWavelength {
        index: usize,
    },
    NonPositiveWavelength {
        index: usize,
        value: f64,
    },
    NonMonotonicWavelengths {
        index: usize,
    },
    AllNanSpectrum {
        what: &'static str,
        index: usize,
    },
    NonPositiveReference {
        index: usize,
        value: f64,
    },
    MisalignedIndexOutOfRange {
        index: usize,
        batch_size: usize,
    },
}

impl std::fmt::Display for InvalidInputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for InvalidInputError {}

#[derive(Debug)]
pub enum InputReadingError {
    FileReadingError {
        source: std::io::Error,
        context: &'static str,
        path: PathBuf,
    },
    JsonParsingError {
        source: serde_json::Error,
        context: &'static str,
    },
    MessagePackParsingError {
        source: rmp_serde::decode::Error,
        context: &'static str,
    },
    CsvParsingError {
        source: csv::Error,
        context: &'static str,
    },
    MissingHeader {
        context: &'static str,
    },
    InvalidNumber {
        line: u64,
        column: usize,
        value: String,
    },
    InconsistentInput {
        context: &'static str,
    },
    UnsupportedFormat {
        path: PathBuf,
    },
}

impl std::fmt::Display for InputReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for InputReadingError {}

#[derive(Debug)]
pub enum ConfigError {
    UnknownParticleSize {
        size_nm: u32,
    },
    InvalidValue {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    Smoothing(SignalError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownParticleSize { size_nm } => write!(
                f,
                "No presets for {} nm particles; set peak_find_midpoint_nm and cm_low_limit_nm explicitly",
                size_nm
            ),
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => write!(f, "Invalid value {} for {}: {}", value, field, reason),
            ConfigError::Smoothing(e) => write!(f, "Invalid smoothing settings: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum OutputWritingError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    Parquet {
        source: parquet::errors::ParquetError,
        context: &'static str,
    },
    Json {
        source: serde_json::Error,
        context: &'static str,
    },
}

impl std::fmt::Display for OutputWritingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for OutputWritingError {}

#[derive(Debug)]
pub enum NpomSortError {
    InvalidInput(InvalidInputError),
    InputReading(InputReadingError),
    Config(ConfigError),
    Processing(ProcessingError),
    OutputWriting(OutputWritingError),
    Signal(SignalError),
}

impl std::fmt::Display for NpomSortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for NpomSortError {}

pub type Result<T> = std::result::Result<T, NpomSortError>;

impl From<InvalidInputError> for NpomSortError {
    fn from(x: InvalidInputError) -> Self {
        Self::InvalidInput(x)
    }
}

impl From<InputReadingError> for NpomSortError {
    fn from(x: InputReadingError) -> Self {
        Self::InputReading(x)
    }
}

impl From<ConfigError> for NpomSortError {
    fn from(x: ConfigError) -> Self {
        Self::Config(x)
    }
}

impl From<ProcessingError> for NpomSortError {
    fn from(x: ProcessingError) -> Self {
        Self::Processing(x)
    }
}

impl From<OutputWritingError> for NpomSortError {
    fn from(x: OutputWritingError) -> Self {
        Self::OutputWriting(x)
    }
}

impl From<SignalError> for NpomSortError {
    fn from(x: SignalError) -> Self {
        Self::Signal(x)
    }
}
