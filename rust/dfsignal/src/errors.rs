use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    ExpectedNonEmptyData {
        context: String,
    },
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    InsufficientData {
        real: usize,
        expected: usize,
        context: String,
    },
    AllNan {
        context: String,
    },
    InvalidParameter {
        name: &'static str,
        value: f64,
        context: String,
    },
    SingularSystem {
        context: String,
    },
    NoConvergence {
        iterations: usize,
        context: String,
    },
}

impl Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SignalError {}

impl SignalError {
    pub fn append_to_context(mut self, extra: &str) -> Self {
        match &mut self {
            SignalError::ExpectedNonEmptyData { context }
            | SignalError::ExpectedSlicesSameLength { context, .. }
            | SignalError::InsufficientData { context, .. }
            | SignalError::AllNan { context }
            | SignalError::InvalidParameter { context, .. }
            | SignalError::SingularSystem { context }
            | SignalError::NoConvergence { context, .. } => {
                if !context.is_empty() {
                    context.push_str("; ");
                }
                context.push_str(extra);
            }
        }
        self
    }

    pub(crate) fn empty(context: &str) -> Self {
        SignalError::ExpectedNonEmptyData {
            context: context.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;

pub(crate) fn check_same_length(x: &[f64], y: &[f64], context: &str) -> Result<()> {
    if x.len() != y.len() {
        return Err(SignalError::ExpectedSlicesSameLength {
            expected: x.len(),
            other: y.len(),
            context: context.to_string(),
        });
    }
    Ok(())
}
