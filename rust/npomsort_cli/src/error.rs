use npomsort::errors::{
    ConfigError,
    InputReadingError,
    InvalidInputError,
    OutputWritingError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("Data reading error: {0}")]
    DataReading(#[from] InputReadingError),

    #[error("Output writing error: {0}")]
    OutputWriting(#[from] OutputWritingError),
}

impl CliError {
    /// 1 for bad input or configuration, 2 for I/O failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Io(_)
            | CliError::OutputWriting(_)
            | CliError::DataReading(InputReadingError::FileReadingError { .. }) => 2,
            CliError::Json(_)
            | CliError::Config(_)
            | CliError::InvalidInput(_)
            | CliError::DataReading(_) => 1,
        }
    }
}
