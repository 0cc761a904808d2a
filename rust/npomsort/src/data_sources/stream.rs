use serde::de::DeserializeOwned;
use serde::{
    Deserialize,
    Serialize,
};
use std::io::{
    BufRead,
    Read,
};
use std::path::PathBuf;

use super::nullable;
use crate::batch::{
    BatchInput,
    Calibration,
    PlInput,
};
use crate::errors::InputReadingError;

/// First value of an NDJSON or MessagePack batch stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BatchHeader {
    pub wavelengths: Vec<f64>,
    #[serde(default, deserialize_with = "nullable::optional_spectrum")]
    pub background: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "nullable::optional_spectrum")]
    pub reference: Option<Vec<f64>>,
    #[serde(default)]
    pub misaligned_indices: Vec<usize>,
    #[serde(default)]
    pub pl_wavelengths: Option<Vec<f64>>,
}

/// Every value after the header: one dark-field spectrum and, when the
/// header has `pl_wavelengths`, its PL spectrum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectrumElement {
    #[serde(deserialize_with = "nullable::spectrum")]
    pub spectrum: Vec<f64>,
    #[serde(default, deserialize_with = "nullable::optional_spectrum")]
    pub pl: Option<Vec<f64>>,
}

pub(crate) trait ValueStream {
    fn next_value<T: DeserializeOwned>(&mut self) -> Option<Result<T, InputReadingError>>;
}

pub(crate) struct NdJsonReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> NdJsonReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> ValueStream for NdJsonReader<R> {
    fn next_value<T: DeserializeOwned>(&mut self) -> Option<Result<T, InputReadingError>> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.trim().is_empty() => continue,
                Ok(_) => {
                    return Some(serde_json::from_str(&line).map_err(|e| {
                        InputReadingError::JsonParsingError {
                            source: e,
                            context: "Error parsing NDJSON line",
                        }
                    }));
                }
                Err(e) => {
                    return Some(Err(InputReadingError::FileReadingError {
                        source: e,
                        context: "Error reading line",
                        path: PathBuf::new(),
                    }));
                }
            }
        }
    }
}

pub(crate) struct MessagePackReader<R: Read> {
    deserializer: rmp_serde::Deserializer<rmp_serde::decode::ReadReader<R>>,
}

impl<R: Read> MessagePackReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            deserializer: rmp_serde::Deserializer::new(reader),
        }
    }
}

impl<R: Read> ValueStream for MessagePackReader<R> {
    fn next_value<T: DeserializeOwned>(&mut self) -> Option<Result<T, InputReadingError>> {
        match T::deserialize(&mut self.deserializer) {
            Ok(value) => Some(Ok(value)),
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref io_err))
                if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                None
            }
            Err(rmp_serde::decode::Error::InvalidDataRead(ref io_err))
                if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                None
            }
            Err(e) => Some(Err(InputReadingError::MessagePackParsingError {
                source: e,
                context: "Error reading MessagePack value",
            })),
        }
    }
}

/// Reads a header followed by spectrum elements into one batch.
pub(crate) fn assemble(stream: &mut impl ValueStream) -> Result<BatchInput, InputReadingError> {
    let header: BatchHeader = stream
        .next_value()
        .ok_or(InputReadingError::MissingHeader {
            context: "Batch stream is empty",
        })??;

    let mut spectra = Vec::new();
    let mut pl_spectra = Vec::new();
    while let Some(elem) = stream.next_value::<SpectrumElement>() {
        let elem = elem?;
        match (header.pl_wavelengths.is_some(), elem.pl) {
            (true, Some(pl)) => pl_spectra.push(pl),
            (true, None) => {
                return Err(InputReadingError::InconsistentInput {
                    context: "Element without a PL spectrum in a batch with PL wavelengths",
                });
            }
            (false, Some(_)) => {
                return Err(InputReadingError::InconsistentInput {
                    context: "Element with a PL spectrum in a batch without PL wavelengths",
                });
            }
            (false, None) => {}
        }
        spectra.push(elem.spectrum);
    }

    let calibration = match (header.background, header.reference) {
        (Some(background), Some(reference)) => Some(Calibration {
            background,
            reference,
        }),
        (None, None) => None,
        _ => {
            return Err(InputReadingError::InconsistentInput {
                context: "Background and reference must be given together",
            });
        }
    };
    let pl = header.pl_wavelengths.map(|wavelengths| PlInput {
        wavelengths,
        spectra: pl_spectra,
    });

    Ok(BatchInput {
        wavelengths: header.wavelengths.into(),
        spectra,
        calibration,
        misaligned_indices: header.misaligned_indices,
        pl,
    })
}
