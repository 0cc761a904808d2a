pub(crate) mod nullable;
mod stream;
mod table;

pub use stream::{
    BatchHeader,
    SpectrumElement,
};

use std::io::{
    BufReader,
    Read,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::debug;

use crate::batch::BatchInput;
use crate::errors::InputReadingError;
use stream::{
    MessagePackReader,
    NdJsonReader,
    assemble,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    /// One JSON document holding the whole [`BatchInput`].
    Json,
    /// A [`BatchHeader`] line followed by one [`SpectrumElement`] per line.
    NdJson,
    NdJsonZstd,
    /// Same layout as [`BatchFormat::NdJson`], as consecutive MessagePack values.
    MessagePack,
    MessagePackZstd,
    /// Wide table with the wavelength in the first column.
    Csv,
}

impl BatchFormat {
    pub fn detect_from_path(path: &Path) -> Result<Self, InputReadingError> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".msgpack.zst") {
            Ok(BatchFormat::MessagePackZstd)
        } else if path_str.ends_with(".msgpack") {
            Ok(BatchFormat::MessagePack)
        } else if path_str.ends_with(".ndjson.zst") {
            Ok(BatchFormat::NdJsonZstd)
        } else if path_str.ends_with(".ndjson") {
            Ok(BatchFormat::NdJson)
        } else if path_str.ends_with(".json") {
            Ok(BatchFormat::Json)
        } else if path_str.ends_with(".csv") {
            Ok(BatchFormat::Csv)
        } else {
            Self::detect_from_content(path)
        }
    }

    fn detect_from_content(path: &Path) -> Result<Self, InputReadingError> {
        let file = std::fs::File::open(path).map_err(|e| InputReadingError::FileReadingError {
            source: e,
            context: "Error opening file for format detection",
            path: PathBuf::from(path),
        })?;

        let mut reader = BufReader::new(file);
        let mut buffer = [0u8; 8];
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| InputReadingError::FileReadingError {
                source: e,
                context: "Error reading file for format detection",
                path: PathBuf::from(path),
            })?;
        let format = Self::sniff(&buffer[..bytes_read]).ok_or_else(|| {
            InputReadingError::UnsupportedFormat {
                path: PathBuf::from(path),
            }
        })?;
        debug!("Detected {:?} from the contents of {}", format, path.display());
        Ok(format)
    }

    fn sniff(head: &[u8]) -> Option<Self> {
        match head {
            [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(BatchFormat::MessagePackZstd),
            [b'{', ..] => Some(BatchFormat::NdJson),
            // fixmap, map16, map32
            [0x80..=0x8f | 0xde | 0xdf, ..] => Some(BatchFormat::MessagePack),
            [] => None,
            _ if head.iter().all(|b| b.is_ascii()) => Some(BatchFormat::Csv),
            _ => None,
        }
    }
}

fn zstd_decoder<R: Read>(
    reader: R,
) -> Result<zstd::Decoder<'static, BufReader<R>>, InputReadingError> {
    zstd::Decoder::new(reader).map_err(|e| InputReadingError::FileReadingError {
        source: e,
        context: "Error creating ZSTD decoder",
        path: PathBuf::new(),
    })
}

impl BatchInput {
    pub fn from_file(path: &Path) -> Result<Self, InputReadingError> {
        let format = BatchFormat::detect_from_path(path)?;
        Self::from_file_with_format(path, format)
    }

    pub fn from_file_with_format(path: &Path, format: BatchFormat) -> Result<Self, InputReadingError> {
        let file = std::fs::File::open(path).map_err(|e| InputReadingError::FileReadingError {
            source: e,
            context: "Error opening batch file",
            path: PathBuf::from(path),
        })?;
        let batch = Self::from_reader(file, format)?;
        debug!(
            "Read {} spectra x {} wavelengths from {}",
            batch.len(),
            batch.wavelengths.len(),
            path.display()
        );
        Ok(batch)
    }

    /// Reads a batch without validating it; call [`BatchInput::validate`]
    /// (or hand it to [`crate::run_batch`]) before trusting its contents.
    pub fn from_reader<R: Read>(reader: R, format: BatchFormat) -> Result<Self, InputReadingError> {
        match format {
            BatchFormat::Json => serde_json::from_reader(BufReader::new(reader)).map_err(|e| {
                InputReadingError::JsonParsingError {
                    source: e,
                    context: "Error parsing JSON batch",
                }
            }),
            BatchFormat::NdJson => assemble(&mut NdJsonReader::new(BufReader::new(reader))),
            BatchFormat::NdJsonZstd => {
                let decoder = zstd_decoder(reader)?;
                assemble(&mut NdJsonReader::new(BufReader::new(decoder)))
            }
            BatchFormat::MessagePack => assemble(&mut MessagePackReader::new(reader)),
            BatchFormat::MessagePackZstd => {
                let decoder = zstd_decoder(reader)?;
                assemble(&mut MessagePackReader::new(decoder))
            }
            BatchFormat::Csv => table::read_wide_csv(reader),
        }
    }
}
