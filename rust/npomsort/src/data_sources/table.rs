use std::io::Read;

use crate::batch::BatchInput;
use crate::errors::InputReadingError;

fn parse_cell(cell: &str, line: u64, column: usize) -> Result<f64, InputReadingError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| InputReadingError::InvalidNumber {
            line,
            column,
            value: cell.to_string(),
        })
}

/// Reads a wide table: a header row, then one row per wavelength with the
/// wavelength in the first column and one column per spectrum.
/// Empty cells are read as missing samples.
pub(crate) fn read_wide_csv<R: Read>(reader: R) -> Result<BatchInput, InputReadingError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let n_columns = rdr
        .headers()
        .map_err(|e| InputReadingError::CsvParsingError {
            source: e,
            context: "Error reading CSV header",
        })?
        .len();
    if n_columns < 2 {
        return Err(InputReadingError::MissingHeader {
            context: "CSV needs a wavelength column and at least one spectrum column",
        });
    }

    let mut wavelengths = Vec::new();
    let mut spectra: Vec<Vec<f64>> = vec![Vec::new(); n_columns - 1];
    for record in rdr.records() {
        let record = record.map_err(|e| InputReadingError::CsvParsingError {
            source: e,
            context: "Error reading CSV row",
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != n_columns {
            return Err(InputReadingError::InconsistentInput {
                context: "CSV row has a different number of columns than the header",
            });
        }
        for (column, cell) in record.iter().enumerate() {
            let value = parse_cell(cell, line, column)?;
            match column {
                0 => wavelengths.push(value),
                c => spectra[c - 1].push(value),
            }
        }
    }

    Ok(BatchInput::new(wavelengths, spectra))
}
