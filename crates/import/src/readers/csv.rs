use stmtflow_core::{Cell, Row};

use super::ReadError;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b'|', b';'];
const SNIFF_LINES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct CsvReadOptions {
    /// Field separator; sniffed from the first lines when `None`.
    pub delimiter: Option<u8>,
}

/// Decode a delimited text file into rows. The header row, if any, is
/// kept as row 0.
pub fn read_csv(data: &[u8]) -> Result<Vec<Row>, ReadError> {
    read_csv_with(data, &CsvReadOptions::default())
}

pub fn read_csv_with(data: &[u8], options: &CsvReadOptions) -> Result<Vec<Row>, ReadError> {
    let text = std::str::from_utf8(data)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let delimiter = options.delimiter.unwrap_or_else(|| guess_delimiter(text));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(Cell::from).collect());
    }

    Ok(rows)
}

/// Pick the candidate that splits the first lines into the same number of
/// fields most consistently, preferring more fields on ties.
fn guess_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut best = (0usize, 0usize, b',');
    for delim in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|l| l.bytes().filter(|b| *b == delim).count())
            .collect();
        let Some(&first) = counts.first() else {
            continue;
        };
        if first == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|c| **c == first).count();
        if (consistent, first) > (best.0, best.1) {
            best = (consistent, first, delim);
        }
    }

    best.2
}
