pub mod csv;
pub mod excel;
pub mod pdf;

use stmtflow_core::{FileType, RawData};
use thiserror::Error;

pub use self::csv::{read_csv, read_csv_with, CsvReadOptions};
pub use self::excel::read_workbook;
pub use self::pdf::read_pdf;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("File is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("Invalid workbook: {0}")]
    Workbook(String),
    #[error("Workbook contains no sheets")]
    NoSheets,
    #[error("Invalid PDF: {0}")]
    Pdf(String),
    #[error("Reader crashed: {0}")]
    Panicked(String),
}

/// Decode `data` with the reader for `file_type`.
pub fn read(file_type: FileType, data: &[u8]) -> Result<RawData, ReadError> {
    match file_type {
        FileType::Csv => read_csv(data).map(RawData::Rows),
        FileType::Excel => read_workbook(data).map(RawData::Rows),
        FileType::Pdf => read_pdf(data).map(RawData::Pages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_csv_to_rows() {
        let raw = read(FileType::Csv, b"a,b\n1,2\n").unwrap();
        assert_eq!(raw.row_count(), 2);
        assert!(matches!(raw, RawData::Rows(_)));
    }

    #[test]
    fn garbage_is_rejected_by_binary_readers() {
        assert!(matches!(read(FileType::Pdf, b"definitely not a pdf"), Err(ReadError::Pdf(_))));
        assert!(matches!(
            read(FileType::Excel, b"definitely not a workbook"),
            Err(ReadError::Workbook(_))
        ));
    }
}
