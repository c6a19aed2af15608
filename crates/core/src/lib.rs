pub mod date;
pub mod detection;
pub mod file_type;
pub mod raw;
pub mod statement;
pub mod transaction;

pub use detection::{DetectionReport, ParserMetrics, ParserScore, ParserTrial};
pub use file_type::{FileType, UnsupportedFileType};
pub use raw::{Cell, PdfLine, PdfPage, PdfToken, RawData, Row};
pub use statement::{
    Checks, ExtractedData, ParserDetectionCheck, Statement, StatementStatus, StatementUpdate,
};
pub use transaction::{ExtractedTransaction, ParsedStatement, Transaction};
