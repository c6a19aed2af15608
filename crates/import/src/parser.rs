use stmtflow_core::{ParsedStatement, RawData};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Invalid parser profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// A bank-statement parser. Implementations are registered by name in a
/// `ParserRegistry`; the name's `__csv` / `__xlsx` / `__excel` / `__pdf`
/// suffix decides which uploads it is tried against.
pub trait StatementParser: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap shape check run before `parse`. Parsers that cannot tell
    /// keep the default and let scoring decide.
    fn is_valid(&self, _raw: &RawData) -> bool {
        true
    }

    fn parse(&self, raw: &RawData) -> Result<ParsedStatement, ParserError>;
}
