use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The container formats statements are uploaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Excel,
    Pdf,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unsupported file type: {0}")]
pub struct UnsupportedFileType(pub String);

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Excel => "excel",
            FileType::Pdf => "pdf",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/csv" | "application/csv" | "text/comma-separated-values" => Some(FileType::Csv),
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(FileType::Excel),
            "application/pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.trim_start_matches('.').parse().ok()
    }
}

impl std::str::FromStr for FileType {
    type Err = UnsupportedFileType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileType::Csv),
            "excel" | "xlsx" | "xls" | "ods" => Ok(FileType::Excel),
            "pdf" => Ok(FileType::Pdf),
            other => Err(UnsupportedFileType(other.to_string())),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
