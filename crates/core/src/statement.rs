use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::{DetectionReport, ParserScore, ParserTrial};
use crate::file_type::FileType;
use crate::raw::RawData;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    #[default]
    Uploaded,
    ParserDetected,
    DetectionFailed,
    Completed,
    Error,
}

impl std::fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementStatus::Uploaded => write!(f, "uploaded"),
            StatementStatus::ParserDetected => write!(f, "parser_detected"),
            StatementStatus::DetectionFailed => write!(f, "detection_failed"),
            StatementStatus::Completed => write!(f, "completed"),
            StatementStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for StatementStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(StatementStatus::Uploaded),
            "parser_detected" => Ok(StatementStatus::ParserDetected),
            "detection_failed" => Ok(StatementStatus::DetectionFailed),
            "completed" => Ok(StatementStatus::Completed),
            "error" => Ok(StatementStatus::Error),
            other => Err(format!("Unknown statement status: '{other}'")),
        }
    }
}

/// The detection audit record kept under `checks.parser_detection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserDetectionCheck {
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub best_parser: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<ParserScore>,
    #[serde(default)]
    pub all_results: Vec<ParserTrial>,
    pub error: Option<String>,
}

impl ParserDetectionCheck {
    pub fn from_report(report: &DetectionReport, completed_at: DateTime<Utc>) -> Self {
        Self {
            completed_at,
            success: report.success,
            confidence: report.confidence,
            best_parser: report.best_parser.clone(),
            alternatives: report.alternatives.clone(),
            all_results: report.all_results.clone(),
            error: report.error.clone(),
        }
    }

    /// The record written when the detection job itself blew up.
    pub fn errored(error: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            completed_at,
            success: false,
            confidence: 0,
            best_parser: None,
            alternatives: Vec::new(),
            all_results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_detection: Option<ParserDetectionCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicates_skipped: Option<usize>,
    /// SHA-256 hex digest of the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub org: String,
    pub project: Option<String>,
    pub file_name: String,
    /// Declared type; may be missing or something we cannot read.
    pub file_type: Option<String>,
    pub mime_type: Option<String>,
    /// Storage key of the uploaded file.
    pub location: Option<String>,
    pub status: StatementStatus,
    pub parser_type: Option<String>,
    #[serde(default)]
    pub checks: Checks,
    pub extracted_data: Option<ExtractedData>,
    pub errors: Option<Vec<String>>,
}

impl Statement {
    pub fn new(id: &str, org: &str, file_name: &str) -> Self {
        Statement {
            id: id.to_string(),
            org: org.to_string(),
            project: None,
            file_name: file_name.to_string(),
            file_type: None,
            mime_type: None,
            location: None,
            status: StatementStatus::Uploaded,
            parser_type: None,
            checks: Checks::default(),
            extracted_data: None,
            errors: None,
        }
    }

    pub fn belongs_to(&self, org_id: &str) -> bool {
        self.org == org_id
    }

    /// Declared type first, then MIME type, then the file name's extension.
    pub fn resolved_file_type(&self) -> Option<FileType> {
        if let Some(declared) = self.file_type.as_deref() {
            if let Ok(ft) = declared.parse() {
                return Some(ft);
            }
        }
        if let Some(ft) = self.mime_type.as_deref().and_then(FileType::from_mime) {
            return Some(ft);
        }
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileType::from_extension)
    }

    pub fn raw_data(&self) -> Option<&RawData> {
        self.extracted_data.as_ref().and_then(|d| d.raw.as_ref())
    }

    pub fn apply(&mut self, update: StatementUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(parser_type) = update.parser_type {
            self.parser_type = parser_type;
        }
        if let Some(checks) = update.checks {
            self.checks = checks;
        }
        if let Some(extracted_data) = update.extracted_data {
            self.extracted_data = extracted_data;
        }
        if let Some(errors) = update.errors {
            self.errors = errors;
        }
    }
}

/// A partial write to one statement. Outer `None` leaves the column alone;
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementUpdate {
    pub status: Option<StatementStatus>,
    pub parser_type: Option<Option<String>>,
    /// Replaces the whole `checks` object.
    pub checks: Option<Checks>,
    pub extracted_data: Option<Option<ExtractedData>>,
    pub errors: Option<Option<Vec<String>>>,
}

impl StatementUpdate {
    pub fn is_empty(&self) -> bool {
        *self == StatementUpdate::default()
    }
}
