use serde::{Deserialize, Serialize};

/// Quality signals gathered from one parser's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserMetrics {
    pub transaction_count: usize,
    pub valid_dates: usize,
    pub valid_amounts: usize,
    pub has_metadata: bool,
}

/// A ranked candidate, as listed in `alternatives`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserScore {
    pub parser: String,
    pub score: u8,
}

/// The outcome of trying a single parser against a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserTrial {
    pub parser: String,
    pub score: u8,
    pub valid: bool,
    pub error: Option<String>,
    pub metrics: ParserMetrics,
    pub metadata: Option<serde_json::Value>,
}

impl ParserTrial {
    pub fn new(parser: impl Into<String>) -> Self {
        Self {
            parser: parser.into(),
            score: 0,
            valid: false,
            error: None,
            metrics: ParserMetrics::default(),
            metadata: None,
        }
    }

    pub fn failed(parser: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(parser)
        }
    }
}

/// Result of running every compatible parser over a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub success: bool,
    pub best_parser: Option<String>,
    pub confidence: u8,
    pub alternatives: Vec<ParserScore>,
    pub error: Option<String>,
    pub all_results: Vec<ParserTrial>,
}

impl DetectionReport {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            best_parser: None,
            confidence: 0,
            alternatives: Vec::new(),
            error: Some(error.into()),
            all_results: Vec::new(),
        }
    }
}
