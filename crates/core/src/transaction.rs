use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::parse_date;

/// A persisted statement line. Amounts are in the smallest currency unit;
/// an absent amount counts as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub inflow: Option<i64>,
    pub outflow: Option<i64>,
    pub particulars: String,
}

impl Transaction {
    pub fn new(date: NaiveDate, inflow: Option<i64>, outflow: Option<i64>, particulars: &str) -> Self {
        Transaction {
            date,
            inflow,
            outflow,
            particulars: particulars.to_string(),
        }
    }

    pub fn inflow_amount(&self) -> i64 {
        self.inflow.unwrap_or(0)
    }

    pub fn outflow_amount(&self) -> i64 {
        self.outflow.unwrap_or(0)
    }

    /// Stable textual identity used by fuzzy duplicate matching.
    pub fn fingerprint(&self) -> String {
        format!(
            "D-({})-IF-({})-OF-({})-P-({})",
            self.date,
            self.inflow_amount(),
            self.outflow_amount(),
            self.particulars.replace(' ', "")
        )
    }
}

/// A line as a bank parser emits it, before date validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedTransaction {
    pub date: String,
    pub inflow: Option<i64>,
    pub outflow: Option<i64>,
    pub particulars: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

impl ExtractedTransaction {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    /// True when either side carries a non-zero amount.
    pub fn has_amount(&self) -> bool {
        self.inflow.is_some_and(|v| v != 0) || self.outflow.is_some_and(|v| v != 0)
    }

    /// Convert to a `Transaction`, or `None` if the date is not a real
    /// calendar date.
    pub fn to_transaction(&self) -> Option<Transaction> {
        Some(Transaction {
            date: self.parsed_date()?,
            inflow: self.inflow,
            outflow: self.outflow,
            particulars: self.particulars.clone(),
        })
    }
}

/// What a parser returns for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub transactions: Vec<ExtractedTransaction>,
    pub metadata: Option<serde_json::Value>,
}
