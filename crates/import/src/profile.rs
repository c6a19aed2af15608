use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use stmtflow_core::date::{from_excel_serial, parse_date_with};
use stmtflow_core::{Cell, ExtractedTransaction, ParsedStatement, RawData};

use crate::parser::{ParserError, StatementParser};

/// Rows scanned for the header pattern.
const HEADER_SCAN_ROWS: usize = 25;

/// Column layout of one bank's statement export, loaded from config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserProfile {
    pub name: String,
    pub bank: Option<String>,
    /// Regex that must match some early row (cells joined by spaces).
    pub header_pattern: Option<String>,
    #[serde(default)]
    pub skip_rows: usize,
    pub date_column: usize,
    pub particulars_column: Option<usize>,
    /// Signed amount; positive is money in.
    pub amount_column: Option<usize>,
    /// Money out.
    pub debit_column: Option<usize>,
    /// Money in.
    pub credit_column: Option<usize>,
    pub balance_column: Option<usize>,
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl ParserProfile {
    pub fn new(name: &str, date_column: usize) -> Self {
        Self {
            name: name.to_string(),
            bank: None,
            header_pattern: None,
            skip_rows: 0,
            date_column,
            particulars_column: None,
            amount_column: None,
            debit_column: None,
            credit_column: None,
            balance_column: None,
            date_format: default_date_format(),
        }
    }
}

/// A `StatementParser` driven entirely by a `ParserProfile`. Works on
/// tabular rows and on PDF lines alike.
pub struct ProfileParser {
    profile: ParserProfile,
    header: Option<regex::Regex>,
}

impl ProfileParser {
    pub fn new(profile: ParserProfile) -> Result<Self, ParserError> {
        if profile.amount_column.is_none()
            && profile.debit_column.is_none()
            && profile.credit_column.is_none()
        {
            return Err(ParserError::InvalidProfile {
                name: profile.name,
                reason: "needs amount_column or debit_column/credit_column".to_string(),
            });
        }

        let header = profile
            .header_pattern
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .map_err(|e| ParserError::InvalidProfile {
                name: profile.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { profile, header })
    }

    /// Text view of `raw`. Spreadsheets store dates as serial numbers, so a
    /// numeric cell in the date column is rendered as an ISO date.
    fn text_rows(&self, raw: &RawData) -> Vec<Vec<String>> {
        let mut rows = raw.text_rows();
        if let RawData::Rows(cells) = raw {
            let col = self.profile.date_column;
            for (row, cells) in rows.iter_mut().zip(cells) {
                let date = cells
                    .get(col)
                    .and_then(Cell::as_number)
                    .and_then(from_excel_serial);
                if let (Some(date), Some(text)) = (date, row.get_mut(col)) {
                    *text = date.to_string();
                }
            }
        }
        rows
    }

    fn parse_row(&self, row: &[String]) -> Option<ExtractedTransaction> {
        let p = &self.profile;
        let cell = |col: Option<usize>| col.and_then(|c| row.get(c)).map(|s| s.trim());

        let raw_date = cell(Some(p.date_column)).unwrap_or_default();
        let date = parse_date_with(raw_date, &p.date_format);

        let (inflow, outflow) = if let Some(amount) = cell(p.amount_column).and_then(parse_amount) {
            if amount >= 0 {
                (Some(amount), None)
            } else {
                (None, Some(-amount))
            }
        } else {
            (
                cell(p.credit_column).and_then(parse_amount).map(i64::abs),
                cell(p.debit_column).and_then(parse_amount).map(i64::abs),
            )
        };

        // Headers, banners and totals rows carry neither a date nor an amount.
        if date.is_none() && inflow.is_none() && outflow.is_none() {
            return None;
        }

        Some(ExtractedTransaction {
            date: date.map(|d| d.to_string()).unwrap_or_else(|| raw_date.to_string()),
            inflow,
            outflow,
            particulars: cell(p.particulars_column).unwrap_or_default().to_string(),
            balance: cell(p.balance_column).and_then(parse_amount),
        })
    }
}

impl StatementParser for ProfileParser {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn is_valid(&self, raw: &RawData) -> bool {
        let rows = self.text_rows(raw);
        match &self.header {
            Some(re) => rows
                .iter()
                .take(HEADER_SCAN_ROWS)
                .any(|row| re.is_match(&row.join(" "))),
            None => rows
                .iter()
                .skip(self.profile.skip_rows)
                .any(|row| {
                    row.get(self.profile.date_column)
                        .and_then(|d| parse_date_with(d, &self.profile.date_format))
                        .is_some()
                }),
        }
    }

    fn parse(&self, raw: &RawData) -> Result<ParsedStatement, ParserError> {
        let rows = self.text_rows(raw);
        if rows.len() <= self.profile.skip_rows {
            return Err(ParserError::UnsupportedInput(format!(
                "expected more than {} rows, found {}",
                self.profile.skip_rows,
                rows.len()
            )));
        }

        let body = &rows[self.profile.skip_rows..];
        let transactions: Vec<ExtractedTransaction> =
            body.iter().filter_map(|row| self.parse_row(row)).collect();

        let metadata = self.profile.bank.as_ref().map(|bank| {
            serde_json::json!({
                "bank": bank,
                "profile": self.profile.name,
                "rows_skipped": body.len() - transactions.len(),
            })
        });

        Ok(ParsedStatement {
            transactions,
            metadata,
        })
    }
}

/// Parse a printed amount into minor units. Handles thousands separators,
/// currency symbols, accounting parentheses and trailing Cr/Dr markers.
pub fn parse_amount(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let upper = s.to_ascii_uppercase();
    let (mut negative, s) = if let Some(rest) = upper.strip_suffix("DR") {
        (true, rest.trim().to_string())
    } else if let Some(rest) = upper.strip_suffix("CR") {
        (false, rest.trim().to_string())
    } else {
        (false, upper)
    };

    let s = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = !negative;
        &s[1..s.len() - 1]
    } else {
        s.as_str()
    };

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '₹' | '€' | '£' | ' '))
        .collect();
    let cleaned = cleaned.strip_prefix("RS.").or_else(|| cleaned.strip_prefix("INR")).unwrap_or(&cleaned);

    let mut dec = Decimal::from_str(cleaned).ok()?;
    if negative {
        dec = -dec;
    }
    (dec * Decimal::from(100)).round().to_i64()
}
