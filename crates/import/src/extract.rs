use stmtflow_core::{RawData, Transaction};
use tracing::debug;

use crate::dedup::{remove_duplicates_with, DuplicatePolicy};
use crate::parser::{ParserError, StatementParser};

/// Transactions pulled from a file by a known parser, already filtered
/// against the ones stored for the same org and project.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub transactions: Vec<Transaction>,
    pub metadata: Option<serde_json::Value>,
    pub duplicates_skipped: usize,
    /// Lines whose date could not be parsed into a calendar date.
    pub undated_skipped: usize,
}

pub fn extract_transactions(
    parser: &dyn StatementParser,
    raw: &RawData,
    existing: &[Transaction],
    policy: DuplicatePolicy,
) -> Result<Extraction, ParserError> {
    let parsed = parser.parse(raw)?;
    let total = parsed.transactions.len();

    let dated: Vec<Transaction> = parsed
        .transactions
        .iter()
        .filter_map(|t| t.to_transaction())
        .collect();
    let undated_skipped = total - dated.len();

    let before = dated.len();
    let transactions = remove_duplicates_with(policy, existing, dated);
    let duplicates_skipped = before - transactions.len();

    debug!(
        parser = parser.name(),
        extracted = total,
        kept = transactions.len(),
        duplicates_skipped,
        undated_skipped,
        "Extracted transactions"
    );

    Ok(Extraction {
        transactions,
        metadata: parsed.metadata,
        duplicates_skipped,
        undated_skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ParserProfile, ProfileParser};
    use chrono::NaiveDate;
    use stmtflow_core::Cell;

    fn parser() -> ProfileParser {
        ProfileParser::new(ParserProfile {
            bank: Some("Axis".into()),
            particulars_column: Some(1),
            amount_column: Some(2),
            ..ParserProfile::new("axis__csv", 0)
        })
        .unwrap()
    }

    fn raw(rows: &[[&str; 3]]) -> RawData {
        RawData::Rows(
            rows.iter()
                .map(|r| r.iter().map(|c| Cell::from(*c)).collect())
                .collect(),
        )
    }

    #[test]
    fn drops_stored_duplicates_and_undated_rows() {
        let existing = vec![Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            None,
            Some(4999),
            "AMAZON",
        )];
        let raw = raw(&[
            ["2024-01-15", "AMAZON", "-49.99"],
            ["2024-01-16", "REFUND", "10.00"],
            ["2024-02-30", "BAD DATE", "5.00"],
        ]);

        let extraction =
            extract_transactions(&parser(), &raw, &existing, DuplicatePolicy::Exact).unwrap();

        assert_eq!(extraction.transactions.len(), 1);
        assert_eq!(extraction.transactions[0].particulars, "REFUND");
        assert_eq!(extraction.duplicates_skipped, 1);
        assert_eq!(extraction.undated_skipped, 1);
        assert_eq!(extraction.metadata.unwrap()["bank"], "Axis");
    }

    #[test]
    fn parser_errors_propagate() {
        let profile = ParserProfile {
            skip_rows: 10,
            amount_column: Some(1),
            ..ParserProfile::new("short__csv", 0)
        };
        let parser = ProfileParser::new(profile).unwrap();
        let result = extract_transactions(
            &parser,
            &raw(&[["2024-01-15", "X", "1"]]),
            &[],
            DuplicatePolicy::Exact,
        );
        assert!(result.is_err());
    }
}
