use std::cmp::Reverse;
use std::sync::Arc;

use stmtflow_core::{
    DetectionReport, FileType, ParsedStatement, ParserMetrics, ParserScore, ParserTrial, RawData,
};
use tracing::{debug, info};

use crate::parser::StatementParser;
use crate::registry::ParserRegistry;

pub const NO_COMPATIBLE_PARSER: &str = "No compatible parser found for this file";
pub const NO_PARSER_MATCHED: &str = "No parser could extract transactions from this file";

const MAX_ALTERNATIVES: usize = 3;

pub fn calculate_metrics(parsed: &ParsedStatement) -> ParserMetrics {
    ParserMetrics {
        transaction_count: parsed.transactions.len(),
        valid_dates: parsed
            .transactions
            .iter()
            .filter(|t| t.parsed_date().is_some())
            .count(),
        valid_amounts: parsed.transactions.iter().filter(|t| t.has_amount()).count(),
        has_metadata: parsed.metadata.is_some(),
    }
}

/// 0-100 heuristic: 30 for producing anything, up to 20 for volume, 25 and
/// 20 weighted by the share of valid dates and amounts, 5 for metadata.
pub fn calculate_score(metrics: &ParserMetrics) -> u8 {
    let count = metrics.transaction_count;
    let mut score = 0.0;

    if count > 0 {
        score += 30.0;
    }
    score += count.saturating_mul(2).min(20) as f64;
    if count > 0 {
        score += 25.0 * metrics.valid_dates as f64 / count as f64;
        score += 20.0 * metrics.valid_amounts as f64 / count as f64;
    }
    if metrics.has_metadata {
        score += 5.0;
    }

    score.min(100.0).round() as u8
}

/// Run one parser against the raw rows and score what it produces.
pub fn test_parser(parser: &dyn StatementParser, raw: &RawData) -> ParserTrial {
    let mut trial = ParserTrial::new(parser.name());

    if !parser.is_valid(raw) {
        return trial;
    }
    trial.valid = true;

    match parser.parse(raw) {
        Ok(parsed) => {
            trial.metrics = calculate_metrics(&parsed);
            trial.score = calculate_score(&trial.metrics);
            trial.metadata = parsed.metadata;
        }
        Err(e) => {
            trial.error = Some(e.to_string());
        }
    }

    trial
}

/// Try every parser registered for `file_type` concurrently and rank them.
/// A failing or panicking parser only zeroes its own score.
pub async fn detect_best_parser(
    registry: &ParserRegistry,
    raw: Arc<RawData>,
    file_type: FileType,
) -> DetectionReport {
    let candidates = registry.candidates(file_type);
    if candidates.is_empty() {
        info!(%file_type, "No parsers registered for file type");
        return DetectionReport::failure(NO_COMPATIBLE_PARSER);
    }

    info!(%file_type, candidates = candidates.len(), "Testing compatible parsers");

    let tasks = candidates.into_iter().map(|parser| {
        let raw = Arc::clone(&raw);
        let name = parser.name().to_string();
        async move {
            match tokio::task::spawn_blocking(move || test_parser(parser.as_ref(), &raw)).await {
                Ok(trial) => trial,
                Err(e) => ParserTrial::failed(name, format!("Parser task failed: {e}")),
            }
        }
    });
    let trials = futures::future::join_all(tasks).await;

    for trial in &trials {
        debug!(
            parser = %trial.parser,
            score = trial.score,
            valid = trial.valid,
            error = trial.error.as_deref(),
            "Parser tested"
        );
    }

    rank(trials)
}

/// Order scored trials and pick the winner. Ties keep registry order.
pub fn rank(trials: Vec<ParserTrial>) -> DetectionReport {
    let mut scored: Vec<&ParserTrial> = trials.iter().filter(|t| t.score > 0).collect();
    scored.sort_by_key(|t| Reverse(t.score));

    let Some(best) = scored.first() else {
        info!("No parser scored above zero");
        return DetectionReport {
            all_results: trials,
            ..DetectionReport::failure(NO_PARSER_MATCHED)
        };
    };

    info!(parser = %best.parser, confidence = best.score, "Best parser detected");

    DetectionReport {
        success: true,
        best_parser: Some(best.parser.clone()),
        confidence: best.score,
        alternatives: scored
            .iter()
            .skip(1)
            .take(MAX_ALTERNATIVES)
            .map(|t| ParserScore {
                parser: t.parser.clone(),
                score: t.score,
            })
            .collect(),
        error: None,
        all_results: trials.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserError;
    use stmtflow_core::{Cell, ExtractedTransaction};

    /// Emits `count` transactions; the first `dated` have real dates and
    /// the first `priced` have amounts.
    struct Fake {
        name: &'static str,
        valid: bool,
        count: usize,
        dated: usize,
        priced: usize,
        metadata: bool,
    }

    impl Fake {
        fn good(name: &'static str, count: usize) -> Self {
            Fake { name, valid: true, count, dated: count, priced: count, metadata: true }
        }
    }

    impl StatementParser for Fake {
        fn name(&self) -> &str {
            self.name
        }
        fn is_valid(&self, _raw: &RawData) -> bool {
            self.valid
        }
        fn parse(&self, _raw: &RawData) -> Result<ParsedStatement, ParserError> {
            let transactions = (0..self.count)
                .map(|i| ExtractedTransaction {
                    date: if i < self.dated { "2024-01-15".into() } else { "n/a".into() },
                    inflow: if i < self.priced { Some(100) } else { None },
                    outflow: None,
                    particulars: format!("row {i}"),
                    balance: None,
                })
                .collect();
            Ok(ParsedStatement {
                transactions,
                metadata: self.metadata.then(|| serde_json::json!({ "bank": self.name })),
            })
        }
    }

    struct Failing;

    impl StatementParser for Failing {
        fn name(&self) -> &str {
            "broken__csv"
        }
        fn parse(&self, _raw: &RawData) -> Result<ParsedStatement, ParserError> {
            Err(ParserError::Failed("unexpected layout".into()))
        }
    }

    struct Panicking;

    impl StatementParser for Panicking {
        fn name(&self) -> &str {
            "panicky__csv"
        }
        fn parse(&self, _raw: &RawData) -> Result<ParsedStatement, ParserError> {
            panic!("index out of bounds");
        }
    }

    fn raw() -> Arc<RawData> {
        Arc::new(RawData::Rows(vec![vec![Cell::from("Date"), Cell::from("Amount")]]))
    }

    fn metrics(count: usize, dates: usize, amounts: usize, meta: bool) -> ParserMetrics {
        ParserMetrics {
            transaction_count: count,
            valid_dates: dates,
            valid_amounts: amounts,
            has_metadata: meta,
        }
    }

    // ── scoring ───────────────────────────────────────────────────────────────

    #[test]
    fn perfect_parser_scores_100() {
        assert_eq!(calculate_score(&metrics(10, 10, 10, true)), 100);
        assert_eq!(calculate_score(&metrics(500, 500, 500, true)), 100);
    }

    #[test]
    fn nothing_scores_zero() {
        assert_eq!(calculate_score(&metrics(0, 0, 0, false)), 0);
    }

    #[test]
    fn metadata_alone_earns_five() {
        assert_eq!(calculate_score(&metrics(0, 0, 0, true)), 5);
    }

    #[test]
    fn partial_quality_is_rounded() {
        // 30 + 6 + 25*(1/3) + 20*(2/3) = 57.67
        assert_eq!(calculate_score(&metrics(3, 1, 2, false)), 58);
    }

    #[test]
    fn score_is_monotonic_in_count_at_fixed_ratios() {
        let mut last = 0;
        for count in 1..40 {
            let score = calculate_score(&metrics(count, count, count, false));
            assert!(score >= last, "count {count}: {score} < {last}");
            assert!(score <= 100);
            last = score;
        }
    }

    // ── test_parser ───────────────────────────────────────────────────────────

    #[test]
    fn invalid_shape_short_circuits() {
        let fake = Fake { valid: false, ..Fake::good("x__csv", 5) };
        let trial = test_parser(&fake, &raw());
        assert!(!trial.valid);
        assert_eq!(trial.score, 0);
        assert_eq!(trial.metrics, ParserMetrics::default());
    }

    #[test]
    fn parse_errors_are_captured() {
        let trial = test_parser(&Failing, &raw());
        assert!(trial.valid);
        assert_eq!(trial.score, 0);
        assert_eq!(trial.error.as_deref(), Some("unexpected layout"));
    }

    // ── detect_best_parser ────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_candidate_set_fails() {
        let mut registry = ParserRegistry::new();
        registry.register(Fake::good("hdfc__pdf", 5));

        let report = detect_best_parser(&registry, raw(), FileType::Csv).await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some(NO_COMPATIBLE_PARSER));
        assert!(report.all_results.is_empty());
    }

    #[tokio::test]
    async fn picks_highest_score_and_lists_alternatives() {
        let mut registry = ParserRegistry::new();
        registry
            .register(Fake::good("a__csv", 2))
            .register(Fake::good("b__csv", 10))
            .register(Fake { dated: 0, ..Fake::good("c__csv", 10) })
            .register(Fake { metadata: false, ..Fake::good("d__csv", 10) })
            .register(Fake::good("e__csv", 1))
            .register(Failing);

        let report = detect_best_parser(&registry, raw(), FileType::Csv).await;
        assert!(report.success);
        assert_eq!(report.best_parser.as_deref(), Some("b__csv"));
        assert_eq!(report.confidence, 100);
        assert_eq!(report.error, None);

        let alts: Vec<(&str, u8)> = report
            .alternatives
            .iter()
            .map(|a| (a.parser.as_str(), a.score))
            .collect();
        // c__csv (75) is fifth and falls off the list.
        assert_eq!(alts, [("d__csv", 95), ("a__csv", 84), ("e__csv", 82)]);
        assert_eq!(report.all_results.len(), 6);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let mut registry = ParserRegistry::new();
        registry
            .register(Panicking)
            .register(Failing)
            .register(Fake::good("ok__csv", 4));

        let report = detect_best_parser(&registry, raw(), FileType::Csv).await;
        assert!(report.success);
        assert_eq!(report.best_parser.as_deref(), Some("ok__csv"));

        let panicky = report
            .all_results
            .iter()
            .find(|t| t.parser == "panicky__csv")
            .unwrap();
        assert_eq!(panicky.score, 0);
        assert!(panicky.error.is_some());
    }

    #[tokio::test]
    async fn all_zero_scores_fail_without_best_parser() {
        let mut registry = ParserRegistry::new();
        registry
            .register(Fake { valid: false, ..Fake::good("a__csv", 3) })
            .register(Failing);

        let report = detect_best_parser(&registry, raw(), FileType::Csv).await;
        assert!(!report.success);
        assert_eq!(report.best_parser, None);
        assert_eq!(report.confidence, 0);
        assert!(report.error.is_some());
        assert_eq!(report.all_results.len(), 2);
    }

    #[tokio::test]
    async fn detection_is_deterministic() {
        let mut registry = ParserRegistry::new();
        registry
            .register(Fake::good("x__csv", 10))
            .register(Fake::good("y__csv", 10));

        let first = detect_best_parser(&registry, raw(), FileType::Csv).await;
        let second = detect_best_parser(&registry, raw(), FileType::Csv).await;
        assert_eq!(first.best_parser.as_deref(), Some("x__csv"));
        assert_eq!(first, second);
    }
}
