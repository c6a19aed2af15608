use serde::{Deserialize, Serialize};
use std::fmt;

/// A single decoded cell. Spreadsheets yield numbers and booleans,
/// delimited text always yields `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Text(s) if s.trim().is_empty())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Integral values print without a trailing ".0", like the sheet shows them.
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

pub type Row = Vec<Cell>;

/// A text run extracted from a PDF page. `y` grows downwards from the
/// top edge of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfToken {
    pub value: String,
    pub x: f64,
    pub y: f64,
}

/// Tokens sharing one vertical coordinate, ordered left to right.
pub type PdfLine = Vec<PdfToken>;
/// Lines of one page, ordered top to bottom.
pub type PdfPage = Vec<PdfLine>;

/// Output of a file reader: tabular rows for CSV and spreadsheets,
/// positioned lines per page for PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawData {
    Rows(Vec<Row>),
    Pages(Vec<PdfPage>),
}

impl RawData {
    pub fn is_empty(&self) -> bool {
        match self {
            RawData::Rows(rows) => rows.is_empty(),
            RawData::Pages(pages) => pages.iter().all(|p| p.is_empty()),
        }
    }

    /// Number of rows, or of PDF lines across all pages.
    pub fn row_count(&self) -> usize {
        match self {
            RawData::Rows(rows) => rows.len(),
            RawData::Pages(pages) => pages.iter().map(Vec::len).sum(),
        }
    }

    /// Flatten to rows of text. PDF lines become rows whose cells are the
    /// line's tokens in reading order.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        match self {
            RawData::Rows(rows) => rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
            RawData::Pages(pages) => pages
                .iter()
                .flatten()
                .map(|line| {
                    let mut tokens: Vec<&PdfToken> = line.iter().collect();
                    tokens.sort_by(|a, b| a.x.total_cmp(&b.x));
                    tokens.into_iter().map(|t| t.value.clone()).collect()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_display_without_fraction() {
        assert_eq!(Cell::Number(1500.0).to_string(), "1500");
        assert_eq!(Cell::Number(12.5).to_string(), "12.5");
    }

    #[test]
    fn rows_and_pages_deserialize_from_their_json_shapes() {
        let rows: RawData = serde_json::from_str(r#"[["Date","Amount"],["2024-01-01",12.5]]"#).unwrap();
        assert!(matches!(rows, RawData::Rows(ref r) if r.len() == 2));

        let pages: RawData =
            serde_json::from_str(r#"[[[{"value":"Opening","x":1.0,"y":2.0}]]]"#).unwrap();
        assert!(matches!(pages, RawData::Pages(ref p) if p[0][0][0].value == "Opening"));
    }

    #[test]
    fn pdf_lines_flatten_left_to_right() {
        let raw = RawData::Pages(vec![vec![vec![
            PdfToken { value: "100.00".into(), x: 300.0, y: 10.0 },
            PdfToken { value: "01/02/2024".into(), x: 20.0, y: 10.0 },
        ]]]);
        assert_eq!(raw.text_rows(), vec![vec!["01/02/2024".to_string(), "100.00".to_string()]]);
        assert_eq!(raw.row_count(), 1);
    }

    #[test]
    fn blank_text_cells_are_empty() {
        assert!(Cell::from("  ").is_empty());
        assert!(!Cell::Number(0.0).is_empty());
    }
}
