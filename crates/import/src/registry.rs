use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use stmtflow_core::FileType;

use crate::parser::StatementParser;

/// Parser names bucketed by the file type their suffix declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParserGroups {
    pub csv: Vec<String>,
    pub excel: Vec<String>,
    pub pdf: Vec<String>,
    pub unknown: Vec<String>,
}

impl ParserGroups {
    pub fn for_file_type(&self, file_type: FileType) -> &[String] {
        match file_type {
            FileType::Csv => &self.csv,
            FileType::Excel => &self.excel,
            FileType::Pdf => &self.pdf,
        }
    }
}

/// Group by naming convention: `__csv`, `__xlsx`/`__excel`, `__pdf`
/// (case-insensitive). Anything else is `unknown` and never tried.
pub fn group_by_file_type<S: AsRef<str>>(names: &[S]) -> ParserGroups {
    let mut grouped = ParserGroups::default();

    for name in names {
        let name = name.as_ref();
        let lower = name.to_lowercase();
        let bucket = if lower.contains("__csv") {
            &mut grouped.csv
        } else if lower.contains("__xlsx") || lower.contains("__excel") {
            &mut grouped.excel
        } else if lower.contains("__pdf") {
            &mut grouped.pdf
        } else {
            &mut grouped.unknown
        };
        bucket.push(name.to_string());
    }

    grouped
}

/// Name-keyed table of the parsers this process knows about. Iteration
/// order is by name, so detection runs are reproducible.
#[derive(Default, Clone)]
pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<dyn StatementParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parser, replacing any previous one with the same name.
    pub fn register<P: StatementParser + 'static>(&mut self, parser: P) -> &mut Self {
        self.register_arc(Arc::new(parser))
    }

    pub fn register_arc(&mut self, parser: Arc<dyn StatementParser>) -> &mut Self {
        let name = parser.name().to_string();
        if self.parsers.insert(name.clone(), parser).is_some() {
            tracing::warn!(parser = %name, "Replacing previously registered parser");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StatementParser>> {
        self.parsers.get(name).cloned()
    }

    pub fn list_parsers(&self) -> Vec<String> {
        self.parsers.keys().cloned().collect()
    }

    pub fn groups(&self) -> ParserGroups {
        group_by_file_type(&self.list_parsers())
    }

    /// Parsers whose name marks them for `file_type`.
    pub fn candidates(&self, file_type: FileType) -> Vec<Arc<dyn StatementParser>> {
        self.groups()
            .for_file_type(file_type)
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parsers", &self.list_parsers())
            .finish()
    }
}
