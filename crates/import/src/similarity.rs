use serde::Serialize;

use crate::util::levenshtein_distance;

/// Canonical form of a free-text description: uppercased, commas and
/// periods removed, whitespace runs collapsed, ends trimmed.
pub fn normalize(s: &str) -> String {
    s.to_uppercase()
        .replace([',', '.'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub distance: usize,
    /// `1 - distance / max_length`, in [0.0, 1.0].
    pub similarity: f64,
    pub max_length: usize,
}

/// Edit-distance similarity of two descriptions after normalisation.
/// Two strings that both normalise to empty are identical (similarity 1).
pub fn similarity(a: &str, b: &str) -> Similarity {
    let a = normalize(a);
    let b = normalize(b);
    let max_length = a.chars().count().max(b.chars().count());
    let distance = levenshtein_distance(&a, &b);

    let similarity = if max_length == 0 {
        1.0
    } else {
        1.0 - distance as f64 / max_length as f64
    };

    Similarity {
        distance,
        similarity,
        max_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_strips_punctuation() {
        assert_eq!(normalize("  neft, a.b.c   ltd \t transfer "), "NEFT ABC LTD TRANSFER");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["", "  ", "Pos 1234, Coffee.  Shop", "ÄÖÜ straße", "a\n\nb"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn identical_after_normalisation() {
        let s = similarity("Amazon, Inc.", "AMAZON INC");
        assert_eq!(s.distance, 0);
        assert_eq!(s.similarity, 1.0);
        assert_eq!(s.max_length, 10);
    }

    #[test]
    fn self_similarity_is_one() {
        for s in ["UPI/1234/SHOP", "x", "salary credit"] {
            let r = similarity(s, s);
            assert_eq!(r.distance, 0);
            assert_eq!(r.similarity, 1.0);
        }
    }

    #[test]
    fn symmetric_distance() {
        let ab = similarity("ATM WITHDRAWAL 123", "ATM WDL 123");
        let ba = similarity("ATM WDL 123", "ATM WITHDRAWAL 123");
        assert_eq!(ab.distance, ba.distance);
        assert_eq!(ab.similarity, ba.similarity);
    }

    #[test]
    fn both_empty_is_defined() {
        let r = similarity(" , . ", "");
        assert_eq!(r.max_length, 0);
        assert_eq!(r.similarity, 1.0);
    }

    #[test]
    fn disjoint_strings_score_low() {
        let r = similarity("AMAZON", "STARBUCKS");
        assert!(r.similarity < 0.5, "similarity was {}", r.similarity);
    }
}
