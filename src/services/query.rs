// src/services/query.rs

//! Search query construction.

use crate::error::{AppError, Result};

/// Restrict results to text posts that are not marked NSFW.
const FILTER_CLAUSES: &str = "self:yes nsfw:no";

/// Builds one search query per (term, age token) cell.
#[derive(Debug, Clone, Default)]
pub struct QuerySynthesizer {
    excludes: Vec<String>,
}

impl QuerySynthesizer {
    pub fn new(excludes: Vec<String>) -> Self {
        Self { excludes }
    }

    /// Build `("<term>" AND <age>) self:yes nsfw:no -<exclude>...`.
    ///
    /// The term is phrase-quoted so multi-word events such as "hit head"
    /// match as a unit; the age token is left bare.
    pub fn build(&self, term: &str, age: &str) -> Result<String> {
        let term = term.trim();
        let age = age.trim();
        if term.is_empty() || age.is_empty() {
            return Err(AppError::validation(format!(
                "query needs a term and an age token (got {term:?}, {age:?})"
            )));
        }

        let mut query = format!("(\"{term}\" AND {age}) {FILTER_CLAUSES}");
        for word in &self.excludes {
            query.push_str(" -");
            query.push_str(word);
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth() -> QuerySynthesizer {
        QuerySynthesizer::new(vec!["lawyer".into(), "insurance".into(), "NFL".into()])
    }

    #[test]
    fn test_build_exact_shape() {
        assert_eq!(
            synth().build("hit head", "toddler").unwrap(),
            r#"("hit head" AND toddler) self:yes nsfw:no -lawyer -insurance -NFL"#
        );
    }

    #[test]
    fn test_structural_order() {
        let query = synth().build("fell", "2 yo").unwrap();
        let term = query.find("\"fell\"").unwrap();
        let age = query.find("2 yo").unwrap();
        let filters = query.find(FILTER_CLAUSES).unwrap();
        let mut last = filters;
        for word in ["-lawyer", "-insurance", "-NFL"] {
            let pos = query.find(word).unwrap();
            assert!(pos > last, "{word} out of order in {query}");
            last = pos;
        }
        assert!(term < age && age < filters);
    }

    #[test]
    fn test_deterministic() {
        let s = synth();
        assert_eq!(s.build("burn", "baby").unwrap(), s.build("burn", "baby").unwrap());
    }

    #[test]
    fn test_no_excludes() {
        let query = QuerySynthesizer::default().build("cut", "LO").unwrap();
        assert_eq!(query, r#"("cut" AND LO) self:yes nsfw:no"#);
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(synth().build("", "baby").is_err());
        assert!(synth().build("fell", "   ").is_err());
    }
}
