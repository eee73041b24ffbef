use crate::error::{ReconciliationError, Result};

/// Resolves logical fields to column positions in an export whose header
/// names vary between tools and versions.
///
/// Matching is case-insensitive on trimmed names. Candidates are tried in
/// order, so earlier synonyms win when an export carries several.
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    source_name: String,
    headers: Vec<String>,
}

impl ColumnResolver {
    pub fn new<I, S>(source_name: &str, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            source_name: source_name.to_string(),
            headers: headers
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn find(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|candidate| {
            let candidate = candidate.trim().to_lowercase();
            self.headers.iter().position(|h| *h == candidate)
        })
    }

    pub fn require(&self, field: &str, candidates: &[&str]) -> Result<usize> {
        self.find(candidates)
            .ok_or_else(|| ReconciliationError::MissingColumn {
                source_name: self.source_name.clone(),
                field: field.to_string(),
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_resolve_case_insensitively() {
        let resolver = ColumnResolver::new("hours", ["Spent Date", " last name ", "Hours (h)"]);
        assert_eq!(resolver.find(&["Date", "Spent Date"]), Some(0));
        assert_eq!(resolver.find(&["Last Name", "LastName"]), Some(1));
        assert_eq!(resolver.require("hours", &["Hours", "Hours (h)"]).unwrap(), 2);
    }

    #[test]
    fn test_earlier_candidate_wins() {
        let resolver = ColumnResolver::new("expenses", ["Total Amount", "Amount"]);
        assert_eq!(resolver.find(&["Amount", "Total Amount"]), Some(1));
    }

    #[test]
    fn test_missing_required_column() {
        let resolver = ColumnResolver::new("expenses", ["Date", "Amount"]);
        let err = resolver.require("billable", &["Billable", "Is Billable"]).unwrap_err();
        match err {
            ReconciliationError::MissingColumn {
                source_name,
                field,
                candidates,
            } => {
                assert_eq!(source_name, "expenses");
                assert_eq!(field, "billable");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
