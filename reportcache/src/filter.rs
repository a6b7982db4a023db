//! Content-based row exclusion.
//!
//! Every cell of a row is scanned because the upstream does not keep
//! dispatch tickets in a consistent column. The cost is false positives: a
//! report whose text merely mentions a keyword is dropped too.

use crate::config::FilterConfig;
use crate::models::RawRow;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExclusionRule {
    parts: Vec<String>,
}

impl ExclusionRule {
    /// `a+b` is conjunctive only when every part is non-blank; anything
    /// else, such as `c++`, is matched literally.
    fn parse(keyword: &str) -> Option<Self> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return None;
        }
        let parts: Vec<String> = keyword
            .split('+')
            .map(|part| part.trim().to_string())
            .collect();
        if parts.len() > 1 && parts.iter().all(|part| !part.is_empty()) {
            Some(Self { parts })
        } else {
            Some(Self {
                parts: vec![keyword],
            })
        }
    }

    fn matches(&self, lowered_cell: &str) -> bool {
        self.parts.iter().all(|part| lowered_cell.contains(part.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    rules: Vec<ExclusionRule>,
}

impl RecordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: keywords
                .into_iter()
                .filter_map(|keyword| ExclusionRule::parse(keyword.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(&config.exclusion_keywords)
    }

    /// Returns `false` when any cell matches any exclusion rule.
    pub fn include(&self, row: &RawRow) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        !row.cells().iter().any(|cell| {
            let lowered = cell.to_lowercase();
            self.rules.iter().any(|rule| rule.matches(&lowered))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().copied().collect()
    }

    #[test]
    fn default_keywords_drop_dispatch_tickets() {
        let filter = RecordFilter::from_config(&FilterConfig::default());

        assert!(!filter.include(&row(&["1", "", "2025-08-01", "派工單", ""])));
        assert!(!filter.include(&row(&["1", "", "2025-08-01", "Misc", "New Work Order #7"])));
        assert!(!filter.include(&row(&["1", "", "2025-08-01", "派工 (緊急) 單", ""])));
        assert!(filter.include(&row(&["1", "", "2025-08-01", "系統開發", "修復登入"])));
    }

    #[test]
    fn conjunctive_rule_needs_every_part_in_one_cell() {
        let filter = RecordFilter::new(["派工+單"]);
        assert!(filter.include(&row(&["派工", "單"])));
        assert!(!filter.include(&row(&["派工 ... 單"])));
    }

    #[test]
    fn empty_keywords_include_everything() {
        let filter = RecordFilter::new(Vec::<String>::new());
        assert!(filter.include(&row(&["派工單"])));

        let filter = RecordFilter::new(["", "  "]);
        assert!(filter.include(&row(&["anything"])));
    }

    #[test]
    fn keyword_with_blank_plus_part_is_literal() {
        let filter = RecordFilter::new(["C++"]);
        assert!(filter.include(&row(&["1", "Call the client about the contract"])));
        assert!(!filter.include(&row(&["1", "Port the parser to c++"])));

        let filter = RecordFilter::new([" + "]);
        assert!(filter.include(&row(&["anything"])));
        assert!(!filter.include(&row(&["1 + 1"])));
    }

    fn clean_cell() -> impl Strategy<Value = String> {
        "[0-9xyz ]{0,12}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn keyword_anywhere_excludes_row(
            cells in proptest::collection::vec(clean_cell(), 1..9),
            position in 0usize..9,
            upper in any::<bool>(),
        ) {
            let filter = RecordFilter::new(["dispatch order"]);
            let mut cells = cells;
            let index = position % cells.len();
            let keyword = if upper { "DISPATCH Order" } else { "dispatch order" };
            cells[index] = format!("{}{}{}", cells[index], keyword, "!");
            prop_assert!(!filter.include(&RawRow(cells)));
        }

        #[test]
        fn rows_without_keyword_are_kept(
            cells in proptest::collection::vec(clean_cell(), 0..9),
        ) {
            let filter = RecordFilter::new(["dispatch order", "派工單"]);
            prop_assert!(filter.include(&RawRow(cells)));
        }
    }
}
