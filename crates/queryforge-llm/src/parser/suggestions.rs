//! Business-question suggestion lists.

use regex::Regex;
use std::sync::LazyLock;

use super::{strip_fences, trim_quotes, ParseStrategy, ParserChain};

pub const MAX_SUGGESTIONS: usize = 5;
/// Line-split fallback keeps only lines longer than this.
pub const MIN_LEN_SINGLE_TABLE: usize = 10;
pub const MIN_LEN_MULTI_TABLE: usize = 15;

static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:\*\*)?\d+[.)](?:\*\*)?\s+(.+?)\s*$").expect("valid regex")
});

fn clean_item(raw: &str) -> String {
    trim_quotes(raw.trim().trim_matches('*').trim()).to_string()
}

/// `1. ...` / `2) ...` lines.
pub struct NumberedList;

impl ParseStrategy<Vec<String>> for NumberedList {
    fn name(&self) -> &'static str { "numbered_list" }

    fn parse(&self, text: &str) -> Option<Vec<String>> {
        let items: Vec<String> = NUMBERED_ITEM
            .captures_iter(text)
            .map(|c| clean_item(&c[1]))
            .filter(|s| !s.is_empty())
            .collect();
        (!items.is_empty()).then_some(items)
    }
}

/// A JSON array of strings, possibly fenced or surrounded by prose.
pub struct JsonArray;

impl ParseStrategy<Vec<String>> for JsonArray {
    fn name(&self) -> &'static str { "json_array" }

    fn parse(&self, text: &str) -> Option<Vec<String>> {
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end <= start {
            return None;
        }
        let items: Vec<String> = serde_json::from_str::<Vec<String>>(&text[start..=end])
            .ok()?
            .iter()
            .map(|s| clean_item(s))
            .filter(|s| !s.is_empty())
            .collect();
        (!items.is_empty()).then_some(items)
    }
}

/// Last resort: every sufficiently long line is a suggestion.
pub struct LineSplit {
    pub min_len: usize,
}

impl ParseStrategy<Vec<String>> for LineSplit {
    fn name(&self) -> &'static str { "line_split" }

    fn parse(&self, text: &str) -> Option<Vec<String>> {
        let items: Vec<String> = strip_fences(text)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('[') && !l.ends_with(']') && !l.ends_with(':'))
            .map(|l| clean_item(l.trim_start_matches(['-', '*', '•', ' ']).trim_end_matches(',')))
            .filter(|l| l.chars().count() > self.min_len)
            .collect();
        (!items.is_empty()).then_some(items)
    }
}

pub fn suggestion_chain(multi_table: bool) -> ParserChain<Vec<String>> {
    let min_len = if multi_table { MIN_LEN_MULTI_TABLE } else { MIN_LEN_SINGLE_TABLE };
    ParserChain::new()
        .with(NumberedList)
        .with(JsonArray)
        .with(LineSplit { min_len })
}

/// Parse up to five suggestions. Empty when nothing usable was found.
pub fn parse_suggestions(text: &str, multi_table: bool) -> Vec<String> {
    suggestion_chain(multi_table)
        .parse(text)
        .map(|(mut items, _)| {
            items.truncate(MAX_SUGGESTIONS);
            items
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_list() {
        assert_eq!(parse_suggestions("1. A\n2. B\n3. C", false), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_numbered_list_with_markdown_and_preamble() {
        let text = "Here are some ideas:\n\n1) **Top customers by revenue**\n2. \"Monthly order trend\"";
        assert_eq!(
            parse_suggestions(text, true),
            vec!["Top customers by revenue", "Monthly order trend"]
        );
    }

    #[test]
    fn test_json_array_fallback() {
        let text = "```json\n[\"Average order value by region\", \"Orders per day\"]\n```";
        assert_eq!(
            parse_suggestions(text, false),
            vec!["Average order value by region", "Orders per day"]
        );
    }

    #[test]
    fn test_line_split_thresholds() {
        // 12 chars: passes the single-table threshold only.
        let text = "- Sales by day\n- ok";
        assert_eq!(parse_suggestions(text, false), vec!["Sales by day"]);
        assert!(parse_suggestions(text, true).is_empty());
    }

    #[test]
    fn test_unparsable_short_text_is_empty() {
        assert!(parse_suggestions("no\nnope", false).is_empty());
    }

    #[test]
    fn test_decimal_lines_are_not_list_items() {
        let text = "1. Revenue by region\n3.5% of orders were refunded last month\n2. Refund rate by product";
        assert_eq!(
            parse_suggestions(text, false),
            vec!["Revenue by region", "Refund rate by product"]
        );
    }

    #[test]
    fn test_capped_at_five() {
        let text = (1..=8).map(|i| format!("{i}. Question {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_suggestions(&text, false).len(), MAX_SUGGESTIONS);
    }
}
