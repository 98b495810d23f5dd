//! Join predicate extraction.

use regex::Regex;
use std::sync::LazyLock;

use super::{strip_fences, trim_quotes, ParseError, ParseStrategy, ParserChain};

static ALIAS_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bt\d+\.\w+\s*=\s*t\d+\.\w+").expect("valid regex")
});

const PREFIXES: &[&str] = &["join conditions:", "join condition:", "answer:", "condition:", "on "];

/// The first line shaped like `tN.col = tM.col`, returned verbatim.
pub struct AliasPredicateLine;

impl ParseStrategy<String> for AliasPredicateLine {
    fn name(&self) -> &'static str { "alias_predicate_line" }

    fn parse(&self, text: &str) -> Option<String> {
        text.lines()
            .map(trim_quotes)
            .find(|line| ALIAS_PREDICATE.is_match(line))
            .map(str::to_string)
    }
}

/// Strip fences and leading labels, then take the first line with `=`.
pub struct PrefixStripped;

impl ParseStrategy<String> for PrefixStripped {
    fn name(&self) -> &'static str { "prefix_stripped" }

    fn parse(&self, text: &str) -> Option<String> {
        strip_fences(text)
            .lines()
            .map(|line| {
                let mut line = trim_quotes(line.trim().trim_matches('*'));
                loop {
                    let lower = line.to_ascii_lowercase();
                    match PREFIXES.iter().find(|p| lower.starts_with(*p)) {
                        Some(p) => line = trim_quotes(&line[p.len()..]),
                        None => break,
                    }
                }
                line.to_string()
            })
            .find(|line| line.contains('='))
    }
}

pub fn join_chain() -> ParserChain<String> {
    ParserChain::new()
        .with(AliasPredicateLine)
        .with(PrefixStripped)
}

pub fn parse_join_condition(text: &str) -> Result<String, ParseError> {
    join_chain()
        .parse(text)
        .map(|(join, _)| join)
        .ok_or(ParseError::NoJoinCondition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_line_returned_verbatim() {
        let text = "The tables share a key.\n`t1.customer_id = t2.id AND t2.region_id = t3.id`\nHope this helps";
        assert_eq!(
            parse_join_condition(text).unwrap(),
            "t1.customer_id = t2.id AND t2.region_id = t3.id"
        );
    }

    #[test]
    fn test_quoted_alias_line() {
        assert_eq!(parse_join_condition("\"t1.a=t2.b\"").unwrap(), "t1.a=t2.b");
    }

    #[test]
    fn test_prefix_fallback() {
        let text = "```\nJOIN CONDITION: ON orders.customer_id = customers.id\n```";
        assert_eq!(parse_join_condition(text).unwrap(), "orders.customer_id = customers.id");
    }

    #[test]
    fn test_no_predicate() {
        assert_eq!(parse_join_condition("I am not sure."), Err(ParseError::NoJoinCondition));
    }
}
