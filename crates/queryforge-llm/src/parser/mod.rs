//! Heuristic parsers for free-text model replies.
//!
//! Each reply shape (suggestion list, join predicate, generated SQL) is
//! handled by a [`ParserChain`]: an ordered list of independent strategies,
//! the first one that yields a value wins.

pub mod join;
pub mod sql;
pub mod suggestions;

use thiserror::Error;

pub use join::parse_join_condition;
pub use sql::{check_completeness, parse_generation, GeneratedSql};
pub use suggestions::parse_suggestions;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("No SQL query found in the model response")]
    NoSql,
    #[error("Generated SQL appears incomplete: {0}")]
    Incomplete(String),
    #[error("Could not extract join condition from the model response")]
    NoJoinCondition,
}

/// One way of reading a reply.
pub trait ParseStrategy<T>: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Option<T>;
}

pub struct ParserChain<T> {
    strategies: Vec<Box<dyn ParseStrategy<T>>>,
}

impl<T> Default for ParserChain<T> {
    fn default() -> Self {
        Self { strategies: Vec::new() }
    }
}

impl<T> ParserChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl ParseStrategy<T> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Run strategies in order; returns the value and the winning strategy's name.
    pub fn parse(&self, text: &str) -> Option<(T, &'static str)> {
        self.strategies.iter().find_map(|s| {
            s.parse(text).map(|value| {
                tracing::debug!(strategy = s.name(), "Model reply parsed");
                (value, s.name())
            })
        })
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

/// Drop markdown code fences, keeping their contents.
pub(crate) fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim whitespace and any wrapping quotes or backticks.
pub(crate) fn trim_quotes(s: &str) -> &str {
    s.trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Option<u8>);

    impl ParseStrategy<u8> for Fixed {
        fn name(&self) -> &'static str { self.0 }
        fn parse(&self, _text: &str) -> Option<u8> { self.1 }
    }

    #[test]
    fn test_chain_returns_first_success() {
        let chain = ParserChain::new()
            .with(Fixed("a", None))
            .with(Fixed("b", Some(2)))
            .with(Fixed("c", Some(3)));
        assert_eq!(chain.parse("anything"), Some((2, "b")));
        assert_eq!(chain.strategy_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_chain_yields_nothing() {
        let chain: ParserChain<u8> = ParserChain::new();
        assert!(chain.parse("x").is_none());
    }

    #[test]
    fn test_strip_fences_keeps_body() {
        assert_eq!(strip_fences("```sql\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_trim_quotes() {
        assert_eq!(trim_quotes("  `t1.a = t2.b`  "), "t1.a = t2.b");
        assert_eq!(trim_quotes("\"x\""), "x");
    }
}
