//! Generated SQL extraction and completeness checks.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::{strip_fences, ParseError, ParseStrategy, ParserChain};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSql {
    pub sql: String,
    pub explanation: Option<String>,
}

static STATEMENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bSELECT\b|\bWITH\s+(?:RECURSIVE\s+)?\w+\s*(?:\([^)]*\)\s*)?AS\s*\(")
        .expect("valid regex")
});

static EXPLANATION_THEN_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)EXPLANATION\s*:\s*(.*?)\s*SQL\s*(?:QUERY)?\s*:\s*(.*)$").expect("valid regex")
});

static SQL_THEN_EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)SQL\s*(?:QUERY)?\s*:\s*(.*?)\s*EXPLANATION\s*:\s*(.*)$").expect("valid regex")
});

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[a-z]*\s*\n?(.*?)```").expect("valid regex")
});

/// Where an unfenced SQL section ends: a blank line or a stray fence.
static SECTION_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n[ \t]*\n|```").expect("valid regex")
});

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)/\*.*?\*/").expect("valid regex")
});

/// Keywords that cannot end a complete statement.
const DANGLING_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "JOIN", "INNER", "LEFT", "RIGHT", "FULL",
    "OUTER", "CROSS", "ON", "BY", "GROUP", "ORDER", "HAVING", "AS", "WITH", "UNION", "ALL",
    "CASE", "WHEN", "THEN", "ELSE", "IN", "LIKE", "BETWEEN", "LIMIT", "DISTINCT", "OVER",
    "PARTITION", "USING", "IS",
];

const DANGLING_CHARS: &[char] = &[',', '=', '(', '+', '-', '*', '/', '<', '>', '.', '|'];

/// Cut everything before the first `SELECT`/`WITH`, drop fences and a trailing `;`.
pub fn clean_sql(raw: &str) -> Option<String> {
    let text = strip_fences(raw);
    let start = STATEMENT_START.find(&text)?.start();
    let sql = text[start..].trim().trim_end_matches(';').trim_end();
    (!sql.is_empty()).then(|| sql.to_string())
}

/// The statement inside a `SQL:` section. A fenced block wins; otherwise the
/// section stops at the first blank line so trailing notes are left out.
fn section_sql(raw: &str) -> Option<String> {
    if let Some(sql) = FENCED_BLOCK.captures(raw).and_then(|caps| clean_sql(&caps[1])) {
        return Some(sql);
    }
    let start = STATEMENT_START.find(raw)?.start();
    let rest = &raw[start..];
    let end = SECTION_END.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    clean_sql(&rest[..end])
}

fn clean_explanation(raw: &str) -> Option<String> {
    let text = strip_fences(raw);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// `EXPLANATION: ... SQL: ...` in either order.
pub struct Sectioned;

impl ParseStrategy<GeneratedSql> for Sectioned {
    fn name(&self) -> &'static str { "sectioned" }

    fn parse(&self, text: &str) -> Option<GeneratedSql> {
        let text = text.replace("**", "");
        if let Some(caps) = EXPLANATION_THEN_SQL.captures(&text) {
            if let Some(sql) = section_sql(&caps[2]) {
                return Some(GeneratedSql { sql, explanation: clean_explanation(&caps[1]) });
            }
        }
        let caps = SQL_THEN_EXPLANATION.captures(&text)?;
        let sql = section_sql(&caps[1])?;
        Some(GeneratedSql { sql, explanation: clean_explanation(&caps[2]) })
    }
}

/// A fenced code block; prose before it becomes the explanation.
pub struct FencedBlock;

impl ParseStrategy<GeneratedSql> for FencedBlock {
    fn name(&self) -> &'static str { "fenced_block" }

    fn parse(&self, text: &str) -> Option<GeneratedSql> {
        let caps = FENCED_BLOCK.captures(text)?;
        let whole = caps.get(0)?;
        let sql = clean_sql(&caps[1])?;
        Some(GeneratedSql { sql, explanation: clean_explanation(&text[..whole.start()]) })
    }
}

/// Anything from the first `SELECT`/`WITH` on.
pub struct BareStatement;

impl ParseStrategy<GeneratedSql> for BareStatement {
    fn name(&self) -> &'static str { "bare_statement" }

    fn parse(&self, text: &str) -> Option<GeneratedSql> {
        clean_sql(text).map(|sql| GeneratedSql { sql, explanation: None })
    }
}

pub fn generation_chain() -> ParserChain<GeneratedSql> {
    ParserChain::new()
        .with(Sectioned)
        .with(FencedBlock)
        .with(BareStatement)
}

/// Extract and validate. `truncated` is the endpoint's `length` finish reason.
pub fn parse_generation(text: &str, truncated: bool) -> Result<GeneratedSql, ParseError> {
    if truncated {
        return Err(ParseError::Incomplete(
            "the model stopped at its output token limit".to_string(),
        ));
    }
    let (generated, _) = generation_chain().parse(text).ok_or(ParseError::NoSql)?;
    check_completeness(&generated.sql)?;
    Ok(generated)
}

/// Reject statements that look cut off.
pub fn check_completeness(sql: &str) -> Result<(), ParseError> {
    let code = strip_comments(sql);
    let code = code.trim();

    if code.is_empty() {
        return Err(ParseError::Incomplete("empty query".to_string()));
    }

    let first = code.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
    if first != "SELECT" && first != "WITH" {
        return Err(ParseError::Incomplete(format!(
            "query starts with {first} instead of SELECT or WITH"
        )));
    }

    let depth = paren_depth(code)?;
    if depth != 0 {
        return Err(ParseError::Incomplete(format!("{depth} unclosed parenthesis")));
    }

    if let Some(c) = code.chars().last().filter(|c| DANGLING_CHARS.contains(c)) {
        return Err(ParseError::Incomplete(format!("query ends with '{c}'")));
    }

    let last_word = code
        .rsplit(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .find(|w| !w.is_empty())
        .unwrap_or("")
        .to_ascii_uppercase();
    if DANGLING_KEYWORDS.contains(&last_word.as_str()) {
        return Err(ParseError::Incomplete(format!("query ends with keyword {last_word}")));
    }

    Ok(())
}

/// Remove `/* */` block comments and `--` line comments outside string literals.
fn strip_comments(sql: &str) -> String {
    let sql = BLOCK_COMMENT.replace_all(sql, " ");
    sql.lines()
        .map(|line| {
            let mut quote: Option<char> = None;
            let chars: Vec<char> = line.chars().collect();
            for i in 0..chars.len() {
                let c = chars[i];
                match quote {
                    Some(q) if c == q => quote = None,
                    Some(_) => {}
                    None if c == '\'' || c == '"' || c == '`' => quote = Some(c),
                    None if c == '-' && chars.get(i + 1) == Some(&'-') => {
                        return chars[..i].iter().collect::<String>();
                    }
                    None => {}
                }
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Net open parentheses outside quotes. Errors on a stray `)`.
fn paren_depth(sql: &str) -> Result<i64, ParseError> {
    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(ParseError::Incomplete("unbalanced parentheses".to_string()));
                    }
                }
                _ => {}
            },
        }
    }
    if quote.is_some() {
        return Err(ParseError::Incomplete("unterminated string literal".to_string()));
    }
    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sectioned_reply() {
        let reply = "EXPLANATION: Lists pilots with more than 5000 hours.\n\nSQL:\n```sql\nSELECT name FROM arao.aircraft.pilots WHERE total_flight_hours > 5000;\n```";
        let parsed = parse_generation(reply, false).unwrap();
        assert_eq!(parsed.sql, "SELECT name FROM arao.aircraft.pilots WHERE total_flight_hours > 5000");
        assert_eq!(parsed.explanation.as_deref(), Some("Lists pilots with more than 5000 hours."));
    }

    #[test]
    fn test_markdown_bold_sections() {
        let reply = "**EXPLANATION:** Counts orders.\n**SQL:**\nHere is the query:\nWITH x AS (SELECT 1 AS n) SELECT n FROM x";
        let parsed = parse_generation(reply, false).unwrap();
        assert!(parsed.sql.starts_with("WITH x AS"));
        assert_eq!(parsed.explanation.as_deref(), Some("Counts orders."));
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let reply = "This query totals revenue.\n```sql\nSELECT SUM(amount) FROM t\n```";
        let parsed = parse_generation(reply, false).unwrap();
        assert_eq!(parsed.sql, "SELECT SUM(amount) FROM t");
        assert_eq!(parsed.explanation.as_deref(), Some("This query totals revenue."));
    }

    #[test]
    fn test_bare_statement_strips_leading_prose() {
        let parsed = parse_generation("Sure! select * from t limit 10", false).unwrap();
        assert_eq!(parsed.sql, "select * from t limit 10");
        assert!(parsed.explanation.is_none());
    }

    #[test]
    fn test_truncated_finish_reason_fails() {
        let err = parse_generation("SELECT 1", true).unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }

    #[test]
    fn test_no_sql() {
        assert_eq!(parse_generation("I cannot help with that.", false), Err(ParseError::NoSql));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let err = check_completeness("SELECT COUNT(id FROM t").unwrap_err();
        assert!(matches!(err, ParseError::Incomplete(_)));
        assert!(check_completeness("SELECT a FROM t)").is_err());
    }

    #[test]
    fn test_parentheses_inside_strings_are_ignored() {
        assert!(check_completeness("SELECT ':(' AS face FROM t").is_ok());
    }

    #[test]
    fn test_dangling_keyword_and_operator() {
        assert!(check_completeness("SELECT a FROM t WHERE").is_err());
        assert!(check_completeness("SELECT a FROM t WHERE b = 1 AND").is_err());
        assert!(check_completeness("SELECT a, FROM t GROUP BY").is_err());
        assert!(check_completeness("SELECT a FROM t WHERE b =").is_err());
        assert!(check_completeness("SELECT a,").is_err());
    }

    #[test]
    fn test_trailing_comment_is_ignored() {
        assert!(check_completeness("SELECT a FROM t -- done").is_ok());
        assert!(check_completeness("SELECT a FROM t WHERE -- todo").is_err());
    }

    #[test]
    fn test_complete_queries_pass() {
        assert!(check_completeness("SELECT COUNT(*) FROM t").is_ok());
        assert!(check_completeness("SELECT CASE WHEN a > 1 THEN 'x' ELSE 'y' END AS c FROM t").is_ok());
        assert!(check_completeness("WITH a AS (SELECT 1) SELECT * FROM a ORDER BY 1 DESC").is_ok());
    }

    #[test]
    fn test_notes_after_fenced_sql_are_dropped() {
        let reply = "EXPLANATION: Lists every row.\nSQL:\n```sql\nSELECT a FROM main.s.t\n```\nNote: this returns every row.";
        let parsed = parse_generation(reply, false).unwrap();
        assert_eq!(parsed.sql, "SELECT a FROM main.s.t");
        assert_eq!(parsed.explanation.as_deref(), Some("Lists every row."));
    }

    #[test]
    fn test_unfenced_section_stops_at_blank_line() {
        let reply = "EXPLANATION: Totals.\nSQL:\nSELECT SUM(x) AS total\nFROM t\n\nThis sums x over the table.";
        let parsed = parse_generation(reply, false).unwrap();
        assert_eq!(parsed.sql, "SELECT SUM(x) AS total\nFROM t");
    }

    #[test]
    fn test_block_comments_are_ignored() {
        assert!(check_completeness("SELECT a FROM t /* all rows */").is_ok());
        assert!(check_completeness("SELECT a /* first */ FROM t").is_ok());
        assert!(check_completeness("SELECT a FROM t WHERE /* todo */").is_err());
    }

    #[test]
    fn test_non_select_is_rejected() {
        let err = check_completeness("DELETE FROM t").unwrap_err();
        assert!(err.to_string().contains("instead of SELECT"));
    }
}
