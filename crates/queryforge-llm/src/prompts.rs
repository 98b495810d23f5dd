//! Prompt construction for suggestions, join conditions and SQL generation.
//!
//! Tables are always presented with positional aliases `t1..tN` so the join
//! parser can look for `tN.col = tM.col` in the reply.

use queryforge_common::{TableContext, TableRef};

/// Longest rendered sample cell; longer values are cut with `…`.
const MAX_CELL_CHARS: usize = 60;

pub const SUGGESTION_SYSTEM_PROMPT: &str = "You are a helpful data analyst assistant. \
Generate 3-5 different business questions that could be answered with the given data. \
Each suggestion must be a clear, concise analytical question or task. \
Return the suggestions as a numbered list, one per line, with no other text.";

pub const JOIN_SYSTEM_PROMPT: &str = "You are an expert data modeler. \
Given several tables with aliases t1, t2, ... identify the most likely join condition between them \
based on column names, types and sample values. \
Return ONLY the join predicate using the aliases, for example: t1.customer_id = t2.customer_id. \
Combine predicates for more than two tables with AND. No explanation, no markdown.";

pub const GENERATION_SYSTEM_PROMPT: &str = "You are an expert Databricks SQL (Spark SQL) query generator. \
Write clean, efficient, complete queries that run on Databricks SQL warehouses. \
Rules:\n\
- Use fully qualified table names (catalog.schema.table) with the given aliases.\n\
- Only use columns that exist in the provided tables.\n\
- Produce a single SELECT or WITH statement. Never modify data.\n\
- Never truncate the query; every parenthesis must be closed.\n\
Answer in exactly this format:\n\
EXPLANATION: <one or two sentences describing what the query does>\n\
SQL:\n\
<the complete SQL query>";

/// System + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn alias(index: usize) -> String {
    format!("t{}", index + 1)
}

/// Render one table as a prompt section.
pub fn render_table(index: usize, ctx: &TableContext) -> String {
    let t = &ctx.table;
    let mut out = format!("Table {} ({}):\n", alias(index), t.full_name());
    out.push_str(&format!("  Selected columns: {}\n", selected_columns(t)));

    if !ctx.columns.is_empty() {
        let described: Vec<String> = ctx.columns.iter().map(|c| {
            match c.comment.as_deref().filter(|s| !s.is_empty()) {
                Some(comment) => format!("{} {} -- {}", c.name, c.data_type, comment),
                None => format!("{} {}", c.name, c.data_type),
            }
        }).collect();
        out.push_str("  Schema:\n");
        for line in described {
            out.push_str(&format!("    {line}\n"));
        }
    }

    if let Some(sample) = ctx.sample.as_ref().filter(|s| !s.rows.is_empty()) {
        out.push_str(&format!("  Sample rows ({}):\n", sample.rows.len()));
        out.push_str(&format!("    {}\n", sample.columns.join(" | ")));
        for row in &sample.rows {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            out.push_str(&format!("    {}\n", cells.join(" | ")));
        }
    }
    out
}

fn selected_columns(t: &TableRef) -> String {
    if t.columns.is_empty() {
        "(all)".to_string()
    } else {
        t.columns.join(", ")
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_CELL_CHARS {
        let cut: String = text.chars().take(MAX_CELL_CHARS).collect();
        format!("{cut}…")
    } else {
        text
    }
}

fn render_tables(contexts: &[TableContext]) -> String {
    contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| render_table(i, ctx))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Suggestion prompt. One table is the legacy single-table mode.
pub fn suggestion_prompt(contexts: &[TableContext]) -> Prompt {
    let tables = render_tables(contexts);
    let user = if contexts.len() <= 1 {
        format!(
            "Based on this table information:\n\n{tables}\n\
             Generate 3-5 different business questions that would be useful for this data. \
             Questions should be realistic analytical tasks.\n\
             Return them as a numbered list:\n1. ...\n2. ...\n3. ..."
        )
    } else {
        format!(
            "Based on these related tables:\n\n{tables}\n\
             Generate 3-5 business questions that require combining data from several of these tables. \
             Questions should be realistic analytical tasks that a join would answer.\n\
             Return them as a numbered list:\n1. ...\n2. ...\n3. ..."
        )
    };
    Prompt { system: SUGGESTION_SYSTEM_PROMPT.to_string(), user }
}

pub fn join_prompt(contexts: &[TableContext]) -> Prompt {
    let tables = render_tables(contexts);
    let user = format!(
        "Tables:\n\n{tables}\n\
         What is the join condition between these tables? \
         Answer with the predicate only, using the aliases (e.g. t1.id = t2.t1_id)."
    );
    Prompt { system: JOIN_SYSTEM_PROMPT.to_string(), user }
}

pub fn generation_prompt(
    contexts: &[TableContext],
    business_logic: &str,
    join_conditions: Option<&str>,
) -> Prompt {
    let tables = render_tables(contexts);
    let mut user = format!("Generate a SQL query for the following tables:\n\n{tables}\n");

    if contexts.len() > 1 {
        let from: Vec<String> = contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} AS {}", c.table.full_name(), alias(i)))
            .collect();
        user.push_str(&format!("Refer to the tables as: {}\n", from.join(", ")));
        match join_conditions.map(str::trim).filter(|s| !s.is_empty()) {
            Some(join) => user.push_str(&format!("Join the tables using: {join}\n")),
            None => user.push_str("Infer the join condition from the column names.\n"),
        }
    }

    user.push_str(&format!(
        "\nBusiness logic:\n{}\n\n\
         Write a SELECT query that answers this using the selected columns. \
         Follow the EXPLANATION / SQL answer format exactly.",
        business_logic.trim()
    ));

    Prompt { system: GENERATION_SYSTEM_PROMPT.to_string(), user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queryforge_common::{ColumnInfo, SampleRows};

    fn orders() -> TableContext {
        TableContext {
            table: TableRef::new("main", "sales", "orders", vec!["order_id".into(), "amount".into()]),
            columns: vec![
                ColumnInfo { name: "order_id".into(), data_type: "bigint".into(), comment: None },
                ColumnInfo { name: "amount".into(), data_type: "double".into(), comment: Some("USD".into()) },
            ],
            sample: Some(SampleRows {
                columns: vec!["order_id".into(), "amount".into()],
                rows: vec![vec![serde_json::json!(1), serde_json::json!(9.5)]],
            }),
        }
    }

    #[test]
    fn test_render_table_includes_schema_and_samples() {
        let text = render_table(0, &orders());
        assert!(text.starts_with("Table t1 (main.sales.orders):"));
        assert!(text.contains("amount double -- USD"));
        assert!(text.contains("1 | 9.5"));
    }

    #[test]
    fn test_degraded_context_lists_selected_columns_only() {
        let ctx = TableContext::bare(TableRef::new("c", "s", "t", vec!["a".into()]));
        let text = render_table(1, &ctx);
        assert!(text.contains("Table t2 (c.s.t)"));
        assert!(text.contains("Selected columns: a"));
        assert!(!text.contains("Schema:"));
    }

    #[test]
    fn test_long_cells_are_cut() {
        let long = serde_json::Value::String("x".repeat(200));
        let cell = render_cell(&long);
        assert_eq!(cell.chars().count(), MAX_CELL_CHARS + 1);
    }

    #[test]
    fn test_generation_prompt_multi_table_mentions_join() {
        let other = TableContext::bare(TableRef::new("main", "sales", "customers", vec![]));
        let prompt = generation_prompt(&[orders(), other], "Revenue per customer", Some("t1.customer_id = t2.id"));
        assert!(prompt.user.contains("main.sales.customers AS t2"));
        assert!(prompt.user.contains("Join the tables using: t1.customer_id = t2.id"));
        assert!(prompt.user.contains("Revenue per customer"));
        assert!(prompt.system.contains("EXPLANATION:"));
    }

    #[test]
    fn test_suggestion_prompt_modes() {
        let single = suggestion_prompt(&[orders()]);
        assert!(single.user.contains("this table"));
        let multi = suggestion_prompt(&[orders(), orders()]);
        assert!(multi.user.contains("combining data"));
    }
}
