//! Table references shared by the warehouse and prompt layers.

use serde::{Deserialize, Serialize};

/// A table selected by the user, with the columns they picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub catalog: String,
    pub schema_name: String,
    pub table: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl TableRef {
    pub fn new(
        catalog: impl Into<String>,
        schema_name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema_name: schema_name.into(),
            table: table.into(),
            columns,
        }
    }

    /// `catalog.schema.table`, unquoted. Used in prompts and audit rows.
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema_name, self.table)
    }

    /// Backtick-quoted three-part name, safe to splice into a statement.
    pub fn quoted_name(&self) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.catalog),
            quote_ident(&self.schema_name),
            quote_ident(&self.table)
        )
    }
}

/// One row of `DESCRIBE <table>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub comment: Option<String>,
}

/// A handful of rows fetched to show the model what the data looks like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Everything known about a table when building a prompt.
///
/// `columns` and `sample` are empty when the metadata fetch timed out or
/// failed; the prompt then falls back to the selected column names.
#[derive(Debug, Clone, PartialEq)]
pub struct TableContext {
    pub table: TableRef,
    pub columns: Vec<ColumnInfo>,
    pub sample: Option<SampleRows>,
}

impl TableContext {
    /// Column names only.
    pub fn bare(table: TableRef) -> Self {
        Self { table, columns: Vec::new(), sample: None }
    }

    pub fn is_degraded(&self) -> bool {
        self.columns.is_empty() && self.sample.is_none()
    }
}

/// Quote one identifier part for Databricks SQL.
pub fn quote_ident(part: &str) -> String {
    format!("`{}`", part.replace('`', "``"))
}
