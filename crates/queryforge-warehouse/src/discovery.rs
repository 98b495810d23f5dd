//! Metadata discovery and prompt context.

use std::time::Duration;

use futures_util::future::join_all;
use queryforge_common::{quote_ident, ColumnInfo, SampleRows, TableContext, TableRef};

use crate::client::Warehouse;
use crate::error::{Result, WarehouseError};

/// Sample rows shown to the model per table.
pub const SAMPLE_ROWS: usize = 5;

pub async fn list_catalogs(wh: &dyn Warehouse) -> Result<Vec<String>> {
    let rs = wh.query("SHOW CATALOGS").await?;
    Ok(rs.column_strings(0))
}

pub async fn list_schemas(wh: &dyn Warehouse, catalog: &str) -> Result<Vec<String>> {
    let rs = wh.query(&format!("SHOW SCHEMAS IN {}", quote_ident(catalog))).await?;
    Ok(rs.column_strings(0))
}

/// `SHOW TABLES` returns `database, tableName, isTemporary`.
pub async fn list_tables(wh: &dyn Warehouse, catalog: &str, schema: &str) -> Result<Vec<String>> {
    let rs = wh
        .query(&format!("SHOW TABLES IN {}.{}", quote_ident(catalog), quote_ident(schema)))
        .await?;
    let index = rs.column_index("tableName").unwrap_or(1);
    Ok(rs.column_strings(index))
}

pub async fn describe_table(wh: &dyn Warehouse, table: &TableRef) -> Result<Vec<ColumnInfo>> {
    let rs = wh.query(&format!("DESCRIBE {}", table.quoted_name())).await?;
    Ok(columns_from_describe(&rs.rows))
}

/// `DESCRIBE` appends a `# Partition Information` section after a blank row.
fn columns_from_describe(rows: &[Vec<serde_json::Value>]) -> Vec<ColumnInfo> {
    let text = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_str()).map(str::to_string);
    rows.iter()
        .map_while(|row| {
            let name = text(row.first()).unwrap_or_default();
            let name = name.trim();
            if name.is_empty() || name.starts_with('#') {
                return None;
            }
            Some(ColumnInfo {
                name: name.to_string(),
                data_type: text(row.get(1)).unwrap_or_default(),
                comment: text(row.get(2)).filter(|c| !c.is_empty()),
            })
        })
        .collect()
}

pub async fn sample_rows(wh: &dyn Warehouse, table: &TableRef, limit: usize) -> Result<SampleRows> {
    let rs = wh
        .execute(
            &format!("SELECT * FROM {} LIMIT {limit}", table.quoted_name()),
            &[],
            Some(limit),
        )
        .await?;
    Ok(SampleRows { columns: rs.columns, rows: rs.rows })
}

pub async fn fetch_table_context(wh: &dyn Warehouse, table: TableRef) -> Result<TableContext> {
    let columns = describe_table(wh, &table).await?;
    let sample = sample_rows(wh, &table, SAMPLE_ROWS).await?;
    Ok(TableContext { table, columns, sample: Some(sample) })
}

/// Fetch context for every table concurrently, each bounded by `timeout`.
/// A table whose fetch fails or times out degrades to its column names.
pub async fn fetch_table_contexts(
    wh: &dyn Warehouse,
    tables: &[TableRef],
    timeout: Duration,
) -> Vec<TableContext> {
    let fetches = tables.iter().cloned().map(|table| async move {
        let name = table.full_name();
        let outcome = tokio::time::timeout(timeout, fetch_table_context(wh, table.clone()))
            .await
            .unwrap_or(Err(WarehouseError::Timeout(timeout)));
        match outcome {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(table = %name, "Table context degraded to column names: {}", e);
                TableContext::bare(table)
            }
        }
    });
    join_all(fetches).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ResultSet, StatementParam, WarehouseInfo};
    use async_trait::async_trait;
    use serde_json::json;

    /// Answers by statement prefix; `SLOW` tables never answer in time.
    struct Scripted;

    #[async_trait]
    impl Warehouse for Scripted {
        async fn execute(&self, statement: &str, _: &[StatementParam], _: Option<usize>) -> Result<ResultSet> {
            if statement.contains("`slow`") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if statement.contains("`broken`") {
                return Err(WarehouseError::Statement { state: "FAILED".into(), message: "denied".into() });
            }
            let rs = if statement == "SHOW CATALOGS" {
                ResultSet::new(vec!["catalog".into()], vec![vec![json!("main")], vec![json!("samples")]])
            } else if statement.starts_with("SHOW TABLES") {
                ResultSet::new(
                    vec!["database".into(), "tableName".into(), "isTemporary".into()],
                    vec![vec![json!("sales"), json!("orders"), json!(false)]],
                )
            } else if statement.starts_with("DESCRIBE") {
                ResultSet::new(
                    vec!["col_name".into(), "data_type".into(), "comment".into()],
                    vec![
                        vec![json!("id"), json!("bigint"), json!(null)],
                        vec![json!("day"), json!("date"), json!("order day")],
                        vec![json!(""), json!(""), json!("")],
                        vec![json!("# Partition Information"), json!(""), json!("")],
                        vec![json!("day"), json!("date"), json!(null)],
                    ],
                )
            } else {
                ResultSet::new(vec!["id".into()], vec![vec![json!(1)]])
            };
            Ok(rs)
        }

        async fn warehouse_info(&self) -> Result<WarehouseInfo> {
            unimplemented!()
        }
    }

    #[test]
    fn test_list_catalogs_and_tables() {
        tokio_test::block_on(async {
            assert_eq!(list_catalogs(&Scripted).await.unwrap(), vec!["main", "samples"]);
            assert_eq!(list_tables(&Scripted, "main", "sales").await.unwrap(), vec!["orders"]);
        });
    }

    #[tokio::test]
    async fn test_describe_stops_at_partition_section() {
        let t = TableRef::new("main", "sales", "orders", vec![]);
        let cols = describe_table(&Scripted, &t).await.unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].comment.as_deref(), Some("order day"));
        assert!(cols[0].comment.is_none());
    }

    #[tokio::test]
    async fn test_contexts_degrade_on_error_and_timeout() {
        let tables = vec![
            TableRef::new("main", "sales", "orders", vec!["id".into()]),
            TableRef::new("main", "sales", "broken", vec!["a".into()]),
            TableRef::new("main", "sales", "slow", vec!["b".into()]),
        ];
        let ctxs = fetch_table_contexts(&Scripted, &tables, Duration::from_millis(200)).await;
        assert_eq!(ctxs.len(), 3);
        assert!(!ctxs[0].is_degraded());
        assert_eq!(ctxs[0].sample.as_ref().map(|s| s.rows.len()), Some(1));
        assert!(ctxs[1].is_degraded());
        assert!(ctxs[2].is_degraded());
        assert_eq!(ctxs[2].table.columns, vec!["b"]);
    }
}
