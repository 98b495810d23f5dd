//! Warehouse trait and the Databricks Statement Execution API client.
//!
//! Statements run synchronously from the caller's point of view: the request
//! waits up to 50 s on the server and the statement is cancelled if it has
//! not finished by then. Results come back inline as `JSON_ARRAY`, where
//! every cell is a string; [`coerce_value`] turns them back into JSON
//! numbers and booleans using the manifest column types.

use async_trait::async_trait;
use queryforge_config::WarehouseConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, WarehouseError};

/// Server-side wait before the statement is cancelled.
const WAIT_TIMEOUT: &str = "50s";

// ── Result set ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column as strings, skipping nulls.
    pub fn column_strings(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter_map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect()
    }

    /// Rows as `{column: value}` objects.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned().chain(std::iter::repeat(Value::Null)))
                    .collect()
            })
            .collect()
    }

    pub fn truncate(&mut self, max_rows: usize) {
        self.rows.truncate(max_rows);
    }
}

/// A named statement parameter (`:name` in the SQL text).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementParam {
    pub name: String,
    /// `None` binds SQL `NULL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub param_type: &'static str,
}

impl StatementParam {
    fn typed(name: &str, value: Option<String>, param_type: &'static str) -> Self {
        Self { name: name.to_string(), value, param_type }
    }

    pub fn string(name: &str, value: Option<&str>) -> Self {
        Self::typed(name, value.map(str::to_string), "STRING")
    }

    pub fn bigint(name: &str, value: Option<i64>) -> Self {
        Self::typed(name, value.map(|v| v.to_string()), "BIGINT")
    }

    pub fn double(name: &str, value: Option<f64>) -> Self {
        Self::typed(name, value.map(|v| v.to_string()), "DOUBLE")
    }

    pub fn timestamp(name: &str, value: chrono::DateTime<chrono::Utc>) -> Self {
        Self::typed(name, Some(value.to_rfc3339()), "TIMESTAMP")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseInfo {
    pub id: String,
    pub name: String,
    /// `RUNNING`, `STOPPED`, `STARTING`, …
    pub state: String,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run one statement. `row_limit` is enforced by the warehouse.
    async fn execute(
        &self,
        statement: &str,
        params: &[StatementParam],
        row_limit: Option<usize>,
    ) -> Result<ResultSet>;

    async fn warehouse_info(&self) -> Result<WarehouseInfo>;

    async fn query(&self, statement: &str) -> Result<ResultSet> {
        self.execute(statement, &[], None).await
    }
}

// ── Databricks ────────────────────────────────────────────────────────────────

pub struct DatabricksWarehouse {
    base_url: String,
    warehouse_id: String,
    token: SecretString,
    client: reqwest::Client,
}

impl DatabricksWarehouse {
    pub fn new(
        base_url: impl Into<String>,
        warehouse_id: impl Into<String>,
        token: SecretString,
        client: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, warehouse_id: warehouse_id.into(), token, client }
    }

    /// `None` unless host, token and HTTP path are all set.
    pub fn from_config(config: &WarehouseConfig, client: reqwest::Client) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let id = config.warehouse_id()?;
        let token = config.token.as_ref()?;
        Some(Self::new(
            config.base_url(),
            id,
            SecretString::from(token.expose_secret().to_string()),
            client,
        ))
    }

    pub fn warehouse_id(&self) -> &str {
        &self.warehouse_id
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        check_response_status(resp).await
    }
}

#[async_trait]
impl Warehouse for DatabricksWarehouse {
    async fn execute(
        &self,
        statement: &str,
        params: &[StatementParam],
        row_limit: Option<usize>,
    ) -> Result<ResultSet> {
        let mut body = serde_json::json!({
            "warehouse_id":    self.warehouse_id,
            "statement":       statement,
            "wait_timeout":    WAIT_TIMEOUT,
            "on_wait_timeout": "CANCEL",
            "format":          "JSON_ARRAY",
            "disposition":     "INLINE",
        });
        if !params.is_empty() {
            body["parameters"] = serde_json::to_value(params)?;
        }
        if let Some(limit) = row_limit {
            body["row_limit"] = Value::from(limit);
        }

        tracing::debug!(statement = %preview(statement), params = params.len(), "Executing statement");
        let resp = self.client
            .post(format!("{}/api/2.0/sql/statements", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        let mut result = parse_statement_response(&json)?;

        // Large inline results arrive in chunks.
        let mut next = json["result"]["next_chunk_internal_link"].as_str().map(str::to_string);
        let types = column_types(&json);
        while let Some(link) = next {
            let chunk = self.get_json(&link).await?;
            result.rows.extend(parse_rows(&chunk, &types));
            next = chunk["next_chunk_internal_link"].as_str().map(str::to_string);
        }

        tracing::debug!(rows = result.rows.len(), columns = result.columns.len(), "Statement succeeded");
        Ok(result)
    }

    async fn warehouse_info(&self) -> Result<WarehouseInfo> {
        let json = self.get_json(&format!("/api/2.0/sql/warehouses/{}", self.warehouse_id)).await?;
        Ok(WarehouseInfo {
            id: self.warehouse_id.clone(),
            name: json["name"].as_str().unwrap_or(&self.warehouse_id).to_string(),
            state: json["state"].as_str().unwrap_or("UNKNOWN").to_string(),
        })
    }
}

// ── Response helpers ──────────────────────────────────────────────────────────

async fn check_response_status(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status >= 400 {
        let body: Value = serde_json::from_str(&text).unwrap_or_default();
        let message = body["message"].as_str().map(str::to_string).unwrap_or(text);
        return Err(WarehouseError::Api { status, message });
    }
    Ok(serde_json::from_str(&text)?)
}

fn column_types(json: &Value) -> Vec<String> {
    json["manifest"]["schema"]["columns"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .map(|c| c["type_name"].as_str().unwrap_or("STRING").to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_rows(chunk: &Value, types: &[String]) -> Vec<Vec<Value>> {
    chunk["data_array"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_array)
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, cell)| coerce_value(cell, types.get(i).map(String::as_str).unwrap_or("STRING")))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Turn a statement response into a [`ResultSet`], failing unless it `SUCCEEDED`.
pub fn parse_statement_response(json: &Value) -> Result<ResultSet> {
    let state = json["status"]["state"].as_str().unwrap_or("UNKNOWN");
    if state != "SUCCEEDED" {
        let message = json["status"]["error"]["message"]
            .as_str()
            .unwrap_or("statement did not complete")
            .to_string();
        return Err(WarehouseError::Statement { state: state.to_string(), message });
    }

    let columns: Vec<String> = json["manifest"]["schema"]["columns"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .map(|c| c["name"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default();

    let rows = parse_rows(&json["result"], &column_types(json));
    if let Some(width) = rows.iter().map(Vec::len).find(|w| *w != columns.len()) {
        return Err(WarehouseError::Shape(format!(
            "{} columns in manifest, {} in row",
            columns.len(),
            width
        )));
    }
    Ok(ResultSet { columns, rows })
}

/// Coerce a `JSON_ARRAY` cell to the JSON type matching its column.
pub fn coerce_value(cell: &Value, type_name: &str) -> Value {
    let Value::String(s) = cell else {
        return cell.clone();
    };
    match type_name.to_ascii_uppercase().as_str() {
        "BYTE" | "SHORT" | "INT" | "LONG" | "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" => s
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| cell.clone()),
        "FLOAT" | "DOUBLE" | "DECIMAL" => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| cell.clone()),
        "BOOLEAN" => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => cell.clone(),
        },
        // Complex types are serialized as JSON text.
        "ARRAY" | "MAP" | "STRUCT" => serde_json::from_str(s).unwrap_or_else(|_| cell.clone()),
        _ => cell.clone(),
    }
}

/// First line of a statement, shortened for logs.
fn preview(statement: &str) -> String {
    let line = statement.trim().lines().next().unwrap_or_default();
    if line.chars().count() > 100 {
        format!("{}…", line.chars().take(100).collect::<String>())
    } else {
        line.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn succeeded() -> Value {
        json!({
            "statement_id": "01ef-abc",
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [
                {"name": "name", "type_name": "STRING", "position": 0},
                {"name": "hours", "type_name": "INT", "position": 1},
                {"name": "rate", "type_name": "DOUBLE", "position": 2},
                {"name": "active", "type_name": "BOOLEAN", "position": 3}
            ]}},
            "result": {"data_array": [
                ["Ada", "5200", "1.5", "true"],
                ["Bob", null, "2", "false"]
            ]}
        })
    }

    #[test]
    fn test_parse_succeeded_statement_coerces_types() {
        let rs = parse_statement_response(&succeeded()).unwrap();
        assert_eq!(rs.columns, vec!["name", "hours", "rate", "active"]);
        assert_eq!(rs.rows[0], vec![json!("Ada"), json!(5200), json!(1.5), json!(true)]);
        assert_eq!(rs.rows[1][1], Value::Null);
    }

    #[test]
    fn test_failed_statement_surfaces_message() {
        let json = json!({
            "status": {"state": "FAILED", "error": {"message": "[TABLE_OR_VIEW_NOT_FOUND] nope"}}
        });
        let err = parse_statement_response(&json).unwrap_err();
        assert_eq!(err.to_string(), "Statement FAILED: [TABLE_OR_VIEW_NOT_FOUND] nope");
    }

    #[test]
    fn test_empty_result_has_no_rows() {
        let json = json!({
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [{"name": "x", "type_name": "INT"}]}},
            "result": {}
        });
        let rs = parse_statement_response(&json).unwrap();
        assert_eq!(rs.columns, vec!["x"]);
        assert!(rs.rows.is_empty());
    }

    #[test]
    fn test_coerce_leaves_unparsable_values_as_strings() {
        assert_eq!(coerce_value(&json!("n/a"), "BIGINT"), json!("n/a"));
        assert_eq!(coerce_value(&json!("2024-01-01"), "DATE"), json!("2024-01-01"));
        assert_eq!(coerce_value(&json!("12.50"), "decimal"), json!(12.5));
        assert_eq!(coerce_value(&json!("[\"a\",\"b\"]"), "ARRAY"), json!(["a", "b"]));
    }

    #[test]
    fn test_records_zip_columns() {
        let rs = parse_statement_response(&succeeded()).unwrap();
        let records = rs.records();
        assert_eq!(records[0]["name"], json!("Ada"));
        assert_eq!(records[1]["active"], json!(false));
    }

    #[test]
    fn test_statement_param_serialization() {
        let p = StatementParam::bigint("row_count", None);
        assert_eq!(serde_json::to_value(&p).unwrap(), json!({"name": "row_count", "type": "BIGINT"}));
        let p = StatementParam::string("status", Some("success"));
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"name": "status", "value": "success", "type": "STRING"})
        );
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = WarehouseConfig::default();
        assert!(DatabricksWarehouse::from_config(&config, reqwest::Client::new()).is_none());

        config.host = "dbc-1.cloud.databricks.com".into();
        config.token = Some(SecretString::from("dapi-x".to_string()));
        config.http_path = "/sql/1.0/warehouses/abc".into();
        let wh = DatabricksWarehouse::from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(wh.warehouse_id(), "abc");
    }

    #[test]
    fn test_preview_cuts_long_statements() {
        let long = format!("SELECT {}", "x, ".repeat(100));
        assert!(preview(&long).ends_with('…'));
        assert_eq!(preview("  SHOW CATALOGS\n"), "SHOW CATALOGS");
    }
}
