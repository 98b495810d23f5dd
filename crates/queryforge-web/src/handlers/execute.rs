//! Running SQL on the warehouse.

use std::time::Instant;

use axum::{extract::State, Json};
use queryforge_common::{ApiError, ApiResult, TableRef};
use queryforge_warehouse::{AuditEvent, EventType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::{audit_failure, client_session_id};
use crate::state::SharedState;

/// Rows returned to the client per execution.
pub const MAX_RESULT_ROWS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ExecuteSqlRequest {
    pub sql_query: String,
    /// Tables the query was generated for, recorded in the audit row.
    #[serde(default)]
    pub tables: Vec<TableRef>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteSqlResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

/// POST /api/execute-sql
pub async fn execute_sql(
    State(state): State<SharedState>,
    Json(req): Json<ExecuteSqlRequest>,
) -> ApiResult<Json<ExecuteSqlResponse>> {
    let started = Instant::now();
    if req.sql_query.trim().is_empty() {
        return Err(ApiError::BadRequest("sql_query must not be empty".to_string()));
    }
    let wh = state.warehouse()?;

    let event = AuditEvent::new(EventType::SqlExecution)
        .tables(&req.tables)
        .generated_sql(req.sql_query.clone())
        .session(client_session_id(req.session_id.clone()));

    let mut rs = match wh.execute(&req.sql_query, &[], Some(MAX_RESULT_ROWS)).await {
        Ok(rs) => rs,
        Err(e) => {
            let err = ApiError::upstream("Failed to execute SQL", e);
            return Err(audit_failure(&state, event, started, err));
        }
    };
    rs.truncate(MAX_RESULT_ROWS);
    let rows = rs.records();
    let row_count = rows.len();
    info!(rows = row_count, elapsed_ms = started.elapsed().as_millis() as u64, "Executed SQL");

    state.audit.record(
        event
            .row_count(row_count)
            .elapsed_ms(started.elapsed().as_millis()),
    );

    Ok(Json(ExecuteSqlResponse { columns: rs.columns, rows, row_count }))
}
