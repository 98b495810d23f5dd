//! SQL generation from business logic.

use std::time::Instant;

use axum::{extract::State, Json};
use queryforge_common::{ApiError, ApiResult, TableRef};
use queryforge_llm::{
    parser::{parse_generation, ParseError},
    prompts, LlmRequest,
};
use queryforge_warehouse::{discovery, AuditEvent, EventType};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{audit_failure, client_session_id, resolve_model_id, with_usage};
use crate::state::SharedState;

const GENERATION_MAX_TOKENS: u32 = 2000;
const GENERATION_TEMPERATURE: f32 = 0.1;

/// Accepts either a `tables` list or the single-table `catalog`/`schema_name`/`table` fields.
#[derive(Debug, Deserialize)]
pub struct GenerateSqlRequest {
    #[serde(default)]
    pub tables: Vec<TableRef>,
    pub catalog: Option<String>,
    pub schema_name: Option<String>,
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    pub business_logic: String,
    pub model_id: Option<String>,
    pub join_conditions: Option<String>,
    pub session_id: Option<String>,
}

impl GenerateSqlRequest {
    pub fn resolved_tables(&self) -> ApiResult<Vec<TableRef>> {
        if !self.tables.is_empty() {
            return Ok(self.tables.clone());
        }
        match (&self.catalog, &self.schema_name, &self.table) {
            (Some(c), Some(s), Some(t)) => Ok(vec![TableRef::new(c, s, t, self.columns.clone())]),
            _ => Err(ApiError::BadRequest(
                "Either tables or catalog, schema_name and table are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateSqlResponse {
    pub sql_query: String,
    pub explanation: Option<String>,
    pub model_used: String,
    pub session_id: Option<String>,
}

/// POST /api/generate-sql
pub async fn generate_sql(
    State(state): State<SharedState>,
    Json(req): Json<GenerateSqlRequest>,
) -> ApiResult<Json<GenerateSqlResponse>> {
    let started = Instant::now();
    let tables = req.resolved_tables()?;
    if req.business_logic.trim().is_empty() {
        return Err(ApiError::BadRequest("business_logic must not be empty".to_string()));
    }
    let model = resolve_model_id(&state, req.model_id.as_deref())?;
    let wh = state.warehouse()?;
    let llm = state.llm()?;
    let session_id = client_session_id(req.session_id.clone());

    let event = AuditEvent::new(EventType::SqlGeneration)
        .tables(&tables)
        .model(&model)
        .business_logic(req.business_logic.clone())
        .session(session_id.clone());

    let contexts = discovery::fetch_table_contexts(wh, &tables, state.context_timeout()).await;
    let degraded = contexts.iter().filter(|c| c.is_degraded()).count();
    let prompt = prompts::generation_prompt(&contexts, &req.business_logic, req.join_conditions.as_deref());
    let request = LlmRequest::chat(&model, prompt.system, prompt.user)
        .with_max_tokens(GENERATION_MAX_TOKENS)
        .with_temperature(GENERATION_TEMPERATURE);

    let resp = match llm.complete(request).await {
        Ok(r) => r,
        Err(e) => {
            let err = ApiError::upstream("Failed to generate SQL", e);
            return Err(audit_failure(&state, event, started, err));
        }
    };
    let event = with_usage(event, &model, &resp)
        .meta("finish_reason", resp.finish_reason.clone().unwrap_or_default())
        .meta("degraded_tables", degraded.to_string());

    let generated = match parse_generation(&resp.content, resp.was_truncated()) {
        Ok(g) => g,
        Err(e) => {
            warn!(model = %model, finish_reason = ?resp.finish_reason, "Rejected model output: {}", e);
            let err = if matches!(e, ParseError::Incomplete(_)) {
                ApiError::IncompleteOutput(e.to_string())
            } else {
                ApiError::IncompleteOutput(format!("Model output incomplete: {e}"))
            };
            return Err(audit_failure(&state, event, started, err));
        }
    };
    info!(
        model = %model,
        tables = tables.len(),
        tokens = resp.total_tokens(),
        "Generated SQL"
    );

    state.audit.record(
        event
            .generated_sql(generated.sql.clone())
            .elapsed_ms(started.elapsed().as_millis()),
    );

    Ok(Json(GenerateSqlResponse {
        sql_query: generated.sql,
        explanation: generated.explanation,
        model_used: model,
        session_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> GenerateSqlRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_tables_list_wins_over_legacy_fields() {
        let req = request(serde_json::json!({
            "tables": [{"catalog": "c", "schema_name": "s", "table": "a"}],
            "catalog": "x", "schema_name": "y", "table": "z",
            "business_logic": "q",
        }));
        let tables = req.resolved_tables().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].full_name(), "c.s.a");
    }

    #[test]
    fn test_legacy_single_table() {
        let req = request(serde_json::json!({
            "catalog": "main", "schema_name": "sales", "table": "orders",
            "columns": ["id"], "business_logic": "q",
        }));
        let tables = req.resolved_tables().unwrap();
        assert_eq!(tables[0].columns, vec!["id"]);
    }

    #[test]
    fn test_missing_table_is_bad_request() {
        let req = request(serde_json::json!({"catalog": "main", "business_logic": "q"}));
        assert!(matches!(req.resolved_tables(), Err(ApiError::BadRequest(_))));
    }
}
