//! Business-question and join-condition suggestions.

use std::time::Instant;

use axum::{extract::State, Json};
use queryforge_common::{ApiError, ApiResult, TableRef};
use queryforge_llm::{
    parser::{parse_join_condition, parse_suggestions, suggestions::MAX_SUGGESTIONS},
    prompts, LlmRequest,
};
use queryforge_warehouse::{discovery, AuditEvent, EventType};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{audit_failure, client_session_id, resolve_model_id, with_usage};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SuggestBusinessLogicRequest {
    pub catalog: String,
    pub schema_name: String,
    pub table: String,
    #[serde(default)]
    pub columns: Vec<String>,
    pub model_id: Option<String>,
    /// Further tables for multi-table suggestions.
    #[serde(default)]
    pub additional_tables: Vec<TableRef>,
    pub session_id: Option<String>,
}

impl SuggestBusinessLogicRequest {
    /// The primary table first, then any additional ones.
    pub fn tables(&self) -> Vec<TableRef> {
        let primary = TableRef::new(&self.catalog, &self.schema_name, &self.table, self.columns.clone());
        std::iter::once(primary).chain(self.additional_tables.iter().cloned()).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct SuggestBusinessLogicResponse {
    pub suggestions: Vec<String>,
    pub model_used: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestJoinRequest {
    pub tables: Vec<TableRef>,
    pub model_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestJoinResponse {
    pub join_condition: String,
    pub model_used: String,
    pub session_id: Option<String>,
}

/// POST /api/suggest-business-logic
pub async fn suggest_business_logic(
    State(state): State<SharedState>,
    Json(req): Json<SuggestBusinessLogicRequest>,
) -> ApiResult<Json<SuggestBusinessLogicResponse>> {
    let started = Instant::now();
    let model = resolve_model_id(&state, req.model_id.as_deref())?;
    let wh = state.warehouse()?;
    let llm = state.llm()?;
    let tables = req.tables();
    let session_id = client_session_id(req.session_id);

    let event = AuditEvent::new(EventType::BusinessLogicSuggestion)
        .tables(&tables)
        .model(&model)
        .session(session_id.clone());

    let contexts = discovery::fetch_table_contexts(wh, &tables, state.context_timeout()).await;
    let prompt = prompts::suggestion_prompt(&contexts);
    let request = LlmRequest::chat(&model, prompt.system, prompt.user)
        .with_max_tokens(500)
        .with_temperature(0.7);

    let resp = match llm.complete(request).await {
        Ok(r) => r,
        Err(e) => {
            let err = ApiError::upstream("Failed to suggest business logic", e);
            return Err(audit_failure(&state, event, started, err));
        }
    };

    let mut suggestions = parse_suggestions(&resp.content, tables.len() > 1);
    suggestions.truncate(MAX_SUGGESTIONS);
    info!(model = %model, tables = tables.len(), count = suggestions.len(), "Suggested business logic");

    let event = with_usage(event, &model, &resp)
        .business_logic(serde_json::Value::from(suggestions.clone()).to_string())
        .elapsed_ms(started.elapsed().as_millis());
    state.audit.record(event);

    Ok(Json(SuggestBusinessLogicResponse { suggestions, model_used: model, session_id }))
}

/// POST /api/suggest-join-conditions
pub async fn suggest_join_conditions(
    State(state): State<SharedState>,
    Json(req): Json<SuggestJoinRequest>,
) -> ApiResult<Json<SuggestJoinResponse>> {
    let started = Instant::now();
    if req.tables.len() < 2 {
        return Err(ApiError::BadRequest(
            "At least two tables are required to suggest join conditions".to_string(),
        ));
    }
    let model = resolve_model_id(&state, req.model_id.as_deref())?;
    let wh = state.warehouse()?;
    let llm = state.llm()?;
    let session_id = client_session_id(req.session_id);

    let event = AuditEvent::new(EventType::JoinConditionSuggestion)
        .tables(&req.tables)
        .model(&model)
        .session(session_id.clone());

    let contexts = discovery::fetch_table_contexts(wh, &req.tables, state.context_timeout()).await;
    let prompt = prompts::join_prompt(&contexts);
    let request = LlmRequest::chat(&model, prompt.system, prompt.user)
        .with_max_tokens(200)
        .with_temperature(0.1);

    let resp = match llm.complete(request).await {
        Ok(r) => r,
        Err(e) => {
            let err = ApiError::upstream("Failed to suggest join conditions", e);
            return Err(audit_failure(&state, event, started, err));
        }
    };
    let event = with_usage(event, &model, &resp);

    let join_condition = match parse_join_condition(&resp.content) {
        Ok(j) => j,
        Err(e) => {
            let err = ApiError::upstream("Failed to suggest join conditions", e);
            return Err(audit_failure(&state, event, started, err));
        }
    };
    info!(model = %model, tables = req.tables.len(), "Suggested join condition");

    state.audit.record(
        event
            .business_logic(join_condition.clone())
            .elapsed_ms(started.elapsed().as_millis()),
    );

    Ok(Json(SuggestJoinResponse { join_condition, model_used: model, session_id }))
}
