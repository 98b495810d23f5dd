//! Health, configuration diagnostics, warehouse status and the model catalog.

use axum::{extract::State, Json};
use chrono::Utc;
use queryforge_llm::MODEL_CATALOG;
use serde_json::{json, Value};
use tracing::warn;

use crate::state::SharedState;

/// GET /api/health
pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.server.env,
        "audit": state.audit.stats(),
    }))
}

/// GET /api/debug/config
///
/// Reports which settings are present. Never echoes a secret.
pub async fn debug_config(State(state): State<SharedState>) -> Json<Value> {
    let cfg = &state.config;
    Json(json!({
        "env": cfg.server.env,
        "debug": cfg.server.debug,
        "databricks_host_configured": !cfg.warehouse.host.is_empty(),
        "databricks_token_configured": cfg.warehouse.token_len() > 0,
        "databricks_token_length": cfg.warehouse.token_len(),
        "databricks_http_path_configured": !cfg.warehouse.http_path.is_empty(),
        "databricks_catalog": cfg.warehouse.catalog,
        "databricks_schema": cfg.warehouse.schema,
        "audit_table": state.audit.table(),
        "audit": state.audit.stats(),
        "llm_configured": state.llm.is_some(),
        "llm_base_url": state.llm.as_ref().map(|b| b.base_url().to_string()),
        "default_model": cfg.llm.default_model,
    }))
}

/// GET /api/warehouse-status
pub async fn warehouse_status(State(state): State<SharedState>) -> Json<Value> {
    let http_path = &state.config.warehouse.http_path;
    let Some(id) = state.config.warehouse.warehouse_id() else {
        return Json(json!({
            "warehouse_id": null,
            "warehouse_name": "Not configured",
            "status": "UNKNOWN",
            "http_path": http_path,
        }));
    };
    let Some(wh) = state.warehouse.as_deref() else {
        return Json(json!({
            "warehouse_id": id,
            "warehouse_name": "Unknown",
            "status": "UNKNOWN",
            "http_path": http_path,
            "error": "Databricks credentials not configured",
        }));
    };

    match wh.warehouse_info().await {
        Ok(info) => Json(json!({
            "warehouse_id": info.id,
            "warehouse_name": info.name,
            "status": info.state,
            "http_path": http_path,
        })),
        Err(e) => {
            warn!(warehouse_id = id, "Warehouse status lookup failed: {}", e);
            Json(json!({
                "warehouse_id": id,
                "warehouse_name": "Unknown",
                "status": "STOPPED",
                "http_path": http_path,
                "error": e.to_string(),
            }))
        }
    }
}

/// GET /api/models
pub async fn list_models(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "models": MODEL_CATALOG,
        "default_model": state.config.llm.default_model,
    }))
}
