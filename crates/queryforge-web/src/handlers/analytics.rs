//! Dashboard and analytics reads over the audit table.
//!
//! These endpoints always answer 200. A missing warehouse or a failed query
//! yields the empty/zeroed shape so the dashboard can still render.

use std::future::Future;

use axum::{extract::State, Json};
use queryforge_warehouse::{
    analytics::{
        self, AnalyticsSummary, CostsByModel, DashboardStats, LlmAnalytics, LlmUsage, QueryHistory,
        TopQueries,
    },
    Warehouse,
};
use tracing::{debug, error};

use crate::state::{AppState, SharedState};

async fn read_or_default<'a, T, F, Fut>(state: &'a AppState, what: &str, load: F) -> Json<T>
where
    T: Default,
    F: FnOnce(&'a dyn Warehouse, &'a str) -> Fut,
    Fut: Future<Output = queryforge_warehouse::Result<T>>,
{
    let Some(wh) = state.warehouse.as_deref() else {
        debug!("No warehouse configured, returning empty {}", what);
        return Json(T::default());
    };
    match load(wh, state.audit.table()).await {
        Ok(value) => Json(value),
        Err(e) => {
            error!("Failed to load {}: {}", what, e);
            Json(T::default())
        }
    }
}

/// GET /api/dashboard-statistics
pub async fn dashboard_statistics(State(state): State<SharedState>) -> Json<DashboardStats> {
    read_or_default(&state, "dashboard statistics", analytics::load_dashboard).await
}

/// GET /api/query-history
pub async fn query_history(State(state): State<SharedState>) -> Json<QueryHistory> {
    read_or_default(&state, "query history", analytics::load_query_history).await
}

/// GET /api/llm-analytics
pub async fn llm_analytics(State(state): State<SharedState>) -> Json<LlmAnalytics> {
    read_or_default(&state, "LLM analytics", analytics::load_llm_analytics).await
}

/// GET /api/llm-costs-by-model
pub async fn llm_costs_by_model(State(state): State<SharedState>) -> Json<CostsByModel> {
    read_or_default(&state, "LLM costs by model", analytics::load_costs_by_model).await
}

/// GET /api/analytics/llm-usage
pub async fn llm_usage(State(state): State<SharedState>) -> Json<LlmUsage> {
    read_or_default(&state, "LLM usage", analytics::load_llm_usage).await
}

/// GET /api/analytics/top-queries
pub async fn top_queries(State(state): State<SharedState>) -> Json<TopQueries> {
    read_or_default(&state, "top queries", analytics::load_top_queries).await
}

/// GET /api/analytics/summary
pub async fn analytics_summary(State(state): State<SharedState>) -> Json<AnalyticsSummary> {
    read_or_default(&state, "analytics summary", analytics::load_summary).await
}
