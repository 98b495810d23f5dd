//! Axum router: maps all URL paths to handlers.

use axum::{
    http::HeaderValue,
    routing::{any, get, post},
    Router,
};
use queryforge_common::ApiError;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::handlers::{
    analytics::{
        analytics_summary, dashboard_statistics, llm_analytics, llm_costs_by_model, llm_usage,
        query_history, top_queries,
    },
    catalog::{list_catalogs, list_columns, list_schemas, list_tables},
    execute::execute_sql,
    generate::generate_sql,
    suggest::{suggest_business_logic, suggest_join_conditions},
    system::{debug_config, health, list_models, warehouse_status},
};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let static_dir = state.config.server.static_dir.clone();
    let shared: SharedState = Arc::new(state);

    // Unknown paths fall through to the single-page app.
    let spa = ServeDir::new(&static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        // System
        .route("/api/health",           get(health))
        .route("/api/debug/config",     get(debug_config))
        .route("/api/warehouse-status", get(warehouse_status))
        .route("/api/models",           get(list_models))

        // Discovery
        .route("/api/catalogs",                                  get(list_catalogs))
        .route("/api/catalogs/{catalog}/schemas",                get(list_schemas))
        .route("/api/catalogs/{catalog}/schemas/{schema}/tables", get(list_tables))
        .route("/api/catalogs/{catalog}/schemas/{schema}/tables/{table}/columns", get(list_columns))

        // LLM
        .route("/api/suggest-business-logic", post(suggest_business_logic))
        .route("/api/suggest-join-conditions", post(suggest_join_conditions))
        .route("/api/generate-sql",           post(generate_sql))
        .route("/api/generate-sql-multi",     post(generate_sql))

        // Execution
        .route("/api/execute-sql", post(execute_sql))

        // Analytics
        .route("/api/dashboard-statistics",  get(dashboard_statistics))
        .route("/api/query-history",         get(query_history))
        .route("/api/llm-analytics",         get(llm_analytics))
        .route("/api/llm-costs-by-model",    get(llm_costs_by_model))
        .route("/api/analytics/llm-usage",   get(llm_usage))
        .route("/api/analytics/top-queries", get(top_queries))
        .route("/api/analytics/summary",     get(analytics_summary))

        // Reserved prefixes never reach the frontend
        .route("/api",           any(not_found))
        .route("/api/{*rest}",   any(not_found))
        .route("/docs",          any(not_found))
        .route("/docs/{*rest}",  any(not_found))
        .route("/openapi.json",  any(not_found))

        .fallback_service(spa)

        // Middleware
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Empty list means any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}
