//! Catalog, schema, table and column discovery.

use axum::{
    extract::{Path, State},
    Json,
};
use queryforge_common::{ApiError, ApiResult, ColumnInfo, TableRef};
use queryforge_warehouse::discovery;
use serde::Serialize;
use tracing::debug;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct CatalogsResponse {
    pub catalogs: Vec<String>,
}

#[derive(Serialize)]
pub struct SchemasResponse {
    pub schemas: Vec<String>,
}

#[derive(Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Serialize)]
pub struct ColumnsResponse {
    pub columns: Vec<ColumnInfo>,
}

/// GET /api/catalogs
pub async fn list_catalogs(State(state): State<SharedState>) -> ApiResult<Json<CatalogsResponse>> {
    let wh = state.warehouse()?;
    let catalogs = discovery::list_catalogs(wh)
        .await
        .map_err(|e| ApiError::upstream("Failed to list catalogs", e))?;
    debug!(count = catalogs.len(), "Listed catalogs");
    Ok(Json(CatalogsResponse { catalogs }))
}

/// GET /api/catalogs/{catalog}/schemas
pub async fn list_schemas(
    State(state): State<SharedState>,
    Path(catalog): Path<String>,
) -> ApiResult<Json<SchemasResponse>> {
    let wh = state.warehouse()?;
    let schemas = discovery::list_schemas(wh, &catalog)
        .await
        .map_err(|e| ApiError::upstream("Failed to list schemas", e))?;
    Ok(Json(SchemasResponse { schemas }))
}

/// GET /api/catalogs/{catalog}/schemas/{schema}/tables
pub async fn list_tables(
    State(state): State<SharedState>,
    Path((catalog, schema)): Path<(String, String)>,
) -> ApiResult<Json<TablesResponse>> {
    let wh = state.warehouse()?;
    let tables = discovery::list_tables(wh, &catalog, &schema)
        .await
        .map_err(|e| ApiError::upstream("Failed to list tables", e))?;
    Ok(Json(TablesResponse { tables }))
}

/// GET /api/catalogs/{catalog}/schemas/{schema}/tables/{table}/columns
pub async fn list_columns(
    State(state): State<SharedState>,
    Path((catalog, schema, table)): Path<(String, String, String)>,
) -> ApiResult<Json<ColumnsResponse>> {
    let wh = state.warehouse()?;
    let table = TableRef::new(catalog, schema, table, Vec::new());
    let columns = discovery::describe_table(wh, &table)
        .await
        .map_err(|e| ApiError::upstream("Failed to get columns", e))?;
    Ok(Json(ColumnsResponse { columns }))
}
