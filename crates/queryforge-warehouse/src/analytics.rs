//! Dashboard and analytics reads over the audit table.
//!
//! Aggregation runs either in the warehouse (`GROUP BY`) or in-process over
//! fetched rows. Every response type implements `Default` as the zeroed
//! fallback served when a read fails.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::audit::{quote_table_name, AuditRecord, EventType};
use crate::client::Warehouse;
use crate::error::Result;
use crate::history::{fetch_recent_records, group_sessions, QuerySession};

/// Rows fetched for the query history view.
pub const HISTORY_LIMIT: usize = 200;
/// LLM events listed in the analytics detail table.
pub const LLM_DETAIL_LIMIT: usize = 100;
/// Rows scanned for the top-queries rankings.
pub const TOP_QUERIES_SCAN_LIMIT: usize = 1000;

const USAGE_TOP_N: usize = 5;
const TOP_QUERIES_N: usize = 10;
const RECENT_QUERIES_N: usize = 20;

// ── Value helpers ─────────────────────────────────────────────────────────────

fn get_f64(row: &Map<String, Value>, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_i64(row: &Map<String, Value>, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn get_string(row: &Map<String, Value>, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Single aggregate row; `None` when the result was empty.
async fn aggregate_row(wh: &dyn Warehouse, statement: &str) -> Result<Option<Map<String, Value>>> {
    Ok(wh.query(statement).await?.records().into_iter().next())
}

// ── Dashboard ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_executions: u64,
    pub total_llm_calls: u64,
    pub avg_execution_time_ms: i64,
    /// Percent of successful events, two decimals.
    pub success_rate: f64,
    pub total_rows_returned: i64,
    pub unique_tables_analyzed: usize,
}

pub fn dashboard_stats(records: &[AuditRecord]) -> DashboardStats {
    let mut stats = DashboardStats::default();
    let mut successes = 0u64;
    let mut exec_times = Vec::new();
    let mut tables = HashSet::new();

    for r in records {
        let kind = r.kind();
        if r.is_success() {
            successes += 1;
        }
        if let Some(t) = r.table_name.as_deref() {
            tables.insert(t);
        }
        match kind {
            Some(EventType::SqlExecution) => {
                stats.total_executions += 1;
                if r.is_success() {
                    exec_times.extend(r.execution_time_ms);
                    stats.total_rows_returned += r.row_count.unwrap_or(0);
                }
            }
            Some(k) if k.is_llm_call() => stats.total_llm_calls += 1,
            _ => {}
        }
    }

    if !exec_times.is_empty() {
        stats.avg_execution_time_ms = exec_times.iter().sum::<i64>() / exec_times.len() as i64;
    }
    if !records.is_empty() {
        stats.success_rate = round_to(successes as f64 * 100.0 / records.len() as f64, 2);
    }
    stats.unique_tables_analyzed = tables.len();
    stats
}

pub async fn load_dashboard(wh: &dyn Warehouse, table: &str) -> Result<DashboardStats> {
    let statement = format!(
        "SELECT event_type, execution_time_ms, row_count, status, table_name FROM {}",
        quote_table_name(table)
    );
    let rs = wh.query(&statement).await?;
    let records: Vec<AuditRecord> = rs.records().into_iter().filter_map(AuditRecord::from_row).collect();
    Ok(dashboard_stats(&records))
}

// ── Query history ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryHistory {
    pub query_sessions: Vec<QuerySession>,
    pub total_count: usize,
}

pub async fn load_query_history(wh: &dyn Warehouse, table: &str) -> Result<QueryHistory> {
    let sessions = group_sessions(fetch_recent_records(wh, table, HISTORY_LIMIT).await?);
    Ok(QueryHistory { total_count: sessions.len(), query_sessions: sessions })
}

// ── LLM analytics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmAggregates {
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub avg_cost_per_call_usd: f64,
    pub total_llm_calls: i64,
}

impl LlmAggregates {
    fn from_row(row: &Map<String, Value>) -> Self {
        Self {
            total_prompt_tokens: get_i64(row, "total_prompt_tokens").unwrap_or(0),
            total_completion_tokens: get_i64(row, "total_completion_tokens").unwrap_or(0),
            total_tokens: get_i64(row, "total_tokens").unwrap_or(0),
            total_cost_usd: round_to(get_f64(row, "total_cost").unwrap_or(0.0), 4),
            avg_cost_per_call_usd: round_to(get_f64(row, "avg_cost_per_call").unwrap_or(0.0), 6),
            total_llm_calls: get_i64(row, "total_llm_calls").unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmAnalytics {
    pub details: Vec<AuditRecord>,
    pub aggregates: LlmAggregates,
}

pub async fn load_llm_analytics(wh: &dyn Warehouse, table: &str) -> Result<LlmAnalytics> {
    let table = quote_table_name(table);
    let llm_calls = EventType::llm_calls_sql_list();

    let details = wh
        .query(&format!(
            "SELECT {} FROM {table} WHERE event_type IN ({llm_calls}) \
             ORDER BY timestamp DESC LIMIT {LLM_DETAIL_LIMIT}",
            AuditRecord::COLUMNS
        ))
        .await?
        .records()
        .into_iter()
        .filter_map(AuditRecord::from_row)
        .collect();

    let aggregates = aggregate_row(
        wh,
        &format!(
            "SELECT SUM(prompt_tokens) AS total_prompt_tokens, \
                    SUM(completion_tokens) AS total_completion_tokens, \
                    SUM(total_tokens) AS total_tokens, \
                    SUM(estimated_cost_usd) AS total_cost, \
                    AVG(estimated_cost_usd) AS avg_cost_per_call, \
                    COUNT(*) AS total_llm_calls \
             FROM {table} WHERE event_type IN ({llm_calls}) AND status = 'success'"
        ),
    )
    .await?
    .map(|row| LlmAggregates::from_row(&row))
    .unwrap_or_default();

    Ok(LlmAnalytics { details, aggregates })
}

// ── Costs by model ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCost {
    pub model_id: String,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub call_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostsByModel {
    pub models: Vec<ModelCost>,
    pub total_cost: f64,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
}

pub fn costs_by_model(models: Vec<ModelCost>) -> CostsByModel {
    CostsByModel {
        total_cost: models.iter().map(|m| m.total_cost).sum(),
        total_prompt_tokens: models.iter().map(|m| m.total_prompt_tokens).sum(),
        total_completion_tokens: models.iter().map(|m| m.total_completion_tokens).sum(),
        models,
    }
}

pub async fn load_costs_by_model(wh: &dyn Warehouse, table: &str) -> Result<CostsByModel> {
    let rs = wh
        .query(&format!(
            "SELECT model_id, SUM(prompt_tokens) AS total_prompt_tokens, \
                    SUM(completion_tokens) AS total_completion_tokens, \
                    SUM(total_tokens) AS total_tokens, \
                    SUM(estimated_cost_usd) AS total_cost, \
                    COUNT(*) AS call_count \
             FROM {} WHERE event_type IN ({}) AND status = 'success' AND model_id IS NOT NULL \
             GROUP BY model_id ORDER BY total_cost DESC",
            quote_table_name(table),
            EventType::llm_calls_sql_list()
        ))
        .await?;

    let models = rs
        .records()
        .iter()
        .map(|row| ModelCost {
            model_id: get_string(row, "model_id").unwrap_or_default(),
            total_prompt_tokens: get_i64(row, "total_prompt_tokens").unwrap_or(0),
            total_completion_tokens: get_i64(row, "total_completion_tokens").unwrap_or(0),
            total_tokens: get_i64(row, "total_tokens").unwrap_or(0),
            total_cost: get_f64(row, "total_cost").unwrap_or(0.0),
            call_count: get_i64(row, "call_count").unwrap_or(0),
        })
        .collect();
    Ok(costs_by_model(models))
}

// ── LLM usage rankings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub model_id: String,
    pub usage_count: i64,
    pub total_cost: f64,
    pub avg_execution_time: Option<f64>,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmUsage {
    pub most_used: Vec<ModelUsage>,
    pub most_costly: Vec<ModelUsage>,
    pub slowest: Vec<ModelUsage>,
    pub fastest: Vec<ModelUsage>,
    pub all_models: Vec<ModelUsage>,
}

fn top_by<T: Clone>(items: &[T], n: usize, cmp: impl FnMut(&T, &T) -> Ordering) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(cmp);
    sorted.truncate(n);
    sorted
}

pub fn rank_llm_usage(all_models: Vec<ModelUsage>) -> LlmUsage {
    let time = |m: &ModelUsage| m.avg_execution_time.unwrap_or(0.0);
    LlmUsage {
        most_used: top_by(&all_models, USAGE_TOP_N, |a, b| b.usage_count.cmp(&a.usage_count)),
        most_costly: top_by(&all_models, USAGE_TOP_N, |a, b| desc(a.total_cost, b.total_cost)),
        slowest: top_by(&all_models, USAGE_TOP_N, |a, b| desc(time(a), time(b))),
        // Models without timings sort last.
        fastest: top_by(&all_models, USAGE_TOP_N, |a, b| {
            let t = |m: &ModelUsage| m.avg_execution_time.unwrap_or(f64::INFINITY);
            t(a).total_cmp(&t(b))
        }),
        all_models,
    }
}

pub async fn load_llm_usage(wh: &dyn Warehouse, table: &str) -> Result<LlmUsage> {
    let rs = wh
        .query(&format!(
            "SELECT model_id, COUNT(*) AS usage_count, \
                    SUM(estimated_cost_usd) AS total_cost, \
                    AVG(execution_time_ms) AS avg_execution_time, \
                    SUM(prompt_tokens) AS total_prompt_tokens, \
                    SUM(completion_tokens) AS total_completion_tokens \
             FROM {} WHERE event_type IN ({}) AND status = 'success' AND model_id IS NOT NULL \
             GROUP BY model_id ORDER BY usage_count DESC",
            quote_table_name(table),
            EventType::llm_calls_sql_list()
        ))
        .await?;

    let stats = rs
        .records()
        .iter()
        .map(|row| ModelUsage {
            model_id: get_string(row, "model_id").unwrap_or_default(),
            usage_count: get_i64(row, "usage_count").unwrap_or(0),
            total_cost: get_f64(row, "total_cost").unwrap_or(0.0),
            avg_execution_time: get_f64(row, "avg_execution_time"),
            total_prompt_tokens: get_i64(row, "total_prompt_tokens").unwrap_or(0),
            total_completion_tokens: get_i64(row, "total_completion_tokens").unwrap_or(0),
        })
        .collect();
    Ok(rank_llm_usage(stats))
}

// ── Top queries ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryMetrics {
    pub session_id: String,
    pub timestamp: Option<String>,
    pub catalog: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub business_logic: Option<String>,
    pub generated_sql: Option<String>,
    pub total_cost_usd: f64,
    pub total_time_ms: i64,
    pub total_tokens: i64,
    pub row_count: Option<i64>,
    pub sql_execution_time_ms: Option<i64>,
    pub status: String,
}

impl From<&QuerySession> for QueryMetrics {
    fn from(s: &QuerySession) -> Self {
        Self {
            session_id: s.session_id.clone(),
            timestamp: s.timestamp.clone(),
            catalog: s.catalog.clone(),
            schema_name: s.schema_name.clone(),
            table_name: s.table_name.clone(),
            business_logic: s.business_logic.clone(),
            generated_sql: s.generated_sql.clone(),
            total_cost_usd: s.total_cost_usd,
            total_time_ms: s.total_time_ms,
            total_tokens: s.total_tokens,
            row_count: s.row_count,
            sql_execution_time_ms: s.execution_time_ms(),
            status: s.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopQueries {
    pub most_costly: Vec<QueryMetrics>,
    pub slowest_total_time: Vec<QueryMetrics>,
    pub slowest_execution: Vec<QueryMetrics>,
    pub most_rows_returned: Vec<QueryMetrics>,
    pub recent_queries: Vec<QueryMetrics>,
}

/// Rank sessions given most recent first.
pub fn rank_top_queries(sessions: &[QuerySession]) -> TopQueries {
    let queries: Vec<QueryMetrics> = sessions.iter().map(QueryMetrics::from).collect();
    let executed: Vec<QueryMetrics> = queries
        .iter()
        .filter(|q| q.sql_execution_time_ms.is_some_and(|t| t > 0))
        .cloned()
        .collect();
    let with_rows: Vec<QueryMetrics> = queries
        .iter()
        .filter(|q| q.row_count.is_some_and(|r| r > 0))
        .cloned()
        .collect();

    TopQueries {
        most_costly: top_by(&queries, TOP_QUERIES_N, |a, b| desc(a.total_cost_usd, b.total_cost_usd)),
        slowest_total_time: top_by(&queries, TOP_QUERIES_N, |a, b| b.total_time_ms.cmp(&a.total_time_ms)),
        slowest_execution: top_by(&executed, TOP_QUERIES_N, |a, b| {
            b.sql_execution_time_ms.cmp(&a.sql_execution_time_ms)
        }),
        most_rows_returned: top_by(&with_rows, TOP_QUERIES_N, |a, b| b.row_count.cmp(&a.row_count)),
        recent_queries: queries.into_iter().take(RECENT_QUERIES_N).collect(),
    }
}

pub async fn load_top_queries(wh: &dyn Warehouse, table: &str) -> Result<TopQueries> {
    let sessions = group_sessions(fetch_recent_records(wh, table, TOP_QUERIES_SCAN_LIMIT).await?);
    Ok(rank_top_queries(&sessions))
}

// ── Summary ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_queries: i64,
    pub unique_models_used: i64,
    pub avg_cost_per_query: f64,
    pub max_cost_query: f64,
    pub min_cost_query: f64,
    pub avg_time_per_event: f64,
    pub max_time_event: i64,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    pub avg_rows_returned: f64,
    pub tokens_per_dollar: f64,
    pub total_cost_usd: f64,
}

impl AnalyticsSummary {
    pub fn from_row(row: &Map<String, Value>) -> Self {
        let mut summary = Self {
            total_queries: get_i64(row, "total_queries").unwrap_or(0),
            unique_models_used: get_i64(row, "unique_models_used").unwrap_or(0),
            avg_cost_per_query: get_f64(row, "avg_cost_per_query").unwrap_or(0.0),
            max_cost_query: get_f64(row, "max_cost_query").unwrap_or(0.0),
            min_cost_query: get_f64(row, "min_cost_query").unwrap_or(0.0),
            avg_time_per_event: get_f64(row, "avg_time_per_event").unwrap_or(0.0),
            max_time_event: get_i64(row, "max_time_event").unwrap_or(0),
            total_prompt_tokens: get_i64(row, "total_prompt_tokens").unwrap_or(0),
            total_completion_tokens: get_i64(row, "total_completion_tokens").unwrap_or(0),
            avg_rows_returned: get_f64(row, "avg_rows_returned").unwrap_or(0.0),
            tokens_per_dollar: 0.0,
            total_cost_usd: get_f64(row, "total_cost_usd").unwrap_or(0.0),
        };
        if summary.total_cost_usd > 0.0 {
            let tokens = (summary.total_prompt_tokens + summary.total_completion_tokens) as f64;
            summary.tokens_per_dollar = tokens / summary.total_cost_usd;
        }
        summary
    }
}

pub async fn load_summary(wh: &dyn Warehouse, table: &str) -> Result<AnalyticsSummary> {
    let statement = format!(
        "SELECT COUNT(DISTINCT session_id) AS total_queries, \
                COUNT(DISTINCT CASE WHEN event_type IN ({llm_calls}) THEN model_id END) AS unique_models_used, \
                AVG(CASE WHEN status = 'success' THEN estimated_cost_usd END) AS avg_cost_per_query, \
                MAX(CASE WHEN status = 'success' THEN estimated_cost_usd END) AS max_cost_query, \
                MIN(CASE WHEN status = 'success' AND estimated_cost_usd > 0 THEN estimated_cost_usd END) AS min_cost_query, \
                AVG(CASE WHEN status = 'success' THEN execution_time_ms END) AS avg_time_per_event, \
                MAX(CASE WHEN status = 'success' THEN execution_time_ms END) AS max_time_event, \
                SUM(CASE WHEN status = 'success' THEN prompt_tokens END) AS total_prompt_tokens, \
                SUM(CASE WHEN status = 'success' THEN completion_tokens END) AS total_completion_tokens, \
                AVG(CASE WHEN event_type = 'sql_execution' AND status = 'success' THEN row_count END) AS avg_rows_returned, \
                SUM(CASE WHEN status = 'success' THEN estimated_cost_usd END) AS total_cost_usd \
         FROM {}",
        quote_table_name(table),
        llm_calls = EventType::llm_calls_sql_list(),
    );
    Ok(aggregate_row(wh, &statement)
        .await?
        .map(|row| AnalyticsSummary::from_row(&row))
        .unwrap_or_default())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(kind: &str, status: &str, table: Option<&str>, time: Option<i64>, rows: Option<i64>) -> AuditRecord {
        AuditRecord {
            event_type: kind.into(),
            status: Some(status.into()),
            table_name: table.map(str::to_string),
            execution_time_ms: time,
            row_count: rows,
            ..Default::default()
        }
    }

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_dashboard_is_zeroed() {
        assert_eq!(dashboard_stats(&[]), DashboardStats::default());
    }

    #[test]
    fn test_dashboard_folding() {
        let records = vec![
            rec("business_logic_suggestion", "success", Some("orders"), Some(900), None),
            rec("join_condition_suggestion", "success", Some("orders, customers"), None, None),
            rec("sql_generation", "error", Some("orders"), Some(500), None),
            rec("sql_execution", "success", None, Some(100), Some(10)),
            rec("sql_execution", "success", None, Some(201), Some(5)),
            rec("sql_execution", "error", None, Some(9000), None),
        ];
        let stats = dashboard_stats(&records);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.total_llm_calls, 3);
        assert_eq!(stats.avg_execution_time_ms, 150);
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.total_rows_returned, 15);
        assert_eq!(stats.unique_tables_analyzed, 2);
    }

    #[test]
    fn test_llm_aggregates_round() {
        let agg = LlmAggregates::from_row(&row(json!({
            "total_prompt_tokens": 1200, "total_completion_tokens": "300", "total_tokens": 1500,
            "total_cost": 0.123456, "avg_cost_per_call": 0.0012345678, "total_llm_calls": 4
        })));
        assert_eq!(agg.total_cost_usd, 0.1235);
        assert_eq!(agg.avg_cost_per_call_usd, 0.001235);
        assert_eq!(agg.total_completion_tokens, 300);
    }

    #[test]
    fn test_null_aggregates_default_to_zero() {
        let summary = AnalyticsSummary::from_row(&row(json!({
            "total_queries": 0, "avg_cost_per_query": null, "total_cost_usd": null
        })));
        assert_eq!(summary, AnalyticsSummary::default());
    }

    #[test]
    fn test_tokens_per_dollar_uses_total_cost() {
        let summary = AnalyticsSummary::from_row(&row(json!({
            "total_prompt_tokens": 1500, "total_completion_tokens": 500, "total_cost_usd": 0.5
        })));
        assert_eq!(summary.tokens_per_dollar, 4000.0);
    }

    #[test]
    fn test_costs_by_model_totals() {
        let costs = costs_by_model(vec![
            ModelCost { model_id: "a".into(), total_cost: 1.5, total_prompt_tokens: 10, ..Default::default() },
            ModelCost { model_id: "b".into(), total_cost: 0.5, total_completion_tokens: 7, ..Default::default() },
        ]);
        assert_eq!(costs.total_cost, 2.0);
        assert_eq!(costs.total_prompt_tokens, 10);
        assert_eq!(costs.total_completion_tokens, 7);
    }

    #[test]
    fn test_llm_usage_rankings() {
        let usage = |id: &str, count, cost, time| ModelUsage {
            model_id: id.into(),
            usage_count: count,
            total_cost: cost,
            avg_execution_time: time,
            ..Default::default()
        };
        let ranked = rank_llm_usage(vec![
            usage("cheap", 10, 0.01, Some(800.0)),
            usage("pricey", 2, 3.0, Some(2500.0)),
            usage("untimed", 1, 0.0, None),
        ]);
        assert_eq!(ranked.most_used[0].model_id, "cheap");
        assert_eq!(ranked.most_costly[0].model_id, "pricey");
        assert_eq!(ranked.slowest[0].model_id, "pricey");
        assert_eq!(ranked.fastest[0].model_id, "cheap");
        assert_eq!(ranked.fastest[2].model_id, "untimed");
        assert_eq!(ranked.all_models.len(), 3);
    }

    #[test]
    fn test_top_queries_rankings() {
        let session = |id: &str, cost: f64, time: i64, rows: Option<i64>| QuerySession {
            session_id: id.into(),
            total_cost_usd: cost,
            total_time_ms: time,
            row_count: rows,
            ..Default::default()
        };
        let sessions = vec![
            session("new", 0.001, 4000, None),
            session("mid", 0.009, 100, Some(50)),
            session("old", 0.002, 900, Some(3)),
        ];
        let top = rank_top_queries(&sessions);
        assert_eq!(top.most_costly[0].session_id, "mid");
        assert_eq!(top.slowest_total_time[0].session_id, "new");
        assert_eq!(top.most_rows_returned.len(), 2);
        assert_eq!(top.most_rows_returned[0].session_id, "mid");
        assert!(top.slowest_execution.is_empty());
        assert_eq!(top.recent_queries[0].session_id, "new");
    }
}
