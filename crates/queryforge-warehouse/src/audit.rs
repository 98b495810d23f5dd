//! Audit log: one append-only row per suggestion, generation, join suggestion
//! or execution.
//!
//! Handlers never wait on the warehouse for audit rows. [`AuditLogger::record`]
//! pushes onto a bounded queue and a single background task inserts the rows.
//! Queue overflow and insert failures are counted, never surfaced.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use queryforge_common::{quote_ident, TableRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{StatementParam, Warehouse};
use crate::error::Result;

/// No user tracking yet; every row carries this id.
pub const DEFAULT_USER: &str = "default_user";

// ── Event kinds ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BusinessLogicSuggestion,
    SqlGeneration,
    JoinConditionSuggestion,
    SqlExecution,
}

impl EventType {
    pub const LLM_CALLS: [EventType; 3] = [
        EventType::BusinessLogicSuggestion,
        EventType::SqlGeneration,
        EventType::JoinConditionSuggestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BusinessLogicSuggestion => "business_logic_suggestion",
            EventType::SqlGeneration => "sql_generation",
            EventType::JoinConditionSuggestion => "join_condition_suggestion",
            EventType::SqlExecution => "sql_execution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "business_logic_suggestion" => Some(EventType::BusinessLogicSuggestion),
            "sql_generation" => Some(EventType::SqlGeneration),
            "join_condition_suggestion" => Some(EventType::JoinConditionSuggestion),
            "sql_execution" => Some(EventType::SqlExecution),
            _ => None,
        }
    }

    pub fn is_llm_call(&self) -> bool {
        *self != EventType::SqlExecution
    }

    /// `'a', 'b', 'c'` for an `IN (...)` clause.
    pub fn llm_calls_sql_list() -> String {
        Self::LLM_CALLS
            .iter()
            .map(|e| format!("'{}'", e.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Error => "error",
        }
    }
}

// ── Event (write side) ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub catalog: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub columns: Vec<String>,
    pub business_logic: Option<String>,
    pub generated_sql: Option<String>,
    pub model_id: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub status: EventStatus,
    pub error_message: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub estimated_cost_usd: Option<f64>,
    pub session_id: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            catalog: None,
            schema_name: None,
            table_name: None,
            columns: Vec::new(),
            business_logic: None,
            generated_sql: None,
            model_id: None,
            execution_time_ms: None,
            row_count: None,
            status: EventStatus::Success,
            error_message: None,
            metadata: BTreeMap::new(),
            prompt_tokens: None,
            completion_tokens: None,
            estimated_cost_usd: None,
            session_id: None,
        }
    }

    /// Location columns come from the first table. With several tables the
    /// table name lists them all and the full names go into metadata.
    pub fn tables(mut self, tables: &[TableRef]) -> Self {
        let Some(first) = tables.first() else { return self };
        self.catalog = Some(first.catalog.clone());
        self.schema_name = Some(first.schema_name.clone());
        if tables.len() == 1 {
            self.table_name = Some(first.table.clone());
            self.columns = first.columns.clone();
        } else {
            self.table_name = Some(tables.iter().map(|t| t.table.as_str()).collect::<Vec<_>>().join(", "));
            self.columns = tables
                .iter()
                .flat_map(|t| t.columns.iter().map(move |c| format!("{}.{}", t.table, c)))
                .collect();
            let names: Vec<String> = tables.iter().map(TableRef::full_name).collect();
            self.metadata.insert("tables".into(), names.join(","));
        }
        self
    }

    pub fn business_logic(mut self, text: impl Into<String>) -> Self {
        self.business_logic = Some(text.into());
        self
    }

    pub fn generated_sql(mut self, sql: impl Into<String>) -> Self {
        self.generated_sql = Some(sql.into());
        self
    }

    pub fn model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn elapsed_ms(mut self, ms: u128) -> Self {
        self.execution_time_ms = Some(i64::try_from(ms).unwrap_or(i64::MAX));
        self
    }

    pub fn row_count(mut self, rows: usize) -> Self {
        self.row_count = Some(rows as i64);
        self
    }

    pub fn usage(mut self, prompt_tokens: u32, completion_tokens: u32, cost_usd: f64) -> Self {
        self.prompt_tokens = Some(prompt_tokens.into());
        self.completion_tokens = Some(completion_tokens.into());
        self.estimated_cost_usd = Some(cost_usd);
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = EventStatus::Error;
        self.error_message = Some(message.into());
        self
    }

    pub fn session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn total_tokens(&self) -> Option<i64> {
        match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
        }
    }

    pub fn business_logic_length(&self) -> Option<i64> {
        char_len(self.business_logic.as_deref())
    }

    pub fn generated_sql_length(&self) -> Option<i64> {
        char_len(self.generated_sql.as_deref())
    }
}

fn char_len(text: Option<&str>) -> Option<i64> {
    text.filter(|t| !t.is_empty()).map(|t| t.chars().count() as i64)
}

// ── Record (read side) ────────────────────────────────────────────────────────

/// One audit row as read back from the warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditRecord {
    pub log_id: String,
    pub timestamp: Option<String>,
    pub event_type: String,
    pub catalog: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub columns: Option<Vec<String>>,
    pub business_logic: Option<String>,
    pub generated_sql: Option<String>,
    pub model_id: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub status: Option<String>,
    pub error_message: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub estimated_cost_usd: Option<f64>,
    pub business_logic_length: Option<i64>,
    pub generated_sql_length: Option<i64>,
    pub session_id: Option<String>,
}

impl AuditRecord {
    /// Columns selected when reading records back.
    pub const COLUMNS: &'static str = "log_id, timestamp, event_type, catalog, schema_name, table_name, \
        columns, business_logic, generated_sql, model_id, execution_time_ms, row_count, status, \
        error_message, prompt_tokens, completion_tokens, total_tokens, estimated_cost_usd, \
        business_logic_length, generated_sql_length, session_id";

    pub fn from_row(row: Map<String, Value>) -> Option<Self> {
        match serde_json::from_value(Value::Object(row)) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable audit row: {}", e);
                None
            }
        }
    }

    pub fn kind(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }

    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(EventStatus::Success.as_str())
    }
}

// ── Statements ────────────────────────────────────────────────────────────────

/// Quote each part of a dotted table name.
pub fn quote_table_name(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

pub fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
  log_id STRING NOT NULL,
  timestamp TIMESTAMP NOT NULL,
  event_type STRING NOT NULL,
  user_id STRING,
  catalog STRING,
  schema_name STRING,
  table_name STRING,
  columns ARRAY<STRING>,
  business_logic STRING,
  generated_sql STRING,
  model_id STRING,
  execution_time_ms BIGINT,
  row_count BIGINT,
  status STRING,
  error_message STRING,
  metadata MAP<STRING, STRING>,
  prompt_tokens BIGINT,
  completion_tokens BIGINT,
  total_tokens BIGINT,
  estimated_cost_usd DOUBLE,
  business_logic_length BIGINT,
  generated_sql_length BIGINT,
  session_id STRING
) USING DELTA COMMENT 'QueryForge audit log'",
        quote_table_name(table)
    )
}

pub fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {} (log_id, timestamp, event_type, user_id, catalog, schema_name, table_name, \
         columns, business_logic, generated_sql, model_id, execution_time_ms, row_count, status, \
         error_message, metadata, prompt_tokens, completion_tokens, total_tokens, estimated_cost_usd, \
         business_logic_length, generated_sql_length, session_id) \
         VALUES (:log_id, :timestamp, :event_type, :user_id, :catalog, :schema_name, :table_name, \
         from_json(:columns, 'array<string>'), :business_logic, :generated_sql, :model_id, \
         :execution_time_ms, :row_count, :status, :error_message, \
         from_json(:metadata, 'map<string,string>'), :prompt_tokens, :completion_tokens, \
         :total_tokens, :estimated_cost_usd, :business_logic_length, :generated_sql_length, :session_id)",
        quote_table_name(table)
    )
}

pub fn insert_params(event: &AuditEvent) -> Vec<StatementParam> {
    let columns = (!event.columns.is_empty()).then(|| Value::from(event.columns.clone()).to_string());
    let metadata = (!event.metadata.is_empty()).then(|| {
        let map: Map<String, Value> = event
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        Value::Object(map).to_string()
    });

    vec![
        StatementParam::string("log_id", Some(event.log_id.to_string().as_str())),
        StatementParam::timestamp("timestamp", event.timestamp),
        StatementParam::string("event_type", Some(event.event_type.as_str())),
        StatementParam::string("user_id", Some(DEFAULT_USER)),
        StatementParam::string("catalog", event.catalog.as_deref()),
        StatementParam::string("schema_name", event.schema_name.as_deref()),
        StatementParam::string("table_name", event.table_name.as_deref()),
        StatementParam::string("columns", columns.as_deref()),
        StatementParam::string("business_logic", event.business_logic.as_deref()),
        StatementParam::string("generated_sql", event.generated_sql.as_deref()),
        StatementParam::string("model_id", event.model_id.as_deref()),
        StatementParam::bigint("execution_time_ms", event.execution_time_ms),
        StatementParam::bigint("row_count", event.row_count),
        StatementParam::string("status", Some(event.status.as_str())),
        StatementParam::string("error_message", event.error_message.as_deref()),
        StatementParam::string("metadata", metadata.as_deref()),
        StatementParam::bigint("prompt_tokens", event.prompt_tokens),
        StatementParam::bigint("completion_tokens", event.completion_tokens),
        StatementParam::bigint("total_tokens", event.total_tokens()),
        StatementParam::double("estimated_cost_usd", event.estimated_cost_usd),
        StatementParam::bigint("business_logic_length", event.business_logic_length()),
        StatementParam::bigint("generated_sql_length", event.generated_sql_length()),
        StatementParam::string("session_id", event.session_id.as_deref()),
    ]
}

/// Create the audit table if it does not exist.
pub async fn ensure_table(wh: &dyn Warehouse, table: &str) -> Result<()> {
    wh.query(&create_table_statement(table)).await?;
    info!(table, "Audit table ready");
    Ok(())
}

// ── Logger ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AuditCounters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub enabled: bool,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct AuditLogger {
    tx: Option<mpsc::Sender<AuditEvent>>,
    counters: Arc<AuditCounters>,
    table: String,
}

impl AuditLogger {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn start(warehouse: Arc<dyn Warehouse>, table: impl Into<String>, capacity: usize) -> Self {
        let table = table.into();
        let counters = Arc::new(AuditCounters::default());
        let (tx, rx) = mpsc::channel::<AuditEvent>(capacity.max(1));

        tokio::spawn(run_writer(warehouse, table.clone(), rx, counters.clone()));

        Self { tx: Some(tx), counters, table }
    }

    /// No warehouse: every event is dropped and counted.
    pub fn disabled(table: impl Into<String>) -> Self {
        Self { tx: None, counters: Arc::new(AuditCounters::default()), table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Queue an event. Never blocks and never fails.
    pub fn record(&self, event: AuditEvent) {
        let Some(tx) = &self.tx else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(event_type = event.event_type.as_str(), "Audit disabled, event dropped");
            return;
        };
        if let Err(e) = tx.try_send(event) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            let (reason, event) = match e {
                TrySendError::Full(ev) => ("queue full", ev),
                TrySendError::Closed(ev) => ("writer stopped", ev),
            };
            warn!(reason, event_type = event.event_type.as_str(), log_id = %event.log_id, "Audit event dropped");
        }
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            enabled: self.tx.is_some(),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_writer(
    warehouse: Arc<dyn Warehouse>,
    table: String,
    mut rx: mpsc::Receiver<AuditEvent>,
    counters: Arc<AuditCounters>,
) {
    info!(table = %table, "Started audit log writer");
    let statement = insert_statement(&table);

    while let Some(event) = rx.recv().await {
        match warehouse.execute(&statement, &insert_params(&event), None).await {
            Ok(_) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                debug!(event_type = event.event_type.as_str(), log_id = %event.log_id, "Audit event written");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_type = event.event_type.as_str(),
                    log_id = %event.log_id,
                    table = event.table_name.as_deref().unwrap_or("-"),
                    "Failed to write audit event: {}", e
                );
            }
        }
    }

    info!("Audit log writer stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
