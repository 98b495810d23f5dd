//! Query sessions: audit rows folded back into user interactions.
//!
//! Rows are scanned oldest first. A suggestion always starts a new session,
//! generation and join events join the open one, and an execution closes it.
//! When rows carry a `session_id`, a different id also closes the open
//! session, so interleaved users are split correctly. Legacy rows without an
//! id fall back to the purely sequential rule.

use serde::Serialize;

use crate::audit::{AuditRecord, EventType};
use crate::client::Warehouse;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySession {
    pub session_id: String,
    pub timestamp: Option<String>,
    pub catalog: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub columns: Option<Vec<String>>,
    pub business_logic: Option<String>,
    pub generated_sql: Option<String>,
    pub business_logic_suggestion: Option<AuditRecord>,
    pub join_condition_suggestion: Option<AuditRecord>,
    pub sql_generation: Option<AuditRecord>,
    pub sql_execution: Option<AuditRecord>,
    pub total_cost_usd: f64,
    pub total_tokens: i64,
    pub total_time_ms: i64,
    pub row_count: Option<i64>,
    /// Execution status, or `incomplete` while no execution was seen.
    pub status: String,
    /// An execution with nothing before it.
    pub orphaned: bool,
    /// The `session_id` column of the opening row, if it had one.
    #[serde(skip)]
    pub(crate) tag: Option<String>,
}

const INCOMPLETE: &str = "incomplete";

impl QuerySession {
    fn open(record: AuditRecord) -> Self {
        let mut session = Self {
            session_id: record.session_id.clone().unwrap_or_else(|| record.log_id.clone()),
            timestamp: record.timestamp.clone(),
            tag: record.session_id.clone(),
            status: INCOMPLETE.to_string(),
            ..Default::default()
        };
        session.absorb(record);
        session
    }

    fn orphan(record: AuditRecord) -> Self {
        let mut session = Self::open(record);
        session.orphaned = true;
        session
    }

    fn slot(&self, kind: EventType) -> &Option<AuditRecord> {
        match kind {
            EventType::BusinessLogicSuggestion => &self.business_logic_suggestion,
            EventType::JoinConditionSuggestion => &self.join_condition_suggestion,
            EventType::SqlGeneration => &self.sql_generation,
            EventType::SqlExecution => &self.sql_execution,
        }
    }

    /// The record cannot belong to this session.
    fn is_closed_by(&self, record: &AuditRecord, kind: EventType) -> bool {
        let other_session = record
            .session_id
            .as_deref()
            .is_some_and(|id| self.tag.as_deref() != Some(id));
        other_session || self.slot(kind).is_some()
    }

    fn absorb(&mut self, record: AuditRecord) {
        let Some(kind) = record.kind() else { return };

        if self.catalog.is_none() { self.catalog = record.catalog.clone(); }
        if self.schema_name.is_none() { self.schema_name = record.schema_name.clone(); }
        if self.table_name.is_none() { self.table_name = record.table_name.clone(); }
        if self.columns.is_none() { self.columns = record.columns.clone(); }
        if self.tag.is_none() { self.tag = record.session_id.clone(); }

        self.total_time_ms += record.execution_time_ms.unwrap_or(0);

        match kind {
            EventType::SqlExecution => {
                self.row_count = record.row_count;
                self.status = record.status.clone().unwrap_or_else(|| "unknown".to_string());
                if self.generated_sql.is_none() {
                    self.generated_sql = record.generated_sql.clone();
                }
                self.sql_execution = Some(record);
            }
            llm_call => {
                self.total_cost_usd += record.estimated_cost_usd.unwrap_or(0.0);
                self.total_tokens += record.total_tokens.unwrap_or_else(|| {
                    record.prompt_tokens.unwrap_or(0) + record.completion_tokens.unwrap_or(0)
                });
                match llm_call {
                    EventType::BusinessLogicSuggestion => {
                        self.business_logic = record.business_logic.clone();
                        self.business_logic_suggestion = Some(record);
                    }
                    EventType::SqlGeneration => {
                        self.generated_sql = record.generated_sql.clone();
                        if record.business_logic.is_some() {
                            self.business_logic = record.business_logic.clone();
                        }
                        self.sql_generation = Some(record);
                    }
                    _ => self.join_condition_suggestion = Some(record),
                }
            }
        }
    }

    /// Execution time of the closing `sql_execution`, if any.
    pub fn execution_time_ms(&self) -> Option<i64> {
        self.sql_execution.as_ref().and_then(|r| r.execution_time_ms)
    }
}

/// Group records sorted by ascending timestamp. Most recent session first.
pub fn group_sessions(records: Vec<AuditRecord>) -> Vec<QuerySession> {
    let mut sessions = Vec::new();
    let mut open: Option<QuerySession> = None;

    for record in records {
        let Some(kind) = record.kind() else {
            tracing::debug!(event_type = %record.event_type, "Ignoring unknown audit event type");
            continue;
        };

        if open.as_ref().is_some_and(|s| s.is_closed_by(&record, kind)) {
            sessions.extend(open.take());
        }

        match kind {
            EventType::BusinessLogicSuggestion => {
                sessions.extend(open.take());
                open = Some(QuerySession::open(record));
            }
            EventType::SqlGeneration | EventType::JoinConditionSuggestion => match open.as_mut() {
                Some(session) => session.absorb(record),
                None => open = Some(QuerySession::open(record)),
            },
            EventType::SqlExecution => match open.take() {
                Some(mut session) => {
                    session.absorb(record);
                    sessions.push(session);
                }
                None => sessions.push(QuerySession::orphan(record)),
            },
        }
    }

    sessions.extend(open);
    sessions.reverse();
    sessions
}

/// The latest `limit` audit rows, oldest first.
pub async fn fetch_recent_records(wh: &dyn Warehouse, table: &str, limit: usize) -> Result<Vec<AuditRecord>> {
    let statement = format!(
        "SELECT {} FROM {} ORDER BY timestamp DESC LIMIT {limit}",
        AuditRecord::COLUMNS,
        crate::audit::quote_table_name(table),
    );
    let rs = wh.query(&statement).await?;
    let mut records: Vec<AuditRecord> = rs.records().into_iter().filter_map(AuditRecord::from_row).collect();
    records.reverse();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, kind: &str, session: Option<&str>) -> AuditRecord {
        AuditRecord {
            log_id: id.to_string(),
            timestamp: Some(format!("2025-03-01T10:00:{id:0>2}Z")),
            event_type: kind.to_string(),
            status: Some("success".into()),
            session_id: session.map(str::to_string),
            table_name: Some("orders".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_session() {
        let mut s = rec("1", "business_logic_suggestion", None);
        s.estimated_cost_usd = Some(0.001);
        s.total_tokens = Some(100);
        s.business_logic = Some("ideas".into());
        let mut g = rec("2", "sql_generation", None);
        g.estimated_cost_usd = Some(0.002);
        g.prompt_tokens = Some(40);
        g.completion_tokens = Some(10);
        g.generated_sql = Some("SELECT 1".into());
        g.execution_time_ms = Some(300);
        let mut e = rec("3", "sql_execution", None);
        e.row_count = Some(12);
        e.execution_time_ms = Some(50);
        e.status = Some("error".into());

        let sessions = group_sessions(vec![s, g, e]);
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.session_id, "1");
        assert!(session.business_logic_suggestion.is_some());
        assert!(session.sql_generation.is_some());
        assert!(session.sql_execution.is_some());
        assert_eq!(session.status, "error");
        assert_eq!(session.row_count, Some(12));
        assert_eq!(session.total_tokens, 150);
        assert_eq!(session.total_time_ms, 350);
        assert!((session.total_cost_usd - 0.003).abs() < 1e-12);
        assert_eq!(session.generated_sql.as_deref(), Some("SELECT 1"));
        assert!(!session.orphaned);
    }

    #[test]
    fn test_lone_execution_is_orphaned() {
        let sessions = group_sessions(vec![rec("1", "sql_execution", None)]);
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].orphaned);
        assert_eq!(sessions[0].status, "success");
        assert!(sessions[0].sql_generation.is_none());
    }

    #[test]
    fn test_open_session_is_incomplete_and_order_is_newest_first() {
        let sessions = group_sessions(vec![
            rec("1", "sql_generation", None),
            rec("2", "sql_execution", None),
            rec("3", "business_logic_suggestion", None),
        ]);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "3");
        assert_eq!(sessions[0].status, "incomplete");
        assert_eq!(sessions[1].session_id, "1");
    }

    #[test]
    fn test_session_ids_split_interleaved_users() {
        let sessions = group_sessions(vec![
            rec("1", "sql_generation", Some("a")),
            rec("2", "sql_generation", Some("b")),
            rec("3", "sql_execution", Some("a")),
        ]);
        // b's generation closes a; a's execution then closes b and stands alone.
        assert_eq!(sessions.len(), 3);
        assert!(sessions[0].orphaned);
        assert_eq!(sessions[0].session_id, "a");
        assert_eq!(sessions[1].session_id, "b");
        assert_eq!(sessions[1].status, "incomplete");
    }

    #[test]
    fn test_same_session_id_groups() {
        let sessions = group_sessions(vec![
            rec("1", "join_condition_suggestion", Some("s")),
            rec("2", "sql_generation", Some("s")),
            rec("3", "sql_execution", Some("s")),
        ]);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "s");
        assert!(sessions[0].join_condition_suggestion.is_some());
    }

    #[test]
    fn test_second_generation_starts_new_session() {
        let sessions = group_sessions(vec![
            rec("1", "sql_generation", None),
            rec("2", "sql_generation", None),
        ]);
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_unknown_event_types_are_skipped() {
        let sessions = group_sessions(vec![rec("1", "query_session_start", None)]);
        assert!(sessions.is_empty());
    }
}
