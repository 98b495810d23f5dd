pub mod analytics;
pub mod catalog;
pub mod execute;
pub mod generate;
pub mod suggest;
pub mod system;

use std::time::Instant;

use queryforge_common::{ApiError, ApiResult};
use queryforge_llm::{estimate_cost, resolve_model, LlmResponse};
use queryforge_warehouse::AuditEvent;

use crate::state::AppState;

/// Resolve a requested model key or id, falling back to the configured default.
pub(crate) fn resolve_model_id(state: &AppState, requested: Option<&str>) -> ApiResult<String> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(state.config.llm.default_model.clone()),
        Some(key) => resolve_model(key)
            .map(|m| m.id.to_string())
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown model: {key}"))),
    }
}

/// The client's session id, if it sent a usable one.
///
/// Never invented here: rows without an id are grouped by arrival order, and
/// an id only the server knows would split a session the client never tagged.
pub(crate) fn client_session_id(requested: Option<String>) -> Option<String> {
    requested
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn with_usage(event: AuditEvent, model_id: &str, resp: &LlmResponse) -> AuditEvent {
    let cost = estimate_cost(model_id, resp.prompt_tokens, resp.completion_tokens);
    event.usage(resp.prompt_tokens, resp.completion_tokens, cost)
}

/// Record a failed event and hand the error back.
pub(crate) fn audit_failure(state: &AppState, event: AuditEvent, started: Instant, err: ApiError) -> ApiError {
    state
        .audit
        .record(event.elapsed_ms(started.elapsed().as_millis()).failed(err.to_string()));
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_echoed_never_generated() {
        assert_eq!(client_session_id(Some(" abc ".into())).as_deref(), Some("abc"));
        assert_eq!(client_session_id(Some("  ".into())), None);
        assert_eq!(client_session_id(None), None);
    }
}
