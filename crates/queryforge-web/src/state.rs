//! Shared application state for the web server.

use std::sync::Arc;
use std::time::Duration;

use queryforge_common::{ApiError, ApiResult};
use queryforge_config::Config;
use queryforge_llm::{LlmBackend, ServingEndpointBackend};
use queryforge_warehouse::{audit, AuditLogger, DatabricksWarehouse, Warehouse};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

const WAREHOUSE_MISSING: &str = "Databricks credentials not configured. Please set DATABRICKS_HOST, \
     DATABRICKS_TOKEN, and DATABRICKS_HTTP_PATH environment variables.";
const LLM_MISSING: &str = "Model serving is not configured. Set LLM_BASE_URL and LLM_API_KEY, \
     or the Databricks host and token.";

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub config: Config,
    pub warehouse: Option<Arc<dyn Warehouse>>,
    pub llm: Option<Arc<dyn LlmBackend>>,
    pub audit: AuditLogger,
}

impl AppState {
    /// Must be called inside a tokio runtime when a warehouse is given.
    pub fn new(
        config: Config,
        warehouse: Option<Arc<dyn Warehouse>>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        let table = config.audit_table();
        let audit = match &warehouse {
            Some(wh) => AuditLogger::start(wh.clone(), table, config.audit.queue_capacity),
            None => {
                warn!("No warehouse configured, audit events will be dropped");
                AuditLogger::disabled(table)
            }
        };
        Self { config, warehouse, llm, audit }
    }

    /// Build the real collaborators from configuration.
    pub async fn from_config(config: Config) -> Self {
        let client = reqwest::Client::new();

        let warehouse: Option<Arc<dyn Warehouse>> =
            match DatabricksWarehouse::from_config(&config.warehouse, client.clone()) {
                Some(wh) => {
                    info!(warehouse_id = wh.warehouse_id(), host = %config.warehouse.host, "Databricks warehouse configured");
                    Some(Arc::new(wh))
                }
                None => {
                    warn!("Databricks credentials missing, warehouse endpoints will return 503");
                    None
                }
            };

        let llm: Option<Arc<dyn LlmBackend>> = match (config.llm_base_url(), config.llm_api_key()) {
            (Some(url), Some(key)) => {
                info!(base_url = %url, default_model = %config.llm.default_model, "Model serving configured");
                let key = SecretString::from(key.expose_secret().to_string());
                Some(Arc::new(ServingEndpointBackend::with_client(url, key, client)))
            }
            _ => {
                warn!("Model serving not configured, LLM endpoints will return 503");
                None
            }
        };

        if config.audit.auto_create {
            if let Some(wh) = &warehouse {
                let table = config.audit_table();
                match audit::ensure_table(wh.as_ref(), &table).await {
                    Ok(()) => info!(table = %table, "Audit table ready"),
                    Err(e) => error!(table = %table, "Failed to create audit table: {}", e),
                }
            }
        }

        Self::new(config, warehouse, llm)
    }

    pub fn warehouse(&self) -> ApiResult<&dyn Warehouse> {
        self.warehouse
            .as_deref()
            .ok_or_else(|| ApiError::ServiceUnavailable(WAREHOUSE_MISSING.to_string()))
    }

    pub fn llm(&self) -> ApiResult<&dyn LlmBackend> {
        self.llm
            .as_deref()
            .ok_or_else(|| ApiError::ServiceUnavailable(LLM_MISSING.to_string()))
    }

    /// Budget for fetching one table's prompt context.
    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs(self.config.warehouse.context_timeout_secs)
    }
}

pub type SharedState = Arc<AppState>;
