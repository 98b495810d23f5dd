use super::*;
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults_are_unconfigured() {
    let config = Config::default();
    assert!(!config.warehouse.is_configured());
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.audit_table(), "main.text_to_sql.audit_logs");
    assert!(config.llm_base_url().is_none());
}

#[test]
fn test_env_overrides_and_host_normalization() {
    let mut config = Config::default();
    config.apply_env(env(&[
        ("DATABRICKS_HOST", "https://dbc-42.cloud.databricks.com/"),
        ("DATABRICKS_TOKEN", "dapi-secret"),
        ("DATABRICKS_HTTP_PATH", "/sql/1.0/warehouses/abc123"),
        ("DATABRICKS_CATALOG", "arao"),
        ("PORT", "8680"),
        ("CORS_ORIGINS", "http://a.test, http://b.test,"),
    ])).unwrap();

    assert!(config.warehouse.is_configured());
    assert_eq!(config.warehouse.host, "dbc-42.cloud.databricks.com");
    assert_eq!(config.warehouse.warehouse_id(), Some("abc123"));
    assert_eq!(config.warehouse.token_len(), "dapi-secret".len());
    assert_eq!(config.server.port, 8680);
    assert_eq!(config.server.cors_origins, vec!["http://a.test", "http://b.test"]);
    assert_eq!(config.audit_table(), "arao.text_to_sql.audit_logs");
    assert_eq!(
        config.llm_base_url().as_deref(),
        Some("https://dbc-42.cloud.databricks.com/serving-endpoints")
    );
}

#[test]
fn test_llm_key_falls_back_to_warehouse_token() {
    let mut config = Config::default();
    config.apply_env(env(&[("DATABRICKS_TOKEN", "dapi-1")])).unwrap();
    assert_eq!(config.llm_api_key().map(|k| k.expose_secret().to_string()), Some("dapi-1".into()));

    config.apply_env(env(&[("LLM_API_KEY", "sk-2")])).unwrap();
    assert_eq!(config.llm_api_key().map(|k| k.expose_secret().to_string()), Some("sk-2".into()));
}

#[test]
fn test_invalid_port_is_rejected() {
    let mut config = Config::default();
    let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
}

#[test]
fn test_empty_env_values_are_ignored() {
    let mut config = Config::default();
    config.apply_env(env(&[("DATABRICKS_CATALOG", "  ")])).unwrap();
    assert_eq!(config.warehouse.catalog, "main");
}

#[test]
fn test_toml_file_values() {
    let config = Config::from_toml_str(r#"
        [server]
        env = "production"

        [warehouse]
        host = "https://dbc-7.cloud.databricks.com"
        http_path = "/sql/1.0/warehouses/w7"

        [audit]
        table = "ops.logs.audit"
        auto_create = true
    "#).unwrap();

    assert_eq!(config.server.env, "production");
    assert_eq!(config.warehouse.host, "dbc-7.cloud.databricks.com");
    assert_eq!(config.audit_table(), "ops.logs.audit");
    assert!(config.audit.auto_create);
    assert_eq!(config.audit.queue_capacity, 1024);
}
