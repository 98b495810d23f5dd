//! Against a real Databricks workspace. Needs DATABRICKS_HOST, DATABRICKS_TOKEN
//! and DATABRICKS_HTTP_PATH.
//!
//! Run with: cargo test -p queryforge-web --test live -- --ignored

use queryforge_config::Config;
use queryforge_warehouse::{discovery, DatabricksWarehouse, Warehouse};

#[tokio::test]
#[ignore]
async fn test_live_catalogs_and_status() {
    let config = Config::load().expect("config");
    let wh = DatabricksWarehouse::from_config(&config.warehouse, reqwest::Client::new())
        .expect("Databricks credentials not set");

    let info = wh.warehouse_info().await.expect("warehouse info");
    println!("Warehouse {} ({}) is {}", info.name, info.id, info.state);

    let catalogs = discovery::list_catalogs(&wh).await.expect("list catalogs");
    assert!(!catalogs.is_empty());
}
