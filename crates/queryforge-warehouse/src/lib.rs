//! queryforge-warehouse: Databricks SQL statement client, metadata discovery,
//! the audit log writer and the analytics read side built on top of it.
//!
//! Everything goes through the [`Warehouse`] trait so handlers and tests can
//! swap in an in-memory implementation.

pub mod analytics;
pub mod audit;
pub mod client;
pub mod discovery;
pub mod error;
pub mod history;

pub use audit::{AuditEvent, AuditLogger, AuditRecord, AuditStats, EventStatus, EventType};
pub use client::{DatabricksWarehouse, ResultSet, StatementParam, Warehouse, WarehouseInfo};
pub use error::{Result, WarehouseError};
pub use history::{group_sessions, QuerySession};
