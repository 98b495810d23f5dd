//! queryforge-common: Shared types and the HTTP error taxonomy used across all QueryForge crates.

pub mod error;
pub mod table;

pub use error::{ApiError, ApiResult};
pub use table::{quote_ident, ColumnInfo, SampleRows, TableContext, TableRef};
