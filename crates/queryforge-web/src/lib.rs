//! queryforge-web: HTTP API and static frontend host.

pub mod handlers;
pub mod router;
pub mod state;
