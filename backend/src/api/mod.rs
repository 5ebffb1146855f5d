//! HTTP API module.
//!
//! Server, request/response types and the SSE log stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{ingest_upload, router, start_server, AppState, ServerConfig};
pub use types::*;
