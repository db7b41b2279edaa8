//! HTTP boundary for SAAI Agents.
//!
//! Routes:
//!
//! - `GET /` service banner
//! - `GET /health` aggregated system status
//! - `GET /agents` registered worker names
//! - `POST /agents/{name}/command` forward a JSON command to a worker

/// JSON error responses.
pub mod error;
/// Request handlers.
pub mod routes;
/// Router assembly and serving.
pub mod server;

pub use error::ApiError;
pub use server::{AppState, GatewayServer};
