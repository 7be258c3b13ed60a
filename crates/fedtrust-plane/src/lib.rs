//! Federation Plane Server
//!
//! Publishes federation operator key sets and by-reference metadata
//! statements, and verifies signed statements against the operators it knows.
//! Optionally hosts one federation operator whose keys rotate on a schedule.
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /v1/bundles` - List operators with a stored key set
//! - `GET /v1/bundles/{name}` - Key set of an operator
//! - `PUT /v1/bundles/{name}` - Store an operator's key set
//! - `GET /v1/statements` - List published statement names
//! - `GET /v1/statements/{name}` - Published statement as a compact token
//! - `POST /v1/statements/verify` - Verify a statement and list its trust paths
//! - `GET /v1/operator` - Identity and keys of the hosted operator
//!
//! Operator ids and statement names are percent-encoded into one path segment.

pub mod api;
pub mod config;
pub mod rotation;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{ConfigError, HostedOperatorConfig, PlaneConfig};
pub use rotation::spawn_key_rotation;
