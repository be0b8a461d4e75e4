//! REST API.
//!
//! `api_router()` returns a `Router` that can be mounted on any axum server
//! instance; `server` owns the bind/serve/shutdown lifecycle.

pub mod endpoints;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server_on, ApiServer};
pub use types::{ApiContext, Identity};
