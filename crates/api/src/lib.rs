//! HTTP surface for the wallet-coordination engine.
//!
//! Every route is a thin adapter: extract the identity headers, build an
//! [`wallet_coord_core::auth::AuthContext`], and dispatch into the
//! corresponding `core` service function or `Storage` method. No business
//! logic lives in this crate.

pub mod adapters;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ServerSettings;
pub use error::{ApiError, Result};
pub use server::{Server, ServerConfig};
pub use state::AppState;
