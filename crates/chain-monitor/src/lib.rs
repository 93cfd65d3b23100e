//! Blockchain-event pipeline I/O shell (`spec.md` §4.6).
//!
//! This crate owns nothing about wallet coordination semantics — that lives
//! in `wallet_coord_core::chain_pipeline`. It only turns explorer HTTP
//! responses into the events that module expects, tracks which wallet owns
//! which address, and keeps the polling loop alive.

pub mod config;
pub mod error;
pub mod explorer_client;
pub mod hub_client;
pub mod models;
pub mod monitor;
pub mod telemetry;
