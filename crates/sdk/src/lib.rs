//! Thin Rust client for the wallet-coordination service's HTTP surface
//! (`spec.md` §6), for backend services that need to act as a copayer
//! without re-implementing request signing and response parsing.

pub mod client;
pub mod error;
pub mod types;

pub use client::Client;
pub use error::{ClientError, Result};
