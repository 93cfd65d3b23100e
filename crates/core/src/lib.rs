//! Wallet-coordination engine: the multisig HD-wallet copayer protocol
//! implemented as a pure, storage-agnostic core. Every external
//! collaborator — database, ledger explorer, hub, message broker, push
//! delivery, fiat rates — is a trait in [`traits`]; concrete adapters live
//! in sibling crates.

pub mod address_service;
pub mod auth;
pub mod chain_pipeline;
pub mod config;
pub mod crypto;
pub mod derivation;
pub mod error;
pub mod lock;
pub mod model;
pub mod notify;
pub mod proposal_service;
pub mod traits;
pub mod utxo;
pub mod wallet_service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use config::EngineConfig;
pub use error::{Error, Result};
