//! Wire shapes returned by the explorer's event-feed endpoints. Mirrors the
//! cursor-paged envelope the explorer also uses for UTXO/history pages, so a
//! page always carries its own next-cursor rather than relying on an
//! out-of-band offset.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EventPage<T> {
    pub records: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJointOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJointRecord {
    /// Hex-encoded unit hash.
    pub unit: String,
    pub outputs: Vec<NewJointOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StableUnitRecord {
    /// Hex-encoded unit hash that just reached the stable main chain.
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetCandidateRecord {
    pub asset: String,
    pub name: String,
    pub registry: String,
    pub decimals: u8,
}
