//! Address records (`spec.md` §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wallet::{AddressType, WalletId};

/// `m/change/index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DerivationPath {
    pub is_change: bool,
    pub index: u32,
}

impl DerivationPath {
    pub fn new(is_change: bool, index: u32) -> Self {
        Self { is_change, index }
    }

    /// Canonical string form, e.g. `m/0/12` or `m/1/3`.
    pub fn to_path_string(self) -> String {
        format!("m/{}/{}", self.is_change as u8, self.index)
    }

    /// Parses the `m/change/index` form back into a path. Inverse of
    /// [`DerivationPath::to_path_string`].
    pub fn from_path_string(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("m/")?;
        let (change, index) = rest.split_once('/')?;
        let is_change = match change {
            "0" => false,
            "1" => true,
            _ => return None,
        };
        let index = index.parse().ok()?;
        Some(Self { is_change, index })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// bech32-like address string.
    pub address: String,
    pub wallet_id: WalletId,
    pub path: DerivationPath,
    pub address_type: AddressType,
    /// The multisig (or single-sig) definition this address was derived
    /// from, serialized canonically.
    pub definition: String,
    /// `pubkey -> signing path`, keyed by hex-encoded copayer device key.
    pub signing_paths: BTreeMap<String, String>,
    /// Sticky once observed: never reverts to `false`.
    pub has_activity: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    pub fn is_change(&self) -> bool {
        self.path.is_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_string_matches_spec_format() {
        assert_eq!(DerivationPath::new(false, 0).to_path_string(), "m/0/0");
        assert_eq!(DerivationPath::new(true, 12).to_path_string(), "m/1/12");
    }

    #[test]
    fn path_string_roundtrips() {
        let path = DerivationPath::new(true, 42);
        assert_eq!(DerivationPath::from_path_string(&path.to_path_string()), Some(path));
    }
}
