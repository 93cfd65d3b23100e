//! Wallet and copayer records (`spec.md` §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coin identifier, kept opaque to the engine — it only needs to match
/// between a wallet and the copayers that join it.
pub type Coin = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DerivationStrategy {
    Legacy,
    Bip44,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Normal,
    Shared,
}

impl AddressType {
    /// `spec.md` §3: "`addressType` (`normal` if `n=1`, else `shared`)".
    pub fn for_quorum(n: u8) -> Self {
        if n == 1 {
            AddressType::Normal
        } else {
            AddressType::Shared
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Pending,
    Complete,
}

/// An opaque 128-bit wallet id (`spec.md` §3).
pub type WalletId = uuid::Uuid;
/// A copayer id: the hash of its extended public key (`spec.md` §3).
pub type CopayerId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    /// Required signatures.
    pub m: u8,
    /// Total copayers.
    pub n: u8,
    pub coin: Coin,
    pub network: Network,
    pub derivation_strategy: DerivationStrategy,
    pub address_type: AddressType,
    pub single_address: bool,
    /// Public key used to verify copayer joining signatures.
    pub creation_pub_key: Vec<u8>,
    /// Boolean-clause template the multisig address is derived from.
    pub definition_template: DefinitionTemplate,
    pub copayer_ids: Vec<CopayerId>,
    /// Frozen once `status = complete`.
    pub public_key_ring: Vec<Vec<u8>>,
    pub scan_status: ScanStatus,
    pub status: WalletStatus,
    /// Monotone receive/change address counters (spec.md §4.3).
    pub receive_index: u32,
    pub change_index: u32,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// `spec.md` §8: `status = complete ⇔ |copayers| = n`.
    pub fn is_complete(&self) -> bool {
        self.status == WalletStatus::Complete
    }

    pub fn validate_quorum(m: u8, n: u8) -> crate::error::Result<()> {
        if n == 0 || n > 15 || m == 0 || m > n {
            return Err(crate::error::Error::Validation {
                field: "m/n".into(),
                reason: "require 1 <= m <= n <= 15".into(),
            });
        }
        Ok(())
    }

    /// `spec.md` §4.4: `requiredRejections = min(m, n - m + 1)`.
    pub fn required_rejections(&self) -> u8 {
        self.m.min(self.n - self.m + 1)
    }
}

/// A boolean clause over signature predicates (`spec.md` GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DefinitionTemplate {
    /// `n = 1`: a single signature clause.
    Single,
    /// `n > 1`: `m` of `n` keyed `sig` sub-clauses.
    ROfSet { required: u8, total: u8 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Copayer {
    pub id: CopayerId,
    pub wallet_id: WalletId,
    pub name: String,
    pub xpub: String,
    pub account: u32,
    pub device_id: String,
    /// Request public keys, oldest first; index 0 is the copayer's very
    /// first registered key, used only for provenance — current-key lookup
    /// in `auth` walks this list newest-first.
    pub request_pub_keys: Vec<RequestPubKey>,
    pub custom_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPubKey {
    pub key: Vec<u8>,
    /// Signature over (name, xpub, key) under the wallet's creation key, or
    /// under the xpub's request-key-auth derivation for `addAccess`.
    pub signature: Vec<u8>,
    pub added_at: DateTime<Utc>,
}

/// The copayer-lookup index (`spec.md` §6): a service-wide fast path from
/// copayer id to its wallet and auth material, independent of the wallet
/// record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopayerIndexEntry {
    pub copayer_id: CopayerId,
    pub wallet_id: WalletId,
    pub is_support_staff: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_type_follows_quorum_size() {
        assert_eq!(AddressType::for_quorum(1), AddressType::Normal);
        assert_eq!(AddressType::for_quorum(3), AddressType::Shared);
    }

    #[test]
    fn quorum_bounds_are_enforced() {
        assert!(Wallet::validate_quorum(2, 3).is_ok());
        assert!(Wallet::validate_quorum(0, 3).is_err());
        assert!(Wallet::validate_quorum(4, 3).is_err());
        assert!(Wallet::validate_quorum(1, 16).is_err());
    }
}
