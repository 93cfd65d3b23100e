//! Request bodies for wallet/copayer formation (`spec.md` §4.2, §6).

use serde::Deserialize;
use wallet_coord_core::model::wallet::{DerivationStrategy, Network, WalletId};

#[derive(Debug, Deserialize)]
pub struct CreateWalletBody {
    pub id: Option<WalletId>,
    pub name: String,
    pub m: u8,
    pub n: u8,
    pub coin: String,
    pub network: Network,
    #[serde(default)]
    pub derivation_strategy: Option<DerivationStrategy>,
    #[serde(default)]
    pub single_address: bool,
    /// Hex-encoded secp256k1 public key.
    pub creation_pub_key: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinWalletBody {
    pub wallet_id: WalletId,
    pub device_id: String,
    pub account: u32,
    pub name: String,
    pub x_pub_key: String,
    /// Hex-encoded secp256k1 public key.
    pub request_pub_key: String,
    /// Hex-encoded signature over `(name, xPubKey, requestPubKey)`.
    pub copayer_signature: String,
    pub coin: String,
    pub network: Network,
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddAccessBody {
    /// Hex-encoded secp256k1 public key.
    pub new_request_pub_key: String,
    /// Hex-encoded signature.
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNameBody {
    pub name: String,
}
