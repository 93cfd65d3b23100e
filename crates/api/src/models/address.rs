//! Query parameters for the address and ledger-read routes (`spec.md` §4.3,
//! §4.5, §6).

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct CreateAddressQuery {
    #[serde(default)]
    pub ignore_max_gap: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListAddressesQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct AddressSetQuery {
    /// Comma-separated address list; every wallet address if omitted.
    pub addresses: Option<String>,
    pub asset: Option<String>,
}

impl AddressSetQuery {
    pub fn address_list(&self) -> Option<Vec<String>> {
        self.addresses
            .as_ref()
            .map(|s| s.split(',').map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TxHistoryQuery {
    pub addresses: Option<String>,
    pub asset: Option<String>,
    pub limit: Option<u32>,
    pub last_row_id: Option<i64>,
}

impl TxHistoryQuery {
    pub fn address_list(&self) -> Option<Vec<String>> {
        self.addresses
            .as_ref()
            .map(|s| s.split(',').map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect())
    }
}
