//! Request bodies and query parameters for notes, subscriptions,
//! preferences, and asset/fiat-rate lookups (`spec.md` §4.5, §4.6, §6).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wallet_coord_core::model::wallet::Network;

#[derive(Debug, Deserialize)]
pub struct TxNoteBody {
    pub body: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct TxNotesQuery {
    pub min_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct TxConfirmationBody {
    /// Hex-encoded transaction id.
    pub txid: String,
    #[serde(default)]
    pub coin: Option<String>,
    #[serde(default)]
    pub network: Option<Network>,
}

#[derive(Debug, Deserialize)]
pub struct PushSubscriptionBody {
    pub token: String,
    pub platform: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct FiatRateQuery {
    pub code: Option<String>,
    pub ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NotificationsQuery {
    pub time_span: Option<i64>,
    pub notification_id: Option<i64>,
}
