//! Thin HTTP client over the wallet-coordination service's transport
//! surface (`spec.md` §6). Every call signs its canonical message
//! (`method|url|body`, matching `core::crypto::canonical_request_message`)
//! with the configured request key, unless a session token has been
//! obtained via [`Client::login`].

use std::sync::Mutex;

use reqwest::Method;
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wallet_coord_core::crypto::{canonical_request_message, sha256};

use crate::error::{ClientError, ErrorBody, Result};
use crate::types::*;

struct Identity {
    copayer_id: String,
    request_priv_key: SecretKey,
}

/// Authenticates either with a standing `x-session` token or by signing
/// each request with the copayer's current request private key.
enum Auth {
    Signed(Identity),
    Session { copayer_id: String, token: String },
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    client_version: String,
    auth: Mutex<Option<Auth>>,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            auth: Mutex::new(None),
        }
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Configures the client to sign every request with `request_priv_key`
    /// (32-byte secp256k1 scalar) as `copayer_id`, until [`Client::login`]
    /// swaps in a session token.
    pub fn with_identity(self, copayer_id: impl Into<String>, request_priv_key: &[u8]) -> Result<Self> {
        let key = SecretKey::from_slice(request_priv_key).map_err(|e| ClientError::Signing(e.to_string()))?;
        *self.auth.lock().unwrap() = Some(Auth::Signed(Identity {
            copayer_id: copayer_id.into(),
            request_priv_key: key,
        }));
        Ok(self)
    }

    fn copayer_id(&self) -> Result<String> {
        match self.auth.lock().unwrap().as_ref() {
            Some(Auth::Signed(id)) => Ok(id.copayer_id.clone()),
            Some(Auth::Session { copayer_id, .. }) => Ok(copayer_id.clone()),
            None => Err(ClientError::NoIdentity),
        }
    }

    fn sign(&self, method: &str, url: &str, body: &str) -> Result<(&'static str, String)> {
        match self.auth.lock().unwrap().as_ref() {
            Some(Auth::Session { token, .. }) => Ok(("x-session", token.clone())),
            Some(Auth::Signed(id)) => {
                let message = canonical_request_message(method, url, body);
                let digest = sha256(&message);
                let secp = Secp256k1::signing_only();
                let msg = Message::from_digest_slice(&digest).map_err(|e| ClientError::Signing(e.to_string()))?;
                let sig = secp.sign_ecdsa(&msg, &id.request_priv_key);
                Ok(("x-signature", hex::encode(sig.serialize_compact())))
            }
            None => Err(ClientError::NoIdentity),
        }
    }

    async fn send<B: Serialize, R: DeserializeOwned>(&self, method: Method, path: &str, query: Option<&[(&str, String)]>, body: Option<&B>) -> Result<R> {
        let body_str = match body {
            Some(b) => serde_json::to_string(b)?,
            None => String::new(),
        };

        let copayer_id = self.copayer_id()?;
        let (auth_header, auth_value) = self.sign(method.as_str(), path, &body_str)?;

        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .header("x-identity", &copayer_id)
            .header("x-client-version", &self.client_version)
            .header(auth_header, auth_value);

        if let Some(pairs) = query {
            req = req.query(pairs);
        }
        if body.is_some() {
            req = req.header("content-type", "application/json").body(body_str);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status.is_success() {
            Ok(serde_json::from_str(&text)?)
        } else {
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or(ErrorBody {
                code: "UNKNOWN".to_string(),
                message: text,
            });
            Err(ClientError::Api {
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            })
        }
    }

    async fn send_unauthenticated<R: DeserializeOwned>(&self, method: Method, path: &str) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.request(method, &url).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if status.is_success() {
            Ok(serde_json::from_str(&text)?)
        } else {
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or(ErrorBody {
                code: "UNKNOWN".to_string(),
                message: text,
            });
            Err(ClientError::Api { status: status.as_u16(), code: body.code, message: body.message })
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send_unauthenticated(Method::GET, "/health").await
    }

    // --- wallet formation ---

    pub async fn create_wallet(&self, req: &CreateWalletRequest) -> Result<CreateWalletResponse> {
        self.send(Method::POST, "/wallets", None, Some(req)).await
    }

    pub async fn join_wallet(&self, req: &JoinWalletRequest) -> Result<JoinWalletResponse> {
        let path = format!("/wallets/{}/copayers", req.wallet_id);
        self.send(Method::POST, &path, None, Some(req)).await
    }

    pub async fn get_own_wallet(&self) -> Result<Wallet> {
        self.send::<(), _>(Method::GET, "/wallets", None, None).await
    }

    pub async fn get_wallet(&self, identifier: &str) -> Result<Wallet> {
        let path = format!("/wallets/{identifier}");
        self.send::<(), _>(Method::GET, &path, None, None).await
    }

    pub async fn update_wallet_name(&self, name: impl Into<String>) -> Result<Wallet> {
        self.send(Method::PUT, "/wallets", None, Some(&UpdateNameRequest { name: name.into() })).await
    }

    pub async fn add_access(&self, copayer_id: &str, req: &AddAccessRequest) -> Result<Copayer> {
        let path = format!("/copayers/{copayer_id}");
        self.send(Method::PUT, &path, None, Some(req)).await
    }

    pub async fn list_copayers_by_device(&self, device_id: &str) -> Result<Vec<Copayer>> {
        self.send::<(), _>(Method::GET, "/copayers", Some(&[("device_id", device_id.to_string())]), None).await
    }

    // --- addresses ---

    pub async fn create_address(&self, ignore_max_gap: bool) -> Result<Address> {
        let query = if ignore_max_gap { Some([("ignore_max_gap", "true".to_string())]) } else { None };
        self.send::<(), _>(Method::POST, "/addresses", query.as_ref().map(|q| q.as_slice()), None).await
    }

    pub async fn list_addresses(&self, query: &ListAddressesQuery) -> Result<Vec<Address>> {
        let mut pairs = Vec::new();
        if let Some(limit) = query.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if query.reverse {
            pairs.push(("reverse", "true".to_string()));
        }
        self.send::<(), _>(Method::GET, "/addresses", Some(&pairs), None).await
    }

    pub async fn scan_addresses(&self) -> Result<ScanResponse> {
        self.send::<(), _>(Method::POST, "/addresses/scan", None, None).await
    }

    // --- ledger reads ---

    pub async fn get_balance(&self, query: &AddressSetQuery) -> Result<BalanceResponse> {
        let pairs = address_set_query_pairs(query);
        self.send::<(), _>(Method::GET, "/balance", Some(&pairs), None).await
    }

    pub async fn get_utxos(&self, query: &AddressSetQuery) -> Result<Vec<UtxoResponse>> {
        let pairs = address_set_query_pairs(query);
        self.send::<(), _>(Method::GET, "/utxos", Some(&pairs), None).await
    }

    pub async fn get_tx_history(&self, query: &TxHistoryQuery) -> Result<Vec<HistoryEntryResponse>> {
        let mut pairs = Vec::new();
        if let Some(a) = &query.addresses {
            pairs.push(("addresses", a.clone()));
        }
        if let Some(a) = &query.asset {
            pairs.push(("asset", a.clone()));
        }
        if let Some(l) = query.limit {
            pairs.push(("limit", l.to_string()));
        }
        if let Some(r) = query.last_row_id {
            pairs.push(("last_row_id", r.to_string()));
        }
        self.send::<(), _>(Method::GET, "/txhistory", Some(&pairs), None).await
    }

    pub async fn get_raw_tx(&self, txid_hex: &str) -> Result<RawJointResponse> {
        let path = format!("/txraw/{txid_hex}");
        self.send::<(), _>(Method::GET, &path, None, None).await
    }

    pub async fn broadcast_raw(&self, joint_hex: impl Into<String>) -> Result<()> {
        self.send(Method::POST, "/broadcast_raw", None, Some(&BroadcastRawRequest { joint: joint_hex.into() })).await
    }

    // --- proposals ---

    pub async fn create_proposal(&self, req: &CreateProposalRequest) -> Result<TxProposal> {
        self.send(Method::POST, "/txproposals", None, Some(req)).await
    }

    pub async fn list_proposals(&self, query: &ListProposalsQuery) -> Result<Vec<TxProposal>> {
        let mut pairs = Vec::new();
        if let Some(s) = query.status {
            pairs.push(("status", serde_json::to_value(s)?.as_str().unwrap_or_default().to_string()));
        }
        if let Some(l) = query.limit {
            pairs.push(("limit", l.to_string()));
        }
        if let Some(p) = query.is_pending {
            pairs.push(("is_pending", p.to_string()));
        }
        if let Some(app) = &query.app {
            pairs.push(("app", app.clone()));
        }
        self.send::<(), _>(Method::GET, "/txproposals", Some(&pairs), None).await
    }

    pub async fn list_pending_proposals(&self) -> Result<Vec<TxProposal>> {
        self.send::<(), _>(Method::GET, "/txproposals/pending", None, None).await
    }

    pub async fn get_proposal(&self, id: ProposalId) -> Result<TxProposal> {
        let path = format!("/txproposals/{id}");
        self.send::<(), _>(Method::GET, &path, None, None).await
    }

    pub async fn remove_proposal(&self, id: ProposalId) -> Result<()> {
        let path = format!("/txproposals/{id}");
        self.send::<(), _>(Method::DELETE, &path, None, None).await
    }

    pub async fn publish_proposal(&self, id: ProposalId, req: &PublishProposalRequest) -> Result<TxProposal> {
        let path = format!("/txproposals/{id}/publish");
        self.send(Method::POST, &path, None, Some(req)).await
    }

    pub async fn sign_proposal(&self, id: ProposalId, req: &SignProposalRequest) -> Result<TxProposal> {
        let path = format!("/txproposals/{id}/signatures");
        self.send(Method::POST, &path, None, Some(req)).await
    }

    pub async fn broadcast_proposal(&self, id: ProposalId) -> Result<TxProposal> {
        let path = format!("/txproposals/{id}/broadcast");
        self.send::<(), _>(Method::POST, &path, None, None).await
    }

    pub async fn reject_proposal(&self, id: ProposalId, req: &RejectProposalRequest) -> Result<TxProposal> {
        let path = format!("/txproposals/{id}/rejections");
        self.send(Method::POST, &path, None, Some(req)).await
    }

    // --- notes, preferences, assets, fiat rates ---

    pub async fn get_tx_note(&self, txid_hex: &str) -> Result<Option<TxNote>> {
        let path = format!("/txnotes/{txid_hex}");
        self.send::<(), _>(Method::GET, &path, None, None).await
    }

    pub async fn put_tx_note(&self, txid_hex: &str, body: impl Into<String>) -> Result<TxNote> {
        let path = format!("/txnotes/{txid_hex}");
        self.send(Method::PUT, &path, None, Some(&TxNoteRequest { body: body.into() })).await
    }

    pub async fn list_tx_notes(&self, query: &TxNotesQuery) -> Result<Vec<TxNote>> {
        let mut pairs = Vec::new();
        if let Some(ts) = query.min_ts {
            pairs.push(("min_ts", ts.to_rfc3339()));
        }
        self.send::<(), _>(Method::GET, "/txnotes", Some(&pairs), None).await
    }

    pub async fn get_preferences(&self) -> Result<Preferences> {
        self.send::<(), _>(Method::GET, "/preferences", None, None).await
    }

    pub async fn put_preferences(&self, prefs: &Preferences) -> Result<Preferences> {
        self.send(Method::PUT, "/preferences", None, Some(prefs)).await
    }

    pub async fn list_assets(&self) -> Result<Vec<AssetMetadata>> {
        self.send_unauthenticated(Method::GET, "/assets").await
    }

    pub async fn get_asset(&self, asset: &str) -> Result<AssetMetadata> {
        self.send_unauthenticated(Method::GET, &format!("/assets/{asset}")).await
    }

    pub async fn get_fiat_rate(&self, code: &str, query: &FiatRateQuery) -> Result<FiatRateResponse> {
        let mut path = format!("/fiatrates/{code}");
        let mut pairs = Vec::new();
        if let Some(c) = &query.code {
            pairs.push(("code", c.clone()));
        }
        if let Some(ts) = query.ts {
            pairs.push(("ts", ts.to_rfc3339()));
        }
        if !pairs.is_empty() {
            let qs: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            path = format!("{path}?{}", qs.join("&"));
        }
        self.send_unauthenticated(Method::GET, &path).await
    }

    // --- notifications and subscriptions ---

    pub async fn list_notifications(&self, query: &NotificationsQuery) -> Result<Vec<Notification>> {
        let mut pairs = Vec::new();
        if let Some(s) = query.time_span {
            pairs.push(("time_span", s.to_string()));
        }
        if let Some(id) = query.notification_id {
            pairs.push(("notification_id", id.to_string()));
        }
        self.send::<(), _>(Method::GET, "/notifications", Some(&pairs), None).await
    }

    pub async fn subscribe_push(&self, token: impl Into<String>, platform: impl Into<String>) -> Result<()> {
        self.send(
            Method::POST,
            "/pushnotifications/subscriptions",
            None,
            Some(&PushSubscriptionRequest { token: token.into(), platform: platform.into() }),
        )
        .await
    }

    pub async fn unsubscribe_push(&self, token: &str) -> Result<()> {
        let path = format!("/pushnotifications/subscriptions/{token}");
        self.send::<(), _>(Method::DELETE, &path, None, None).await
    }

    pub async fn subscribe_tx_confirmation(&self, req: &TxConfirmationRequest) -> Result<()> {
        self.send(Method::POST, "/txconfirmations", None, Some(req)).await
    }

    pub async fn unsubscribe_tx_confirmation(&self, txid_hex: &str) -> Result<()> {
        let path = format!("/txconfirmations/{txid_hex}");
        self.send::<(), _>(Method::DELETE, &path, None, None).await
    }

    // --- session ---

    /// Authenticates with the currently configured signing identity, then
    /// swaps internal auth over to the returned session token so subsequent
    /// calls skip re-signing (`spec.md` §4.1).
    pub async fn login(&self) -> Result<Session> {
        let copayer_id = self.copayer_id()?;
        let session: Session = self.send::<(), _>(Method::POST, "/login", None, None).await?;
        *self.auth.lock().unwrap() = Some(Auth::Session { copayer_id, token: session.id.clone() });
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        self.send::<(), _>(Method::POST, "/logout", None, None).await
    }
}

fn address_set_query_pairs(query: &AddressSetQuery) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(a) = &query.addresses {
        pairs.push(("addresses", a.clone()));
    }
    if let Some(a) = &query.asset {
        pairs.push(("asset", a.clone()));
    }
    pairs
}
