//! HTTP route table (`spec.md` §6).

pub mod addresses;
pub mod health;
pub mod ledger;
pub mod misc;
pub mod proposals;
pub mod util;
pub mod wallets;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::middleware::WalletCreationRateLimitLayer;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let create_wallet_route = post(wallets::create_wallet).layer(WalletCreationRateLimitLayer::default());

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/wallets",
            create_wallet_route
                .get(wallets::get_own_wallet)
                .put(wallets::update_wallet_name),
        )
        .route("/wallets/:identifier", get(wallets::get_wallet))
        .route("/wallets/:id/copayers", post(wallets::join_wallet))
        .route("/copayers", get(wallets::list_copayers_by_device))
        .route("/copayers/:id", put(wallets::add_access))
        .route("/preferences", get(misc::get_preferences).put(misc::put_preferences))
        .route("/addresses", post(addresses::create_address).get(addresses::list_addresses))
        .route("/addresses/scan", post(addresses::scan_addresses))
        .route("/balance", get(ledger::get_balance))
        .route("/utxos", get(ledger::get_utxos))
        .route("/txhistory", get(ledger::get_tx_history))
        .route("/txproposals", post(proposals::create_proposal).get(proposals::list_proposals))
        .route("/txproposals/pending", get(proposals::list_pending_proposals))
        .route("/txproposals/:id", get(proposals::get_proposal).delete(proposals::remove_proposal))
        .route("/txproposals/:id/publish", post(proposals::publish_proposal))
        .route("/txproposals/:id/signatures", post(proposals::sign_proposal))
        .route("/txproposals/:id/broadcast", post(proposals::broadcast_proposal))
        .route("/txproposals/:id/rejections", post(proposals::reject_proposal))
        .route("/broadcast_raw", post(ledger::broadcast_raw))
        .route("/txraw/:txid", get(ledger::get_raw_tx))
        .route("/txnotes/:txid", get(misc::get_tx_note).put(misc::put_tx_note))
        .route("/txnotes", get(misc::list_tx_notes))
        .route("/assets", get(misc::list_assets))
        .route("/assets/:asset", get(misc::get_asset))
        .route("/fiatrates/:code", get(misc::get_fiat_rate))
        .route("/notifications", get(misc::list_notifications))
        .route("/pushnotifications/subscriptions", post(misc::subscribe_push))
        .route("/pushnotifications/subscriptions/:token", delete(misc::unsubscribe_push))
        .route("/txconfirmations", post(misc::subscribe_tx_confirmation))
        .route("/txconfirmations/:txid", delete(misc::unsubscribe_tx_confirmation))
        .route("/login", post(misc::login))
        .route("/logout", post(misc::logout))
        .with_state(state)
}
