//! Minimal adapters for the two collaborators `spec.md` §1 explicitly
//! scopes out beyond their interface: push delivery and fiat-rate scraping.
//! A real deployment swaps these for an APNs/FCM client and a rate-fetch
//! loop; until one exists, the engine still needs something behind
//! [`PushNotifier`]/[`FiatRateProvider`] to construct [`crate::state::AppState`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wallet_coord_core::error::Result;
use wallet_coord_core::model::{Notification, PushSubscription};
use wallet_coord_core::traits::{FiatRateProvider, PushNotifier};

#[derive(Debug, Default)]
pub struct NullPushNotifier;

#[async_trait]
impl PushNotifier for NullPushNotifier {
    async fn notify(&self, subscription: &PushSubscription, notification: &Notification) -> Result<()> {
        tracing::debug!(
            copayer_id = %subscription.copayer_id,
            notification_id = notification.id,
            "push delivery not configured; dropping notification"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullFiatRateProvider;

#[async_trait]
impl FiatRateProvider for NullFiatRateProvider {
    async fn get_rate(&self, _code: &str, _provider: Option<&str>, _ts: Option<DateTime<Utc>>) -> Result<Option<f64>> {
        Ok(None)
    }
}
