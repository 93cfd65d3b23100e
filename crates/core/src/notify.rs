//! Notification kernel: ticker assignment and the default in-process
//! message broker (`spec.md` §4.7, §9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::notification::{Notification, NotificationType};
use crate::model::wallet::{CopayerId, WalletId};
use crate::traits::{MessageBroker, Storage};

/// Per-process monotonic counter combined with the storage-assigned id so
/// two notifications created within the same millisecond are still
/// strictly ordered for a single reader (`spec.md` §9).
#[derive(Default)]
pub struct Ticker(AtomicU64);

impl Ticker {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Builds and persists a notification, stamping it with the next ticker
/// value, then publishes it through the broker. Best-effort: a broker
/// failure is logged but never fails the calling operation (`spec.md` §7:
/// "notifications are best-effort").
pub async fn emit(
    storage: &dyn Storage,
    broker: &dyn MessageBroker,
    ticker: &Ticker,
    wallet_id: WalletId,
    notification_type: NotificationType,
    creator_id: Option<CopayerId>,
    data: serde_json::Value,
) -> Result<Notification> {
    let draft = Notification {
        id: 0,
        ticker: ticker.next(),
        wallet_id,
        notification_type,
        creator_id,
        data,
        created_at: Utc::now(),
    };
    let stored = storage.append_notification(draft).await?;
    if let Err(err) = broker.publish(stored.clone()).await {
        tracing::warn!(error = %err, wallet_id = %wallet_id, "notification broker publish failed");
    }
    Ok(stored)
}

/// In-process fan-out broker: publishes to every live subscriber via a
/// `tokio::sync::broadcast` channel. A remote deployment would instead
/// relay to an external broker; that adapter lives outside `core`.
pub struct InProcessBroker {
    sender: broadcast::Sender<Notification>,
    address_sender: broadcast::Sender<(WalletId, String)>,
}

impl InProcessBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (address_sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            address_sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscribe_addresses(&self) -> broadcast::Receiver<(WalletId, String)> {
        self.address_sender.subscribe()
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBroker for InProcessBroker {
    async fn publish(&self, notification: Notification) -> Result<()> {
        // No active subscribers is not an error — fan-out is best-effort.
        let _ = self.sender.send(notification);
        Ok(())
    }

    async fn announce_address(&self, wallet_id: WalletId, address: &str) -> Result<()> {
        let _ = self
            .address_sender
            .send((wallet_id, address.to_string()));
        Ok(())
    }
}

pub type SharedBroker = Arc<dyn MessageBroker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_is_strictly_increasing() {
        let ticker = Ticker::default();
        let a = ticker.next();
        let b = ticker.next();
        assert!(b > a);
    }

    #[tokio::test]
    async fn broker_fans_out_to_subscribers() {
        let broker = InProcessBroker::default();
        let mut rx = broker.subscribe();
        let notification = Notification {
            id: 1,
            ticker: 1,
            wallet_id: WalletId::new_v4(),
            notification_type: NotificationType::WalletComplete,
            creator_id: None,
            data: serde_json::json!({}),
            created_at: Utc::now(),
        };
        broker.publish(notification.clone()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, notification.id);
    }
}
