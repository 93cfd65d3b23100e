//! Per-copayer session tokens (`spec.md` §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wallet::CopayerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub copayer_id: CopayerId,
    pub created_at: DateTime<Utc>,
    /// Last activity; the sliding window is `last_active_at + SESSION_EXPIRATION`.
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>, expiration: chrono::Duration) -> bool {
        now <= self.last_active_at + expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_slides_forward_on_activity() {
        let now = Utc::now();
        let session = Session {
            id: "tok".into(),
            copayer_id: "cid".into(),
            created_at: now,
            last_active_at: now,
        };
        let expiration = chrono::Duration::seconds(3600);
        assert!(session.is_valid_at(now + chrono::Duration::seconds(3599), expiration));
        assert!(!session.is_valid_at(now + chrono::Duration::seconds(3601), expiration));
    }
}
