//! Error types for the wallet-coordination engine.
//!
//! Every client-facing failure mode maps 1:1 onto an error code from
//! `spec.md` §6 ("Error-code set"), so the HTTP layer in `crates/api` can
//! translate a `Error` into `{code, message}` without guessing.

use thiserror::Error;

/// The wallet-coordination engine's error type.
#[derive(Error, Debug)]
pub enum Error {
    // --- authorization (spec.md §7: always mapped to NOT_AUTHORIZED) ---
    #[error("copayer not found")]
    CopayerNotFound,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("session expired")]
    SessionExpired,
    #[error("client version too old")]
    UpgradeNeeded,

    // --- wallet formation (§4.2) ---
    #[error("wallet not found")]
    WalletNotFound,
    #[error("wallet already exists")]
    WalletAlreadyExists,
    #[error("wallet is full")]
    WalletFull,
    #[error("wallet is not complete")]
    WalletNotComplete,
    #[error("wallet needs a scan before this operation")]
    WalletNeedScan,
    #[error("wallet is busy")]
    WalletBusy,
    #[error("copayer is already in this wallet")]
    CopayerInWallet,
    #[error("copayer is already registered to another wallet")]
    CopayerRegistered,
    #[error("too many request keys")]
    TooManyKeys,

    // --- address engine (§4.3) ---
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid change address: {0}")]
    InvalidChangeAddress(String),
    #[error("address not found")]
    AddressNotFound,
    #[error("gap limit reached")]
    MainAddressGapReached,

    // --- proposal engine (§4.4) ---
    #[error("transaction proposal not found")]
    TxNotFound,
    #[error("transaction proposal is not pending")]
    TxNotPending,
    #[error("transaction proposal already accepted")]
    TxAlreadyAccepted,
    #[error("transaction proposal is not accepted")]
    TxNotAccepted,
    #[error("transaction proposal already broadcasted")]
    TxAlreadyBroadcasted,
    #[error("cannot create transaction proposal: {0}")]
    TxCannotCreate(String),
    #[error("cannot remove transaction proposal: {0}")]
    TxCannotRemove(String),
    #[error("copayer already voted on this proposal")]
    CopayerVoted,
    #[error("signature verification failed")]
    BadSignatures,

    // --- utxo reservation (§4.5) ---
    #[error("one or more inputs are no longer available")]
    UnavailableUtxos,

    // --- generic / ambient ---
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("history window exceeds the configured limit")]
    HistoryLimitExceeded,
    #[error("lock acquisition timed out for wallet {0}")]
    LockTimeout(String),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl Error {
    /// The wire error code from `spec.md` §6, used verbatim in HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::CopayerNotFound
            | Error::InvalidSignature
            | Error::SessionExpired => "NOT_AUTHORIZED",
            Error::UpgradeNeeded => "UPGRADE_NEEDED",
            Error::WalletNotFound => "WALLET_NOT_FOUND",
            Error::WalletAlreadyExists => "WALLET_ALREADY_EXISTS",
            Error::WalletFull => "WALLET_FULL",
            Error::WalletNotComplete => "WALLET_NOT_COMPLETE",
            Error::WalletNeedScan => "WALLET_NEED_SCAN",
            Error::WalletBusy => "WALLET_BUSY",
            Error::CopayerInWallet => "COPAYER_IN_WALLET",
            Error::CopayerRegistered => "COPAYER_REGISTERED",
            Error::TooManyKeys => "TOO_MANY_KEYS",
            Error::InvalidAddress(_) => "INVALID_ADDRESS",
            Error::InvalidChangeAddress(_) => "INVALID_CHANGE_ADDRESS",
            Error::AddressNotFound => "ADDRESS_NOT_FOUND",
            Error::MainAddressGapReached => "MAIN_ADDRESS_GAP_REACHED",
            Error::TxNotFound => "TX_NOT_FOUND",
            Error::TxNotPending => "TX_NOT_PENDING",
            Error::TxAlreadyAccepted => "TX_ALREADY_ACCEPTED",
            Error::TxNotAccepted => "TX_NOT_ACCEPTED",
            Error::TxAlreadyBroadcasted => "TX_ALREADY_BROADCASTED",
            Error::TxCannotCreate(_) => "TX_CANNOT_CREATE",
            Error::TxCannotRemove(_) => "TX_CANNOT_REMOVE",
            Error::CopayerVoted => "COPAYER_VOTED",
            Error::BadSignatures => "BAD_SIGNATURES",
            Error::UnavailableUtxos => "UNAVAILABLE_UTXOS",
            Error::Validation { .. } => "INVALID_ADDRESS",
            Error::HistoryLimitExceeded => "HISTORY_LIMIT_EXCEEDED",
            Error::LockTimeout(_) => "WALLET_BUSY",
            Error::Storage(_) => "SERVER_ERROR",
        }
    }

    /// `true` for the three kinds of failure `spec.md` §7 calls "client
    /// errors": bad input, unknown entity, precondition failure. These are
    /// logged at info level and never retried.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Error::CopayerNotFound
                | Error::InvalidSignature
                | Error::SessionExpired
                | Error::UpgradeNeeded
                | Error::Storage(_)
        )
    }

    /// `true` when this failure is purely an authorization outcome and must
    /// be surfaced without leaking *why* (spec.md §4.1/§7).
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            Error::CopayerNotFound | Error::InvalidSignature | Error::SessionExpired
        )
    }

    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        if self.is_authorization_error() {
            Level::INFO
        } else if self.is_client_error() {
            Level::INFO
        } else {
            Level::ERROR
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_errors_never_leak_reason_in_code() {
        assert_eq!(Error::CopayerNotFound.code(), "NOT_AUTHORIZED");
        assert_eq!(Error::InvalidSignature.code(), "NOT_AUTHORIZED");
        assert_eq!(Error::SessionExpired.code(), "NOT_AUTHORIZED");
    }

    #[test]
    fn client_errors_are_not_server_errors() {
        assert!(Error::WalletFull.is_client_error());
        assert!(!Error::Storage(anyhow::anyhow!("boom")).is_client_error());
    }
}
