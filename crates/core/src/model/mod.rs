//! Persisted entity shapes (`spec.md` §3).

pub mod address;
pub mod misc;
pub mod notification;
pub mod proposal;
pub mod session;
pub mod wallet;

pub use address::Address;
pub use misc::{AssetMetadata, Preferences, PushSubscription, TxConfirmationSubscription, TxNote};
pub use notification::{Notification, NotificationType};
pub use proposal::{ProposalAction, ProposalActionType, ProposalStatus, TxProposal};
pub use session::Session;
pub use wallet::{AddressType, Copayer, DerivationStrategy, ScanStatus, Wallet, WalletStatus};
