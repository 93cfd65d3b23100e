pub mod address;
pub mod health;
pub mod ledger;
pub mod misc;
pub mod proposal;
pub mod wallet;

pub use address::*;
pub use health::*;
pub use ledger::*;
pub use misc::*;
pub use proposal::*;
pub use wallet::*;
