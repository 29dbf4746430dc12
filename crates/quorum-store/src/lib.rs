pub mod beliefs;
pub mod error;
pub mod inbox;
pub mod ledger;

pub use beliefs::BeliefStore;
pub use error::StoreError;
pub use inbox::SignalInbox;
pub use ledger::{EquityLedger, TradeOutcome};
