pub mod ledger;
pub mod share;
pub mod task;
pub mod user;

pub use ledger::LedgerRecord;
pub use share::{ReferralOutcome, ReferralRecord, ShareClickRecord, ShareCounts};
pub use task::{ChargeOutcome, TaskRecord};
pub use user::UserRecord;
