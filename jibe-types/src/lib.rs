//! Wire types shared by `jibe-server` and `jibe-client`.
//!
//! Every JSON body exchanged over the HTTP API is defined here so that the
//! server and the client can never drift apart.  Field names are camelCase on
//! the wire.

pub mod points;
pub mod share;
pub mod task;

pub use points::{
    CreateUserRequest, CreatedUser, CreatedUserResponse, GrantPointsRequest, LedgerEntry,
    Pagination, PointsHistoryResponse, PointsStats, PointsStatsResponse, ReasonTotal, UserPoints,
    UserPointsResponse,
};
pub use share::{
    share_link, CreateReferralRequest, Referral, ReferralResponse, ShareClick, ShareClickRequest,
    ShareClickResponse, ShareStats, ShareStatsResponse,
};
pub use task::{
    ChatMessage, ErrorBody, GenerateAccepted, GenerateRequest, Role, StatusResponse, TaskStatus,
};

/// Points debited for one successful generation.
pub const GENERATION_COST: i64 = 10;

/// Ledger reason recorded for a generation debit.
pub const REASON_GENERATION: &str = "generation";

/// Ledger reason recorded for an administrative credit.
pub const REASON_GRANT: &str = "grant";

/// Ledger reason recorded for a referral reward.
pub const REASON_REFERRAL: &str = "referral";
