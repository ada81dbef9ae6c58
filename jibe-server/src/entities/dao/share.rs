use chrono::{DateTime, Utc};

/// A row in the `share_clicks` table.
#[derive(Debug, Clone)]
pub struct ShareClickRecord {
    pub id: String,
    pub logged_in: bool,
}

/// A row in the `referrals` table.
#[derive(Debug, Clone)]
pub struct ReferralRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Result of recording a referral.
#[derive(Debug, Clone)]
pub enum ReferralOutcome {
    Created(ReferralRecord),
    /// No user with the given referrer id.
    UnknownReferrer,
    /// The referred user already has a referrer; nothing changed.
    AlreadyReferred,
}

/// Aggregates behind `GET /api/share/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareCounts {
    pub total_clicks: i64,
    pub successful_referrals: i64,
    pub points_earned: i64,
}
