//! Share-link and referral types.

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/share/click`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ShareClickRequest {
    /// Owner of the share link that was followed.
    #[serde(default)]
    pub sharer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ShareClick {
    pub id: String,
    /// Whether the visitor presented a valid bearer token.
    pub logged_in: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ShareClickResponse {
    pub data: ShareClick,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ShareStats {
    pub total_clicks: i64,
    pub successful_referrals: i64,
    /// Sum of ledger entries recorded as referral rewards.
    pub points_earned: i64,
    /// `<site url>?ref=<user id>`
    pub share_link: String,
}

/// Response body for `GET /api/share/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ShareStatsResponse {
    pub data: ShareStats,
    pub success: bool,
}

/// Request body for `POST /api/referral/create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralRequest {
    #[serde(default)]
    pub referrer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReferralResponse {
    pub data: Referral,
    pub success: bool,
}

/// The link a user hands out; visits through it are attributed to `user_id`.
pub fn share_link(site_url: &str, user_id: &str) -> String {
    format!("{}/?ref={user_id}", site_url.trim_end_matches('/'))
}
