//! Points balance, ledger and admin types.

use serde::{Deserialize, Serialize};

/// One immutable balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    /// Signed change; debits are negative.
    pub amount: i64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Sum of all ledger amounts recorded under one reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReasonTotal {
    pub reason: String,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PointsStats {
    pub current_points: i64,
    pub transaction_stats: Vec<ReasonTotal>,
    pub generations_count: i64,
    pub remaining_generations: i64,
}

/// Response body for `GET /api/points/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PointsStatsResponse {
    pub data: PointsStats,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: u32, page_size: u32) -> Self {
        let size = i64::from(page_size.max(1));
        Self {
            total,
            page,
            page_size,
            total_pages: (total + size - 1) / size,
        }
    }
}

/// Response body for `GET /api/points/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PointsHistoryResponse {
    pub data: Vec<LedgerEntry>,
    pub pagination: Pagination,
    pub success: bool,
}

/// Request body for `POST /admin/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub initial_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
    pub user_id: String,
    /// Bearer token for the `/api` routes.  Only returned once.
    pub token: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreatedUserResponse {
    pub data: CreatedUser,
    pub success: bool,
}

/// Request body for `POST /admin/users/{id}/points`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GrantPointsRequest {
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UserPoints {
    pub user_id: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserPointsResponse {
    pub data: UserPoints,
    pub success: bool,
}
