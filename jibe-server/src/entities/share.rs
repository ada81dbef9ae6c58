use std::future::Future;

use jibe_types::REASON_REFERRAL;

use crate::entities::dao::{ReferralOutcome, ReferralRecord, ShareClickRecord, ShareCounts};
use crate::entities::{new_id, now_rfc3339, parse_ts, SqliteStore};

/// Share-link visits and referral relationships.
pub trait ShareStore: Send + Sync + 'static {
    /// Record one visit through `sharer_id`'s link.  `None` when the sharer
    /// does not exist.
    fn record_click(
        &self,
        sharer_id: &str,
        visitor_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<ShareClickRecord>, sqlx::Error>> + Send;
    /// Attach `referred_id` to `referrer_id`.  A positive `bonus` is credited
    /// to the referrer and written to the ledger in the same transaction.
    fn create_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
        bonus: i64,
    ) -> impl Future<Output = Result<ReferralOutcome, sqlx::Error>> + Send;
    fn share_stats(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<ShareCounts, sqlx::Error>> + Send;
}

impl ShareStore for SqliteStore {
    async fn record_click(
        &self,
        sharer_id: &str,
        visitor_id: Option<&str>,
    ) -> Result<Option<ShareClickRecord>, sqlx::Error> {
        let id = new_id();
        let logged_in = visitor_id.is_some();
        // Inserts nothing when the sharer is unknown.
        let done = sqlx::query(
            "INSERT INTO share_clicks (id, sharer_id, visitor_id, logged_in, created_at) \
             SELECT ?1, id, ?2, ?3, ?4 FROM users WHERE id = ?5",
        )
        .bind(&id)
        .bind(visitor_id)
        .bind(logged_in)
        .bind(now_rfc3339())
        .bind(sharer_id)
        .execute(&self.pool)
        .await?;

        Ok((done.rows_affected() == 1).then_some(ShareClickRecord { id, logged_in }))
    }

    async fn create_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
        bonus: i64,
    ) -> Result<ReferralOutcome, sqlx::Error> {
        let id = new_id();
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;

        let referrer: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?1")
            .bind(referrer_id)
            .fetch_optional(&mut *tx)
            .await?;
        if referrer.is_none() {
            tx.rollback().await?;
            return Ok(ReferralOutcome::UnknownReferrer);
        }

        let inserted = sqlx::query(
            "INSERT INTO referrals (id, referrer_id, referred_id, created_at) \
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT (referred_id) DO NOTHING",
        )
        .bind(&id)
        .bind(referrer_id)
        .bind(referred_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReferralOutcome::AlreadyReferred);
        }

        if bonus > 0 {
            sqlx::query("UPDATE users SET points = points + ?1, updated_at = ?2 WHERE id = ?3")
                .bind(bonus)
                .bind(&now)
                .bind(referrer_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO point_transactions (id, user_id, amount, reason, task_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            )
            .bind(new_id())
            .bind(referrer_id)
            .bind(bonus)
            .bind(REASON_REFERRAL)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(ReferralOutcome::Created(ReferralRecord {
            id,
            created_at: parse_ts(&now, "referrals.created_at"),
        }))
    }

    async fn share_stats(&self, user_id: &str) -> Result<ShareCounts, sqlx::Error> {
        let (total_clicks, successful_referrals, points_earned): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 (SELECT COUNT(*) FROM share_clicks WHERE sharer_id = ?1), \
                 (SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1), \
                 (SELECT COALESCE(SUM(amount), 0) FROM point_transactions \
                  WHERE user_id = ?1 AND reason = ?2)",
        )
        .bind(user_id)
        .bind(REASON_REFERRAL)
        .fetch_one(&self.pool)
        .await?;

        Ok(ShareCounts {
            total_clicks,
            successful_referrals,
            points_earned,
        })
    }
}
