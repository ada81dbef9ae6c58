use std::future::Future;

use crate::entities::{dao::LedgerRecord, parse_ts, SqliteStore};

/// Read side of the points ledger.
pub trait PointsStore: Send + Sync + 'static {
    /// One page of a user's ledger, newest first, plus the total row count.
    /// `page` is 1-based.
    fn list_transactions(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<(Vec<LedgerRecord>, i64), sqlx::Error>> + Send;
    /// Sum of ledger amounts per reason, ordered by reason.
    fn transaction_stats(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<(String, i64)>, sqlx::Error>> + Send;
}

impl PointsStore for SqliteStore {
    async fn list_transactions(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<LedgerRecord>, i64), sqlx::Error> {
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        let rows: Vec<(String, i64, String, Option<String>, String)> = sqlx::query_as(
            "SELECT id, amount, reason, task_id, created_at \
             FROM point_transactions WHERE user_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM point_transactions WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let records = rows
            .into_iter()
            .map(|(id, amount, reason, task_id, created_at)| LedgerRecord {
                id,
                amount,
                reason,
                task_id,
                created_at: parse_ts(&created_at, "point_transactions.created_at"),
            })
            .collect();
        Ok((records, total))
    }

    async fn transaction_stats(&self, user_id: &str) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT reason, SUM(amount) FROM point_transactions \
             WHERE user_id = ?1 GROUP BY reason ORDER BY reason",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{memory_store, UserStore};

    #[tokio::test]
    async fn pages_are_newest_first() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 1).await.unwrap();
        for amount in 2..=5 {
            store.grant_points(&user.id, amount, "grant").await.unwrap();
        }

        let (first, total) = store.list_transactions(&user.id, 1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.iter().map(|r| r.amount).collect::<Vec<_>>(), vec![5, 4]);

        let (last, _) = store.list_transactions(&user.id, 3, 2).await.unwrap();
        assert_eq!(last.iter().map(|r| r.amount).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn stats_group_by_reason() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 10).await.unwrap();
        store.grant_points(&user.id, 15, "purchase").await.unwrap();
        store.grant_points(&user.id, 5, "purchase").await.unwrap();

        let stats = store.transaction_stats(&user.id).await.unwrap();
        assert_eq!(
            stats,
            vec![("grant".to_owned(), 10), ("purchase".to_owned(), 20)]
        );
    }
}
