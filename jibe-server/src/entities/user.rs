use std::future::Future;

use jibe_types::REASON_GRANT;

use crate::entities::{dao::UserRecord, new_id, now_rfc3339, SqliteStore};

pub trait UserStore: Send + Sync + 'static {
    /// Create a user with an opening balance and issue its bearer token.
    ///
    /// A positive opening balance is also written to the ledger as a grant.
    fn create_user(
        &self,
        display_name: &str,
        initial_points: i64,
    ) -> impl Future<Output = Result<(UserRecord, String), sqlx::Error>> + Send;
    fn find_user_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
    fn get_points(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<i64>, sqlx::Error>> + Send;
    /// Credit `amount` points and append a ledger entry.  `None` when the
    /// user does not exist.
    fn grant_points(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> impl Future<Output = Result<Option<i64>, sqlx::Error>> + Send;
}


impl UserStore for SqliteStore {
    async fn create_user(
        &self,
        display_name: &str,
        initial_points: i64,
    ) -> Result<(UserRecord, String), sqlx::Error> {
        let id = new_id();
        let token = format!("jb_{}", uuid::Uuid::new_v4().simple());
        let now = now_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, display_name, points, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(&id)
        .bind(display_name)
        .bind(initial_points)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO api_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(&token)
            .bind(&id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        if initial_points > 0 {
            sqlx::query(
                "INSERT INTO point_transactions (id, user_id, amount, reason, task_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            )
            .bind(new_id())
            .bind(&id)
            .bind(initial_points)
            .bind(REASON_GRANT)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok((UserRecord { id, points: initial_points }, token))
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT u.id, u.points FROM api_tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, points)| UserRecord { id, points }))
    }

    async fn get_points(&self, user_id: &str) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT points FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(p,)| p))
    }

    async fn grant_points(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;
        let balance: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET points = points + ?1, updated_at = ?2 WHERE id = ?3 RETURNING points",
        )
        .bind(amount)
        .bind(&now)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((balance,)) = balance else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO point_transactions (id, user_id, amount, reason, task_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(amount)
        .bind(reason)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(balance))
    }
}
