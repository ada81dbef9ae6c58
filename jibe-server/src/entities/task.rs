use std::future::Future;

use jibe_types::{ChatMessage, TaskStatus, REASON_GENERATION};

use crate::entities::dao::{ChargeOutcome, TaskRecord};
use crate::entities::{decode_err, new_id, now_rfc3339, parse_ts, SqliteStore};

/// Durable task rows.  Every terminal write is conditional on the row still
/// being `pending`/`processing`, so a terminal state can never be left.
pub trait TaskStore: Send + Sync + 'static {
    /// Insert a new task in `processing` and return it.
    fn create_task(
        &self,
        user_id: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<TaskRecord, sqlx::Error>> + Send;
    /// Unfiltered lookup for the worker.
    fn get_task(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TaskRecord>, sqlx::Error>> + Send;
    /// Lookup filtered by owner; a foreign task is indistinguishable from a
    /// missing one.
    fn get_user_task(
        &self,
        id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<TaskRecord>, sqlx::Error>> + Send;
    /// Move a non-terminal task to `failed`.  Returns `false` when the task
    /// was already terminal (or missing).
    fn fail_task(
        &self,
        id: &str,
        error: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Debit `cost` points, append the ledger entry and mark the task
    /// completed, all in one transaction.
    fn complete_and_charge(
        &self,
        id: &str,
        result: &str,
        cost: i64,
    ) -> impl Future<Output = Result<ChargeOutcome, sqlx::Error>> + Send;
    /// Ids of tasks that have not reached a terminal state, oldest first.
    fn list_in_flight(&self) -> impl Future<Output = Result<Vec<String>, sqlx::Error>> + Send;
    fn count_completed(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

const TASK_COLUMNS: &str = "id, user_id, status, messages, result, error, points_consumed, \
                            remaining_points, created_at, completed_at";

type TaskRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    String,
    Option<String>,
);

fn task_from_row(row: TaskRow) -> Result<TaskRecord, sqlx::Error> {
    let (
        id,
        user_id,
        status,
        messages,
        result,
        error,
        points_consumed,
        remaining_points,
        created_at,
        completed_at,
    ) = row;
    let status: TaskStatus = status.parse().map_err(decode_err)?;
    let messages: Vec<ChatMessage> = serde_json::from_str(&messages).map_err(decode_err)?;
    Ok(TaskRecord {
        id,
        user_id,
        status,
        messages,
        result,
        error,
        points_consumed,
        remaining_points,
        created_at: parse_ts(&created_at, "generation_tasks.created_at"),
        completed_at: completed_at
            .as_deref()
            .map(|raw| parse_ts(raw, "generation_tasks.completed_at")),
    })
}

impl TaskStore for SqliteStore {
    async fn create_task(
        &self,
        user_id: &str,
        messages: &[ChatMessage],
    ) -> Result<TaskRecord, sqlx::Error> {
        let id = new_id();
        let now = now_rfc3339();
        let payload = serde_json::to_string(messages).map_err(decode_err)?;
        sqlx::query(
            "INSERT INTO generation_tasks (id, user_id, status, messages, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(TaskStatus::Processing.as_ref())
        .bind(&payload)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        task_from_row((
            id,
            user_id.to_owned(),
            TaskStatus::Processing.to_string(),
            payload,
            None,
            None,
            None,
            None,
            now,
            None,
        ))
    }

    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM generation_tasks WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(task_from_row).transpose()
    }

    async fn get_user_task(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM generation_tasks WHERE id = ?1 AND user_id = ?2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(task_from_row).transpose()
    }

    async fn fail_task(&self, id: &str, error: &str) -> Result<bool, sqlx::Error> {
        let now = now_rfc3339();
        let result = sqlx::query(
            "UPDATE generation_tasks \
             SET status = 'failed', error = ?1, result = NULL, updated_at = ?2, completed_at = ?2 \
             WHERE id = ?3 AND status IN ('pending', 'processing')",
        )
        .bind(error)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_and_charge(
        &self,
        id: &str,
        result: &str,
        cost: i64,
    ) -> Result<ChargeOutcome, sqlx::Error> {
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Writing first takes SQLite's write lock up front, so the
        // read-modify-write below cannot be invalidated by another writer.
        let owner: Option<(String,)> = sqlx::query_as(
            "UPDATE generation_tasks \
             SET status = 'completed', result = ?1, error = NULL, points_consumed = ?2, \
                 updated_at = ?3, completed_at = ?3 \
             WHERE id = ?4 AND status IN ('pending', 'processing') \
             RETURNING user_id",
        )
        .bind(result)
        .bind(cost)
        .bind(&now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = owner else {
            tx.rollback().await?;
            return Ok(ChargeOutcome::AlreadyFinal);
        };

        let balance: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET points = points - ?1, updated_at = ?2 \
             WHERE id = ?3 AND points >= ?1 \
             RETURNING points",
        )
        .bind(cost)
        .bind(&now)
        .bind(&user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((remaining,)) = balance else {
            tx.rollback().await?;
            return Ok(ChargeOutcome::InsufficientFunds);
        };

        sqlx::query("UPDATE generation_tasks SET remaining_points = ?1 WHERE id = ?2")
            .bind(remaining)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO point_transactions (id, user_id, amount, reason, task_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(new_id())
        .bind(&user_id)
        .bind(-cost)
        .bind(REASON_GENERATION)
        .bind(id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ChargeOutcome::Charged { remaining })
    }

    async fn list_in_flight(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM generation_tasks \
             WHERE status IN ('pending', 'processing') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn count_completed(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM generation_tasks WHERE user_id = ?1 AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{memory_store, PointsStore, UserStore};

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::assistant("earlier"), ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn new_task_is_processing_and_round_trips_messages() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 50).await.unwrap();
        let task = store.create_task(&user.id, &history()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Processing);

        let loaded = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages, history());
        assert!(loaded.result.is_none() && loaded.error.is_none());
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn owner_filter_hides_foreign_tasks() {
        let store = memory_store().await;
        let (owner, _) = store.create_user("owner", 50).await.unwrap();
        let (other, _) = store.create_user("other", 50).await.unwrap();
        let task = store.create_task(&owner.id, &history()).await.unwrap();

        assert!(store.get_user_task(&task.id, &owner.id).await.unwrap().is_some());
        assert!(store.get_user_task(&task.id, &other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_and_charge_debits_once() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 50).await.unwrap();
        let task = store.create_task(&user.id, &history()).await.unwrap();

        let outcome = store.complete_and_charge(&task.id, "hi there", 10).await.unwrap();
        assert_eq!(outcome, ChargeOutcome::Charged { remaining: 40 });

        let again = store.complete_and_charge(&task.id, "again", 10).await.unwrap();
        assert_eq!(again, ChargeOutcome::AlreadyFinal);
        assert_eq!(store.get_points(&user.id).await.unwrap(), Some(40));

        let done = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("hi there"));
        assert_eq!(done.points_consumed, Some(10));
        assert_eq!(done.remaining_points, Some(40));
        assert!(done.error.is_none());
        assert!(done.completed_at.is_some());

        let (rows, _) = store.list_transactions(&user.id, 1, 10).await.unwrap();
        let debits: Vec<_> = rows.iter().filter(|r| r.amount < 0).collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].amount, -10);
        assert_eq!(debits[0].task_id.as_deref(), Some(task.id.as_str()));
    }

    #[tokio::test]
    async fn insufficient_funds_rolls_everything_back() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 5).await.unwrap();
        let task = store.create_task(&user.id, &history()).await.unwrap();

        let outcome = store.complete_and_charge(&task.id, "text", 10).await.unwrap();
        assert_eq!(outcome, ChargeOutcome::InsufficientFunds);

        let still = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(still.status, TaskStatus::Processing);
        assert!(still.result.is_none());
        assert_eq!(store.get_points(&user.id).await.unwrap(), Some(5));
        let (_, total) = store.list_transactions(&user.id, 1, 10).await.unwrap();
        assert_eq!(total, 1, "only the opening grant");
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 50).await.unwrap();

        let failed = store.create_task(&user.id, &history()).await.unwrap();
        assert!(store.fail_task(&failed.id, "boom").await.unwrap());
        assert!(!store.fail_task(&failed.id, "again").await.unwrap());
        assert_eq!(
            store.complete_and_charge(&failed.id, "late", 10).await.unwrap(),
            ChargeOutcome::AlreadyFinal
        );
        let row = store.get_task(&failed.id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("boom"));
        assert!(row.result.is_none());

        let completed = store.create_task(&user.id, &history()).await.unwrap();
        store.complete_and_charge(&completed.id, "ok", 10).await.unwrap();
        assert!(!store.fail_task(&completed.id, "late failure").await.unwrap());
        let row = store.get_task(&completed.id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert!(row.error.is_none());
    }

    #[tokio::test]
    async fn in_flight_lists_only_non_terminal() {
        let store = memory_store().await;
        let (user, _) = store.create_user("a", 50).await.unwrap();
        let a = store.create_task(&user.id, &history()).await.unwrap();
        let b = store.create_task(&user.id, &history()).await.unwrap();
        store.fail_task(&a.id, "x").await.unwrap();

        assert_eq!(store.list_in_flight().await.unwrap(), vec![b.id.clone()]);
        store.complete_and_charge(&b.id, "ok", 10).await.unwrap();
        assert!(store.list_in_flight().await.unwrap().is_empty());
        assert_eq!(store.count_completed(&user.id).await.unwrap(), 1);
    }
}
