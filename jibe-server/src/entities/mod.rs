//! Persistence layer.
//!
//! Each concern has its own store trait ([`TaskStore`], [`UserStore`],
//! [`PointsStore`], [`ShareStore`]); [`SqliteStore`] implements all of them.  To move to a
//! different database implement the traits for a new type and change the
//! concrete type in [`crate::state::AppState`].
//!
//! Trait methods use `impl Future` in their signatures so handlers stay free
//! of boxing.  Timestamps are stored as RFC 3339 text.

pub mod dao;
pub mod points;
pub mod share;
pub mod task;
pub mod user;

pub use dao::{ChargeOutcome, LedgerRecord, ReferralOutcome, ShareCounts, TaskRecord};

pub use points::PointsStore;
pub use share::ShareStore;
pub use task::TaskStore;
pub use user::UserStore;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// SQLite-backed store for users, tasks and the points ledger.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://jibe.db"`
    /// or `"sqlite::memory:"` for tests.  An in-memory database lives on a
    /// single pinned connection; every other connection would see its own
    /// empty database.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };
        let pool = pool_options.connect_with(options).await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

// ── shared row helpers ───────────────────────────────────────────────────────

pub(crate) fn now_rfc3339() -> String {
    format_ts(Utc::now())
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str, field: &'static str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, field, error = %e, "failed to parse timestamp; using now");
        Utc::now()
    })
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}
