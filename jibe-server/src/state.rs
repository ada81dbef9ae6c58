//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::orchestrator::Orchestrator;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Users, tasks and the points ledger.
    pub store: Arc<SqliteStore>,
    /// Accepts generation requests and owns the worker pool.
    pub orchestrator: Arc<Orchestrator>,
}
