//! Status API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::Policy;
use crate::engine::monitor::{MonitorStats, SharedStats};
use crate::storage::TransactionStore;
use crate::types::{format_eth, StoredRecord};

/// Most rows `/api/transactions` returns in one call.
pub const MAX_TRANSACTIONS: u32 = 500;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub stats: SharedStats,
    pub store: Arc<dyn TransactionStore>,
    pub policy: Policy,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(stats: SharedStats, store: Arc<dyn TransactionStore>, policy: Policy) -> Self {
        Self {
            stats,
            store,
            policy,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub tracked_contract: String,
    pub min_value_eth: String,
    pub buy_value_eth: String,
    pub buy_enabled: bool,
    pub uptime_secs: i64,
    pub stats: MonitorStats,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.stats.read().await.clone();
    Json(StatusResponse {
        tracked_contract: state.policy.tracked_contract.to_string(),
        min_value_eth: format_eth(state.policy.min_value),
        buy_value_eth: format_eth(state.policy.buy_value),
        buy_enabled: state.policy.buy_enabled,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        stats,
    })
}

/// GET /api/transactions?limit=N
pub async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<StoredRecord>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(100).min(MAX_TRANSACTIONS);
    state.store.recent(limit).await.map(Json).map_err(|e| {
        warn!(error = %e, "Failed to read transaction records");
        (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable".to_string())
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
