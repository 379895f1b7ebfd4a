//! Periodic leaderboard recompute and broadcast.
//!
//! Runs independently of any connection: rebuilds the materialized ranking
//! rows, then pushes the top-N snapshot to every connected client,
//! room-unscoped. The same path serves the role-gated manual refresh.

use crate::error::AppResult;
use crate::services::leaderboard_service::{LeaderboardService, SPECIALTY_ALL};
use crate::state::AppState;
use crate::websocket::events::ServerEvent;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

pub fn spawn(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(state.config.leaderboard_interval_seconds));
        loop {
            interval.tick().await;
            if let Err(e) = recompute_and_broadcast(&state).await {
                warn!(error = %e, "leaderboard recompute failed");
            }
        }
    })
}

pub async fn recompute_and_broadcast(state: &AppState) -> AppResult<()> {
    LeaderboardService::recompute_all(&state.db).await?;

    let entries = LeaderboardService::top(
        &state.db,
        "all",
        SPECIALTY_ALL,
        state.config.leaderboard_top_n,
    )
    .await?;

    let event = ServerEvent::LeaderboardSnapshot {
        period: "all".to_string(),
        specialty: SPECIALTY_ALL.to_string(),
        entries,
    };
    if let Ok(payload) = event.to_payload() {
        state.registry.broadcast_all(&payload).await;
    }
    Ok(())
}
