//! Periodic consistency sweep.
//!
//! Reconciles what the transport layer may have missed: presence entries
//! that stopped heartbeating are forced offline, and stale typing
//! indicators are deleted. Every write is a final-state overwrite, so the
//! sweep is idempotent and safe to run alongside live traffic.

use crate::error::AppResult;
use crate::models::presence::PresenceStatus;
use crate::services::presence_service::PresenceService;
use crate::services::typing_service::TypingService;
use crate::state::AppState;
use crate::websocket::events::ServerEvent;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn spawn(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(state.config.cleanup_interval_seconds));
        loop {
            interval.tick().await;
            if let Err(e) = run_sweep(&state).await {
                warn!(error = %e, "cleanup sweep failed");
            }
        }
    })
}

pub async fn run_sweep(state: &AppState) -> AppResult<()> {
    let flipped =
        PresenceService::sweep_stale(&state.db, state.config.presence_stale_seconds).await?;
    for user_id in &flipped {
        let event = ServerEvent::PresenceChanged {
            user_id: *user_id,
            status: PresenceStatus::Offline.as_str().to_string(),
        };
        if let Ok(payload) = event.to_payload() {
            state.registry.broadcast_all(&payload).await;
        }
    }

    let removed =
        TypingService::sweep_stale(&state.db, state.config.typing_stale_seconds).await?;

    if !flipped.is_empty() || removed > 0 {
        info!(
            stale_presence = flipped.len(),
            stale_typing = removed,
            "cleanup sweep reconciled stale state"
        );
    }
    Ok(())
}
