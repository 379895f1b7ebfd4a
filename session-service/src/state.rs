use crate::{config::Config, websocket::rate_limit::RateLimiter, websocket::ConnectionRegistry};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub limiter: RateLimiter,
    pub config: Arc<Config>,
}
