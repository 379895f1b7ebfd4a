use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::websocket::ConnectionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Bucket {
    count: u32,
    window_started_at: Instant,
}

/// Fixed-window message counter per connection.
///
/// The window resets lazily on the first check after expiry; there is no
/// timer per connection. Buckets are discarded on disconnect, so the map is
/// bounded by the number of live connections.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<ConnectionId, Bucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one action against the connection's window. Rejects with
    /// `AppError::RateLimited` once the cap is exceeded; the underlying
    /// handler must not run in that case.
    pub async fn check(&self, connection_id: ConnectionId) -> Result<(), AppError> {
        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(connection_id).or_insert(Bucket {
            count: 0,
            window_started_at: now,
        });

        if now.duration_since(bucket.window_started_at) >= window {
            bucket.count = 0;
            bucket.window_started_at = now;
        }

        if bucket.count >= self.config.max_requests {
            crate::metrics::RATE_LIMITED_TOTAL.inc();
            return Err(AppError::RateLimited);
        }

        bucket.count += 1;
        Ok(())
    }

    /// Drop the connection's bucket. Called on disconnect.
    pub async fn discard(&self, connection_id: ConnectionId) {
        self.buckets.lock().await.remove(&connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_seconds,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cap_plus_one_is_rejected_and_window_resets() {
        let limiter = limiter(3, 10);
        let conn = ConnectionId::new();

        for _ in 0..3 {
            assert!(limiter.check(conn).await.is_ok());
        }
        assert!(matches!(
            limiter.check(conn).await,
            Err(AppError::RateLimited)
        ));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check(conn).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn connections_do_not_share_buckets() {
        let limiter = limiter(1, 10);
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        assert!(limiter.check(a).await.is_ok());
        assert!(limiter.check(a).await.is_err());
        assert!(limiter.check(b).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn discard_forgets_the_window() {
        let limiter = limiter(1, 60);
        let conn = ConnectionId::new();

        assert!(limiter.check(conn).await.is_ok());
        assert!(limiter.check(conn).await.is_err());

        limiter.discard(conn).await;
        assert!(limiter.check(conn).await.is_ok());
    }
}
