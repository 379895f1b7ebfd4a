use dotenvy::dotenv;
use std::env;

/// Fixed-window message rate limit, applied per connection.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// How many persisted messages a joining connection receives as history.
    pub history_limit: i64,
    pub rate_limit: RateLimitConfig,
    /// Presence entries idle longer than this are swept to offline.
    pub presence_stale_seconds: i64,
    /// Typing indicators older than this are deleted by the sweep.
    pub typing_stale_seconds: i64,
    pub cleanup_interval_seconds: u64,
    pub leaderboard_interval_seconds: u64,
    pub leaderboard_top_n: i64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env_parse("PORT", 3000);

        let history_limit = env_parse("MESSAGE_HISTORY_LIMIT", 50);

        let rate_limit = RateLimitConfig {
            max_requests: env_parse("MESSAGE_RATE_LIMIT_MAX", 10),
            window_seconds: env_parse("MESSAGE_RATE_LIMIT_WINDOW_SECONDS", 10),
        };

        Ok(Self {
            database_url,
            port,
            history_limit,
            rate_limit,
            presence_stale_seconds: env_parse("PRESENCE_STALE_SECONDS", 300),
            typing_stale_seconds: env_parse("TYPING_STALE_SECONDS", 10),
            cleanup_interval_seconds: env_parse("CLEANUP_INTERVAL_SECONDS", 60),
            leaderboard_interval_seconds: env_parse("LEADERBOARD_INTERVAL_SECONDS", 300),
            leaderboard_top_n: env_parse("LEADERBOARD_TOP_N", 10),
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 3000,
            history_limit: 50,
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window_seconds: 10,
            },
            presence_stale_seconds: 300,
            typing_stale_seconds: 10,
            cleanup_interval_seconds: 60,
            leaderboard_interval_seconds: 300,
            leaderboard_top_n: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_env_values_fall_back_to_defaults() {
        std::env::set_var("TEST_CONFIG_BOGUS_NUMBER", "not-a-number");
        assert_eq!(env_parse("TEST_CONFIG_BOGUS_NUMBER", 42u32), 42);
        assert_eq!(env_parse("TEST_CONFIG_UNSET_KEY", 7i64), 7);
    }

    #[test]
    fn test_defaults_are_self_consistent() {
        let cfg = Config::test_defaults();
        assert!(cfg.rate_limit.max_requests > 0);
        assert!(cfg.history_limit > 0);
        assert!(cfg.typing_stale_seconds < cfg.presence_stale_seconds);
    }
}
