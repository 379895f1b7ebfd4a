use crate::error::{AppError, AppResult};
use crate::models::identity::{Identity, UserRole};
use axum::http::HeaderMap;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;

/// Pull the bearer credential out of the upgrade request: `?token=` query
/// parameter first (browser WebSocket clients cannot set headers), then the
/// Authorization header.
pub fn extract_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    query_token
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .filter(|t| !t.is_empty())
                .map(|s| s.to_string())
        })
}

/// Verify the handshake credential and resolve the identity it names.
///
/// This is the single gate excluding unauthenticated traffic: on any
/// failure the connection is rejected before upgrade and no state exists
/// for it anywhere. Downstream handlers may assume the identity is valid.
pub async fn authenticate_handshake(
    db: &Pool<Postgres>,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> AppResult<Identity> {
    let token = match extract_token(query_token, headers) {
        Some(token) => token,
        None => {
            warn!("websocket handshake rejected: no bearer token");
            return Err(AppError::Unauthorized);
        }
    };

    let user_id = auth_core::jwt::validate_access_token_subject(&token).map_err(|e| {
        warn!(error = %e, "websocket handshake rejected: invalid token");
        AppError::Unauthorized
    })?;

    let row = sqlx::query("SELECT display_name, role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;

    let row = row.ok_or_else(|| {
        warn!(%user_id, "websocket handshake rejected: token subject unknown to identity store");
        AppError::Unauthorized
    })?;

    Ok(Identity {
        user_id,
        display_name: row.get("display_name"),
        role: UserRole::from_str(row.get::<String, _>("role").as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(
            extract_token(Some("from-query"), &headers).as_deref(),
            Some("from-query")
        );
    }

    #[test]
    fn header_requires_bearer_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        assert_eq!(extract_token(None, &headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_token(None, &headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(Some(""), &headers), None);
        assert_eq!(extract_token(None, &headers), None);
    }
}
