use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ACCESS_TOKEN_EXPIRY_HOURS: i64 = 1;

/// All ExamLive tokens are RS256. No other algorithm is ever accepted.
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Claims carried by an ExamLive access token.
///
/// Deliberately minimal: the subject is the user id, and everything else
/// about the identity (display name, role) is resolved against the identity
/// store by the consuming service. Tokens are not a profile cache.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type, always "access" for handshake credentials
    pub token_type: String,
}

/// Keys are installed once at startup and immutable afterwards. OnceCell
/// gives thread-safe initialization without runtime locks.
static JWT_ENCODING_KEY: OnceCell<EncodingKey> = OnceCell::new();
static JWT_DECODING_KEY: OnceCell<DecodingKey> = OnceCell::new();

/// Initialize both keys from PEM strings.
///
/// Only the identity provider (and test harnesses) should hold the private
/// key. Can only be called once per process.
pub fn initialize_jwt_keys(private_key_pem: &str, public_key_pem: &str) -> Result<()> {
    let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| anyhow!("Failed to parse RSA private key: {e}"))?;
    let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
        .map_err(|e| anyhow!("Failed to parse RSA public key: {e}"))?;

    JWT_ENCODING_KEY
        .set(encoding_key)
        .map_err(|_| anyhow!("JWT encoding key already initialized"))?;
    JWT_DECODING_KEY
        .set(decoding_key)
        .map_err(|_| anyhow!("JWT decoding key already initialized"))?;

    Ok(())
}

/// Initialize for validation-only services (everything except the identity
/// provider). Requires only the public key.
pub fn initialize_jwt_validation_only(public_key_pem: &str) -> Result<()> {
    let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
        .map_err(|e| anyhow!("Failed to parse RSA public key: {e}"))?;

    JWT_DECODING_KEY
        .set(decoding_key)
        .map_err(|_| anyhow!("JWT decoding key already initialized"))?;

    Ok(())
}

fn get_encoding_key() -> Result<&'static EncodingKey> {
    JWT_ENCODING_KEY
        .get()
        .ok_or_else(|| anyhow!("JWT keys not initialized. Call initialize_jwt_keys() during startup."))
}

fn get_decoding_key() -> Result<&'static DecodingKey> {
    JWT_DECODING_KEY.get().ok_or_else(|| {
        anyhow!("JWT keys not initialized. Call initialize_jwt_keys() or initialize_jwt_validation_only() during startup.")
    })
}

/// Generate a short-lived access token for `user_id`.
pub fn generate_access_token(user_id: Uuid) -> Result<String> {
    let now = Utc::now();
    let expiry = now + Duration::hours(ACCESS_TOKEN_EXPIRY_HOURS);

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: expiry.timestamp(),
        token_type: "access".to_string(),
    };

    let encoding_key = get_encoding_key()?;
    encode(&Header::new(JWT_ALGORITHM), &claims, encoding_key)
        .map_err(|e| anyhow!("Failed to generate access token: {e}"))
}

/// Validate and decode a token.
///
/// Verifies the RS256 signature with the installed public key and enforces
/// expiry. Returns the decoded claims on success.
pub fn validate_token(token: &str) -> Result<TokenData<Claims>> {
    let decoding_key = get_decoding_key()?;

    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.validate_exp = true;

    decode::<Claims>(token, decoding_key, &validation)
        .map_err(|e| anyhow!("Token validation failed: {e}"))
}

/// Validate a token and extract its subject as a user id.
///
/// Rejects non-access tokens so a leaked long-lived credential of some other
/// type cannot open a realtime session.
pub fn validate_access_token_subject(token: &str) -> Result<Uuid> {
    let token_data = validate_token(token)?;
    if token_data.claims.token_type != "access" {
        return Err(anyhow!("not an access token"));
    }
    Uuid::parse_str(&token_data.claims.sub).map_err(|e| anyhow!("invalid subject in token: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[test]
    fn round_trip_and_subject_extraction() {
        let (private_pem, public_pem) = test_utils::generate_test_keypair();
        initialize_jwt_keys(&private_pem, &public_pem).unwrap();

        let user_id = Uuid::new_v4();
        let token = generate_access_token(user_id).unwrap();

        let data = validate_token(&token).unwrap();
        assert_eq!(data.claims.sub, user_id.to_string());
        assert_eq!(data.claims.token_type, "access");
        assert!(data.claims.exp > data.claims.iat);

        assert_eq!(validate_access_token_subject(&token).unwrap(), user_id);
    }

    #[test]
    fn garbage_token_is_rejected() {
        // Key installation is process-wide; the round-trip test may have run
        // first, either way validation must fail.
        let err = validate_token("not.a.jwt");
        assert!(err.is_err());
    }
}
