//! Shared bearer-credential validation for ExamLive services.
//!
//! Tokens are JWTs signed with RS256. Services that only consume tokens
//! (everything except the identity provider) install the public key once at
//! startup with [`jwt::initialize_jwt_validation_only`] and call
//! [`jwt::validate_token`] on every handshake. There is no symmetric-key
//! fallback: a token that is not RS256-signed by the identity provider does
//! not validate, full stop.

pub mod jwt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use jwt::{validate_token, Claims};
