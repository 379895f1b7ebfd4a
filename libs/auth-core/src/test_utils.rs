//! Key-generation helpers for tests.
//!
//! Integration tests need to mint real RS256 tokens without talking to the
//! identity provider. This generates a throwaway keypair; tests install it
//! with [`crate::jwt::initialize_jwt_keys`] and mint tokens normally.

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Generate a fresh 2048-bit RSA keypair as (private PEM, public PEM).
///
/// 2048 bits keeps test startup tolerable; production keys are provisioned
/// out of band and never pass through this code.
pub fn generate_test_keypair() -> (String, String) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA key");
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .expect("failed to encode private key")
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .expect("failed to encode public key");

    (private_pem, public_pem)
}
