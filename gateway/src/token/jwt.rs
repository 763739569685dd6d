//! GitHub App JWT signing
//!
//! The signing assertion proves the process's identity to GitHub when
//! requesting an installation token: RS256 over `{iat, exp, iss}` with the
//! App's private key. GitHub caps the assertion lifetime at 10 minutes; 9
//! leaves margin for clock skew. A fresh assertion is built for every mint
//! and is never logged in full.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Assertion lifetime in seconds (GitHub's maximum is 600).
const ASSERTION_TTL_SECS: i64 = 9 * 60;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to parse RSA private key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),
    #[error("failed to sign app JWT: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: u64,
}

/// Parses the App private key once at startup.
///
/// Accepts both PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8
/// (`BEGIN PRIVATE KEY`) PEM encodings; anything that is not an RSA private
/// key is rejected here rather than at mint time.
pub fn load_signing_key(private_key_pem: &SecretString) -> Result<EncodingKey, JwtError> {
    EncodingKey::from_rsa_pem(private_key_pem.expose_secret().as_bytes())
        .map_err(JwtError::InvalidKey)
}

/// Builds a fresh signing assertion for the given App.
pub fn sign_app_jwt(signing_key: &EncodingKey, app_id: u64) -> Result<String, JwtError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        iat: now,
        exp: now + ASSERTION_TTL_SECS,
        iss: app_id,
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, signing_key)
        .map_err(JwtError::Signing)
}
