//! Expiry extraction from signed bearer tokens.
//!
//! Tokens are JWTs signed by the upstream API, which also verifies them.
//! This side only needs `exp` to compare freshness, so the signature is
//! not checked and an already-expired token still decodes.

use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

/// Errors from reading a credential's claims.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("malformed credential: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
    #[error("credential decoding task failed: {0}")]
    Task(String),
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    /// NumericDate, which may carry a fractional part.
    exp: f64,
}

fn unverified_validation() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

/// Returns the `exp` claim (seconds since epoch) of `token`.
///
/// # Errors
///
/// Returns [`CredentialError::Malformed`] if the token is not a JWT or has
/// no numeric `exp` claim.
pub fn decode_expiry(token: &str) -> Result<f64, CredentialError> {
    let data = jsonwebtoken::decode::<ExpiryClaim>(
        token,
        &DecodingKey::from_secret(&[]),
        &unverified_validation(),
    )?;
    Ok(data.claims.exp)
}

/// [`decode_expiry`] on the blocking pool, keeping base64 and JSON work
/// off the async workers.
///
/// # Errors
///
/// As [`decode_expiry`], plus [`CredentialError::Task`] if the blocking
/// task panicked or was cancelled.
pub async fn decode_expiry_blocking(token: String) -> Result<f64, CredentialError> {
    tokio::task::spawn_blocking(move || decode_expiry(&token))
        .await
        .map_err(|e| CredentialError::Task(e.to_string()))?
}
