//! JWT inspection
//!
//! The client never verifies tokens (it does not hold the server's secret);
//! it only reads the expiry so it can refresh ahead of time.

use crate::error::{ApiResult, AppError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

/// Refresh this long before the access token actually expires
pub const REFRESH_MARGIN_SECONDS: i64 = 30;

/// The claims the client cares about
#[derive(Debug, Deserialize, Clone)]
pub struct Claims {
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<i64>,
    /// Subject, an id or a username depending on the server version
    #[serde(default)]
    pub sub: Option<serde_json::Value>,
    /// `access` or `refresh`
    #[serde(default, rename = "type")]
    pub token_type: Option<String>,
}

/// Read a token's claims without checking its signature
pub fn decode_unverified(token: &str) -> ApiResult<Claims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AppError::Unauthorized(format!("Unreadable token: {}", e)))?;
    Ok(data.claims)
}

/// When the token expires, if it can be read
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    match decode_unverified(token) {
        Ok(claims) => Utc.timestamp_opt(claims.exp, 0).single(),
        Err(e) => {
            warn!("Could not read token expiry: {}", e);
            None
        }
    }
}

/// True when a token with this expiry should be refreshed now.
/// Tokens without a known expiry are left alone.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(exp) => exp - now <= Duration::seconds(REFRESH_MARGIN_SECONDS),
        None => false,
    }
}
