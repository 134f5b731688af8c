//! Token inspection
//!
//! The client never holds the signing key, so tokens are decoded without
//! signature verification and only read for their expiry and scopes. Anything
//! that cannot be decoded is treated as "not expiring": forcing a refresh on
//! an undecodable token would refresh on every request.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Claims the client cares about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiration time (epoch seconds)
    pub exp: i64,
    /// Subject, usually the username
    #[serde(default)]
    pub sub: Option<String>,
    /// Scopes as a list
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Scopes as a space separated string (OAuth2 style)
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenClaims {
    /// Union of `scopes` and `scope`
    pub fn scope_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.scopes.iter().cloned().collect();
        if let Some(scope) = &self.scope {
            set.extend(scope.split_whitespace().map(str::to_string));
        }
        set
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
            || self
                .scope
                .as_deref()
                .is_some_and(|s| s.split_whitespace().any(|s| s == scope))
    }
}

fn insecure_validation() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

/// Decode the payload of `token` without verifying its signature
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    match decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &insecure_validation()) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!(error = %e, "Token payload could not be decoded");
            None
        }
    }
}

/// Expiry of `token` as a timestamp
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token).and_then(|claims| DateTime::from_timestamp(claims.exp, 0))
}

/// Seconds left before `token` expires at `now`; negative once expired
pub fn expires_in_at(token: &str, now: DateTime<Utc>) -> Option<i64> {
    decode_claims(token).map(|claims| claims.exp - now.timestamp())
}

/// Whether `token` expires within `threshold_seconds` of now
pub fn is_expiring(token: Option<&str>, threshold_seconds: u64) -> bool {
    is_expiring_at(token, threshold_seconds, Utc::now())
}

/// Whether `token` expires within `threshold_seconds` of `now`
///
/// True iff `now >= exp - threshold`. A missing or undecodable token, or one
/// without `exp`, is never reported as expiring.
pub fn is_expiring_at(token: Option<&str>, threshold_seconds: u64, now: DateTime<Utc>) -> bool {
    let Some(token) = token else {
        return false;
    };
    let Some(claims) = decode_claims(token) else {
        return false;
    };

    let threshold = i64::try_from(threshold_seconds).unwrap_or(i64::MAX);
    let expiring = now.timestamp() >= claims.exp.saturating_sub(threshold);
    debug!(
        exp = claims.exp,
        threshold_seconds,
        expiring,
        "Checked token expiry"
    );
    expiring
}
