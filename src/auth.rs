use axum::http::{HeaderMap, StatusCode};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::models::api::AuthContext;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub user_id: Option<String>,
    /// Backward-compat: subject field used by older tokens.
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: Option<u64>,
}

/// Verify a JWT token and extract auth context.
pub fn verify_token(token: &str, secret: &str, algorithm: &str) -> Result<AuthContext, String> {
    let algo = match algorithm {
        "HS256" => jsonwebtoken::Algorithm::HS256,
        "HS384" => jsonwebtoken::Algorithm::HS384,
        "HS512" => jsonwebtoken::Algorithm::HS512,
        _ => return Err(format!("Unsupported algorithm: {algorithm}")),
    };

    let mut validation = Validation::new(algo);
    // Allow some clock drift.
    validation.leeway = 60;
    // Don't require specific claims.
    validation.required_spec_claims = std::collections::HashSet::new();

    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &key, &validation)
        .map_err(|e| format!("Token validation failed: {e}"))?;

    let claims = token_data.claims;
    let user_id = claims
        .user_id
        .or(claims.sub)
        .ok_or_else(|| "Token carries no user identity".to_string())?;

    Ok(AuthContext { user_id })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Extract the calling user from the Authorization header.
pub fn extract_user(
    headers: &HeaderMap,
    secret: &str,
    algorithm: &str,
    bypass_mode: bool,
    dev_user_id: &str,
) -> Result<AuthContext, (StatusCode, String)> {
    if bypass_mode {
        return Ok(AuthContext {
            user_id: dev_user_id.to_string(),
        });
    }

    let token = bearer_token(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            "Missing or malformed Authorization header".to_string(),
        )
    })?;

    verify_token(token, secret, algorithm).map_err(|e| (StatusCode::UNAUTHORIZED, e))
}

/// Validate the shared-secret bearer token used by the scheduled trigger.
pub fn require_cron_secret(headers: &HeaderMap, secret: &str) -> Result<(), (StatusCode, String)> {
    match bearer_token(headers) {
        Some(token) if token == secret => Ok(()),
        Some(_) => Err((
            StatusCode::UNAUTHORIZED,
            "Invalid cron secret".to_string(),
        )),
        None => Err((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        )),
    }
}
