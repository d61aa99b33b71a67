//! Account endpoints: login, profile, registration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub(super) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginResponse {
    pub access_token: String,
}

/// New-account request. The server rejects registrations without a valid
/// invitation code.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub invitation_code: String,
}

/// Profile returned by `GET /api/auth/me`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<Value>,
    pub username: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A signed-in user and the bearer token for both REST and the live link.
#[derive(Debug)]
pub struct AuthSession {
    pub user: UserProfile,
    pub token: SecretString,
}

/// FastAPI-style error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Value,
}

/// Human-readable failure text: the body's `detail` when present, else the
/// raw body, else the fallback.
pub(super) fn error_detail(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: Value::String(s) }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => fallback.to_string(),
    }
}
