use std::env;
use std::fs;
use std::path::Path;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::core::errors::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct SessionToken {
    value: String,
}

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Resolve the token guarding mutating routes.
///
/// `DOCQA_SESSION_TOKEN` wins; otherwise a fresh token is generated and
/// written to `<data_dir>/.session_token` (mode 0600 on unix) for local clients.
pub fn init_session_token(data_dir: &Path) -> SessionToken {
    if let Ok(token) = env::var("DOCQA_SESSION_TOKEN") {
        if !token.trim().is_empty() {
            return SessionToken::new(token);
        }
    }

    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let token_path = data_dir.join(".session_token");
    if let Err(err) = fs::write(&token_path, &token) {
        tracing::warn!("Failed to write session token: {}", err);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&token_path) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            let _ = fs::set_permissions(&token_path, perms);
        }
    }

    SessionToken::new(token)
}

pub fn require_api_key(headers: &HeaderMap, expected: &SessionToken) -> Result<(), ApiError> {
    let header_value = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if header_value.is_empty() || header_value != expected.value() {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}
