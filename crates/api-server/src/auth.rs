use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hash a key with SHA-256 so lookups compare fixed-length digests
/// instead of raw keys.
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    User = 0,
    Admin = 1,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Authenticated caller, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    /// Identity attached to every request when no keys are configured.
    pub fn development() -> Self {
        Self {
            user_id: "dev".to_string(),
            role: Role::Admin,
        }
    }
}

/// Hashed API key table parsed from `key:user_id:role` entries.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: HashMap<String, Identity>,
}

impl ApiKeys {
    /// Parse a comma separated key list. Entries without a role default to
    /// `user`; entries with an unknown role or no user id are skipped.
    pub fn parse(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }

                let mut parts = entry.splitn(3, ':').map(str::trim);
                let key = parts.next().filter(|k| !k.is_empty())?;
                let user_id = parts.next().filter(|u| !u.is_empty())?;
                let role = match parts.next() {
                    Some(role) => match Role::from_str(role) {
                        Some(role) => role,
                        None => {
                            tracing::warn!("Skipping API key for {} with unknown role '{}'", user_id, role);
                            return None;
                        }
                    },
                    None => Role::User,
                };

                Some((
                    hash_key(key),
                    Identity {
                        user_id: user_id.to_string(),
                        role,
                    },
                ))
            })
            .collect();

        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn lookup(&self, key: &str) -> Option<&Identity> {
        self.keys.get(&hash_key(key))
    }
}

/// API key authentication middleware.
///
/// Checks for the key in `X-API-Key` first, then `Authorization: Bearer`.
/// With no keys configured every request runs as [`Identity::development`].
pub async fn auth_middleware(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if state.api_keys.is_empty() {
        request.extensions_mut().insert(Identity::development());
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&headers)?;

    let identity = match state.api_keys.lookup(&api_key) {
        Some(identity) => identity.clone(),
        None => {
            tracing::warn!("Invalid API key attempted: {}", mask_api_key(&api_key));
            return Err(AuthError::InvalidApiKey);
        }
    };

    tracing::debug!(user = %identity.user_id, role = %identity.role, "Authenticated request");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

pub(crate) fn extract_api_key(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(api_key) = headers.get("X-API-Key") {
        if let Ok(key) = api_key.to_str() {
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }
    }

    if let Some(auth) = headers.get("Authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
    }

    Err(AuthError::MissingApiKey)
}

/// Mask API key for logging (show first 4 and last 4 characters)
pub(crate) fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 || !key.is_ascii() {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[derive(Debug)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
    InsufficientRole(Role),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingApiKey => write!(f, "Missing API key"),
            AuthError::InvalidApiKey => write!(f, "Invalid API key"),
            AuthError::InsufficientRole(role) => {
                write!(f, "Insufficient permissions. Required role: {}", role)
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingApiKey => StatusCode::UNAUTHORIZED,
            AuthError::InvalidApiKey | AuthError::InsufficientRole(_) => StatusCode::FORBIDDEN,
        };
        let message = match self {
            AuthError::MissingApiKey => {
                "Missing API key. Provide via X-API-Key header or Authorization: Bearer header."
                    .to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({
                "success": false,
                "data": null,
                "error": message,
            })),
        )
            .into_response()
    }
}

fn check_role(required: Role, request: &Request) -> Result<(), AuthError> {
    match request.extensions().get::<Identity>() {
        Some(identity) if identity.role >= required => Ok(()),
        _ => Err(AuthError::InsufficientRole(required)),
    }
}

/// Middleware to require the admin role. Must run after [`auth_middleware`].
pub async fn require_admin_middleware(request: Request, next: Next) -> Result<Response, AuthError> {
    check_role(Role::Admin, &request)?;
    Ok(next.run(request).await)
}
