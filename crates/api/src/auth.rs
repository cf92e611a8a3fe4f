//! Bearer-token authentication.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use event_store::EventStore;
use thiserror::Error;

use crate::AppState;
use crate::error::ApiError;

/// Resolves a bearer token to the user it belongs to.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns `None` when the token is unknown.
    async fn authenticate(&self, token: &str) -> Option<UserId>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("token entry `{0}` is not of the form token=user-id")]
    MalformedEntry(String),

    #[error("user id `{0}` is not a valid UUID")]
    InvalidUserId(String),
}

/// Fixed token table, typically loaded from `API_TOKENS`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }

    /// Parses `token=user-uuid` pairs separated by commas.
    pub fn parse(table: &str) -> Result<Self, TokenParseError> {
        let mut tokens = HashMap::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, user) = entry
                .split_once('=')
                .map(|(t, u)| (t.trim(), u.trim()))
                .filter(|(t, u)| !t.is_empty() && !u.is_empty())
                .ok_or_else(|| TokenParseError::MalformedEntry(entry.to_string()))?;
            let user_id = user
                .parse()
                .map_err(|_| TokenParseError::InvalidUserId(user.to_string()))?;
            tokens.insert(token.to_string(), user_id);
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

/// The user a request was authenticated as.
///
/// Handlers taking this extractor reject requests without a known bearer
/// token before touching any cart.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl<S> FromRequestParts<Arc<AppState<S>>> for AuthUser
where
    S: EventStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            ApiError::Unauthorized("missing or invalid Authorization header".into())
        })?;

        match state.authenticator.authenticate(token).await {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => Err(ApiError::Unauthorized("invalid API token".into())),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}
