//! Caller identity.
//!
//! Authentication happens upstream; the gateway in front of this service
//! forwards the verified subject in `x-account-id` (plus optional profile
//! headers). The first request from a new subject creates its account with
//! the configured initial grant.

use archrender_types::{Account, Role};
use axum::{extract::FromRequestParts, http::request::Parts};

use super::AppState;
use crate::error::ServiceError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_EMAIL_HEADER: &str = "x-account-email";
pub const ACCOUNT_NAME_HEADER: &str = "x-account-name";

/// The signed-in account, resolved (or created) from the identity headers
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| ServiceError::Internal("application state missing".to_string()))?;

        let external_id = header(parts, ACCOUNT_ID_HEADER).ok_or(ServiceError::Unauthenticated)?;
        let role = if state.config.is_admin_account(external_id) {
            Role::Admin
        } else {
            Role::User
        };
        let account = state.db.ensure_account(
            external_id,
            header(parts, ACCOUNT_EMAIL_HEADER),
            header(parts, ACCOUNT_NAME_HEADER),
            state.config.initial_tokens,
            role,
        )?;
        Ok(CurrentAccount(account))
    }
}
