//! Request-scoped authentication.
//!
//! The session is resolved once per request from `Authorization: Bearer
//! <uuid>` and handed to the handler as a typed extractor; handlers pass the
//! resulting account id explicitly to the operations they call.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use mkp_db::{Account, SessionSubject};
use mkp_ledger::MarketError;

use crate::{error::ApiError, state::AppState};

/// Parse the bearer token, if any. A present but malformed header is treated
/// the same as a missing one.
pub fn bearer_token(parts: &Parts) -> Option<Uuid> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    Uuid::parse_str(token.trim()).ok()
}

async fn resolve(parts: &Parts, st: &AppState) -> Result<SessionSubject, ApiError> {
    let token = bearer_token(parts).ok_or(MarketError::Unauthenticated)?;
    let subject = mkp_db::resolve_session(&st.db, token, st.settings.session_max_age)
        .await?
        .ok_or(MarketError::Unauthenticated)?;
    Ok(subject)
}

/// Any valid session (account or admin).
#[derive(Debug, Clone)]
pub struct Session(pub SessionSubject);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, ApiError> {
        Ok(Session(resolve(parts, st).await?))
    }
}

/// A logged-in, non-banned marketplace account.
#[derive(Debug, Clone)]
pub struct AuthedAccount {
    pub token: Uuid,
    pub account: Account,
}

impl AuthedAccount {
    pub fn id(&self) -> i64 {
        self.account.id
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthedAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, ApiError> {
        let subject = resolve(parts, st).await?;
        match subject.account {
            Some(account) => Ok(AuthedAccount {
                token: subject.token,
                account,
            }),
            None => Err(MarketError::forbidden("an account session is required").into()),
        }
    }
}

/// An admin session issued by `POST /v1/admin/login`.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub token: Uuid,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, ApiError> {
        let subject = resolve(parts, st).await?;
        if !subject.is_admin {
            return Err(MarketError::forbidden("admin session required").into());
        }
        Ok(AdminSession {
            token: subject.token,
        })
    }
}
