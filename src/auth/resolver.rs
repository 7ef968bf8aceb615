//! Bearer credential resolution.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use super::identity::Identity;
use super::token::{is_well_formed, Scope, TokenHash};
use crate::store::{StoreError, TokenStore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid or missing authentication token")]
    InvalidToken,

    #[error("Credential lookup failed: {0}")]
    Transient(#[from] StoreError),
}

/// Turn an `Authorization` header value into an [`Identity`].
///
/// A missing header is anonymous. Anything other than `Bearer <token>` with
/// a well-formed, unexpired authentication token is [`AuthError::InvalidToken`].
/// The result depends only on the header, the store contents and `now`.
pub async fn resolve<S>(
    header: Option<&str>,
    store: &S,
    now: DateTime<Utc>,
) -> Result<Identity, AuthError>
where
    S: TokenStore + ?Sized,
{
    let Some(header) = header else {
        return Ok(Identity::Anonymous);
    };

    let mut parts = header.split(' ');
    let plaintext = match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => token,
        _ => return Err(AuthError::InvalidToken),
    };

    if !is_well_formed(plaintext) {
        return Err(AuthError::InvalidToken);
    }

    let hash = TokenHash::of(plaintext);
    match store
        .lookup_token_owner(&hash, Scope::Authentication, now)
        .await?
    {
        Some(user) => {
            debug!(user_id = user.id, "Resolved bearer token");
            Ok(Identity::Authenticated(user))
        }
        None => Err(AuthError::InvalidToken),
    }
}
