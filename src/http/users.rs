//! Registration, activation and token issuance.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ApiResult, JsonBody};
use super::state::AppState;
use crate::auth::{
    hash_password, is_well_formed, validate_password, verify_password, Scope, Token, TokenHash,
    TOKEN_PLAINTEXT_LEN,
};
use crate::concurrency;
use crate::notify::WELCOME_TEMPLATE;
use crate::store::{NewUser, UserFields};
use crate::validation::{looks_like_email, Validator};

/// Permissions every new account starts with.
const DEFAULT_PERMISSIONS: &[&str] = &["movies:read"];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(looks_like_email(email), "email", "must be a valid email address");
}

fn validate_token_plaintext(v: &mut Validator, token: &str) {
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
    v.check(is_well_formed(token), "token", "must be a valid token");
}

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    v.check(!input.name.is_empty(), "name", "must be provided");
    v.check(input.name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(&mut v, &input.email);
    validate_password(&mut v, &input.password);
    if !v.is_valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let password_hash = hash_password(&input.password, state.config.auth.bcrypt_cost).await?;
    let user = state
        .store
        .insert_user(NewUser {
            name: input.name,
            email: input.email,
            password_hash,
            activated: false,
        })
        .await?;

    state.store.add_permissions(user.id, DEFAULT_PERMISSIONS).await?;

    let token = Token::generate(
        user.id,
        state.config.auth.activation_token_ttl(),
        Scope::Activation,
        Utc::now(),
    );
    state.store.insert_token(&token).await?;
    info!(user_id = user.id, "Registered user");

    let notifier = Arc::clone(&state.notifier);
    let recipient = user.email.clone();
    let data = json!({
        "user_id": user.id,
        "activation_token": token.plaintext,
        "expiry": token.expiry.to_rfc3339(),
    });
    state.background.spawn("welcome_email", async move {
        notifier.send(&recipient, WELCOME_TEMPLATE, data).await
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.is_valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let hash = TokenHash::of(&input.token);
    let Some(mut user) = state
        .store
        .lookup_token_owner(&hash, Scope::Activation, Utc::now())
        .await?
    else {
        v.add_error("token", "invalid or expired activation token");
        return Err(ApiError::FailedValidation(v.into_errors()));
    };

    user.activated = true;
    let version = concurrency::commit(
        state.store.as_ref(),
        user.id,
        user.version,
        UserFields::from(&user),
    )
    .await?;
    user.version = version;

    state
        .store
        .delete_tokens_for_user(user.id, Scope::Activation)
        .await?;
    info!(user_id = user.id, "Activated user");

    Ok(Json(json!({ "user": user })))
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password(&mut v, &input.password);
    if !v.is_valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let user = state
        .store
        .get_user_by_email(&input.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&input.password, &user.password_hash).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = Token::generate(
        user.id,
        state.config.auth.authentication_token_ttl(),
        Scope::Authentication,
        Utc::now(),
    );
    state.store.insert_token(&token).await?;
    info!(user_id = user.id, "Issued authentication token");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        let mut v = Validator::new();
        validate_email(&mut v, "ada@example.com");
        assert!(v.is_valid());

        let mut v = Validator::new();
        validate_email(&mut v, "");
        assert_eq!(v.errors()["email"], "must be provided");

        let mut v = Validator::new();
        validate_email(&mut v, "not-an-email");
        assert_eq!(v.errors()["email"], "must be a valid email address");
    }

    #[test]
    fn test_validate_token_plaintext() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert!(v.is_valid());

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "short");
        assert_eq!(v.errors()["token"], "must be 26 bytes long");

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "abcdefghijklmnopqrstuvwxyz");
        assert_eq!(v.errors()["token"], "must be a valid token");
    }
}
