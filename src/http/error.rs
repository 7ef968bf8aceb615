//! API error responses.
//!
//! Every failure a handler or middleware can produce ends up here and is
//! rendered as `{"error": ...}` with the matching status code.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{error, warn};

use crate::auth::{AccessError, AuthError, PasswordError};
use crate::concurrency::ConflictError;
use crate::ratelimit::ClientKeyError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    RateLimited,
    InvalidToken,
    InvalidCredentials,
    AuthenticationRequired,
    AccountInactive,
    NotPermitted,
    NotFound,
    BadRequest(String),
    FailedValidation(BTreeMap<String, String>),
    EditConflict,
    /// Server-side fault; the detail is logged and never sent to the client
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::Internal(detail.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidToken
            | ApiError::InvalidCredentials
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::AccountInactive | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> serde_json::Value {
        match self {
            ApiError::RateLimited => json!("rate limit exceeded"),
            ApiError::InvalidToken => json!("invalid or missing authentication token"),
            ApiError::InvalidCredentials => json!("invalid authentication credentials"),
            ApiError::AuthenticationRequired => {
                json!("you must be authenticated to access this resource")
            }
            ApiError::AccountInactive => {
                json!("your user account must be activated to access this resource")
            }
            ApiError::NotPermitted => json!(
                "your user account doesn't have the necessary permissions to access this resource"
            ),
            ApiError::NotFound => json!("the requested resource could not be found"),
            ApiError::BadRequest(message) => json!(message),
            ApiError::FailedValidation(errors) => json!(errors),
            ApiError::EditConflict => {
                json!("unable to update the record due to an edit conflict, please try again")
            }
            ApiError::Internal(_) => {
                json!("the server encountered a problem and could not process your request")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!(error = %detail, "Server error");
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.message() }))).into_response();
        if self == ApiError::InvalidToken {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RecordNotFound => ApiError::NotFound,
            StoreError::DuplicateEmail => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "email".to_string(),
                    "a user with this email address already exists".to_string(),
                );
                ApiError::FailedValidation(errors)
            }
            StoreError::Query(e) => ApiError::internal(e),
            StoreError::Unavailable(e) => ApiError::internal(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => ApiError::InvalidToken,
            AuthError::Transient(e) => ApiError::internal(e),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::AuthenticationRequired => ApiError::AuthenticationRequired,
            AccessError::AccountInactive => ApiError::AccountInactive,
            AccessError::NotPermitted => ApiError::NotPermitted,
            AccessError::Transient(e) => ApiError::internal(e),
        }
    }
}

impl From<ConflictError> for ApiError {
    fn from(err: ConflictError) -> Self {
        match err {
            ConflictError::EditConflict => ApiError::EditConflict,
            ConflictError::NotFound => ApiError::NotFound,
            ConflictError::Store(e) => e.into(),
        }
    }
}

impl From<ClientKeyError> for ApiError {
    fn from(err: ClientKeyError) -> Self {
        ApiError::internal(err)
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected request body");
        ApiError::BadRequest(rejection.body_text())
    }
}

/// JSON body extractor whose rejections use the API error envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}
