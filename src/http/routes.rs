//! Router assembly.

use std::any::Any;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info_span, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::metrics::track_metrics;
use super::middleware::{authenticate, guard, rate_limit};
use super::movies;
use super::state::AppState;
use super::users;
use crate::auth::GateChain;

/// Build the application router.
///
/// Layers, outermost first: request metrics, request span, panic recovery,
/// CORS, rate limiter, credential resolver.
pub fn create_router(state: AppState) -> Router {
    let read = || GateChain::permission("movies:read");
    let write = || GateChain::permission("movies:write");

    let routes = Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route(
            "/v1/movies",
            guard(get(movies::list_movies), read(), &state)
                .merge(guard(post(movies::create_movie), write(), &state)),
        )
        .route(
            "/v1/movies/:id",
            guard(get(movies::show_movie), read(), &state)
                .merge(guard(patch(movies::update_movie), write(), &state))
                .merge(guard(delete(movies::delete_movie), write(), &state)),
        )
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(users::create_authentication_token),
        )
        .route("/debug/vars", get(debug_vars))
        .fallback(not_found)
        .with_state(state.clone());

    with_middleware(routes, &state)
}

/// Wrap `routes` in the global middleware stack.
pub(crate) fn with_middleware(routes: Router, state: &AppState) -> Router {
    routes
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors_layer(&state.config.cors.trusted_origins))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %Uuid::new_v4(),
                )
            }),
        )
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
}

/// CORS for the configured trusted origins, preflight included.
///
/// Origins that are not valid header values are skipped with a warning.
fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::OPTIONS,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(60))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "Handler panicked");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "the server encountered a problem and could not process your request"
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.server.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

async fn debug_vars(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
        "requests": state.metrics.snapshot(),
        "limiter": {
            "enabled": state.limiter.is_enabled(),
            "clients": state.limiter.client_count(),
        },
        "background": {
            "outstanding": state.background.outstanding(),
        },
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
