//! Request pipeline middleware: admission, credential resolution, gates.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use axum::async_trait;
use chrono::Utc;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::{self, GateChain, Identity};
use crate::ratelimit::{ClientKey, ClientKeyError};

/// Reject clients that have exhausted their bucket.
///
/// The peer address comes from the listener's connect info, or from
/// `MockConnectInfo` when the router is driven without a socket.
pub async fn rate_limit(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let peer = peer.map(|ConnectInfo(addr)| addr);
    let key = client_key(&state, peer.as_ref(), &request)?;
    if !state.limiter.admit(&key) {
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}

fn client_key(
    state: &AppState,
    peer: Option<&SocketAddr>,
    request: &Request,
) -> Result<ClientKey, ClientKeyError> {
    let forwarded = match &state.config.limiter.forwarded_header {
        Some(name) => match request.headers().get(name.as_str()) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| ClientKeyError::Malformed(format!("{:?}", value)))?,
            ),
            None => None,
        },
        None => None,
    };

    ClientKey::derive(peer, forwarded)
}

/// Resolve the bearer credential and attach the [`Identity`] to the request.
///
/// Every response that passes through here varies on `Authorization`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match authorization_header(&request) {
        Ok(credential) => match resolve_identity(&state, credential).await {
            Ok(identity) => {
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            Err(e) => e.into_response(),
        },
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Owned copy of the `Authorization` header, so nothing borrowed from the
/// request is held across the store lookup.
fn authorization_header(request: &Request) -> Result<Option<String>, ApiError> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .map(str::to_owned)
                .map_err(|_| ApiError::InvalidToken)
        })
        .transpose()
}

async fn resolve_identity(state: &AppState, header: Option<String>) -> Result<Identity, ApiError> {
    Ok(auth::resolve(header.as_deref(), state.store.as_ref(), Utc::now()).await?)
}

/// The identity resolved for the current request.
///
/// Extracting it on a route the credential resolver did not run on is a
/// wiring bug and fails that request with a 500.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| ApiError::internal("identity read before credential resolution"))
    }
}

#[derive(Clone)]
struct GateState {
    app: AppState,
    chain: Arc<GateChain>,
}

/// Put `route` behind `chain`.
///
/// The chain is checked after credential resolution and before the handler.
pub fn guard(
    route: MethodRouter<AppState>,
    chain: GateChain,
    state: &AppState,
) -> MethodRouter<AppState> {
    let gate_state = GateState {
        app: state.clone(),
        chain: Arc::new(chain),
    };
    route.route_layer(middleware::from_fn_with_state(gate_state, check_gates))
}

async fn check_gates(
    State(gates): State<GateState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Cloned so no borrow of the request is held across the permission load
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| ApiError::internal("gate checked before credential resolution"))?;
    gates
        .chain
        .check(&identity, gates.app.store.as_ref())
        .await?;
    Ok(next.run(request).await)
}
