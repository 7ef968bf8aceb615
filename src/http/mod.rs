//! JSON HTTP API.
//!
//! | Endpoint | Method | Gate |
//! |----------|--------|------|
//! | `/v1/healthcheck` | GET | none |
//! | `/v1/movies` | GET | `movies:read` |
//! | `/v1/movies` | POST | `movies:write` |
//! | `/v1/movies/:id` | GET | `movies:read` |
//! | `/v1/movies/:id` | PATCH | `movies:write` |
//! | `/v1/movies/:id` | DELETE | `movies:write` |
//! | `/v1/users` | POST | none |
//! | `/v1/users/activated` | PUT | none |
//! | `/v1/tokens/authentication` | POST | none |
//! | `/debug/vars` | GET | none |

mod error;
mod metrics;
mod middleware;
mod movies;
mod routes;
mod state;
mod users;

pub use error::{ApiError, ApiResult, JsonBody};
pub use metrics::{MetricsSnapshot, RequestMetrics};
pub use middleware::{guard, CurrentIdentity};
pub use movies::EXPECTED_VERSION_HEADER;
pub use routes::create_router;
pub use state::AppState;
