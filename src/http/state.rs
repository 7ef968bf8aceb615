//! Shared state for HTTP handlers and middleware.

use std::sync::Arc;

use crate::background::BackgroundTasks;
use crate::config::MarqueeConfig;
use crate::notify::Notifier;
use crate::ratelimit::ClientRateLimiter;
use crate::store::Store;

use super::metrics::RequestMetrics;

/// Everything a request may touch.
///
/// The lifecycle orchestrator builds one of these and hands it to the router;
/// nothing here is a process global.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub limiter: Arc<ClientRateLimiter>,
    pub background: BackgroundTasks,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<MarqueeConfig>,
    pub metrics: Arc<RequestMetrics>,
}

impl AppState {
    pub fn new(
        config: MarqueeConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let limiter = Arc::new(ClientRateLimiter::from_config(&config.limiter));
        Self {
            store,
            limiter,
            background: BackgroundTasks::new(),
            notifier,
            config: Arc::new(config),
            metrics: Arc::new(RequestMetrics::new()),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("limiter", &self.limiter)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}
