//! Process lifecycle: startup, serving, graceful shutdown.
//!
//! ```text
//! Starting -> Serving -> Draining -> Stopped
//!     \          \           \
//!      +----------+-----------+--> Faulted
//! ```
//!
//! One deadline, taken when the shutdown signal arrives, bounds both the
//! wait for in-flight requests and the background drain.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::background::DrainOutcome;
use crate::config::MarqueeConfig;
use crate::error::{MarqueeError, Result};
use crate::http::{create_router, AppState};
use crate::notify::Notifier;
use crate::store::Store;

/// Lifecycle phase, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Serving,
    Draining,
    Stopped,
    Faulted,
}

/// How a completed shutdown went.
///
/// A degraded shutdown still counts as a clean exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// In-flight requests were still running at the deadline
    pub requests_abandoned: bool,
    pub drain: DrainOutcome,
}

impl ShutdownReport {
    pub fn is_degraded(&self) -> bool {
        self.requests_abandoned || self.drain != DrainOutcome::Drained
    }
}

/// Owns the server for its whole life.
pub struct Lifecycle {
    config: Arc<MarqueeConfig>,
    phase: watch::Sender<Phase>,
}

impl Lifecycle {
    pub fn new(config: MarqueeConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Starting);
        Self {
            config: Arc::new(config),
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn transition(&self, next: Phase) {
        let previous = self.phase.send_replace(next);
        info!(from = ?previous, to = ?next, "Lifecycle transition");
    }

    /// Build the shared request state around `store` and `notifier`.
    pub fn build_state(&self, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> AppState {
        AppState::new(self.config.as_ref().clone(), store, notifier)
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(
        &self,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        shutdown: F,
    ) -> Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.config.server.addr;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(addr = %addr, error = %source, "Failed to bind listener");
                self.transition(Phase::Faulted);
                return Err(MarqueeError::Bind { addr, source });
            }
        };

        let state = self.build_state(store, notifier);
        self.serve(listener, state, shutdown).await
    }

    /// Serve on an already bound `listener` until `shutdown` resolves.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        state: AppState,
        shutdown: F,
    ) -> Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send,
    {
        let router = create_router(state.clone());
        self.serve_router(listener, router, state, shutdown).await
    }

    async fn serve_router<F>(
        &self,
        listener: TcpListener,
        router: Router,
        state: AppState,
        shutdown: F,
    ) -> Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server: JoinHandle<io::Result<()>> = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
        });
        info!(addr = %local_addr, "Serving HTTP");

        self.supervise(server, stop_tx, &state, shutdown).await
    }

    /// Drive a running server task through serving and shutdown.
    ///
    /// `stop` asks the server to stop accepting; the task's result is the
    /// listener outcome.
    async fn supervise<F>(
        &self,
        mut server: JoinHandle<io::Result<()>>,
        stop: oneshot::Sender<()>,
        state: &AppState,
        shutdown: F,
    ) -> Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send,
    {
        let sweeper = if state.limiter.is_enabled() {
            Some(state.limiter.spawn_sweeper(
                self.config.limiter.sweep_interval(),
                self.config.limiter.idle_threshold(),
            ))
        } else {
            None
        };

        self.transition(Phase::Serving);

        // The server only finishes on its own if the listener failed
        let early_exit = tokio::select! {
            _ = shutdown => None,
            result = &mut server => Some(flatten(result)),
        };
        let deadline = Instant::now() + self.config.shutdown.grace_period();

        if let Some(result) = early_exit {
            let e = result
                .err()
                .unwrap_or_else(|| io::Error::other("listener stopped before shutdown was requested"));
            error!(error = %e, "HTTP listener failed");
            self.transition(Phase::Faulted);
            state.background.drain_until(deadline).await;
            abort_sweeper(sweeper);
            return Err(MarqueeError::Listener(e));
        }

        self.transition(Phase::Draining);
        let _ = stop.send(());

        let mut requests_abandoned = false;
        let listener_result = match tokio::time::timeout_at(deadline, &mut server).await {
            Ok(result) => flatten(result),
            Err(_) => {
                warn!("In-flight requests still running at shutdown deadline");
                server.abort();
                requests_abandoned = true;
                Ok(())
            }
        };

        let drain = state.background.drain_until(deadline).await;
        abort_sweeper(sweeper);

        if let Err(e) = listener_result {
            error!(error = %e, "HTTP listener failed during shutdown");
            self.transition(Phase::Faulted);
            return Err(MarqueeError::Listener(e));
        }

        let report = ShutdownReport {
            requests_abandoned,
            drain,
        };
        if report.is_degraded() {
            warn!(report = ?report, "Shutdown completed in degraded state");
        }
        self.transition(Phase::Stopped);
        Ok(report)
    }
}

fn abort_sweeper(sweeper: Option<JoinHandle<()>>) {
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
}

fn flatten(result: std::result::Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match result {
        Ok(inner) => inner,
        Err(join_error) => Err(io::Error::other(join_error.to_string())),
    }
}
