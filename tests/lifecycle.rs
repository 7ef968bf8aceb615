//! Serving over a real socket and shutting down.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use marquee::background::DrainOutcome;
use marquee::config::MarqueeConfig;
use marquee::lifecycle::{Lifecycle, Phase};
use marquee::notify::LogNotifier;
use marquee::store::MemoryStore;

async fn raw_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_serves_then_drains_on_shutdown() {
    let mut config = MarqueeConfig::default();
    config.shutdown.grace_period_secs = 5;
    let lifecycle = Lifecycle::new(config);
    let mut phases = lifecycle.subscribe();

    let state = lifecycle.build_state(Arc::new(MemoryStore::new()), Arc::new(LogNotifier::new()));
    let background = state.background.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let run = lifecycle.serve(listener, state, async move {
        let _ = stopped.await;
    });

    let client = async {
        phases.wait_for(|p| *p == Phase::Serving).await.unwrap();

        let response = raw_get(addr, "/v1/healthcheck").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("\"status\":\"available\""));

        let response = raw_get(addr, "/v1/movies").await;
        assert!(response.starts_with("HTTP/1.1 401"), "{response}");

        background.spawn("slow_email", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, String>(())
        });
        stop.send(()).unwrap();
    };

    let (report, ()) = tokio::join!(run, client);
    let report = report.unwrap();
    assert_eq!(report.drain, DrainOutcome::Drained);
    assert!(!report.requests_abandoned);
    assert_eq!(background.outstanding(), 0);
    assert_eq!(lifecycle.phase(), Phase::Stopped);

    // The listener is gone once serve returns
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_rate_limit_over_socket() {
    let mut config = MarqueeConfig::default();
    config.limiter.rps = 0.5;
    config.limiter.burst = 2;
    config.shutdown.grace_period_secs = 5;
    let lifecycle = Lifecycle::new(config);
    let mut phases = lifecycle.subscribe();

    let state = lifecycle.build_state(Arc::new(MemoryStore::new()), Arc::new(LogNotifier::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let run = lifecycle.serve(listener, state, async move {
        let _ = stopped.await;
    });

    let client = async {
        phases.wait_for(|p| *p == Phase::Serving).await.unwrap();
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = raw_get(addr, "/v1/healthcheck").await;
            statuses.push(response[9..12].to_string());
        }
        stop.send(()).unwrap();
        statuses
    };

    let (report, statuses) = tokio::join!(run, client);
    assert!(report.is_ok());
    assert_eq!(statuses, ["200", "200", "429"]);
}
