//! Integration tests for the HTTP fetcher against a local exporter stub

use axum::{Router, http::StatusCode, routing::get};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use uyuni_metrics::{HttpFetcher, MetricsSource};

const PAYLOAD: &str = r#"# HELP salt_jobs Salt jobs in the last 24 hours
# TYPE salt_jobs gauge
salt_jobs{fun="state.apply",name="salt_jobs_state.apply_total"} 7.0
salt_jobs{fun="test.ping",name="salt_jobs_test.ping_total"} 2.0
# HELP salt_master_stats Some stats from Salt master
# TYPE salt_master_stats gauge
salt_master_stats{name="salt_master_zeromq_alived_minions_total"} 5.0
# HELP uyuni_summary Some relevant metrics in the context of Uyuni
# TYPE uyuni_summary gauge
uyuni_summary{name="uyuni_summary_channels_total"} 12.0
python_gc_objects_collected_total{generation="0"} 1234.0
"#;

/// Serve the router on an ephemeral local port
async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_fetch_parses_exporter_payload() {
    let addr = serve(Router::new().route("/", get(|| async { PAYLOAD }))).await;

    let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
    let snapshot = fetcher.fetch("127.0.0.1", addr.port()).await.unwrap();

    assert_eq!(snapshot.salt_jobs().len(), 2);
    assert_eq!(snapshot.salt_jobs().get("state.apply"), Some(7.0));
    assert_eq!(
        snapshot
            .salt_master_stats()
            .get("salt_master_zeromq_alived_minions_total"),
        Some(5.0)
    );
    assert_eq!(
        snapshot.uyuni_summary().get("uyuni_summary_channels_total"),
        Some(12.0)
    );
}

#[tokio::test]
async fn test_fetch_raw_returns_body() {
    let addr = serve(Router::new().route("/", get(|| async { "up 1\n" }))).await;

    let fetcher = HttpFetcher::new(None).unwrap();
    let body = fetcher.fetch_raw("127.0.0.1", addr.port()).await.unwrap();
    assert_eq!(body, "up 1\n");
}

#[tokio::test]
async fn test_fetch_error_status_is_network_failure() {
    let app = Router::new().route(
        "/",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "collector crashed") }),
    );
    let addr = serve(app).await;

    let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
    let err = fetcher.fetch("127.0.0.1", addr.port()).await.unwrap_err();
    assert!(err.is_network());
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_fetch_closed_port_is_network_failure() {
    // Reserve a port, then release it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
    let err = fetcher.fetch("127.0.0.1", port).await.unwrap_err();
    assert!(err.is_network());
}
