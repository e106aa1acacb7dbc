//! Readiness probe tests against a local health endpoint

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use provisioner::deploy::probe::{HttpReadinessProbe, ProbeOptions, ReadinessProbe, PING_ROUTE};
use provisioner::errors::DeployError;

/// Serve a health endpoint failing `failures` times before answering 200
async fn serve_health(failures: u32) -> (String, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));

    async fn ping(State((calls, failures)): State<(Arc<AtomicU32>, u32)>) -> StatusCode {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        }
    }

    let app = Router::new()
        .route(PING_ROUTE, get(ping))
        .with_state((calls.clone(), failures));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), calls)
}

fn options(max_attempts: u32) -> ProbeOptions {
    ProbeOptions {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        max_attempts,
    }
}

#[tokio::test]
async fn test_ready_after_failures() {
    let (uri, calls) = serve_health(3).await;
    let probe = HttpReadinessProbe::new(options(10)).unwrap();

    let attempts = probe.wait_until_ready(&uri, &CancellationToken::new()).await.unwrap();
    assert_eq!(attempts, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_attempts_exhausted() {
    let (uri, calls) = serve_health(u32::MAX).await;
    let probe = HttpReadinessProbe::new(options(3)).unwrap();

    let err = probe
        .wait_until_ready(&uri, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::ReadinessTimeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancellation_stops_polling() {
    let (uri, _) = serve_health(u32::MAX).await;
    let probe = HttpReadinessProbe::new(ProbeOptions {
        interval: Duration::from_secs(1),
        timeout: Duration::from_secs(30),
        max_attempts: 100,
    })
    .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = probe.wait_until_ready(&uri, &cancel).await.unwrap_err();
    assert!(matches!(err, DeployError::Cancelled(_)));
}

#[tokio::test]
async fn test_unreachable_instance_times_out() {
    let probe = HttpReadinessProbe::new(ProbeOptions {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(300),
        max_attempts: 1000,
    })
    .unwrap();

    let err = probe
        .wait_until_ready("http://127.0.0.1:9", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::ReadinessTimeout(_)));
}
