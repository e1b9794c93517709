//! Shared fixtures for the full-stack smoke tests: an in-process stand-in for
//! the reporting API and helpers to run axum apps on ephemeral ports.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct ReportFixture {
    pub registration_purpose: &'static str,
    pub operation_type: &'static str,
    pub report_status: &'static str,
    pub needs_verification: bool,
    pub is_supplementary: bool,
}

impl ReportFixture {
    pub fn draft(registration_purpose: &'static str) -> Self {
        Self {
            registration_purpose,
            operation_type: "Single Facility Operation",
            report_status: "Draft",
            needs_verification: false,
            is_supplementary: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockReportApi {
    reports: Arc<HashMap<i64, ReportFixture>>,
    hits: Arc<AtomicUsize>,
    identities: Arc<Mutex<Vec<String>>>,
}

impl MockReportApi {
    pub fn new(reports: impl IntoIterator<Item = (i64, ReportFixture)>) -> Self {
        Self {
            reports: Arc::new(reports.into_iter().collect()),
            hits: Arc::new(AtomicUsize::new(0)),
            identities: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Caller identities forwarded by the gateway, in arrival order.
    pub fn identities(&self) -> Vec<String> {
        self.identities
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/reporting/report-version/{id}/{endpoint}",
                get(report_state),
            )
            .with_state(self.clone())
    }
}

async fn report_state(
    State(api): State<MockReportApi>,
    Path((id, endpoint)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Response {
    api.hits.fetch_add(1, Ordering::SeqCst);

    let identity = headers
        .get("authorization")
        .or_else(|| headers.get("x-rptflow-user-guid"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if let Ok(mut ids) = api.identities.lock() {
        ids.push(identity);
    }

    let Some(report) = api.reports.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let body = match endpoint.as_str() {
        "registration-purpose" => {
            serde_json::json!({ "registration_purpose": report.registration_purpose })
        }
        "report-operation" => serde_json::json!({
            "operation_type": report.operation_type,
            "report_status": report.report_status,
        }),
        "report-needs-verification" => serde_json::json!(report.needs_verification),
        "is-supplementary-report-version" => serde_json::json!(report.is_supplementary),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    axum::Json(body).into_response()
}

pub async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

pub async fn wait_for_healthz(client: &reqwest::Client, addr: SocketAddr) {
    let url = format!("http://{}/healthz", addr);

    for _ in 0..50 {
        if let Ok(response) = client.get(&url).send().await
            && response.status().is_success()
        {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    panic!("server at {} did not become healthy", addr);
}

/// Client that reports redirects instead of following them.
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client should build")
}
