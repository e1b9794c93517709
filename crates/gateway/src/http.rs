use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rptflow_auth::{AuthError, OidcAuthenticator, Principal};
use rptflow_contracts::ReportRoutes;
use rptflow_policy::{AccessEngine, EngineConfig, ReportStateSource, standard_rule_set};
use serde::Serialize;
use ulid::Ulid;

use crate::backend::BackendClient;
use crate::config::{AuthMode, GatewayConfig, StartupError};

mod route_access;

pub const REQUEST_ID_HEADER: &str = "x-rptflow-request-id";
pub const TRACE_ID_HEADER: &str = "x-rptflow-trace-id";

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    oidc: Option<OidcAuthenticator>,
    engine: Arc<AccessEngine>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

impl AppState {
    pub fn new(
        config: GatewayConfig,
        oidc: Option<OidcAuthenticator>,
        source: Arc<dyn ReportStateSource>,
    ) -> Self {
        let engine = AccessEngine::new(
            standard_rule_set(),
            source,
            EngineConfig {
                reports_segment: config.reports_segment.clone(),
                routes: ReportRoutes::new(&config.reports_base),
                fail_closed_path: config.fail_closed_path.clone(),
            },
        );

        Self {
            config,
            oidc,
            engine: Arc::new(engine),
        }
    }
}

pub async fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let oidc = if config.auth_mode == AuthMode::Oidc {
        let oidc_config = config.oidc.clone().ok_or_else(|| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "oidc auth mode requires oidc config".to_string(),
        })?;

        Some(
            OidcAuthenticator::new(oidc_config)
                .await
                .map_err(|err| StartupError {
                    code: err.code,
                    message: err.message,
                })?,
        )
    } else {
        None
    };

    let backend = BackendClient::new(
        config.backend_url.clone(),
        Duration::from_millis(config.backend_timeout_ms),
    )
    .map_err(|_| StartupError {
        code: "ERR_BACKEND_UNAVAILABLE",
        message: "failed to initialize report API client".to_string(),
    })?;

    tracing::info!(
        backend_url = %config.backend_url,
        reports_base = %config.reports_base,
        constrained_identity_provider = %config.constrained_identity_provider,
        "route access engine configured"
    );

    Ok(app(AppState::new(config, oidc, Arc::new(backend))))
}

/// Operational and decision routes; every other path is guarded by the
/// route access middleware and answers `204` when the request may proceed.
pub fn app(state: AppState) -> Router {
    let guarded = Router::new()
        .fallback(route_access::proceed)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            route_access::guard,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/v1/route-access", post(route_access::decide))
        .fallback_service(guarded)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn extract_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, AuthError> {
    match state.config.auth_mode {
        AuthMode::Local => rptflow_auth::local_principal(headers),
        AuthMode::Oidc => {
            let Some(auth) = state.oidc.as_ref() else {
                return Err(AuthError {
                    code: "ERR_INTERNAL",
                    message: "oidc authenticator is not initialized".to_string(),
                });
            };
            auth.authenticate(headers).await
        }
    }
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn extract_trace_id(headers: &HeaderMap) -> String {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<Ulid>().ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

fn correlation_headers(request_id: &str, trace_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        headers.insert(TRACE_ID_HEADER, value);
    }
    headers
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    retryable: bool,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
    retryable: bool,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
            retryable,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rptflow_auth::{IDENTITY_PROVIDER_HEADER, USER_GUID_HEADER};
    use rptflow_contracts::{
        IdentityToken, OperationSummary, OperationType, RegistrationPurpose, ReportStatus,
        ReportVersionId,
    };
    use rptflow_policy::FetchError;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    struct StaticSource {
        purpose: RegistrationPurpose,
        summary: OperationSummary,
        verification_required: bool,
        unavailable: bool,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn draft() -> Self {
            Self {
                purpose: RegistrationPurpose::RegulatedOperation,
                summary: OperationSummary {
                    operation_type: OperationType::SingleFacility,
                    status: ReportStatus::Draft,
                },
                verification_required: false,
                unavailable: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn answer<T>(&self, value: T) -> Result<T, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                Err(FetchError::Unavailable("connection refused".to_string()))
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl ReportStateSource for StaticSource {
        async fn registration_purpose(
            &self,
            _id: ReportVersionId,
            _token: &IdentityToken,
        ) -> Result<RegistrationPurpose, FetchError> {
            self.answer(self.purpose)
        }

        async fn operation_summary(
            &self,
            _id: ReportVersionId,
            _token: &IdentityToken,
        ) -> Result<OperationSummary, FetchError> {
            self.answer(self.summary)
        }

        async fn verification_required(
            &self,
            _id: ReportVersionId,
            _token: &IdentityToken,
        ) -> Result<bool, FetchError> {
            self.answer(self.verification_required)
        }

        async fn is_supplementary(
            &self,
            _id: ReportVersionId,
            _token: &IdentityToken,
        ) -> Result<bool, FetchError> {
            self.answer(false)
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig::from_kv(&HashMap::from([(
            "RPTFLOW_BACKEND_URL".to_string(),
            "http://127.0.0.1:9".to_string(),
        )]))
        .expect("test config should load")
    }

    async fn spawn_app(source: Arc<StaticSource>) -> (SocketAddr, oneshot::Sender<()>) {
        let app = app(AppState::new(test_config(), None, source));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local_addr should succeed");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        (addr, shutdown_tx)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("client should build")
    }

    fn as_industry_user(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(USER_GUID_HEADER, "ba2ba62a-1218-4d57")
            .header(IDENTITY_PROVIDER_HEADER, "bceidbusiness")
    }

    #[test]
    fn sanitize_request_id_keeps_safe_characters() {
        assert_eq!(
            sanitize_request_id("req 01/<script>"),
            Some("req01script".to_string())
        );
        assert_eq!(sanitize_request_id("%%%"), None);
        assert_eq!(sanitize_request_id(&"a".repeat(100)).map(|s| s.len()), Some(64));
    }

    #[test]
    fn trace_id_must_be_a_ulid() {
        let ulid = Ulid::new().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, ulid.parse().unwrap());
        assert_eq!(extract_trace_id(&headers), ulid);

        headers.insert(TRACE_ID_HEADER, "not-a-ulid".parse().unwrap());
        let generated = extract_trace_id(&headers);
        assert_ne!(generated, "not-a-ulid");
        assert!(generated.parse::<Ulid>().is_ok());
    }

    #[tokio::test]
    async fn guarded_path_redirects_with_temporary_status() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source.clone()).await;

        let resp = as_industry_user(
            client().get(format!("http://{}/reports/42/verification", addr)),
        )
        .header(REQUEST_ID_HEADER, "req_guard_01")
        .send()
        .await
        .expect("request should succeed");

        assert_eq!(resp.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            resp.headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("/reports/42/review-operation-information")
        );
        assert_eq!(
            resp.headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("req_guard_01")
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn guarded_path_proceeds_with_no_content() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source).await;

        let resp = as_industry_user(
            client().get(format!("http://{}/reports/42/facilities/7/activities", addr)),
        )
        .send()
        .await
        .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn unconstrained_callers_never_touch_the_backend() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source.clone()).await;

        let resp = client()
            .get(format!("http://{}/reports/42/verification", addr))
            .header(USER_GUID_HEADER, "58f255ed-8d46-44ee")
            .header(IDENTITY_PROVIDER_HEADER, "idir")
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn missing_identity_fails_closed() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source.clone()).await;

        let resp = client()
            .get(format!("http://{}/reports/42/final-review", addr))
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            resp.headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("/onboarding")
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn paths_without_report_id_proceed_without_identity() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source.clone()).await;

        for path in ["/onboarding", "/dashboard", "/reports/abc", "/reports"] {
            let resp = client()
                .get(format!("http://{}{}", addr, path))
                .send()
                .await
                .expect("request should succeed");
            assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT, "{}", path);
            assert!(resp.headers().get(reqwest::header::LOCATION).is_none(), "{}", path);
        }

        let resp = client()
            .post(format!("http://{}/v1/route-access", addr))
            .json(&serde_json::json!({"path": "/onboarding"}))
            .send()
            .await
            .expect("request should succeed");
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body, serde_json::json!({"decision": "proceed"}));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn decision_api_ignores_query_and_fragment() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source).await;

        for path in [
            "/reports/42/verification?tab=1",
            "/reports/42/verification#summary",
        ] {
            let resp = as_industry_user(client().post(format!("http://{}/v1/route-access", addr)))
                .json(&serde_json::json!({ "path": path }))
                .send()
                .await
                .expect("request should succeed");
            let body: serde_json::Value = resp.json().await.expect("json body");
            assert_eq!(
                body,
                serde_json::json!({
                    "decision": "redirect",
                    "location": "/reports/42/review-operation-information"
                }),
                "{}",
                path
            );
        }

        let resp = as_industry_user(client().get(format!(
            "http://{}/reports/42/verification?tab=1",
            addr
        )))
        .send()
        .await
        .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn decision_api_reports_redirects_and_fail_closed() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source).await;

        let resp = as_industry_user(client().post(format!("http://{}/v1/route-access", addr)))
            .json(&serde_json::json!({"path": "/reports/42/submitted"}))
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(
            body,
            serde_json::json!({
                "decision": "redirect",
                "location": "/reports/42/review-operation-information"
            })
        );

        let resp = as_industry_user(client().post(format!("http://{}/v1/route-access", addr)))
            .json(&serde_json::json!({"path": "/dashboard"}))
            .send()
            .await
            .expect("request should succeed");
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body, serde_json::json!({"decision": "proceed"}));

        let _ = shutdown.send(());

        let mut unavailable = StaticSource::draft();
        unavailable.unavailable = true;
        let (addr, shutdown) = spawn_app(Arc::new(unavailable)).await;
        let resp = as_industry_user(client().post(format!("http://{}/v1/route-access", addr)))
            .json(&serde_json::json!({"path": "/reports/42/verification"}))
            .send()
            .await
            .expect("request should succeed");
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(
            body,
            serde_json::json!({"decision": "redirect", "location": "/onboarding"})
        );

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn decision_api_rejects_invalid_bodies() {
        let (addr, shutdown) = spawn_app(Arc::new(StaticSource::draft())).await;

        let resp = as_industry_user(client().post(format!("http://{}/v1/route-access", addr)))
            .json(&serde_json::json!({"path": "reports/42"}))
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(body["code"], "ERR_INVALID_PARAMS");

        let resp = as_industry_user(client().post(format!("http://{}/v1/route-access", addr)))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{\"route\":1}")
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn operational_routes_are_not_guarded() {
        let source = Arc::new(StaticSource::draft());
        let (addr, shutdown) = spawn_app(source.clone()).await;

        let resp = client()
            .get(format!("http://{}/healthz", addr))
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "ok");

        let resp = client()
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        let _ = shutdown.send(());
    }
}
