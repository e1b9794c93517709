use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use rptflow_contracts::{Decision, report_version_id_from_path};
use rptflow_policy::{AccessRequest, CallerClass, Evaluation};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::{
    ApiError, AppState, correlation_headers, extract_principal, extract_request_id,
    extract_trace_id, json_error,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RouteAccessRequest {
    path: String,
}

#[derive(Debug, Serialize)]
pub(super) struct RouteAccessResponse {
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

/// Runs in front of every guarded path. Proceeds to `next` or answers with a
/// temporary redirect.
pub(super) async fn guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = extract_request_id(request.headers());
    let trace_id = extract_trace_id(request.headers());
    let method = request.method().to_string();

    let span = tracing::info_span!(
        "route_access.evaluate",
        request_id = %request_id,
        trace_id = %trace_id,
        path = %request.uri().path(),
        report_version_id = tracing::field::Empty,
        rule = tracing::field::Empty,
        outcome = tracing::field::Empty,
        fetches = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let mut response = async move {
        let path = request.uri().path().to_string();
        let evaluation = evaluate(&state, request.headers(), &path).await;
        record(&evaluation, started);

        match evaluation.decision {
            Decision::Proceed => next.run(request).await,
            Decision::RedirectTo(location) => Redirect::temporary(&location).into_response(),
        }
    }
    .instrument(span)
    .await;

    response
        .headers_mut()
        .extend(correlation_headers(&request_id, &trace_id));
    crate::metrics::observe_http_request(
        "guarded",
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

pub(super) async fn proceed() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(super) async fn decide(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<RouteAccessRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<RouteAccessResponse>), ApiError> {
    let started = Instant::now();
    let request_id = extract_request_id(&headers);
    let trace_id = extract_trace_id(&headers);

    let span = tracing::info_span!(
        "route_access.evaluate",
        request_id = %request_id,
        trace_id = %trace_id,
        path = tracing::field::Empty,
        report_version_id = tracing::field::Empty,
        rule = tracing::field::Empty,
        outcome = tracing::field::Empty,
        fetches = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let result = async move {
        let Json(req) = req.map_err(|_| {
            json_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_PARAMS",
                "invalid JSON body".to_string(),
                false,
            )
        })?;

        let path = req.path.trim();
        if !path.starts_with('/') {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_PARAMS",
                "path must be an absolute request path".to_string(),
                false,
            ));
        }
        tracing::Span::current().record("path", path);

        let evaluation = evaluate(&state, &headers, path).await;
        record(&evaluation, started);

        Ok((
            correlation_headers(&request_id, &trace_id),
            Json(RouteAccessResponse {
                decision: evaluation.decision.as_str(),
                location: evaluation.decision.location().map(|l| l.to_string()),
            }),
        ))
    }
    .instrument(span)
    .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        "/v1/route-access",
        "POST",
        status.as_u16(),
        started.elapsed(),
    );
    result
}

/// Resolves the caller and asks the engine. Paths without a report id proceed
/// before identity is looked at; a caller that cannot be resolved on a report
/// path gets the fail-closed redirect without any report fetch.
async fn evaluate(state: &AppState, headers: &HeaderMap, path: &str) -> Evaluation {
    let Some(report_version_id) = report_version_id_from_path(path, &state.config.reports_segment)
    else {
        return Evaluation {
            decision: Decision::Proceed,
            report_version_id: None,
            rule: None,
            fetches: 0,
            fail_closed: false,
        };
    };

    let principal = match extract_principal(state, headers).await {
        Ok(principal) => principal,
        Err(err) => {
            tracing::warn!(
                code = err.code,
                message = %err.message,
                "caller identity unresolved; redirecting to fail-closed path"
            );
            return Evaluation {
                decision: Decision::RedirectTo(state.engine.config().fail_closed_path.clone()),
                report_version_id: Some(report_version_id),
                rule: None,
                fetches: 0,
                fail_closed: true,
            };
        }
    };

    let caller = if principal.has_identity_provider(&state.config.constrained_identity_provider) {
        CallerClass::Constrained
    } else {
        CallerClass::Unconstrained
    };

    state
        .engine
        .assess(&AccessRequest {
            path,
            caller,
            token: principal.identity_token(),
        })
        .await
}

fn record(evaluation: &Evaluation, started: Instant) {
    let span = tracing::Span::current();
    if let Some(id) = evaluation.report_version_id {
        span.record("report_version_id", id.get());
    }
    span.record("rule", evaluation.rule.unwrap_or("none"));
    span.record("fetches", evaluation.fetches as u64);
    span.record("latency_ms", started.elapsed().as_millis() as u64);

    let (outcome, rule_label) = if evaluation.fail_closed {
        ("fail_closed", "fail_closed")
    } else {
        (
            evaluation.decision.as_str(),
            evaluation.rule.unwrap_or("none"),
        )
    };
    span.record("outcome", outcome);

    tracing::info!(
        decision = evaluation.decision.as_str(),
        location = evaluation.decision.location().unwrap_or(""),
        "route access decided"
    );
    crate::metrics::observe_route_decision(evaluation.decision.as_str(), rule_label);
}
