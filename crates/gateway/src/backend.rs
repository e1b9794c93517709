use std::time::Duration;

use async_trait::async_trait;
use rptflow_auth::USER_GUID_HEADER;
use rptflow_contracts::{
    IdentityToken, OperationSummary, RegistrationPurpose, RegistrationPurposeResponse,
    ReportVersionId, StateKind,
};
use rptflow_policy::{FetchError, ReportStateSource};
use serde::de::DeserializeOwned;

use crate::metrics;

#[derive(Debug)]
pub enum BackendError {
    Timeout,
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode),
    InvalidResponse(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Timeout => write!(f, "report API request timed out"),
            BackendError::Http(err) => write!(f, "report API HTTP error: {}", err),
            BackendError::BadStatus(status) => write!(f, "report API returned status {}", status),
            BackendError::InvalidResponse(detail) => {
                write!(f, "report API returned an invalid body: {}", detail)
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Http(value)
        }
    }
}

impl From<BackendError> for FetchError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Timeout => FetchError::Timeout,
            BackendError::Http(err) => FetchError::Unavailable(err.to_string()),
            BackendError::BadStatus(status) => FetchError::BadStatus(status.as_u16()),
            BackendError::InvalidResponse(detail) => FetchError::InvalidResponse(detail),
        }
    }
}

/// Reads report-version state from the reporting API over HTTP.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint_url(&self, id: ReportVersionId, kind: StateKind) -> String {
        let endpoint = match kind {
            StateKind::RegistrationPurpose => "registration-purpose",
            StateKind::OperationSummary => "report-operation",
            StateKind::VerificationRequirement => "report-needs-verification",
            StateKind::SupplementaryFlag => "is-supplementary-report-version",
        };
        format!("{}/reporting/report-version/{}/{}", self.base_url, id, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        id: ReportVersionId,
        kind: StateKind,
        token: &IdentityToken,
    ) -> Result<T, BackendError> {
        let request = self.http.get(self.endpoint_url(id, kind));
        let request = match token {
            IdentityToken::Bearer(authorization) => {
                request.header(reqwest::header::AUTHORIZATION, authorization.as_str())
            }
            IdentityToken::UserGuid(user_guid) => {
                request.header(USER_GUID_HEADER, user_guid.as_str())
            }
        };

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(BackendError::BadStatus(resp.status()));
        }

        let body = resp.bytes().await?;
        serde_json::from_slice::<T>(&body)
            .map_err(|err| BackendError::InvalidResponse(err.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        id: ReportVersionId,
        kind: StateKind,
        token: &IdentityToken,
    ) -> Result<T, FetchError> {
        let result = self.get_json::<T>(id, kind, token).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(BackendError::Timeout) => "timeout",
            Err(BackendError::Http(_)) => "unavailable",
            Err(BackendError::BadStatus(_)) => "bad_status",
            Err(BackendError::InvalidResponse(_)) => "invalid_response",
        };
        metrics::observe_backend_fetch(kind.as_str(), outcome);
        result.map_err(FetchError::from)
    }
}

#[async_trait]
impl ReportStateSource for BackendClient {
    async fn registration_purpose(
        &self,
        id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<RegistrationPurpose, FetchError> {
        let body: RegistrationPurposeResponse =
            self.fetch(id, StateKind::RegistrationPurpose, token).await?;
        Ok(body.registration_purpose)
    }

    async fn operation_summary(
        &self,
        id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<OperationSummary, FetchError> {
        self.fetch(id, StateKind::OperationSummary, token).await
    }

    async fn verification_required(
        &self,
        id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<bool, FetchError> {
        self.fetch(id, StateKind::VerificationRequirement, token).await
    }

    async fn is_supplementary(
        &self,
        id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<bool, FetchError> {
        self.fetch(id, StateKind::SupplementaryFlag, token).await
    }
}
