use async_trait::async_trait;
use rptflow_contracts::{IdentityToken, OperationSummary, RegistrationPurpose, ReportVersionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Timeout,
    Unavailable(String),
    BadStatus(u16),
    InvalidResponse(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "report API request timed out"),
            FetchError::Unavailable(reason) => write!(f, "report API unavailable: {}", reason),
            FetchError::BadStatus(status) => write!(f, "report API returned status {}", status),
            FetchError::InvalidResponse(reason) => {
                write!(f, "report API returned an invalid response: {}", reason)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Remote reads of report-version state. One call per invocation, no caching.
#[async_trait]
pub trait ReportStateSource: Send + Sync {
    async fn registration_purpose(
        &self,
        report_version_id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<RegistrationPurpose, FetchError>;

    async fn operation_summary(
        &self,
        report_version_id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<OperationSummary, FetchError>;

    async fn verification_required(
        &self,
        report_version_id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<bool, FetchError>;

    async fn is_supplementary(
        &self,
        report_version_id: ReportVersionId,
        token: &IdentityToken,
    ) -> Result<bool, FetchError>;
}
